//! Composition of pipeline outputs into stored records.

use chrono::NaiveDate;

use crate::models::{GenericPredictions, MedicationRecord, PrescriptionRecord};
use crate::reminders::{IdAllocator, IdsExhausted};

/// Build the prescription record for one upload, taking its id from `ids`.
pub fn assemble_prescription(
    ids: &mut IdAllocator,
    filename: &str,
    date: NaiveDate,
    structured_text: &str,
    generic_predictions: &GenericPredictions,
) -> Result<PrescriptionRecord, IdsExhausted> {
    Ok(PrescriptionRecord {
        id: ids.next_id()?,
        filename: filename.to_string(),
        date,
        structured_text: structured_text.to_string(),
        generic_predictions: generic_predictions.clone(),
    })
}

/// Add a catalog entry for each mentioned name not already cataloged.
///
/// Matching is by exact name; an existing entry is never updated. Returns
/// the entries that were added.
pub fn merge_medications(
    medications: &mut Vec<MedicationRecord>,
    predictions: &GenericPredictions,
    ids: &mut IdAllocator,
) -> Result<Vec<MedicationRecord>, IdsExhausted> {
    let mut added = Vec::new();

    for medicine in predictions {
        if medications.iter().any(|m| m.name == medicine.mentioned_name) {
            continue;
        }
        let record = MedicationRecord::new(
            ids.next_id()?,
            medicine.mentioned_name.clone(),
            medicine.generic_name.clone(),
        );
        medications.push(record.clone());
        added.push(record);
    }
    Ok(added)
}
