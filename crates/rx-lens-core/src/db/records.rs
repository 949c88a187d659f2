//! Typed record operations over a [`RecordStore`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Collection, Database, DbError, DbResult, JsonDirStore, RecordStore};
use crate::assembler::{assemble_prescription, merge_medications};
use crate::models::{
    AlternativesMap, GenericPredictions, MedicationRecord, PrescriptionRecord, ReminderRecord,
    ResolvedMedicine,
};
use crate::reminders::{derive_reminders, IdAllocator};

/// Everything one upload writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedUpload {
    pub prescription: PrescriptionRecord,
    /// Catalog entries added by this upload
    pub new_medications: Vec<MedicationRecord>,
    pub reminders: Vec<ReminderRecord>,
}

/// Highest id ever issued per record collection. Deletes never lower it.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct IdCounters(BTreeMap<String, u64>);

impl IdCounters {
    /// Allocator past both the stored high-water mark and every id in use.
    fn allocator<I>(&self, collection: Collection, in_use: I) -> IdAllocator
    where
        I: IntoIterator<Item = u64>,
    {
        let high_water = self.0.get(collection.as_str()).copied().unwrap_or(0);
        IdAllocator::after(in_use.into_iter().chain(std::iter::once(high_water)))
    }

    fn record(&mut self, collection: Collection, ids: &IdAllocator) {
        let high_water = self.0.entry(collection.as_str().to_string()).or_insert(0);
        *high_water = (*high_water).max(ids.last_issued());
    }
}

/// Single-writer access to the record collections.
///
/// Each operation is a read-modify-write of whole documents under one lock.
/// Operations that change several collections save them in one batch.
pub struct Records {
    store: Mutex<Box<dyn RecordStore>>,
}

impl Records {
    pub fn new(store: Box<dyn RecordStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// JSON files under `dir`.
    pub fn open_json_dir<P: AsRef<Path>>(dir: P) -> DbResult<Self> {
        Ok(Self::new(Box::new(JsonDirStore::open(dir)?)))
    }

    /// SQLite database file at `path`.
    pub fn open_sqlite<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Ok(Self::new(Box::new(Database::open(path)?)))
    }

    /// In-memory SQLite (for testing).
    pub fn in_memory() -> DbResult<Self> {
        Ok(Self::new(Box::new(Database::open_in_memory()?)))
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Box<dyn RecordStore>>> {
        self.store.lock().map_err(|_| DbError::Poisoned)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn prescriptions(&self) -> DbResult<Vec<PrescriptionRecord>> {
        load(&**self.lock()?, Collection::Prescriptions)
    }

    pub fn medications(&self) -> DbResult<Vec<MedicationRecord>> {
        load(&**self.lock()?, Collection::Medications)
    }

    pub fn reminders(&self) -> DbResult<Vec<ReminderRecord>> {
        load(&**self.lock()?, Collection::Reminders)
    }

    pub fn alternatives(&self) -> DbResult<AlternativesMap> {
        load(&**self.lock()?, Collection::DrugAlternatives)
    }

    /// Stored brands for one drug, matched case-insensitively. Empty if unknown.
    pub fn alternatives_for(&self, drug: &str) -> DbResult<Vec<String>> {
        let key = drug.trim().to_lowercase();
        let mut alternatives = self.alternatives()?;
        Ok(alternatives.remove(&key).unwrap_or_default())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Mark a reminder completed. Returns whether it exists.
    pub fn complete_reminder(&self, id: u64) -> DbResult<bool> {
        let mut store = self.lock()?;
        let mut reminders: Vec<ReminderRecord> = load(&**store, Collection::Reminders)?;
        let Some(reminder) = reminders.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        reminder.completed = true;
        save(&mut **store, Collection::Reminders, &reminders)?;
        info!(reminder_id = id, "Reminder completed");
        Ok(true)
    }

    /// Delete a reminder. Returns whether it existed.
    pub fn delete_reminder(&self, id: u64) -> DbResult<bool> {
        let mut store = self.lock()?;
        let mut reminders: Vec<ReminderRecord> = load(&**store, Collection::Reminders)?;
        let before = reminders.len();
        reminders.retain(|r| r.id != id);
        if reminders.len() == before {
            return Ok(false);
        }
        save(&mut **store, Collection::Reminders, &reminders)?;
        info!(reminder_id = id, "Reminder deleted");
        Ok(true)
    }

    /// Delete a catalog entry. Returns whether it existed.
    pub fn delete_medication(&self, id: u64) -> DbResult<bool> {
        let mut store = self.lock()?;
        let mut medications: Vec<MedicationRecord> =
            load(&**store, Collection::Medications)?;
        let before = medications.len();
        medications.retain(|m| m.id != id);
        if medications.len() == before {
            return Ok(false);
        }
        save(&mut **store, Collection::Medications, &medications)?;
        info!(medication_id = id, "Medication deleted");
        Ok(true)
    }

    /// Merge fresh lookups into the stored map, fresh values winning.
    /// Returns the merged map.
    pub fn merge_alternatives(&self, fresh: &AlternativesMap) -> DbResult<AlternativesMap> {
        let mut store = self.lock()?;
        let mut stored: AlternativesMap = load(&**store, Collection::DrugAlternatives)?;
        stored.extend(fresh.iter().map(|(k, v)| (k.clone(), v.clone())));
        save(&mut **store, Collection::DrugAlternatives, &stored)?;
        debug!(fresh = fresh.len(), total = stored.len(), "Merged alternatives");
        Ok(stored)
    }

    /// Derive reminders with ids past every stored reminder and append them.
    pub fn append_reminders(
        &self,
        medicines: &[ResolvedMedicine],
        date: NaiveDate,
    ) -> DbResult<Vec<ReminderRecord>> {
        let mut store = self.lock()?;
        let mut reminders: Vec<ReminderRecord> = load(&**store, Collection::Reminders)?;
        let mut counters: IdCounters = load(&**store, Collection::IdCounters)?;

        let mut ids = counters.allocator(Collection::Reminders, reminders.iter().map(|r| r.id));
        let fresh = derive_reminders(medicines, date, &mut ids)?;
        reminders.extend(fresh.iter().cloned());
        counters.record(Collection::Reminders, &ids);

        store.save_documents(&[
            encode(Collection::Reminders, &reminders)?,
            encode(Collection::IdCounters, &counters)?,
        ])?;
        Ok(fresh)
    }

    /// Append the prescription, catalog new medications, append their
    /// reminders and merge the upload's alternatives, saved as one batch.
    pub fn commit_upload(
        &self,
        filename: &str,
        date: NaiveDate,
        structured_text: &str,
        predictions: &GenericPredictions,
        alternatives: &AlternativesMap,
    ) -> DbResult<CommittedUpload> {
        let mut store = self.lock()?;
        let mut counters: IdCounters = load(&**store, Collection::IdCounters)?;

        let mut prescriptions: Vec<PrescriptionRecord> =
            load(&**store, Collection::Prescriptions)?;
        let mut ids = counters.allocator(
            Collection::Prescriptions,
            prescriptions.iter().map(|p| p.id),
        );
        let prescription =
            assemble_prescription(&mut ids, filename, date, structured_text, predictions)?;
        counters.record(Collection::Prescriptions, &ids);
        prescriptions.push(prescription.clone());

        let mut medications: Vec<MedicationRecord> =
            load(&**store, Collection::Medications)?;
        let mut ids = counters.allocator(Collection::Medications, medications.iter().map(|m| m.id));
        let new_medications = merge_medications(&mut medications, predictions, &mut ids)?;
        counters.record(Collection::Medications, &ids);

        let mut reminders: Vec<ReminderRecord> = load(&**store, Collection::Reminders)?;
        let mut ids = counters.allocator(Collection::Reminders, reminders.iter().map(|r| r.id));
        let fresh = derive_reminders(predictions.as_slice(), date, &mut ids)?;
        counters.record(Collection::Reminders, &ids);
        reminders.extend(fresh.iter().cloned());

        let mut stored_alternatives: AlternativesMap =
            load(&**store, Collection::DrugAlternatives)?;
        stored_alternatives.extend(alternatives.iter().map(|(k, v)| (k.clone(), v.clone())));

        store.save_documents(&[
            encode(Collection::Prescriptions, &prescriptions)?,
            encode(Collection::Medications, &medications)?,
            encode(Collection::Reminders, &reminders)?,
            encode(Collection::DrugAlternatives, &stored_alternatives)?,
            encode(Collection::IdCounters, &counters)?,
        ])?;

        info!(
            prescription_id = prescription.id,
            new_medications = new_medications.len(),
            reminders = fresh.len(),
            alternatives = alternatives.len(),
            "Committed upload"
        );

        Ok(CommittedUpload {
            prescription,
            new_medications,
            reminders: fresh,
        })
    }
}

/// Load a collection, defaulting to empty when never saved.
fn load<T, S>(store: &S, collection: Collection) -> DbResult<T>
where
    T: DeserializeOwned + Default,
    S: RecordStore + ?Sized,
{
    match store.load_document(collection)? {
        Some(body) if !body.trim().is_empty() => Ok(serde_json::from_str(&body)?),
        _ => Ok(T::default()),
    }
}

fn save<T, S>(store: &mut S, collection: Collection, value: &T) -> DbResult<()>
where
    T: Serialize,
    S: RecordStore + ?Sized,
{
    let (collection, body) = encode(collection, value)?;
    store.save_document(collection, &body)
}

fn encode<T: Serialize>(collection: Collection, value: &T) -> DbResult<(Collection, String)> {
    Ok((collection, serde_json::to_string_pretty(value)?))
}
