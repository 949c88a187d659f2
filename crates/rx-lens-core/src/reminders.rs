//! Dose and refill reminder derivation.

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::models::{Recurrence, ReminderRecord, ResolvedMedicine};

/// Clock hour of the first medicine's daily dose.
pub const FIRST_DOSE_HOUR: u32 = 8;

/// Days from the prescription date until the refill reminder.
pub const REFILL_AFTER_DAYS: u64 = 30;

/// Clock time of refill reminders.
pub const REFILL_TIME: &str = "09:00";

/// Every id up to `u64::MAX` has been issued.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Record id space exhausted")]
pub struct IdsExhausted;

/// Hands out record ids strictly above every id already in use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    /// Start after the largest of `existing` (at 1 if there are none).
    pub fn after<I: IntoIterator<Item = u64>>(existing: I) -> Self {
        Self {
            last: existing.into_iter().max().unwrap_or(0),
        }
    }

    pub fn next_id(&mut self) -> Result<u64, IdsExhausted> {
        let id = self.last.checked_add(1).ok_or(IdsExhausted)?;
        self.last = id;
        Ok(id)
    }

    /// Largest id issued or seen so far (0 if none).
    pub fn last_issued(&self) -> u64 {
        self.last
    }
}

/// Dose time for the medicine at `position`, wrapping past midnight.
pub fn dose_time(position: usize) -> String {
    let hour = (FIRST_DOSE_HOUR as usize + position) % 24;
    format!("{:02}:00", hour)
}

/// Two reminders per medicine: a daily dose and a one-off refill.
///
/// Medicines are taken in mention order. Ids come from `ids`, so repeated
/// calls against the same allocator never collide.
pub fn derive_reminders(
    medicines: &[ResolvedMedicine],
    today: NaiveDate,
    ids: &mut IdAllocator,
) -> Result<Vec<ReminderRecord>, IdsExhausted> {
    let refill_date = today + Days::new(REFILL_AFTER_DAYS);

    let mut reminders = Vec::with_capacity(medicines.len() * 2);
    for (i, medicine) in medicines.iter().enumerate() {
        let name = &medicine.mentioned_name;
        reminders.push(ReminderRecord {
            id: ids.next_id()?,
            medication: name.clone(),
            title: format!("Take {}", name),
            date: today,
            time: dose_time(i),
            recurring: Recurrence::Daily,
            completed: false,
        });
        reminders.push(ReminderRecord {
            id: ids.next_id()?,
            medication: name.clone(),
            title: format!("Refill {}", name),
            date: refill_date,
            time: REFILL_TIME.to_string(),
            recurring: Recurrence::None,
            completed: false,
        });
    }
    Ok(reminders)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_two_reminders_per_medicine() {
        let medicines = vec![
            ResolvedMedicine::new("Crocin", "Acetaminophen"),
            ResolvedMedicine::new("Amoxil", "Amoxicillin"),
        ];
        let mut ids = IdAllocator::default();
        let reminders = derive_reminders(&medicines, date(2026, 1, 15), &mut ids).unwrap();

        assert_eq!(reminders.len(), 4);

        let dose = &reminders[0];
        assert_eq!(dose.id, 1);
        assert_eq!(dose.title, "Take Crocin");
        assert_eq!(dose.time, "08:00");
        assert_eq!(dose.date, date(2026, 1, 15));
        assert_eq!(dose.recurring, Recurrence::Daily);
        assert!(!dose.completed);

        let refill = &reminders[1];
        assert_eq!(refill.id, 2);
        assert_eq!(refill.title, "Refill Crocin");
        assert_eq!(refill.date, date(2026, 2, 14));
        assert_eq!(refill.time, REFILL_TIME);
        assert!(refill.is_refill());

        assert_eq!(reminders[2].time, "09:00");
        assert_eq!(reminders[2].medication, "Amoxil");
    }

    #[test]
    fn test_ids_continue_after_existing() {
        let mut ids = IdAllocator::after([3, 17, 5]);
        let reminders = derive_reminders(
            &[ResolvedMedicine::new("Crocin", "Acetaminophen")],
            date(2026, 1, 1),
            &mut ids,
        )
        .unwrap();
        assert_eq!(reminders[0].id, 18);
        assert_eq!(reminders[1].id, 19);
        assert_eq!(ids.last_issued(), 19);
    }

    #[test]
    fn test_dose_time_wraps() {
        assert_eq!(dose_time(0), "08:00");
        assert_eq!(dose_time(1), "09:00");
        assert_eq!(dose_time(15), "23:00");
        assert_eq!(dose_time(16), "00:00");
        assert_eq!(dose_time(41), "01:00");
    }

    #[test]
    fn test_no_medicines_no_reminders() {
        let mut ids = IdAllocator::default();
        assert!(derive_reminders(&[], date(2026, 1, 1), &mut ids).unwrap().is_empty());
        assert_eq!(ids.last_issued(), 0);
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let mut ids = IdAllocator::after([u64::MAX - 1]);
        assert_eq!(ids.next_id(), Ok(u64::MAX));
        assert_eq!(ids.next_id(), Err(IdsExhausted));

        let mut ids = IdAllocator::after([7, u64::MAX]);
        let result = derive_reminders(
            &[ResolvedMedicine::new("Crocin", "Acetaminophen")],
            date(2026, 1, 1),
            &mut ids,
        );
        assert_eq!(result, Err(IdsExhausted));
    }
}
