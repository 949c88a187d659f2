//! Dosage and refill reminder models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How often a reminder repeats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    None,
}

/// A reminder tied to one mentioned medicine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderRecord {
    pub id: u64,
    /// Mentioned name of the medicine
    pub medication: String,
    pub title: String,
    pub date: NaiveDate,
    /// Clock time, "HH:MM"
    pub time: String,
    pub recurring: Recurrence,
    pub completed: bool,
}

impl ReminderRecord {
    pub fn is_refill(&self) -> bool {
        self.recurring == Recurrence::None
    }
}
