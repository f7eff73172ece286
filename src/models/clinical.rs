use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{explicit, require_fields};
use crate::error::CareError;

/// One timestamped vital-sign measurement, owned by exactly one patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalEntry {
    pub date: DateTime<Utc>,
    pub blood_pressure_high: i32,
    pub blood_pressure_low: i32,
    pub respiration_rate: i32,
    pub blood_oxygen_level: i32,
    pub heart_beat_rate: i32,
}

/// Inbound payload for appending an entry. Every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClinicalEntryDraft {
    pub date: Option<DateTime<Utc>>,
    pub blood_pressure_high: Option<i32>,
    pub blood_pressure_low: Option<i32>,
    pub respiration_rate: Option<i32>,
    pub blood_oxygen_level: Option<i32>,
    pub heart_beat_rate: Option<i32>,
}

impl ClinicalEntryDraft {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("date");
        }
        if self.blood_pressure_high.is_none() {
            missing.push("bloodPressureHigh");
        }
        if self.blood_pressure_low.is_none() {
            missing.push("bloodPressureLow");
        }
        if self.respiration_rate.is_none() {
            missing.push("respirationRate");
        }
        if self.blood_oxygen_level.is_none() {
            missing.push("bloodOxygenLevel");
        }
        if self.heart_beat_rate.is_none() {
            missing.push("heartBeatRate");
        }
        missing
    }

    pub fn into_entry(self) -> Result<ClinicalEntry, CareError> {
        require_fields(&self.missing())?;
        match (
            self.date,
            self.blood_pressure_high,
            self.blood_pressure_low,
            self.respiration_rate,
            self.blood_oxygen_level,
            self.heart_beat_rate,
        ) {
            (Some(date), Some(high), Some(low), Some(respiration), Some(oxygen), Some(heart)) => {
                Ok(ClinicalEntry {
                    date,
                    blood_pressure_high: high,
                    blood_pressure_low: low,
                    respiration_rate: respiration,
                    blood_oxygen_level: oxygen,
                    heart_beat_rate: heart,
                })
            }
            _ => Err(CareError::validation("incomplete clinical entry")),
        }
    }
}

impl From<&ClinicalEntry> for ClinicalEntryDraft {
    fn from(entry: &ClinicalEntry) -> Self {
        ClinicalEntryDraft {
            date: Some(entry.date),
            blood_pressure_high: Some(entry.blood_pressure_high),
            blood_pressure_low: Some(entry.blood_pressure_low),
            respiration_rate: Some(entry.respiration_rate),
            blood_oxygen_level: Some(entry.blood_oxygen_level),
            heart_beat_rate: Some(entry.heart_beat_rate),
        }
    }
}

/// Partial update of an entry. Absent fields keep their value, `null` clears.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClinicalEntryPatch {
    #[serde(default, deserialize_with = "explicit")]
    pub date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "explicit")]
    pub blood_pressure_high: Option<Option<i32>>,
    #[serde(default, deserialize_with = "explicit")]
    pub blood_pressure_low: Option<Option<i32>>,
    #[serde(default, deserialize_with = "explicit")]
    pub respiration_rate: Option<Option<i32>>,
    #[serde(default, deserialize_with = "explicit")]
    pub blood_oxygen_level: Option<Option<i32>>,
    #[serde(default, deserialize_with = "explicit")]
    pub heart_beat_rate: Option<Option<i32>>,
}

impl ClinicalEntryPatch {
    /// Produce the merged entry without touching `current`.
    pub fn merge(self, current: &ClinicalEntry) -> Result<ClinicalEntry, CareError> {
        let mut draft = ClinicalEntryDraft::from(current);
        if let Some(date) = self.date {
            draft.date = date;
        }
        if let Some(value) = self.blood_pressure_high {
            draft.blood_pressure_high = value;
        }
        if let Some(value) = self.blood_pressure_low {
            draft.blood_pressure_low = value;
        }
        if let Some(value) = self.respiration_rate {
            draft.respiration_rate = value;
        }
        if let Some(value) = self.blood_oxygen_level {
            draft.blood_oxygen_level = value;
        }
        if let Some(value) = self.heart_beat_rate {
            draft.heart_beat_rate = value;
        }
        draft.into_entry()
    }
}
