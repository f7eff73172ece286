//! Critical patient classification.
//!
//! A patient is critical when a clinician flagged it (`status: Critical`) or
//! when the evaluated clinical entries leave at least one threshold band. The
//! stored flag is read only; classification never writes it back.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::{Band, ClassifierConfig, ClassifierScope};
use crate::error::CareError;
use crate::models::{ClinicalEntry, Patient};
use crate::storage::StorageEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Vital {
    BloodPressureHigh,
    BloodPressureLow,
    RespirationRate,
    BloodOxygenLevel,
    HeartBeatRate,
}

/// One reading outside its normal band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breach {
    pub vital: Vital,
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone)]
pub struct CriticalClassifier {
    storage: Arc<StorageEngine>,
    config: ClassifierConfig,
}

impl CriticalClassifier {
    pub fn new(storage: Arc<StorageEngine>, config: ClassifierConfig) -> Self {
        CriticalClassifier { storage, config }
    }

    /// Every band the entry falls outside of.
    pub fn assess(&self, entry: &ClinicalEntry) -> Vec<Breach> {
        let t = &self.config.thresholds;
        let readings: [(Vital, i32, Band); 5] = [
            (Vital::BloodPressureHigh, entry.blood_pressure_high, t.blood_pressure_high),
            (Vital::BloodPressureLow, entry.blood_pressure_low, t.blood_pressure_low),
            (Vital::RespirationRate, entry.respiration_rate, t.respiration_rate),
            (Vital::BloodOxygenLevel, entry.blood_oxygen_level, t.blood_oxygen_level),
            (Vital::HeartBeatRate, entry.heart_beat_rate, t.heart_beat_rate),
        ];

        readings
            .into_iter()
            .filter(|(_, value, band)| !band.contains(*value))
            .map(|(vital, value, band)| Breach {
                vital,
                value,
                min: band.min,
                max: band.max,
            })
            .collect()
    }

    /// Breaches found in the entries this classifier's scope looks at.
    pub fn breaches(&self, patient: &Patient) -> Vec<Breach> {
        match self.config.scope {
            ClassifierScope::Latest => latest_entry(&patient.clinical_entries)
                .map(|entry| self.assess(entry))
                .unwrap_or_default(),
            ClassifierScope::Any => patient
                .clinical_entries
                .iter()
                .flat_map(|entry| self.assess(entry))
                .collect(),
        }
    }

    /// Scan every patient and keep the critical ones, in store order.
    #[instrument(skip(self))]
    pub async fn find_critical(&self) -> Result<Vec<Patient>, CareError> {
        let patients = self.storage.patients().list().await;
        let scanned = patients.len();

        let critical: Vec<Patient> = patients
            .into_iter()
            .filter(|patient| {
                let breaches = self.breaches(patient);
                if !breaches.is_empty() {
                    debug!(patient = %patient.id, ?breaches, "thresholds breached");
                }
                patient.is_flagged_critical() || !breaches.is_empty()
            })
            .collect();

        info!(
            scanned,
            critical = critical.len(),
            scope = ?self.config.scope,
            "critical scan finished"
        );
        Ok(critical)
    }
}

/// Most recent entry by measurement date; later position wins a tie.
pub fn latest_entry(entries: &[ClinicalEntry]) -> Option<&ClinicalEntry> {
    entries
        .iter()
        .enumerate()
        .max_by_key(|(position, entry)| (entry.date, *position))
        .map(|(_, entry)| entry)
}
