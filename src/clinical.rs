//! Positional CRUD over a patient's embedded clinical history.
//!
//! Entries have no identity of their own. They are addressed by their 0-based
//! position, and deleting one shifts every later entry down by one. Each
//! operation resolves the owning patient inside a single store update, so it
//! always acts on the current version of the sequence.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::CareError;
use crate::models::{ClinicalEntry, ClinicalEntryDraft, ClinicalEntryPatch, Patient};
use crate::storage::StorageEngine;

/// Check `index` against a sequence of `len` entries.
pub fn resolve_index(index: i64, len: usize) -> Result<usize, CareError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(CareError::IndexOutOfRange { index, len })
}

#[derive(Debug, Clone)]
pub struct ClinicalEntryStore {
    storage: Arc<StorageEngine>,
}

impl ClinicalEntryStore {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        ClinicalEntryStore { storage }
    }

    /// Append an entry to the end of the patient's history.
    #[instrument(skip(self, draft))]
    pub async fn append(
        &self,
        patient_id: Uuid,
        draft: ClinicalEntryDraft,
    ) -> Result<Patient, CareError> {
        let entry = draft.into_entry()?;
        let patient = self
            .storage
            .patients()
            .update(patient_id, |patient| -> Result<Patient, CareError> {
                patient.clinical_entries.push(entry);
                patient.updated_at = Utc::now();
                Ok(patient.clone())
            })
            .await?;

        debug!(entries = patient.clinical_entries.len(), "clinical entry appended");
        Ok(patient)
    }

    #[instrument(skip(self))]
    pub async fn fetch_by_index(
        &self,
        patient_id: Uuid,
        index: i64,
    ) -> Result<ClinicalEntry, CareError> {
        let patient = self
            .storage
            .patients()
            .get(patient_id)
            .await
            .ok_or_else(|| not_found(patient_id))?;
        let position = resolve_index(index, patient.clinical_entries.len())?;
        Ok(patient.clinical_entries[position].clone())
    }

    /// Merge `patch` into the entry at `index` and return the merged entry.
    #[instrument(skip(self, patch))]
    pub async fn update_by_index(
        &self,
        patient_id: Uuid,
        index: i64,
        patch: ClinicalEntryPatch,
    ) -> Result<ClinicalEntry, CareError> {
        self.storage
            .patients()
            .update(patient_id, |patient| -> Result<ClinicalEntry, CareError> {
                let position = resolve_index(index, patient.clinical_entries.len())?;
                let merged = patch.merge(&patient.clinical_entries[position])?;
                patient.clinical_entries[position] = merged.clone();
                patient.updated_at = Utc::now();
                Ok(merged)
            })
            .await
    }

    /// Remove the entry at `index`; later entries move down one position.
    #[instrument(skip(self))]
    pub async fn delete_by_index(
        &self,
        patient_id: Uuid,
        index: i64,
    ) -> Result<Patient, CareError> {
        let patient = self
            .storage
            .patients()
            .update(patient_id, |patient| -> Result<Patient, CareError> {
                let position = resolve_index(index, patient.clinical_entries.len())?;
                patient.clinical_entries.remove(position);
                patient.updated_at = Utc::now();
                Ok(patient.clone())
            })
            .await?;

        debug!(entries = patient.clinical_entries.len(), "clinical entry removed");
        Ok(patient)
    }
}

fn not_found(patient_id: Uuid) -> CareError {
    CareError::NotFound(format!("no patients record with id {}", patient_id))
}
