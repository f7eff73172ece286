//! Patient record lifecycle.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::classifier::CriticalClassifier;
use crate::clinical::ClinicalEntryStore;
use crate::config::ClassifierConfig;
use crate::error::CareError;
use crate::models::{Patient, PatientDraft, PatientUpdate};
use crate::storage::StorageEngine;

#[derive(Debug, Clone)]
pub struct PatientService {
    storage: Arc<StorageEngine>,
    clinical: ClinicalEntryStore,
    classifier: CriticalClassifier,
}

impl PatientService {
    pub fn new(storage: Arc<StorageEngine>, classifier: ClassifierConfig) -> Self {
        PatientService {
            clinical: ClinicalEntryStore::new(Arc::clone(&storage)),
            classifier: CriticalClassifier::new(Arc::clone(&storage), classifier),
            storage,
        }
    }

    pub fn clinical(&self) -> &ClinicalEntryStore {
        &self.clinical
    }

    pub async fn find_critical(&self) -> Result<Vec<Patient>, CareError> {
        self.classifier.find_critical().await
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: PatientDraft) -> Result<Patient, CareError> {
        let patient = draft.into_patient(Utc::now())?;
        if self.storage.users().get(patient.owner_user_id).await.is_none() {
            return Err(CareError::Validation(format!(
                "ownerUserId {} does not reference an existing user",
                patient.owner_user_id
            )));
        }

        let patient = self.storage.patients().insert(patient).await?;
        info!(patient = %patient.id, owner = %patient.owner_user_id, "patient created");
        Ok(patient)
    }

    pub async fn fetch_by_id(&self, id: Uuid) -> Result<Patient, CareError> {
        self.storage
            .patients()
            .get(id)
            .await
            .ok_or_else(|| CareError::NotFound(format!("no patients record with id {}", id)))
    }

    pub async fn fetch_all(&self) -> Result<Vec<Patient>, CareError> {
        Ok(self.storage.patients().list().await)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: Uuid, update: PatientUpdate) -> Result<Patient, CareError> {
        self.storage
            .patients()
            .update(id, |patient| -> Result<Patient, CareError> {
                update.apply(patient)?;
                patient.updated_at = Utc::now();
                Ok(patient.clone())
            })
            .await
    }

    /// Remove the record and, with it, its whole clinical history.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), CareError> {
        let removed = self.storage.patients().remove(id).await?;
        info!(entries = removed.clinical_entries.len(), "patient deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinicalEntryDraft, Gender, PatientStatus, Position, UserAccount};
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;

    async fn service() -> (PatientService, Uuid) {
        let storage = Arc::new(StorageEngine::in_memory());
        let owner = UserAccount {
            id: Uuid::new_v4(),
            name: "Dr. Imani Cole".to_string(),
            email: "imani@clinic.example".to_string(),
            password: "$argon2id$placeholder".to_string(),
            phone: "555-0101".to_string(),
            position: Position::Doctor,
            created_at: Utc::now(),
        };
        let owner_id = storage.users().insert(owner).await.unwrap().id;
        (PatientService::new(storage, ClassifierConfig::default()), owner_id)
    }

    fn draft(email: &str, owner: Uuid) -> PatientDraft {
        PatientDraft {
            name: Some("Lena Okafor".to_string()),
            email: Some(email.to_string()),
            phone: Some("555-0177".to_string()),
            birth_date: NaiveDate::from_ymd_opt(1964, 8, 30),
            gender: Some(Gender::Female),
            address: Some("88 Quay Lane".to_string()),
            status: None,
            image: Some("uploads/lena.jpg".to_string()),
            owner_user_id: Some(owner),
        }
    }

    #[tokio::test]
    async fn test_create_then_fetch_round_trip() {
        let (service, owner) = service().await;
        let created = service.create(draft("lena@example.com", owner)).await.unwrap();
        let fetched = service.fetch_by_id(created.id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.name, "Lena Okafor");
        assert_eq!(fetched.email, "lena@example.com");
        assert_eq!(fetched.birth_date, NaiveDate::from_ymd_opt(1964, 8, 30).unwrap());
        assert_eq!(fetched.image.as_deref(), Some("uploads/lena.jpg"));
        assert_eq!(fetched.owner_user_id, owner);
        assert_eq!(fetched.status, PatientStatus::Normal);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (service, owner) = service().await;
        service.create(draft("lena@example.com", owner)).await.unwrap();

        let err = service.create(draft("LENA@example.com", owner)).await.unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
        assert_eq!(service.fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_owner_rejected() {
        let (service, _) = service().await;
        let err = service.create(draft("lena@example.com", Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
        assert!(service.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let (service, owner) = service().await;
        let created = service.create(draft("lena@example.com", owner)).await.unwrap();

        let update = PatientUpdate {
            address: Some("3 Mill Row".to_string()),
            status: Some(PatientStatus::Critical),
            ..Default::default()
        };
        let updated = service.update(created.id, update).await.unwrap();

        assert_eq!(updated.address, "3 Mill Row");
        assert_eq!(updated.status, PatientStatus::Critical);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.phone, created.phone);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_update_email_into_collision() {
        let (service, owner) = service().await;
        service.create(draft("lena@example.com", owner)).await.unwrap();
        let other = service.create(draft("omar@example.com", owner)).await.unwrap();

        let update = PatientUpdate {
            email: Some("lena@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(service.update(other.id, update).await, Err(CareError::Conflict(_))));
        assert_eq!(service.fetch_by_id(other.id).await.unwrap().email, "omar@example.com");
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let (service, _) = service().await;
        let id = Uuid::new_v4();
        assert!(matches!(service.fetch_by_id(id).await, Err(CareError::NotFound(_))));
        assert!(matches!(
            service.update(id, PatientUpdate::default()).await,
            Err(CareError::NotFound(_))
        ));
        assert!(matches!(service.delete(id).await, Err(CareError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_takes_clinical_history_along() {
        let (service, owner) = service().await;
        let created = service.create(draft("lena@example.com", owner)).await.unwrap();
        let entry = ClinicalEntryDraft {
            date: Some(Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).unwrap()),
            blood_pressure_high: Some(130),
            blood_pressure_low: Some(85),
            respiration_rate: Some(18),
            blood_oxygen_level: Some(96),
            heart_beat_rate: Some(77),
        };
        service.clinical().append(created.id, entry).await.unwrap();

        service.delete(created.id).await.unwrap();
        assert!(matches!(
            service.clinical().fetch_by_index(created.id, 0).await,
            Err(CareError::NotFound(_))
        ));
        assert!(service.fetch_all().await.unwrap().is_empty());
    }
}
