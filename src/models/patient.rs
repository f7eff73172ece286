use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{explicit, non_blank, require_fields, valid_email, ClinicalEntry};
use crate::error::CareError;
use crate::storage::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Manually maintained flag. The classifier reads it but never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatientStatus {
    Critical,
    #[default]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub address: String,
    pub status: PatientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub owner_user_id: Uuid,
    #[serde(default)]
    pub clinical_entries: Vec<ClinicalEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Patient {
    const COLLECTION: &'static str = "patients";

    fn id(&self) -> Uuid {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.email.to_lowercase())
    }
}

impl Patient {
    pub fn is_flagged_critical(&self) -> bool {
        self.status == PatientStatus::Critical
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub status: Option<PatientStatus>,
    pub image: Option<String>,
    pub owner_user_id: Option<Uuid>,
}

impl PatientDraft {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        if self.phone.is_none() {
            missing.push("phone");
        }
        if self.birth_date.is_none() {
            missing.push("birthDate");
        }
        if self.gender.is_none() {
            missing.push("gender");
        }
        if self.address.is_none() {
            missing.push("address");
        }
        if self.owner_user_id.is_none() {
            missing.push("ownerUserId");
        }
        missing
    }

    /// Build a new record with a fresh id and an empty clinical history.
    pub fn into_patient(self, now: DateTime<Utc>) -> Result<Patient, CareError> {
        require_fields(&self.missing())?;
        let (
            Some(name),
            Some(email),
            Some(phone),
            Some(birth_date),
            Some(gender),
            Some(address),
            Some(owner_user_id),
        ) = (
            self.name,
            self.email,
            self.phone,
            self.birth_date,
            self.gender,
            self.address,
            self.owner_user_id,
        )
        else {
            return Err(CareError::validation("incomplete patient record"));
        };

        non_blank("name", &name)?;
        non_blank("phone", &phone)?;
        non_blank("address", &address)?;
        valid_email(&email)?;

        Ok(Patient {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            birth_date,
            gender,
            address,
            status: self.status.unwrap_or_default(),
            image: self.image,
            owner_user_id,
            clinical_entries: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Allow-listed partial update. Identity, ownership and clinical history are
/// not part of it, and `deny_unknown_fields` rejects them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub status: Option<PatientStatus>,
    #[serde(default, deserialize_with = "explicit")]
    pub image: Option<Option<String>>,
}

impl PatientUpdate {
    pub fn apply(self, patient: &mut Patient) -> Result<(), CareError> {
        if let Some(name) = self.name {
            non_blank("name", &name)?;
            patient.name = name;
        }
        if let Some(email) = self.email {
            valid_email(&email)?;
            patient.email = email;
        }
        if let Some(phone) = self.phone {
            non_blank("phone", &phone)?;
            patient.phone = phone;
        }
        if let Some(birth_date) = self.birth_date {
            patient.birth_date = birth_date;
        }
        if let Some(gender) = self.gender {
            patient.gender = gender;
        }
        if let Some(address) = self.address {
            non_blank("address", &address)?;
            patient.address = address;
        }
        if let Some(status) = self.status {
            patient.status = status;
        }
        if let Some(image) = self.image {
            patient.image = image;
        }
        Ok(())
    }
}
