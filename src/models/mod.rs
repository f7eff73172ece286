//! Domain records and the inbound payload shapes that build them.

pub mod clinical;
pub mod patient;
pub mod user;

pub use clinical::{ClinicalEntry, ClinicalEntryDraft, ClinicalEntryPatch};
pub use patient::{Gender, Patient, PatientDraft, PatientStatus, PatientUpdate};
pub use user::{Position, UserAccount, UserDraft, UserProfile, UserUpdate};

use serde::{Deserialize, Deserializer};

use crate::error::CareError;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
/// Pair with `#[serde(default)]`.
pub(crate) fn explicit<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Fails with a `Validation` error naming every unset required field.
pub(crate) fn require_fields(missing: &[&'static str]) -> Result<(), CareError> {
    if missing.is_empty() {
        return Ok(());
    }
    Err(CareError::Validation(format!(
        "missing required fields: {}",
        missing.join(", ")
    )))
}

pub(crate) fn non_blank(name: &str, value: &str) -> Result<(), CareError> {
    if value.trim().is_empty() {
        return Err(CareError::Validation(format!("{} must not be blank", name)));
    }
    Ok(())
}

pub(crate) fn valid_email(value: &str) -> Result<(), CareError> {
    if !validator::validate_email(value) {
        return Err(CareError::Validation(format!("{} is not a valid email address", value)));
    }
    Ok(())
}
