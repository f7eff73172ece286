use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::require_fields;
use crate::error::CareError;
use crate::storage::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    CareGiver,
    Doctor,
    Nurse,
}

/// Stored staff account. `password` holds an argon2 PHC string, never plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub position: Position,
    pub created_at: DateTime<Utc>,
}

impl Document for UserAccount {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> Uuid {
        self.id
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.email.to_lowercase())
    }
}

/// Outbound view of an account, without the credential hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub position: Position,
    pub created_at: DateTime<Utc>,
}

impl From<&UserAccount> for UserProfile {
    fn from(user: &UserAccount) -> Self {
        UserProfile {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            position: user.position,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserDraft {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub position: Option<Position>,
}

impl UserDraft {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.email.is_none() {
            missing.push("email");
        }
        if self.password.is_none() {
            missing.push("password");
        }
        if self.phone.is_none() {
            missing.push("phone");
        }
        if self.position.is_none() {
            missing.push("position");
        }
        missing
    }

    /// Fails naming every unset field.
    pub fn check_complete(&self) -> Result<(), CareError> {
        require_fields(&self.missing())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub position: Option<Position>,
}
