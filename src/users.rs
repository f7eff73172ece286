//! Staff account management and credential hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::UsersConfig;
use crate::error::CareError;
use crate::models::{non_blank, valid_email, UserAccount, UserDraft, UserProfile, UserUpdate};
use crate::storage::StorageEngine;

#[derive(Debug, Clone)]
pub struct UserService {
    storage: Arc<StorageEngine>,
    config: UsersConfig,
}

impl UserService {
    pub fn new(storage: Arc<StorageEngine>, config: UsersConfig) -> Self {
        UserService { storage, config }
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: UserDraft) -> Result<UserProfile, CareError> {
        draft.check_complete()?;
        let (Some(name), Some(email), Some(password), Some(phone), Some(position)) =
            (draft.name, draft.email, draft.password, draft.phone, draft.position)
        else {
            return Err(CareError::validation("incomplete user account"));
        };
        non_blank("name", &name)?;
        non_blank("phone", &phone)?;
        valid_email(&email)?;
        self.check_password(&password)?;

        let user = UserAccount {
            id: Uuid::new_v4(),
            name,
            email,
            password: hash_password(password).await?,
            phone,
            position,
            created_at: Utc::now(),
        };
        let user = self.storage.users().insert(user).await?;
        info!(user = %user.id, position = ?user.position, "user created");
        Ok(UserProfile::from(&user))
    }

    pub async fn fetch_by_id(&self, id: Uuid) -> Result<UserProfile, CareError> {
        self.storage
            .users()
            .get(id)
            .await
            .map(|user| UserProfile::from(&user))
            .ok_or_else(|| CareError::NotFound(format!("no users record with id {}", id)))
    }

    pub async fn fetch_all(&self) -> Result<Vec<UserProfile>, CareError> {
        let users = self.storage.users().list().await;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: Uuid, update: UserUpdate) -> Result<UserProfile, CareError> {
        // Hash before taking the collection lock.
        let password = match update.password {
            Some(password) => {
                self.check_password(&password)?;
                Some(hash_password(password).await?)
            }
            None => None,
        };

        self.storage
            .users()
            .update(id, |user| -> Result<UserProfile, CareError> {
                if let Some(name) = update.name {
                    non_blank("name", &name)?;
                    user.name = name;
                }
                if let Some(email) = update.email {
                    valid_email(&email)?;
                    user.email = email;
                }
                if let Some(phone) = update.phone {
                    non_blank("phone", &phone)?;
                    user.phone = phone;
                }
                if let Some(position) = update.position {
                    user.position = position;
                }
                if let Some(password) = password {
                    user.password = password;
                }
                Ok(UserProfile::from(&*user))
            })
            .await
    }

    /// Refuses while any patient still names this user as owner.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), CareError> {
        if self.storage.patients().any(|p| p.owner_user_id == id).await {
            warn!(user = %id, "refusing to delete user that still owns patients");
            return Err(CareError::Conflict(format!("user {} still owns patient records", id)));
        }
        self.storage.users().remove(id).await?;
        info!(user = %id, "user deleted");
        Ok(())
    }

    fn check_password(&self, password: &str) -> Result<(), CareError> {
        if password.chars().count() < self.config.min_password_length {
            return Err(CareError::Validation(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        Ok(())
    }
}

/// Argon2id PHC string with a fresh random salt. Runs on the blocking pool.
async fn hash_password(password: String) -> Result<String, CareError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CareError::StoreUnavailable(format!("password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| CareError::StoreUnavailable(format!("password hashing task failed: {}", e)))?
}
