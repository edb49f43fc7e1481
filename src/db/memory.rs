use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::session::tokens_match;
use crate::db::models::Identity;
use crate::db::repository::{IdentityDetails, IdentityRepository};
use crate::error::{AppError, DatabaseError};

/// Process-local identity store used by tests and the `memory` backend.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    identities: Arc<RwLock<HashMap<Uuid, Identity>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn remove(&self, id: Uuid) -> Option<Identity> {
        self.identities.write().await.remove(&id)
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn create(&self, identity: &Identity) -> Result<Identity, AppError> {
        let mut identities = self.identities.write().await;

        for existing in identities.values() {
            if existing.id == identity.id {
                return Err(DatabaseError::Duplicate("users_pkey".into()).into());
            }
            if existing.email == identity.email {
                return Err(DatabaseError::Duplicate("users_email_key".into()).into());
            }
            if existing.phone == identity.phone {
                return Err(DatabaseError::Duplicate("users_phone_key".into()).into());
            }
        }

        identities.insert(identity.id, identity.clone());
        Ok(identity.clone())
    }

    async fn update_refresh_token(&self, id: Uuid, token: Option<String>) -> Result<(), AppError> {
        if let Some(identity) = self.identities.write().await.get_mut(&id) {
            identity.refresh_token = token;
            identity.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        token: String,
    ) -> Result<bool, AppError> {
        let mut identities = self.identities.write().await;
        let Some(identity) = identities.get_mut(&id) else {
            return Ok(false);
        };

        match &identity.refresh_token {
            Some(current) if tokens_match(current, expected) => {
                identity.refresh_token = Some(token);
                identity.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), AppError> {
        let mut identities = self.identities.write().await;
        let identity = identities.get_mut(&id).ok_or(DatabaseError::NotFound)?;
        identity.password_hash = password_hash;
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn update_details(
        &self,
        id: Uuid,
        details: IdentityDetails,
    ) -> Result<Option<Identity>, AppError> {
        let mut identities = self.identities.write().await;

        if let Some(phone) = &details.phone {
            let taken = identities
                .values()
                .any(|other| other.id != id && &other.phone == phone);
            if taken {
                return Err(DatabaseError::Duplicate("users_phone_key".into()).into());
            }
        }

        Ok(identities.get_mut(&id).map(|identity| {
            if let Some(name) = details.name {
                identity.name = name;
            }
            if let Some(phone) = details.phone {
                identity.phone = phone;
            }
            identity.updated_at = Utc::now();
            identity.clone()
        }))
    }
}
