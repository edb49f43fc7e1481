use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repository::IdentityRepository;
use crate::error::AppError;

/// The single refresh-token slot kept on each identity.
///
/// Writes are last-write-wins: a login on a second device overwrites the
/// slot and so ends the first device's session.
#[derive(Clone)]
pub struct SessionStore {
    repository: Arc<dyn IdentityRepository>,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn IdentityRepository>) -> Self {
        Self { repository }
    }

    pub async fn record(&self, identity_id: Uuid, refresh_token: &str) -> Result<(), AppError> {
        self.repository
            .update_refresh_token(identity_id, Some(refresh_token.to_string()))
            .await
    }

    pub async fn current_of(&self, identity_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self
            .repository
            .find_by_id(identity_id)
            .await?
            .and_then(|identity| identity.refresh_token))
    }

    /// Clears the slot. Revoking an identity with no session, or one that no
    /// longer exists, succeeds without doing anything.
    pub async fn revoke(&self, identity_id: Uuid) -> Result<(), AppError> {
        self.repository.update_refresh_token(identity_id, None).await
    }

    /// Records `next` only if the slot still holds `presented`. Returns false,
    /// leaving the slot untouched, when it holds anything else or nothing.
    pub async fn rotate(
        &self,
        identity_id: Uuid,
        presented: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        self.repository
            .replace_refresh_token(identity_id, presented, next.to_string())
            .await
    }
}

/// Compares the SHA-256 digests of both tokens without early exit, so timing
/// reveals neither the mismatch position nor the token length.
pub(crate) fn tokens_match(stored: &str, presented: &str) -> bool {
    let a = Sha256::digest(stored.as_bytes());
    let b = Sha256::digest(presented.as_bytes());

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
