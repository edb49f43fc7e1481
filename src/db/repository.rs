use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::Identity;
use crate::error::AppError;

/// Profile fields a signed-in identity may change about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityDetails {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Persistence collaborator for identities and their refresh slot.
///
/// Every write touches a single identity record and is expected to be atomic
/// at the storage layer; nothing here spans records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError>;

    /// Fails with `DatabaseError::Duplicate` when the email or phone is taken.
    async fn create(&self, identity: &Identity) -> Result<Identity, AppError>;

    /// Overwrites the refresh slot. `None` clears it. Unknown ids are a no-op.
    async fn update_refresh_token(&self, id: Uuid, token: Option<String>) -> Result<(), AppError>;

    /// Sets the slot to `token` only if it currently holds `expected`, as a
    /// single atomic step. Returns whether the swap happened.
    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        token: String,
    ) -> Result<bool, AppError>;

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), AppError>;

    async fn update_details(
        &self,
        id: Uuid,
        details: IdentityDetails,
    ) -> Result<Option<Identity>, AppError>;
}
