use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{Identity, IdentityRow};
use crate::db::repository::{IdentityDetails, IdentityRepository};
use crate::error::{AppError, DatabaseError};

const IDENTITY_COLUMNS: &str =
    "id, name, email, phone, role, password_hash, refresh_token, created_at, updated_at";

/// Postgres-backed identity store.
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &Arc<PgPool> {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await?;
        Ok(())
    }

    pub async fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    fn into_identity(row: IdentityRow) -> Result<Identity, AppError> {
        Identity::try_from(row).map_err(|e| AppError::DatabaseError(DatabaseError::QueryError(e)))
    }
}

#[async_trait]
impl IdentityRepository for DbOperations {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Self::into_identity).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            IDENTITY_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Self::into_identity).transpose()
    }

    async fn create(&self, identity: &Identity) -> Result<Identity, AppError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, phone, role, password_hash, refresh_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        ))
        .bind(identity.id)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&identity.phone)
        .bind(identity.role.as_str())
        .bind(&identity.password_hash)
        .bind(&identity.refresh_token)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Self::into_identity(row)
    }

    async fn update_refresh_token(&self, id: Uuid, token: Option<String>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET refresh_token = $1, updated_at = $2 WHERE id = $3")
            .bind(token)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        token: String,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = $1, updated_at = $2 WHERE id = $3 AND refresh_token = $4",
        )
        .bind(token)
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound.into());
        }
        Ok(())
    }

    async fn update_details(
        &self,
        id: Uuid,
        details: IdentityDetails,
    ) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($1, name), phone = COALESCE($2, phone), updated_at = $3
            WHERE id = $4
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        ))
        .bind(details.name)
        .bind(details.phone)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Self::into_identity).transpose()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
