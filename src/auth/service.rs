use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::authenticator::{CredentialSource, RequestAuthenticator};
use crate::auth::password::{hash_password, verify_password, MAX_PASSWORD_BYTES};
use crate::auth::session::SessionStore;
use crate::auth::tokens::{TokenIssuer, TokenPair};
use crate::db::models::{Identity, Role};
use crate::db::repository::{IdentityDetails, IdentityRepository};
use crate::error::{AppError, AuthError};

/// Registration input as submitted by the client.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub password: String,
}

impl NewIdentity {
    fn validate(&self) -> Result<Role, AppError> {
        let fields = [&self.name, &self.email, &self.phone, &self.role, &self.password];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::ValidationError("All fields are required".into()));
        }
        if !self.email.contains('@') {
            return Err(AppError::ValidationError("Invalid email address".into()));
        }
        check_password_length(&self.password)?;
        self.role
            .parse::<Role>()
            .map_err(|_| AppError::ValidationError("Invalid user role selected".into()))
    }
}

fn check_password_length(password: &str) -> Result<(), AppError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::ValidationError(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

/// Account and session operations built on the credential lifecycle pieces.
pub struct AuthService {
    repository: Arc<dyn IdentityRepository>,
    issuer: Arc<TokenIssuer>,
    sessions: SessionStore,
    authenticator: Arc<RequestAuthenticator>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        repository: Arc<dyn IdentityRepository>,
        issuer: Arc<TokenIssuer>,
        bcrypt_cost: u32,
    ) -> Self {
        let sessions = SessionStore::new(repository.clone());
        let authenticator = Arc::new(RequestAuthenticator::new(
            issuer.clone(),
            repository.clone(),
            sessions.clone(),
        ));
        Self {
            repository,
            issuer,
            sessions,
            authenticator,
            bcrypt_cost,
        }
    }

    pub fn authenticator(&self) -> Arc<RequestAuthenticator> {
        self.authenticator.clone()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub async fn register(&self, input: NewIdentity) -> Result<(Identity, TokenPair), AppError> {
        let role = input.validate()?;

        if self.repository.find_by_email(&input.email).await?.is_some() {
            warn!("Registration rejected, email already in use: {}", input.email);
            return Err(crate::error::DatabaseError::Duplicate("users_email_key".into()).into());
        }

        let password_hash = hash_password(&input.password, self.bcrypt_cost)?;
        let identity = Identity::new(input.name, input.email, input.phone, role, password_hash);
        let identity = self.repository.create(&identity).await?;
        info!("Registered {} identity {}", identity.role, identity.id);

        let tokens = self.start_session(&identity).await?;
        Ok((identity, tokens))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(Identity, TokenPair), AppError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::ValidationError("All fields are required".into()));
        }

        let identity = self
            .repository
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        match verify_password(password, &identity.password_hash) {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::InvalidCredentials.into()),
            Err(e) => {
                error!("Stored password hash for identity {} is unusable: {}", identity.id, e);
                return Err(e.into());
            }
        }

        let tokens = self.start_session(&identity).await?;
        info!("Identity {} logged in", identity.id);
        Ok((identity, tokens))
    }

    /// Exchanges a refresh token for a new pair and rotates the stored slot.
    /// The slot is swapped only if it still holds the presented token, so of
    /// two concurrent calls with the same token exactly one succeeds. Not safe
    /// to retry: a repeated call presents a token that is no longer current.
    pub async fn refresh(&self, source: &CredentialSource) -> Result<(Identity, TokenPair), AppError> {
        let presented = source.extract().ok_or(AuthError::MissingCredential)?;
        let claims = self.issuer.verify_refresh(presented)?;
        let identity = self.authenticator.resolve(claims.sub).await?;

        let tokens = self.issuer.issue_pair(&identity)?;
        if !self.sessions.rotate(identity.id, presented, &tokens.refresh_token).await? {
            warn!("Refresh token for identity {} was reused or superseded", identity.id);
            return Err(AuthError::RefreshReused.into());
        }

        info!("Rotated session for identity {}", identity.id);
        Ok((identity, tokens))
    }

    pub async fn logout(&self, identity_id: Uuid) -> Result<(), AppError> {
        self.sessions.revoke(identity_id).await?;
        info!("Identity {} logged out", identity_id);
        Ok(())
    }

    /// Changing the password also ends the current session.
    pub async fn change_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(AppError::ValidationError("All fields are required".into()));
        }
        check_password_length(new_password)?;

        let verified = verify_password(old_password, &identity.password_hash).map_err(|e| {
            error!("Stored password hash for identity {} is unusable: {}", identity.id, e);
            e
        })?;
        if !verified {
            return Err(AuthError::InvalidCredentials.into());
        }

        let password_hash = hash_password(new_password, self.bcrypt_cost)?;
        self.repository.update_password(identity.id, password_hash).await?;
        self.sessions.revoke(identity.id).await?;
        info!("Password changed for identity {}", identity.id);
        Ok(())
    }

    pub async fn update_details(
        &self,
        identity_id: Uuid,
        details: IdentityDetails,
    ) -> Result<Identity, AppError> {
        let blank = |v: &Option<String>| v.as_deref().map_or(false, |s| s.trim().is_empty());
        if blank(&details.name) || blank(&details.phone) {
            return Err(AppError::ValidationError("Fields must not be empty".into()));
        }

        self.repository
            .update_details(identity_id, details)
            .await?
            .ok_or_else(|| AuthError::IdentityNotFound.into())
    }

    async fn start_session(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        let tokens = self.issuer.issue_pair(identity)?;
        self.sessions.record(identity.id, &tokens.refresh_token).await?;
        Ok(tokens)
    }
}
