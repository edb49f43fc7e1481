use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::session::SessionStore;
use crate::auth::tokens::{AccessClaims, TokenIssuer};
use crate::db::models::{Identity, Role};
use crate::db::repository::IdentityRepository;
use crate::error::{AppError, AuthError};
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Where a request may carry a credential, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSource {
    pub cookie: Option<String>,
    pub header: Option<String>,
    pub body: Option<String>,
}

impl CredentialSource {
    /// Reads the named cookie and an `Authorization: Bearer` header.
    ///
    /// The body slot stays empty here: a request body belongs to the handler's
    /// own extractor and can only be read once. Handlers that accept a token in
    /// their payload fill it with [`CredentialSource::with_body`].
    pub fn from_request(req: &HttpRequest, cookie_name: &str) -> Self {
        let header = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        Self {
            cookie: req.cookie(cookie_name).map(|c| c.value().to_string()),
            header,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn extract(&self) -> Option<&str> {
        [&self.cookie, &self.header, &self.body]
            .into_iter()
            .filter_map(|slot| slot.as_deref())
            .find(|token| !token.is_empty())
    }
}

/// Where a request ended up in the authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CredentialExtracted,
    Verified,
    Resolved,
    Rejected,
    /// The access token expired; the client can recover through the refresh
    /// endpoint without re-entering a password.
    RefreshRequired,
}

impl AuthState {
    fn advance(&mut self, next: AuthState) {
        debug!("Authentication state {:?} -> {:?}", self, next);
        *self = next;
    }

    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::AuthError(AuthError::TokenExpired) => AuthState::RefreshRequired,
            _ => AuthState::Rejected,
        }
    }
}

/// A request whose access token verified and whose identity was re-read from
/// storage. `identity` is authoritative; `claims` are what the token said at
/// issuance.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub identity: Identity,
    pub claims: AccessClaims,
}

impl AuthenticatedIdentity {
    pub fn require_role(&self, role: Role) -> Result<&Identity, AuthError> {
        if self.identity.role == role {
            Ok(&self.identity)
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Gate in front of protected routes: extract → verify → resolve.
///
/// An expired access token is rejected like any other; refreshing is a
/// separate, explicit call.
pub struct RequestAuthenticator {
    issuer: Arc<TokenIssuer>,
    repository: Arc<dyn IdentityRepository>,
    sessions: SessionStore,
}

impl RequestAuthenticator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        repository: Arc<dyn IdentityRepository>,
        sessions: SessionStore,
    ) -> Self {
        Self { issuer, repository, sessions }
    }

    pub async fn authenticate(
        &self,
        source: &CredentialSource,
    ) -> Result<AuthenticatedIdentity, AppError> {
        self.authenticate_traced(source).await.1
    }

    /// Like [`authenticate`](Self::authenticate), also reporting the state the
    /// request ended in: `Resolved`, `Rejected` or `RefreshRequired`.
    pub async fn authenticate_traced(
        &self,
        source: &CredentialSource,
    ) -> (AuthState, Result<AuthenticatedIdentity, AppError>) {
        let mut state = AuthState::Unauthenticated;
        let result = self.run(source, &mut state).await;
        if let Err(e) = &result {
            state.advance(AuthState::from_error(e));
        }
        (state, result)
    }

    async fn run(
        &self,
        source: &CredentialSource,
        state: &mut AuthState,
    ) -> Result<AuthenticatedIdentity, AppError> {
        let token = source.extract().ok_or(AuthError::MissingCredential)?;
        state.advance(AuthState::CredentialExtracted);

        let claims = self.issuer.verify_access(token)?;
        state.advance(AuthState::Verified);

        let identity = self.resolve(claims.sub).await?;
        state.advance(AuthState::Resolved);

        Ok(AuthenticatedIdentity { identity, claims })
    }

    /// Loads the identity behind verified claims. A missing identity has its
    /// refresh slot cleared so it cannot keep refreshing.
    pub async fn resolve(&self, id: uuid::Uuid) -> Result<Identity, AppError> {
        match self.repository.find_by_id(id).await? {
            Some(identity) => Ok(identity),
            None => {
                self.sessions.revoke(id).await?;
                Err(AuthError::IdentityNotFound.into())
            }
        }
    }
}

impl FromRequest for AuthenticatedIdentity {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let source = CredentialSource::from_request(req, ACCESS_TOKEN_COOKIE);
        let path = req.path().to_string();

        Box::pin(async move {
            let state = state.ok_or_else(|| {
                AppError::InternalError("application state is not configured".into())
            })?;

            let (outcome, result) = state.authenticator.authenticate_traced(&source).await;
            result.map_err(|e| {
                warn!("Rejected request to {}: {:?} ({})", path, outcome, e);
                e
            })
        })
    }
}
