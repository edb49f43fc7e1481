//! Credential and session lifecycle.
//!
//! Passwords are checked once at login; after that an identity holds a
//! short-lived access token and a long-lived refresh token. The refresh token
//! is also stored on the identity, which is what makes rotation and logout
//! take effect before the token's own expiry.

pub mod authenticator;
pub mod clock;
pub mod handlers;
pub mod password;
pub mod service;
pub mod session;
pub mod tokens;

pub use authenticator::{AuthState, AuthenticatedIdentity, CredentialSource, RequestAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use service::{AuthService, NewIdentity};
pub use session::SessionStore;
pub use tokens::{AccessClaims, RefreshClaims, TokenConfig, TokenIssuer, TokenPair};
