use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::auth::clock::Clock;
use crate::db::models::Identity;
use crate::error::{AppError, AuthError};

/// Longest lifetime either token may be given.
const MAX_TTL_DAYS: i64 = 3650;

/// Signing secrets and lifetimes, fixed at startup.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.access_secret.is_empty() || self.refresh_secret.is_empty() {
            return Err(AppError::ConfigError("token secrets must not be empty".into()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(AppError::ConfigError(
                "access and refresh token secrets must differ".into(),
            ));
        }
        if self.access_ttl <= Duration::zero() {
            return Err(AppError::ConfigError("access token ttl must be positive".into()));
        }
        if self.refresh_ttl > Duration::days(MAX_TTL_DAYS) {
            return Err(AppError::ConfigError(format!(
                "token ttl must not exceed {} days",
                MAX_TTL_DAYS
            )));
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(AppError::ConfigError(
                "refresh token ttl must be longer than access token ttl".into(),
            ));
        }
        Ok(())
    }
}

/// Claims of the short-lived access token. Profile fields are a snapshot
/// taken at issuance and only suitable for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Claims of the refresh token: identity only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints and verifies access and refresh tokens (HS256 JWTs).
///
/// Access and refresh tokens are signed with different keys, so one can never
/// pass as the other. Expiry is checked against the injected clock rather than
/// the system time; with a seeded issuer the output is fully deterministic.
pub struct TokenIssuer {
    config: TokenConfig,
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        Self::build(config, clock, StdRng::from_entropy())
    }

    pub fn with_seed(config: TokenConfig, clock: Arc<dyn Clock>, seed: u64) -> Result<Self, AppError> {
        Self::build(config, clock, StdRng::seed_from_u64(seed))
    }

    fn build(config: TokenConfig, clock: Arc<dyn Clock>, rng: StdRng) -> Result<Self, AppError> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "sub".to_string()]);

        Ok(Self {
            access: KeyPair::from_secret(&config.access_secret),
            refresh: KeyPair::from_secret(&config.refresh_secret),
            config,
            validation,
            clock,
            rng: Mutex::new(rng),
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.config.refresh_ttl
    }

    pub fn issue_access(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            iat: now.timestamp(),
            exp: (now + self.config.access_ttl).timestamp(),
            jti: self.next_jti(),
        };
        sign(&claims, &self.access.encoding)
    }

    pub fn issue_refresh(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = RefreshClaims {
            sub: identity.id,
            iat: now.timestamp(),
            exp: (now + self.config.refresh_ttl).timestamp(),
            jti: self.next_jti(),
        };
        sign(&claims, &self.refresh.encoding)
    }

    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let now = self.clock.now();
        Ok(TokenPair {
            access_token: self.issue_access(identity)?,
            refresh_token: self.issue_refresh(identity)?,
            access_expires_at: truncate_to_secs(now + self.config.access_ttl),
            refresh_expires_at: truncate_to_secs(now + self.config.refresh_ttl),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(token, &self.access.decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify(token, &self.refresh.decoding)
    }

    fn verify<C>(&self, token: &str, key: &DecodingKey) -> Result<C, AuthError>
    where
        C: DeserializeOwned + Expiring,
    {
        let claims = decode::<C>(token, key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if self.clock.now().timestamp() >= claims.exp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }

    fn next_jti(&self) -> Uuid {
        let bytes: [u8; 16] = self.rng.lock().unwrap_or_else(|e| e.into_inner()).gen();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key).map_err(|e| AuthError::Signing(e.to_string()))
}

// Token expiry is carried in whole seconds.
fn truncate_to_secs(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::db::models::Role;

    fn config() -> TokenConfig {
        TokenConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn identity() -> Identity {
        Identity::new(
            "Grace".into(),
            "grace@example.com".into(),
            "5550101".into(),
            Role::Teacher,
            "hash".into(),
        )
    }

    fn issuer(clock: Arc<ManualClock>) -> TokenIssuer {
        TokenIssuer::with_seed(config(), clock, 7).unwrap()
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let clock = Arc::new(ManualClock::new(start()));
        let issuer = issuer(clock);
        let user = identity();

        let pair = issuer.issue_pair(&user).unwrap();
        let access = issuer.verify_access(&pair.access_token).unwrap();
        let refresh = issuer.verify_refresh(&pair.refresh_token).unwrap();

        assert_eq!(access.sub, user.id);
        assert_eq!(refresh.sub, user.id);
        assert_eq!(access.email, "grace@example.com");
        assert_eq!(access.exp - access.iat, 15 * 60);
        assert_eq!(refresh.exp - refresh.iat, 7 * 24 * 60 * 60);
        assert_eq!(pair.access_expires_at, start() + Duration::minutes(15));
    }

    #[test]
    fn test_issuance_is_deterministic_for_fixed_clock_and_seed() {
        let user = identity();
        let a = issuer(Arc::new(ManualClock::new(start()))).issue_pair(&user).unwrap();
        let b = issuer(Arc::new(ManualClock::new(start()))).issue_pair(&user).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_successive_refresh_tokens_differ_within_one_second() {
        let clock = Arc::new(ManualClock::new(start()));
        let issuer = issuer(clock);
        let user = identity();

        let first = issuer.issue_refresh(&user).unwrap();
        let second = issuer.issue_refresh(&user).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_expired_access_is_distinct_from_invalid() {
        let clock = Arc::new(ManualClock::new(start()));
        let issuer = issuer(clock.clone());
        let token = issuer.issue_access(&identity()).unwrap();

        clock.advance(Duration::minutes(14));
        assert!(issuer.verify_access(&token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(issuer.verify_access(&token), Err(AuthError::TokenExpired));

        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(issuer.verify_access(&tampered), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let clock = Arc::new(ManualClock::new(start()));
        let issuer = issuer(clock.clone());
        let mut other_config = config();
        other_config.access_secret = "someone-else".into();
        let other = TokenIssuer::with_seed(other_config, clock, 7).unwrap();

        let forged = other.issue_access(&identity()).unwrap();
        assert_eq!(issuer.verify_access(&forged), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_access_and_refresh_keys_are_not_interchangeable() {
        let clock = Arc::new(ManualClock::new(start()));
        let issuer = issuer(clock);
        let pair = issuer.issue_pair(&identity()).unwrap();

        assert_eq!(issuer.verify_refresh(&pair.access_token), Err(AuthError::InvalidToken));
        assert_eq!(issuer.verify_access(&pair.refresh_token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_token() {
        let issuer = issuer(Arc::new(ManualClock::new(start())));
        assert_eq!(issuer.verify_access(""), Err(AuthError::InvalidToken));
        assert_eq!(issuer.verify_refresh("a.b.c"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_config_validation() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start()));

        let mut same = config();
        same.refresh_secret = same.access_secret.clone();
        assert!(TokenIssuer::new(same, clock.clone()).is_err());

        let mut empty = config();
        empty.access_secret.clear();
        assert!(TokenIssuer::new(empty, clock.clone()).is_err());

        let mut short = config();
        short.refresh_ttl = Duration::minutes(5);
        assert!(TokenIssuer::new(short, clock.clone()).is_err());

        let mut endless = config();
        endless.refresh_ttl = Duration::days(MAX_TTL_DAYS + 1);
        assert!(matches!(
            TokenIssuer::new(endless, clock.clone()),
            Err(AppError::ConfigError(_))
        ));

        assert!(TokenIssuer::new(config(), clock).is_ok());
    }
}
