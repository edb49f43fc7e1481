use actix_web::cookie::{time, Cookie};
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::authenticator::{
    AuthenticatedIdentity, CredentialSource, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::auth::service::NewIdentity;
use crate::auth::tokens::TokenPair;
use crate::db::models::PublicIdentity;
use crate::db::repository::IdentityDetails;
use crate::error::AppError;
use crate::AppState;

/// Success envelope shared by every account route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.is_success(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDetailsRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: PublicIdentity,
    pub access_token: String,
    pub refresh_token: String,
}

fn session_cookie(name: &'static str, value: String, max_age: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .finish()
}

fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .path("/")
        .http_only(true)
        .secure(secure)
        .finish();
    cookie.make_removal();
    cookie
}

fn with_session_cookies(
    mut builder: HttpResponseBuilder,
    state: &AppState,
    tokens: &TokenPair,
) -> HttpResponseBuilder {
    let secure = state.config.auth.secure_cookies;
    let issuer = state.auth_service.issuer();
    builder
        .cookie(session_cookie(
            ACCESS_TOKEN_COOKIE,
            tokens.access_token.clone(),
            issuer.access_ttl(),
            secure,
        ))
        .cookie(session_cookie(
            REFRESH_TOKEN_COOKIE,
            tokens.refresh_token.clone(),
            issuer.refresh_ttl(),
            secure,
        ));
    builder
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);
    let req = req.into_inner();
    let input = NewIdentity {
        name: req.name,
        email: req.email,
        phone: req.phone,
        role: req.role,
        password: req.password,
    };

    let (identity, tokens) = state.auth_service.register(input).await.map_err(|e| {
        error!("Registration failed: {}", e);
        e
    })?;

    let body = ApiResponse::new(
        StatusCode::CREATED,
        PublicIdentity::from(&identity),
        "User registered successfully.",
    );
    Ok(with_session_cookies(HttpResponse::Created(), &state, &tokens).json(body))
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    let (identity, tokens) = state
        .auth_service
        .login(&req.email, &req.password)
        .await
        .map_err(|e| {
            error!("Login failed for email: {}: {}", req.email, e);
            e
        })?;

    let body = ApiResponse::new(
        StatusCode::OK,
        SessionResponse {
            user: PublicIdentity::from(&identity),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
        },
        "User logged in successfully.",
    );
    Ok(with_session_cookies(HttpResponse::Ok(), &state, &tokens).json(body))
}

pub async fn logout(
    auth: AuthenticatedIdentity,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.auth_service.logout(auth.identity.id).await?;

    let secure = state.config.auth.secure_cookies;
    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE, secure))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE, secure))
        .json(ApiResponse::new(StatusCode::OK, serde_json::json!({}), "User logged out successfully.")))
}

/// Public on purpose: an expired access token must not block the exchange.
pub async fn refresh_token(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let source = CredentialSource::from_request(&req, REFRESH_TOKEN_COOKIE)
        .with_body(body.and_then(|b| b.into_inner().refresh_token));
    // the Authorization header carries access tokens, never refresh tokens
    let source = CredentialSource { header: None, ..source };

    let (identity, tokens) = state.auth_service.refresh(&source).await.map_err(|e| {
        error!("Token refresh failed: {}", e);
        e
    })?;

    info!("Issued refreshed tokens for identity {}", identity.id);
    let body = ApiResponse::new(StatusCode::OK, tokens.clone(), "Access token refreshed.");
    Ok(with_session_cookies(HttpResponse::Ok(), &state, &tokens).json(body))
}

pub async fn change_password(
    auth: AuthenticatedIdentity,
    req: web::Json<ChangePasswordRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state
        .auth_service
        .change_password(&auth.identity, &req.old_password, &req.new_password)
        .await?;

    let secure = state.config.auth.secure_cookies;
    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE, secure))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE, secure))
        .json(ApiResponse::new(StatusCode::OK, serde_json::json!({}), "Password changed successfully.")))
}

pub async fn update_details(
    auth: AuthenticatedIdentity,
    req: web::Json<UpdateDetailsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let details = IdentityDetails { name: req.name, phone: req.phone };
    let identity = state.auth_service.update_details(auth.identity.id, details).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        PublicIdentity::from(&identity),
        "User details updated successfully.",
    )))
}

pub async fn current_user(auth: AuthenticatedIdentity) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        PublicIdentity::from(&auth.identity),
        "Current user fetched successfully.",
    ))
}

/// Mounts the account routes under the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/user")
            .route("/register-user", web::post().to(register))
            .route("/login-user", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/refresh-token", web::post().to(refresh_token))
            .route("/change-password", web::post().to(change_password))
            .route("/update-details", web::post().to(update_details))
            .route("/current-user", web::get().to(current_user)),
    );
}
