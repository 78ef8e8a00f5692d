use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::warn;
use uuid::Uuid;

use tribute_db::Database;
use tribute_db::models::NewUser;
use tribute_mail::templates;
use tribute_types::api::{
    Claims, ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterDeviceTokenRequest,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, UpdateProfileRequest, UserResponse,
};
use tribute_types::events::EventBus;
use tribute_types::models::{Role, User};

use crate::error::ApiError;
use crate::uploads::AssetClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub events: EventBus,
    pub assets: AssetClient,
    pub jwt_secret: String,
    /// Base URL of the web frontend, used for links in emails.
    pub site_url: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email address is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::Validation("display name is required".into()));
    }

    if state.db.get_user_row_by_email(&email)?.is_some() {
        return Err(ApiError::EmailTaken);
    }

    let password_hash = hash_password(&req.password)?;

    let user = state.db.create_user(&NewUser {
        id: Uuid::new_v4(),
        email: &email,
        password_hash: &password_hash,
        display_name,
        location: req.location.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        phone_number: req.phone_number.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        community_reference: req
            .community_reference
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty()),
        role: Role::Member,
    })?;

    let token = create_token(&state.jwt_secret, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let row = state
        .db
        .get_user_row_by_email(&req.email.trim().to_lowercase())?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt password hash: {e}")))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user = row.into_user()?;
    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        display_name: user.display_name,
        role: user.role,
        token,
    }))
}

/// Always answers 200 — whether the account exists is not revealed. The
/// reset email is a best-effort side effect.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let email = req.email.trim().to_lowercase();
    let Some(row) = state.db.get_user_row_by_email(&email)? else {
        return Ok(StatusCode::OK);
    };
    let user = row.into_user()?;

    let token = Uuid::new_v4().to_string();
    state.db.create_password_reset(&token, user.id)?;

    let reset_url = format!("{}/login?reset={}", state.site_url, token);
    let (subject, html) = templates::password_reset(&user.display_name, &reset_url);
    if let Err(e) = state.db.enqueue_mail(&user.email, &subject, &html) {
        warn!("Failed to queue password reset mail: {e}");
    }

    Ok(StatusCode::OK)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    if req.new_password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }

    let user_id = state
        .db
        .consume_password_reset(&req.token)?
        .ok_or_else(|| ApiError::Validation("invalid or expired reset token".into()))?;

    let password_hash = hash_password(&req.new_password)?;
    if !state.db.set_password(user_id, &password_hash)? {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::OK)
}

// -- Profile --

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(name) = req.display_name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("display name cannot be empty".into()));
        }
    }

    let updated = state
        .db
        .update_profile(
            claims.sub,
            req.display_name.as_deref().map(str::trim),
            req.location.as_deref(),
            req.phone_number.as_deref(),
            req.community_reference.as_deref(),
        )?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(updated.into()))
}

/// Register a push token for this device. Duplicates are ignored.
pub async fn register_device_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterDeviceTokenRequest>,
) -> Result<StatusCode, ApiError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("device token is required".into()));
    }
    state.db.register_device_token(claims.sub, token)?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Helpers --

fn hash_password(password: &str) -> Result<String, ApiError> {
    // Argon2id with a fresh salt
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub fn create_token(secret: &str, user: &User) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.id,
        display_name: user.display_name.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("token encoding failed: {e}")))
}
