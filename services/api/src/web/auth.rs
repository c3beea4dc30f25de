//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for staff login and logout, plus account creation by
//! admins.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use pickup_core::domain::{Caller, Role};
use pickup_core::ports::{PortError, StaffDirectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::BootstrapAdmin;
use crate::web::api_error::HttpError;
use crate::web::middleware::session_id;
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 7;
const MIN_PASSWORD_LEN: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateStaffRequest {
    pub email: String,
    pub password: String,
    /// `staff` (default) or `admin`.
    pub role: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StaffResponse {
    pub staff_id: Uuid,
    pub email: String,
    pub role: String,
}

//=========================================================================================
// Password Helpers
//=========================================================================================

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Failed to parse password hash: {:?}", e);
            false
        }
    }
}

/// Creates the configured admin account unless the email is already registered.
pub async fn ensure_bootstrap_admin(
    staff: &dyn StaffDirectory,
    admin: &BootstrapAdmin,
) -> Result<(), PortError> {
    let email = normalize_email(&admin.email);
    match staff.get_staff_by_email(&email).await {
        Ok(_) => {
            info!(%email, "Bootstrap admin already exists");
            Ok(())
        }
        Err(PortError::NotFound(_)) => {
            let hashed = hash_password(&admin.password)
                .map_err(|e| PortError::Unexpected(format!("failed to hash password: {}", e)))?;
            staff.create_staff(&email, &hashed, Role::Admin).await?;
            info!(%email, "Bootstrap admin created");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Start a staff session
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = StaffResponse),
        (status = 401, description = "Invalid credentials", body = crate::web::api_error::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::web::api_error::ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(req) = body?;
    let email = normalize_email(&req.email);
    let invalid = || HttpError::new("unauthenticated", "invalid_credentials", "Invalid email or password");

    // 1. Look up the account and check the password.
    let creds = match state.staff.get_staff_by_email(&email).await {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => {
            warn!(%email, "Login attempt for unknown account");
            return Err(invalid());
        }
        Err(e) => return Err(HttpError::internal(e)),
    };
    if !verify_password(&req.password, &creds.hashed_password) {
        warn!(%email, "Login attempt with a wrong password");
        return Err(invalid());
    }

    // 2. Open the session.
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .staff
        .create_auth_session(&auth_session_id, creds.id, expires_at)
        .await?;
    info!(staff_id = %creds.id, role = creds.role.as_str(), "Staff member signed in");

    let cookie = format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    );
    let response = StaffResponse {
        staff_id: creds.id,
        email: creds.email,
        role: creds.role.as_str().to_string(),
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - End the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session", body = crate::web::api_error::ErrorBody)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let auth_session_id = session_id(&headers).ok_or_else(HttpError::unauthenticated)?;
    state.staff.delete_auth_session(auth_session_id).await?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// POST /staff - Create a staff or admin account (admin only)
#[utoipa::path(
    post,
    path = "/staff",
    request_body = CreateStaffRequest,
    responses(
        (status = 201, description = "Account created", body = StaffResponse),
        (status = 400, description = "Invalid request", body = crate::web::api_error::ErrorBody),
        (status = 403, description = "Admin access required", body = crate::web::api_error::ErrorBody),
        (status = 409, description = "Email already registered", body = crate::web::api_error::ErrorBody)
    )
)]
pub async fn create_staff_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateStaffRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HttpError> {
    if !caller.is_admin() {
        return Err(HttpError::new("permission-denied", "admin_only", "admin access required"));
    }
    let Json(req) = body?;

    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err(HttpError::invalid("invalid_email", "email address is not valid"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(HttpError::invalid(
            "weak_password",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    let role = match req.role.as_deref() {
        None => Role::Staff,
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| HttpError::invalid("invalid_role", e))?,
    };

    let hashed = hash_password(&req.password).map_err(HttpError::internal)?;
    let member = state.staff.create_staff(&email, &hashed, role).await?;
    info!(staff_id = %member.id, role = member.role.as_str(), "Staff account created");

    Ok((
        StatusCode::CREATED,
        Json(StaffResponse {
            staff_id: member.id,
            email: member.email,
            role: member.role.as_str().to_string(),
        }),
    ))
}
