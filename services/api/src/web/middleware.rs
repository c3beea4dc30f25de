//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use pickup_core::domain::Caller;
use pickup_core::ports::PortError;
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::api_error::HttpError;
use crate::web::state::AppState;

/// Reads the `session=` value out of the cookie header, if present.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the session cookie and derives the caller's role.
///
/// If valid, inserts the `Caller` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let session = session_id(req.headers()).ok_or_else(HttpError::unauthenticated)?;

    let role = match state.staff.validate_auth_session(session).await {
        Ok(role) => role,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Rejected request with an unknown or expired session");
            return Err(HttpError::unauthenticated());
        }
        Err(e) => {
            error!("Failed to validate auth session: {:?}", e);
            return Err(HttpError::internal(e));
        }
    };

    req.extensions_mut().insert(Caller::from(role));
    Ok(next.run(req).await)
}
