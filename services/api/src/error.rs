//! services/api/src/error.rs
//!
//! Startup and shutdown failures of the pickup service. Request-level failures
//! are rendered by `web::api_error` instead.

use crate::config::ConfigError;
use pickup_core::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A store call made during startup, such as creating the bootstrap admin.
    #[error("Store error: {0}")]
    Port(#[from] PortError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// `CORS_ORIGIN` is not a valid header value.
    #[error("Invalid CORS origin '{origin}': {reason}")]
    CorsOrigin { origin: String, reason: String },

    /// Binding the listener or serving connections.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_error_names_the_value() {
        let err = ApiError::CorsOrigin {
            origin: "http://bad\norigin".to_string(),
            reason: "failed to parse header value".to_string(),
        };
        assert!(err.to_string().starts_with("Invalid CORS origin 'http://bad"));
        assert!(err.to_string().ends_with("failed to parse header value"));
    }
}
