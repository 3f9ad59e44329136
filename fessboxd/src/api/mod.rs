//! API module for the fessbox daemon
//!
//! Exposes the modem manager's list and exec operations over a small axum
//! REST surface.

pub(crate) mod handlers;

use crate::devices::ModemManager;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    /// Hotplug-driven modem manager
    pub manager: Arc<ModemManager>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manager: Arc<ModemManager>) -> Self {
        Self {
            manager,
            start_time: Instant::now(),
        }
    }
}

/// Create the API router with all endpoints
pub(crate) fn create_router(state: AppState) -> Router {
    info!("Setting up API router...");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(64 * 1024));

    Router::new()
        // Modem endpoints
        .route("/api/v0/modems", get(handlers::modems::list_modems))
        .route("/api/v0/devices", get(handlers::modems::list_devices))
        .route(
            "/api/v0/modem/:id/exec",
            post(handlers::modems::exec_command),
        )
        // System info endpoint
        .route("/api/v0/info", get(handlers::info::get_info))
        // Root endpoint
        .route("/", get(handlers::info::root))
        .layer(middleware_stack)
        .with_state(state)
}

/// Error handling utilities
pub(crate) mod error {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use fessbox_core::api::ApiResponse;
    use fessbox_core::FessboxError;
    use tracing::error;

    /// Error returned by handlers, rendered as the error envelope
    #[derive(Debug)]
    pub struct ApiError {
        pub status_code: StatusCode,
        pub message: String,
    }

    impl ApiError {
        pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
            Self {
                status_code,
                message: message.into(),
            }
        }

        pub fn bad_request(message: impl Into<String>) -> Self {
            Self::new(StatusCode::BAD_REQUEST, message)
        }

        pub fn not_found(message: impl Into<String>) -> Self {
            Self::new(StatusCode::NOT_FOUND, message)
        }

        pub fn internal_error(message: impl Into<String>) -> Self {
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
        }

        /// The modem is there but did not cooperate
        pub fn service_unavailable(message: impl Into<String>) -> Self {
            Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            error!("API Error {}: {}", self.status_code, self.message);

            let response: ApiResponse<()> = ApiResponse::error(self.message);

            (self.status_code, Json(response)).into_response()
        }
    }

    impl From<FessboxError> for ApiError {
        fn from(err: FessboxError) -> Self {
            match err {
                FessboxError::NoDeviceFound(_) => Self::not_found(err.to_string()),
                FessboxError::InvalidInput(msg) => Self::bad_request(msg),
                FessboxError::CommandRejected { .. }
                | FessboxError::Timeout(_)
                | FessboxError::PortUnavailable { .. }
                | FessboxError::Serial(_) => Self::service_unavailable(err.to_string()),
                _ => Self::internal_error(err.to_string()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_error_status_mapping() {
            let cases = [
                (
                    FessboxError::NoDeviceFound("ttyUSB2".into()),
                    StatusCode::NOT_FOUND,
                ),
                (
                    FessboxError::InvalidInput("empty".into()),
                    StatusCode::BAD_REQUEST,
                ),
                (
                    FessboxError::CommandRejected {
                        command: "AT".into(),
                        response: b"ERROR".to_vec(),
                    },
                    StatusCode::SERVICE_UNAVAILABLE,
                ),
                (
                    FessboxError::PortUnavailable {
                        path: "/dev/ttyUSB0".into(),
                        reason: "busy".into(),
                    },
                    StatusCode::SERVICE_UNAVAILABLE,
                ),
                (
                    FessboxError::Other("boom".into()),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            ];

            for (err, status) in cases {
                assert_eq!(ApiError::from(err).status_code, status);
            }
        }
    }
}

/// Wrap data in a success envelope
#[macro_export]
macro_rules! api_ok {
    ($data:expr) => {
        Ok(axum::Json(fessbox_core::api::ApiResponse::success($data)))
    };
}
