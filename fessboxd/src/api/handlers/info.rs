//! Info handlers for system information and root endpoint

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::api_ok;

use axum::{extract::State, Json};
use fessbox_core::api::{ApiResponse, InfoResponse};
use serde_json::{json, Value};
use tracing::debug;

/// `GET /`
///
/// Service identification, usable as a health check.
pub(crate) async fn root() -> Result<Json<ApiResponse<Value>>, ApiError> {
    debug!("Request: GET /");

    api_ok!(json!({
        "service": "Fessbox Modem Manager",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok"
    }))
}

/// `GET /api/v0/info`
///
/// Server version, uptime in seconds and number of serving modems.
pub(crate) async fn get_info(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<InfoResponse>>, ApiError> {
    debug!("Request: GET /api/v0/info");

    let info = InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        modem_count: state.manager.modem_count().await,
        software: format!("fessboxd v{}", env!("CARGO_PKG_VERSION")),
    };

    api_ok!(info)
}

#[cfg(test)]
mod tests {
    use crate::api::{create_router, AppState};
    use crate::devices::test_support::TestManager;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fessbox_hardware::mock::ScriptedFactory;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let t = TestManager::new(ScriptedFactory::new());
        let app = create_router(AppState::new(t.manager.clone()));

        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        t.manager.shutdown().await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root() {
        let (status, json) = get_json("/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_without_modems() {
        let (status, json) = get_json("/api/v0/info").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["modem_count"], 0);
        assert_eq!(json["data"]["version"], env!("CARGO_PKG_VERSION"));
    }
}
