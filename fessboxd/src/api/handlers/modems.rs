//! Modem handlers
//!
//! Listing of serving modems, per-path device states, and execution of
//! arbitrary AT commands against an identified modem.

use axum::{
    extract::{Path, State},
    Json,
};
use fessbox_core::api::{ApiResponse, DevicesResponse, ExecRequest, ExecResponse, ModemsResponse};
use fessbox_hardware::clean_result;
use tracing::{debug, info};

use crate::api::{error::ApiError, AppState};
use crate::api_ok;

/// `GET /api/v0/modems`
///
/// Serving modems keyed by IMEI.
pub(crate) async fn list_modems(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ModemsResponse>>, ApiError> {
    debug!("Request: GET /api/v0/modems");

    let modems = state.manager.list().await;
    api_ok!(ModemsResponse {
        count: modems.len(),
        modems,
    })
}

/// `GET /api/v0/devices`
pub(crate) async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DevicesResponse>>, ApiError> {
    debug!("Request: GET /api/v0/devices");

    api_ok!(DevicesResponse {
        devices: state.manager.states().await,
    })
}

/// `POST /api/v0/modem/{id}/exec`
///
/// `id` is an IMEI, a serving path's base name (`ttyUSB0`) or the full
/// path percent-encoded into one segment (`%2Fdev%2FttyUSB0`). Returns the
/// raw response and its cleaned payload.
pub(crate) async fn exec_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecRequest>,
) -> Result<Json<ApiResponse<ExecResponse>>, ApiError> {
    debug!("Request: POST /api/v0/modem/{}/exec {:?}", id, request.command);

    if request.command.contains(['\r', '\n']) {
        return Err(ApiError::bad_request(
            "Command must be a single line without terminator",
        ));
    }

    let raw = state.manager.exec(&id, &request.command).await?;
    info!("Executed {} on {}", request.command, id);

    api_ok!(ExecResponse {
        raw: String::from_utf8_lossy(&raw).to_string(),
        cleaned: clean_result(&raw),
    })
}
