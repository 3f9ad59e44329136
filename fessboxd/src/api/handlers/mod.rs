//! API request handlers
//!
//! - [`info`] - system information and root endpoint
//! - [`modems`] - modem listing, device states and command execution
//!
//! Handlers take `State<AppState>` and return
//! `Result<Json<ApiResponse<T>>, ApiError>`.

pub mod info;
pub mod modems;
