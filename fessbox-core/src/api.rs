//! API models for the fessbox REST API

use crate::types::{DeviceState, ModemMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generic API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ApiResponse<T> {
    #[serde(rename = "success")]
    Success { data: T },
    #[serde(rename = "error")]
    Error { error: String },
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self::Success { data }
    }

    /// Create an error response
    pub fn error(error: String) -> Self {
        Self::Error { error }
    }
}

/// Server information response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Server version
    pub version: String,
    /// Server uptime in seconds
    pub uptime: u64,
    /// Number of admitted modems
    pub modem_count: usize,
    /// Software information
    pub software: String,
}

/// Listing of admitted modems keyed by IMEI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemsResponse {
    pub count: usize,
    pub modems: ModemMap,
}

/// Lifecycle state of every device path seen so far
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: HashMap<String, DeviceState>,
}

/// Body of an exec request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Command text, without trailing carriage return
    pub command: String,
}

/// Result of an exec request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    /// Raw response, decoded lossily
    pub raw: String,
    /// Response with echo and status marker removed
    pub cleaned: String,
}
