//! AT command vocabulary used while identifying modems
//!
//! Commands are plain constants handed to the command session by value;
//! nothing here is mutable process state.

/// Success marker every accepted response must contain
pub const OK_MARKER: &str = "OK";

/// Failure marker; seeing it ends a response early
pub const ERROR_MARKER: &str = "ERROR";

/// Echoed command prefix stripped from cleaned responses
pub const ECHO_PREFIX: &str = "AT";

/// Request the product serial number (IMEI)
pub const IMEI_COMMAND: &str = "AT+GSN";

/// Request the international mobile subscriber identity
pub const IMSI_COMMAND: &str = "AT+CIMI";

/// Request the manufacturer identification
pub const MANUFACTURER_COMMAND: &str = "AT+CGMI";

/// Line terminator appended to every command
pub const COMMAND_TERMINATOR: &str = "\r";
