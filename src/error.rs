//! Unified error types for hwsign
//!
//! All errors flow through this module so the command loop can print them
//! consistently and decide which ones end the process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all hwsign operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HwsignError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl HwsignError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// True for errors after which continuing without the device is pointless.
    pub fn is_fatal(&self) -> bool {
        self.code == ErrorCode::DeviceDisconnected
    }

    // Convenience constructors

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPath, msg)
    }

    pub fn unknown_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownAddress, msg)
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceCommunication, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceDisconnected, msg)
    }

    pub fn script_format(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnexpectedScriptFormat, msg)
    }

    pub fn sighash_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InconsistentSighashType, msg)
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientFunds, msg)
    }

    pub fn broadcast_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BroadcastFailed, msg)
    }

    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for HwsignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for HwsignError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors
    InvalidPath,
    UnknownAddress,
    InvalidAddress,

    // Device errors
    DeviceCommunication,
    DeviceDisconnected,

    // Multisig merge errors
    UnexpectedScriptFormat,
    InconsistentSighashType,

    // Transaction errors
    InsufficientFunds,
    BroadcastFailed,

    // Network errors
    NetworkError,

    // Parse errors
    ParseError,
    HexError,

    // Internal
    Internal,
}

/// Result type alias for hwsign operations
pub type HwsignResult<T> = Result<T, HwsignError>;

// Conversions from common error types

impl From<serde_json::Error> for HwsignError {
    fn from(e: serde_json::Error) -> Self {
        HwsignError::new(ErrorCode::ParseError, e.to_string())
    }
}

impl From<hex::FromHexError> for HwsignError {
    fn from(e: hex::FromHexError) -> Self {
        HwsignError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<std::io::Error> for HwsignError {
    fn from(e: std::io::Error) -> Self {
        HwsignError::new(ErrorCode::Internal, e.to_string())
    }
}

impl From<reqwest::Error> for HwsignError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HwsignError::new(ErrorCode::NetworkError, "Request timed out")
        } else if e.is_connect() {
            HwsignError::new(ErrorCode::NetworkError, "Connection failed")
        } else {
            HwsignError::new(ErrorCode::NetworkError, e.to_string())
        }
    }
}

impl From<bitcoin::consensus::encode::Error> for HwsignError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        HwsignError::new(ErrorCode::ParseError, format!("Transaction decode error: {}", e))
    }
}

impl From<bitcoin::address::ParseError> for HwsignError {
    fn from(e: bitcoin::address::ParseError) -> Self {
        HwsignError::new(ErrorCode::InvalidAddress, e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for HwsignError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        HwsignError::new(ErrorCode::ParseError, format!("BIP32 error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = HwsignError::insufficient_funds("Not enough sats")
            .with_details("Required: 300000, Available: 120000");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("insufficient_funds"));
        assert!(json.contains("Not enough sats"));
    }

    #[test]
    fn test_only_disconnect_is_fatal() {
        assert!(HwsignError::disconnected("gone").is_fatal());
        assert!(!HwsignError::device("nack").is_fatal());
        assert!(!HwsignError::broadcast_failed("rejected").is_fatal());
    }
}
