//! Unified error codes for OneScan
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Tracker errors
//! - 7xxx: Sync errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the frontend can
/// switch on them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 4xxx: Tracker ====================
    /// Tracker not found
    TrackerNotFound = 4001,
    /// Tracker code is empty or malformed
    InvalidTrackerCode = 4002,
    /// Tracker has been cancelled
    TrackerCancelled = 4003,
    /// Unknown scan stage
    InvalidStage = 4004,

    // ==================== 7xxx: Sync ====================
    /// Spreadsheet sync is not configured
    SyncDisabled = 7001,
    /// Spreadsheet sync scheduler has stopped
    SyncUnavailable = 7002,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
    /// Document store temporarily unavailable (retry the operation)
    StorageUnavailable = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidRequest => "Invalid request",

            // Tracker
            ErrorCode::TrackerNotFound => "Tracker not found",
            ErrorCode::InvalidTrackerCode => "Tracker code is invalid",
            ErrorCode::TrackerCancelled => "Tracker has been cancelled",
            ErrorCode::InvalidStage => "Unknown scan stage",

            // Sync
            ErrorCode::SyncDisabled => "Spreadsheet sync is not configured",
            ErrorCode::SyncUnavailable => "Spreadsheet sync scheduler is not running",

            // System
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StorageUnavailable => "Storage temporarily unavailable, please retry",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            5 => Ok(ErrorCode::InvalidRequest),

            // Tracker
            4001 => Ok(ErrorCode::TrackerNotFound),
            4002 => Ok(ErrorCode::InvalidTrackerCode),
            4003 => Ok(ErrorCode::TrackerCancelled),
            4004 => Ok(ErrorCode::InvalidStage),

            // Sync
            7001 => Ok(ErrorCode::SyncDisabled),
            7002 => Ok(ErrorCode::SyncUnavailable),

            // System
            9002 => Ok(ErrorCode::DatabaseError),
            9404 => Ok(ErrorCode::StorageUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
