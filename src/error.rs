//! Error handling for the Pi Pins GPIO manager.

use crate::gpio::data::PinMode;
use serde::{Deserialize, Serialize};

/// A specialized `Result` type for Pi Pins operations.
pub type Result<T> = std::result::Result<T, GpioError>;

/// Failure reported by a [`PinDriver`](crate::gpio::driver::PinDriver).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// The line is claimed by another consumer
    #[error("pin is busy")]
    Busy,

    /// The line does not exist on this hardware
    #[error("pin is not available on this hardware")]
    Unavailable,

    /// The hardware layer reported a fault
    #[error("{0}")]
    Hardware(String),

    /// The driver did not answer within the configured bound
    #[error("{op} timed out")]
    Timeout { op: &'static str },
}

impl DriverError {
    /// Create a new hardware fault
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }
}

/// The main error type for GPIO operations.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    /// Pin is reserved by the platform
    #[error("Pin {0} is reserved")]
    ReservedPin(u8),

    /// Pin number is outside the platform's valid range
    #[error("Pin {0} is not a valid GPIO pin")]
    InvalidPin(u8),

    /// Mode-specific option missing or out of range
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Pin has no configuration
    #[error("Pin {0} is not configured")]
    NotConfigured(u8),

    /// Pin is configured, but in another mode
    #[error("Pin {pin} is not configured as {expected} (mode: {actual})")]
    WrongMode {
        pin: u8,
        expected: PinMode,
        actual: PinMode,
    },

    /// Monitoring request names no pins, or pins that are not inputs
    #[error("Invalid monitor target: {0}")]
    InvalidMonitorTarget(String),

    /// Monitoring interval must be positive
    #[error("Invalid monitoring interval: {0}ms")]
    InvalidInterval(u64),

    /// The pin driver failed
    #[error("Driver error on pin {pin}: {source}")]
    Driver {
        pin: u8,
        #[source]
        source: DriverError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GpioError {
    /// Create a new invalid option error
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Create a new invalid monitor target error
    pub fn invalid_monitor_target(msg: impl Into<String>) -> Self {
        Self::InvalidMonitorTarget(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a driver failure for `pin`
    pub fn driver(pin: u8, source: DriverError) -> Self {
        Self::Driver { pin, source }
    }

    /// Response-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ReservedPin(_) => ErrorCode::ReservedPin,
            Self::InvalidPin(_) => ErrorCode::InvalidPin,
            Self::InvalidOption(_) => ErrorCode::InvalidOption,
            Self::NotConfigured(_) => ErrorCode::NotConfigured,
            Self::WrongMode { .. } => ErrorCode::WrongMode,
            Self::InvalidMonitorTarget(_) => ErrorCode::InvalidMonitorTarget,
            Self::InvalidInterval(_) => ErrorCode::InvalidInterval,
            Self::Driver { .. } => ErrorCode::DriverError,
            Self::Config(_) | Self::Io(_) | Self::Json(_) => ErrorCode::Internal,
        }
    }
}

/// Error kinds as surfaced to external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ReservedPin,
    InvalidPin,
    InvalidOption,
    NotConfigured,
    WrongMode,
    InvalidMonitorTarget,
    InvalidInterval,
    DriverError,
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::ReservedPin => "reserved_pin",
            Self::InvalidPin => "invalid_pin",
            Self::InvalidOption => "invalid_option",
            Self::NotConfigured => "not_configured",
            Self::WrongMode => "wrong_mode",
            Self::InvalidMonitorTarget => "invalid_monitor_target",
            Self::InvalidInterval => "invalid_interval",
            Self::DriverError => "driver_error",
            Self::Internal => "internal",
        };
        f.write_str(code)
    }
}

/// The failure shape returned by [`GpioService`](crate::service::GpioService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<GpioError> for ErrorResponse {
    fn from(err: GpioError) -> Self {
        Self::from(&err)
    }
}

impl From<&GpioError> for ErrorResponse {
    fn from(err: &GpioError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GpioError::ReservedPin(6).code(), ErrorCode::ReservedPin);
        assert_eq!(
            GpioError::driver(17, DriverError::Busy).code(),
            ErrorCode::DriverError
        );
        assert_eq!(
            GpioError::config_error("bad").code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn test_driver_message_preserved() {
        let err = GpioError::driver(17, DriverError::hardware("bus fault"));
        assert_eq!(err.to_string(), "Driver error on pin 17: bus fault");

        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, ErrorCode::DriverError);
        assert!(response.message.contains("bus fault"));
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InvalidMonitorTarget).unwrap();
        assert_eq!(json, "\"invalid_monitor_target\"");
        assert_eq!(ErrorCode::WrongMode.to_string(), "wrong_mode");
    }

    #[test]
    fn test_wrong_mode_message() {
        let err = GpioError::WrongMode {
            pin: 17,
            expected: PinMode::Output,
            actual: PinMode::Input,
        };
        assert_eq!(
            err.to_string(),
            "Pin 17 is not configured as output (mode: input)"
        );
    }
}
