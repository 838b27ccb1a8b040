//! Audio backend error types
//!
//! This module defines unified error types for all audio backend operations.
//! Platform-specific errors are mapped to these generic error variants.

use thiserror::Error;

use crate::audio::types::DeviceId;

/// Unified error type for audio backend operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioBackendError {
    /// Device is no longer present (benign race with a removal)
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),
    /// Failed to enumerate devices
    #[error("Device enumeration failed: {0}")]
    DeviceEnumerationFailed(String),
    /// Sample rate not in the device's supported set
    #[error("Unsupported sample rate for device {device}: {rate} Hz")]
    UnsupportedSampleRate { device: DeviceId, rate: u32 },
    /// Clock source not in the device's supported set
    #[error("Unsupported clock source for device {device}: {source_id}")]
    UnsupportedClockSource { device: DeviceId, source_id: u32 },
    /// Volume is NaN or infinite
    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),
    /// Registering or removing a property listener failed
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    /// HAL/System API error
    #[error("System error {code}: {message}")]
    SystemError { code: i32, message: String },
    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl AudioBackendError {
    /// True for errors caused by an out-of-set or malformed user value
    pub fn is_invalid_value(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSampleRate { .. }
                | Self::UnsupportedClockSource { .. }
                | Self::InvalidVolume(_)
        )
    }

    /// True when the target device has gone away; callers treat this as a no-op
    pub fn is_device_gone(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}

/// Result type alias for audio backend operations
pub type Result<T> = std::result::Result<T, AudioBackendError>;
