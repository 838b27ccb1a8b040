//! Audio hardware abstraction layer
//!
//! This trait is the only boundary between the device model and the OS audio
//! subsystem. Implementations enumerate devices, read and write device
//! properties, and register listeners that report hardware changes.
//!
//! # Important
//!
//! This file must NOT contain any platform-specific imports (coreaudio-sys, windows, etc.).
//! All platform-specific code goes in the implementation files.

use crate::audio::error::Result;
use crate::audio::notifications::{EventSink, SubscriptionSet};
use crate::audio::types::*;

/// Core audio hardware trait
///
/// Every call is best-effort. A device that disappeared between enumeration
/// and the call yields `AudioBackendError::DeviceNotFound`, which callers
/// treat as a benign race.
///
/// # Example
///
/// ```ignore
/// let hardware = create_backend()?;
///
/// for id in hardware.list_devices()? {
///     let attrs = hardware.device_attributes(id)?;
///     println!("{} ({})", attrs.name, attrs.transport);
/// }
///
/// if let Some(output) = hardware.default_device(DefaultRole::Output)? {
///     hardware.set_volume(output, Scope::Output, 0.5)?;
/// }
/// ```
pub trait AudioHardware: Send + Sync {
    // === Device Enumeration ===

    /// All devices currently present, in either direction
    fn list_devices(&self) -> Result<Vec<DeviceId>>;

    /// Read every descriptive and current-state attribute of a device
    fn device_attributes(&self, device: DeviceId) -> Result<DeviceAttributes>;

    /// Device currently holding a default role, if any
    fn default_device(&self, role: DefaultRole) -> Result<Option<DeviceId>>;

    /// Live volume for one direction; `None` if the device has no volume control
    fn volume(&self, device: DeviceId, scope: Scope) -> Result<Option<f32>>;

    /// Display name of one of the device's clock sources
    fn clock_source_name(&self, device: DeviceId, source_id: u32) -> Result<Option<String>>;

    // === Writes ===

    /// Write a volume in [0.0, 1.0]. Completion is observed through a later
    /// `HardwareEvent::VolumeChanged`.
    fn set_volume(&self, device: DeviceId, scope: Scope, volume: f32) -> Result<()>;

    /// Request a nominal sample rate change. Does not wait for the hardware
    /// to confirm.
    fn set_sample_rate(&self, device: DeviceId, rate: u32) -> Result<()>;

    /// Select a clock source by id
    fn set_clock_source(&self, device: DeviceId, source_id: u32) -> Result<()>;

    // === Notifications ===

    /// Listen for device list and default device changes
    fn subscribe_system(&self, sink: EventSink) -> Result<SubscriptionSet>;

    /// Listen for sample rate, clock source and volume changes on one device
    fn subscribe_device(&self, device: DeviceId, sink: EventSink) -> Result<SubscriptionSet>;

    // === Info ===

    /// Get the backend name (e.g., "CoreAudio", "Memory")
    fn name(&self) -> &'static str;
}

/// Factory function to create the appropriate backend for the current platform
pub fn create_backend() -> Result<Box<dyn AudioHardware>> {
    #[cfg(target_os = "macos")]
    {
        use crate::audio::coreaudio_backend::CoreAudioBackend;
        Ok(Box::new(CoreAudioBackend::new()))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(crate::audio::error::AudioBackendError::NotSupported(
            "No native audio backend for this platform".to_string(),
        ))
    }
}
