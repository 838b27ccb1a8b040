//! Audio device model for SoundyControl
//!
//! This module keeps an in-memory model of every audio device in sync with
//! the OS audio subsystem, and lets the UI edit volume, mute, sample rate and
//! clock source through per-device projections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              UI (menu bar)                   │
//! │  Reads the registry, edits devices through  │
//! │  DeviceProjection, watches RegistryChange   │
//! └─────────────┬───────────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────────┐
//! │         DeviceRegistry                       │
//! │  devices, default roles, subscriptions      │
//! │  process_pending() drains HardwareEvents    │
//! └─────────────┬───────────────────────────────┘
//!               │ trait AudioHardware
//!        ┌──────┴───────────────┐
//!        ▼                      ▼
//! ┌──────────────┐    ┌──────────────┐
//! │ CoreAudio    │    │ Memory       │
//! │ Backend      │    │ Hardware     │
//! │ (macOS)      │    │ (simulated)  │
//! └──────────────┘    └──────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod memory_backend;
pub mod notifications;
pub mod projection;
pub mod registry;
pub mod types;

#[cfg(target_os = "macos")]
pub mod coreaudio_backend;

// Re-exports for convenience
pub use backend::{create_backend, AudioHardware};
pub use error::{AudioBackendError, Result};
pub use memory_backend::MemoryHardware;
pub use notifications::{EventSink, HardwareEvent, Subscription, SubscriptionSet};
pub use projection::DeviceProjection;
pub use registry::{DeviceRegistry, RegistryChange};
pub use types::*;
