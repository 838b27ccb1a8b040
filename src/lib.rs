//! SoundyControl core
//!
//! Keeps a live model of the machine's audio devices (names, formats, clock
//! sources, volumes and default roles) in sync with the OS, and exposes
//! validated writes for the menu-bar UI.
//!
//! ```ignore
//! let mut registry = soundy_control::start()?;
//! let updates = registry.subscribe_changes();
//!
//! // on the UI thread, whenever woken up
//! registry.process_pending();
//! if let Some(mut output) = registry.default_projection(Scope::Output) {
//!     output.toggle_mute(Scope::Output)?;
//! }
//! ```

pub mod audio;
pub mod config;

use std::sync::Arc;

pub use audio::{
    AudioBackendError, AudioHardware, DefaultRole, Device, DeviceId, DeviceProjection,
    DeviceRegistry, RegistryChange, Scope,
};
pub use config::Config;

/// Build a registry on the platform backend with the user's saved config
pub fn start() -> audio::Result<DeviceRegistry> {
    let config = config::load_config();
    let hardware: Arc<dyn AudioHardware> = Arc::from(audio::create_backend()?);
    log::info!(
        "[SoundyControl] Starting on {} backend (step {})",
        hardware.name(),
        config.volume_step
    );
    Ok(DeviceRegistry::initialize(hardware, config))
}
