//! Editable view of one device
//!
//! A [`DeviceProjection`] borrows a registry record and the hardware. Reads
//! return the state at last sync; writes go straight to the hardware and are
//! confirmed by a later notification.
//!
//! Mute is remember-and-restore: muting writes 0.0 and keeps the level,
//! unmuting writes the kept level back. Every write is recorded on the
//! volume state, so its later notification confirms it instead of reading
//! as an outside change.

use crate::audio::backend::AudioHardware;
use crate::audio::error::{AudioBackendError, Result};
use crate::audio::registry::{ChangeFeed, RegistryChange};
use crate::audio::types::*;

pub struct DeviceProjection<'a> {
    device: &'a mut Device,
    hardware: &'a dyn AudioHardware,
    volume_step: f32,
    changes: &'a mut ChangeFeed,
}

impl<'a> DeviceProjection<'a> {
    pub(crate) fn new(
        device: &'a mut Device,
        hardware: &'a dyn AudioHardware,
        volume_step: f32,
        changes: &'a mut ChangeFeed,
    ) -> Self {
        Self {
            device,
            hardware,
            volume_step,
            changes,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.device.id
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    // === Volume ===

    /// Level at last sync; while muted, the level unmuting restores
    pub fn volume(&self, scope: Scope) -> f32 {
        self.device.volume(scope).level
    }

    pub fn output_volume(&self) -> f32 {
        self.volume(Scope::Output)
    }

    pub fn input_volume(&self) -> f32 {
        self.volume(Scope::Input)
    }

    pub fn is_muted(&self, scope: Scope) -> bool {
        self.device.volume(scope).muted
    }

    /// Clamp and write a level. Ends any mute on that scope.
    pub fn set_volume(&mut self, scope: Scope, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(AudioBackendError::InvalidVolume(volume));
        }
        let level = clamp_volume(volume);
        let id = self.device.id;

        if !self.write(|hw| hw.set_volume(id, scope, level))? {
            return Ok(());
        }

        let state = self.device.volume_mut(scope);
        state.level = level;
        state.muted = false;
        state.record_write(level);
        self.changes.publish(RegistryChange::DeviceUpdated(id));
        Ok(())
    }

    pub fn set_output_volume(&mut self, volume: f32) -> Result<()> {
        self.set_volume(Scope::Output, volume)
    }

    pub fn set_input_volume(&mut self, volume: f32) -> Result<()> {
        self.set_volume(Scope::Input, volume)
    }

    /// Move the level by `steps` volume steps (negative lowers it)
    pub fn step_volume(&mut self, scope: Scope, steps: i32) -> Result<f32> {
        let target = self.volume(scope) + steps as f32 * self.volume_step;
        self.set_volume(scope, target)?;
        Ok(self.volume(scope))
    }

    /// Mute writes 0.0 and keeps the level; unmute writes the kept level.
    /// Setting the current state again is a no-op.
    pub fn set_muted(&mut self, scope: Scope, muted: bool) -> Result<()> {
        let state = *self.device.volume(scope);
        if state.muted == muted {
            return Ok(());
        }

        let id = self.device.id;
        let written = if muted { 0.0 } else { state.level };
        if !self.write(|hw| hw.set_volume(id, scope, written))? {
            return Ok(());
        }

        let state = self.device.volume_mut(scope);
        state.muted = muted;
        state.record_write(written);
        log::debug!(
            "[Projection] Device {} {:?} {} (level {:.2})",
            id,
            scope,
            if muted { "muted" } else { "unmuted" },
            state.level
        );
        self.changes.publish(RegistryChange::DeviceUpdated(id));
        Ok(())
    }

    /// Flip mute and return the new state
    pub fn toggle_mute(&mut self, scope: Scope) -> Result<bool> {
        let muted = !self.is_muted(scope);
        self.set_muted(scope, muted)?;
        Ok(self.is_muted(scope))
    }

    // === Format ===

    /// Request a rate from the device's supported set. The record keeps the
    /// current rate until the hardware confirms.
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        let id = self.device.id;
        if !self.device.supports_sample_rate(rate) {
            return Err(AudioBackendError::UnsupportedSampleRate { device: id, rate });
        }
        if rate == self.device.sample_rate {
            return Ok(());
        }

        log::info!(
            "[Projection] Setting device {} sample rate to {}",
            id,
            SampleRate(rate).khz_label()
        );
        self.write(|hw| hw.set_sample_rate(id, rate))?;
        Ok(())
    }

    /// Request a clock source from the device's supported set
    pub fn set_clock_source(&mut self, source_id: u32) -> Result<()> {
        let id = self.device.id;
        if !self.device.supports_clock_source(source_id) {
            return Err(AudioBackendError::UnsupportedClockSource {
                device: id,
                source_id,
            });
        }
        if self.device.clock_source_id == Some(source_id) {
            return Ok(());
        }

        log::info!(
            "[Projection] Setting device {} clock source to {}",
            id,
            self.device.clock_source_label(source_id)
        );
        self.write(|hw| hw.set_clock_source(id, source_id))?;
        Ok(())
    }

    /// Run a hardware write. Returns false when the device is gone, which is
    /// a benign race rather than an error.
    fn write(&self, op: impl FnOnce(&dyn AudioHardware) -> Result<()>) -> Result<bool> {
        match op(self.hardware) {
            Ok(()) => Ok(true),
            Err(e) if e.is_device_gone() => {
                log::debug!("[Projection] Write skipped: {}", e);
                Ok(false)
            }
            Err(e) => {
                log::warn!("[Projection] Write to device {} failed: {}", self.device.id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::memory_backend::{HardwareWrite, MemoryHardware};
    use crate::audio::notifications::HardwareEvent;
    use crate::audio::registry::DeviceRegistry;
    use crate::config::Config;

    const SPEAKERS: DeviceId = DeviceId(1);
    const MIC: DeviceId = DeviceId(2);

    fn hardware() -> MemoryHardware {
        let hw = MemoryHardware::new();
        hw.insert_device(
            SPEAKERS,
            DeviceAttributes {
                name: "Speakers".to_string(),
                channels: ChannelCounts { input: 0, output: 2 },
                supported_sample_rates: vec![44100, 48000],
                sample_rate: Some(44100),
                clock_sources: vec![
                    ClockSource { id: 1, name: "Internal".to_string() },
                    ClockSource { id: 2, name: "External".to_string() },
                ],
                clock_source_id: Some(1),
                output_volume: Some(0.4),
                ..Default::default()
            },
        );
        hw.insert_device(
            MIC,
            DeviceAttributes {
                name: "Microphone".to_string(),
                channels: ChannelCounts { input: 1, output: 0 },
                supported_sample_rates: vec![48000],
                sample_rate: Some(48000),
                input_volume: Some(0.7),
                ..Default::default()
            },
        );
        hw.insert_default(DefaultRole::Output, Some(SPEAKERS));
        hw.insert_default(DefaultRole::Input, Some(MIC));
        hw
    }

    fn registry(hw: &MemoryHardware) -> DeviceRegistry {
        DeviceRegistry::initialize(Arc::new(hw.clone()), Config::default())
    }

    fn last_volume_write(hw: &MemoryHardware) -> Option<f32> {
        hw.writes().into_iter().rev().find_map(|w| match w {
            HardwareWrite::Volume { volume, .. } => Some(volume),
            _ => None,
        })
    }

    #[test]
    fn test_set_volume_writes_immediately() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry.projection(SPEAKERS).unwrap().set_output_volume(0.65).unwrap();

        assert_eq!(
            hw.writes(),
            vec![HardwareWrite::Volume {
                device: SPEAKERS,
                scope: Scope::Output,
                volume: 0.65
            }]
        );
        assert_eq!(registry.device(SPEAKERS).unwrap().output.level, 0.65);
    }

    #[test]
    fn test_volume_is_clamped() {
        let hw = hardware();
        let mut registry = registry(&hw);
        let mut projection = registry.projection(SPEAKERS).unwrap();

        projection.set_output_volume(1.5).unwrap();
        assert_eq!(projection.output_volume(), 1.0);
        projection.set_output_volume(-3.0).unwrap();
        assert_eq!(projection.output_volume(), 0.0);
        assert_eq!(last_volume_write(&hw), Some(0.0));
    }

    #[test]
    fn test_non_finite_volume_is_rejected() {
        let hw = hardware();
        let mut registry = registry(&hw);

        let err = registry
            .projection(SPEAKERS)
            .unwrap()
            .set_output_volume(f32::NAN)
            .unwrap_err();

        assert!(err.is_invalid_value());
        assert!(hw.writes().is_empty());
    }

    #[test]
    fn test_mute_round_trip_restores_volume() {
        let hw = hardware();
        let mut registry = registry(&hw);
        let mut projection = registry.projection(SPEAKERS).unwrap();

        projection.set_output_volume(0.37).unwrap();
        projection.set_muted(Scope::Output, true).unwrap();
        assert_eq!(last_volume_write(&hw), Some(0.0));
        assert_eq!(projection.output_volume(), 0.37);

        projection.set_muted(Scope::Output, false).unwrap();
        assert_eq!(last_volume_write(&hw), Some(0.37));
        assert_eq!(projection.output_volume(), 0.37);
        assert_eq!(hw.volume(SPEAKERS, Scope::Output).unwrap(), Some(0.37));
    }

    #[test]
    fn test_mute_echo_keeps_remembered_level() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry
            .projection(SPEAKERS)
            .unwrap()
            .set_muted(Scope::Output, true)
            .unwrap();
        registry.process_pending();

        let mut projection = registry.projection(SPEAKERS).unwrap();
        assert!(projection.is_muted(Scope::Output));
        assert_eq!(projection.output_volume(), 0.4);

        assert!(!projection.toggle_mute(Scope::Output).unwrap());
        assert_eq!(last_volume_write(&hw), Some(0.4));
    }

    #[test]
    fn test_mute_round_trip_with_drain_between_each_step() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry.projection(SPEAKERS).unwrap().set_output_volume(0.37).unwrap();
        registry.process_pending();
        registry
            .projection(SPEAKERS)
            .unwrap()
            .set_muted(Scope::Output, true)
            .unwrap();
        registry.process_pending();

        let output = registry.device(SPEAKERS).unwrap().output;
        assert!(output.muted);
        assert_eq!(output.level, 0.37);

        registry
            .projection(SPEAKERS)
            .unwrap()
            .set_muted(Scope::Output, false)
            .unwrap();
        registry.process_pending();

        assert_eq!(last_volume_write(&hw), Some(0.37));
        assert_eq!(hw.volume(SPEAKERS, Scope::Output).unwrap(), Some(0.37));
        let output = registry.device(SPEAKERS).unwrap().output;
        assert!(!output.muted);
        assert_eq!(output.level, 0.37);
        assert_eq!(output.pending_writes(), 0);
    }

    #[test]
    fn test_mute_round_trip_with_queued_volume_echo() {
        let hw = hardware();
        let mut registry = registry(&hw);

        let mut projection = registry.projection(SPEAKERS).unwrap();
        projection.set_output_volume(0.37).unwrap();
        projection.set_muted(Scope::Output, true).unwrap();
        assert_eq!(registry.process_pending(), 2);

        let mut projection = registry.projection(SPEAKERS).unwrap();
        assert!(projection.is_muted(Scope::Output));
        assert_eq!(projection.output_volume(), 0.37);

        projection.set_muted(Scope::Output, false).unwrap();
        assert_eq!(hw.volume(SPEAKERS, Scope::Output).unwrap(), Some(0.37));
    }

    #[test]
    fn test_unconfirmed_zero_while_muted_keeps_mute() {
        let hw = hardware();
        let mut registry = registry(&hw);
        registry
            .projection(SPEAKERS)
            .unwrap()
            .set_muted(Scope::Output, true)
            .unwrap();
        registry.process_pending();
        hw.clear_writes();

        hw.emit(HardwareEvent::VolumeChanged {
            device: SPEAKERS,
            scope: Scope::Output,
            volume: 0.0,
        });
        registry.process_pending();

        let mut projection = registry.projection(SPEAKERS).unwrap();
        assert!(projection.is_muted(Scope::Output));
        projection.toggle_mute(Scope::Output).unwrap();
        assert_eq!(
            hw.writes(),
            vec![HardwareWrite::Volume {
                device: SPEAKERS,
                scope: Scope::Output,
                volume: 0.4
            }]
        );
    }

    #[test]
    fn test_repeated_mute_does_not_rewrite() {
        let hw = hardware();
        let mut registry = registry(&hw);
        let mut projection = registry.projection(SPEAKERS).unwrap();

        projection.set_muted(Scope::Output, true).unwrap();
        projection.set_muted(Scope::Output, true).unwrap();
        projection.set_muted(Scope::Output, false).unwrap();

        assert_eq!(hw.writes().len(), 2);
        assert_eq!(last_volume_write(&hw), Some(0.4));
    }

    #[test]
    fn test_volume_write_while_muted_unmutes() {
        let hw = hardware();
        let mut registry = registry(&hw);
        let mut projection = registry.projection(SPEAKERS).unwrap();

        projection.set_muted(Scope::Output, true).unwrap();
        projection.set_output_volume(0.2).unwrap();

        assert!(!projection.is_muted(Scope::Output));
        assert_eq!(projection.output_volume(), 0.2);
    }

    #[test]
    fn test_external_change_while_muted_ends_mute() {
        let hw = hardware();
        let mut registry = registry(&hw);
        registry
            .projection(SPEAKERS)
            .unwrap()
            .set_muted(Scope::Output, true)
            .unwrap();

        hw.change_volume(SPEAKERS, Scope::Output, 0.9);
        registry.process_pending();

        let output = registry.device(SPEAKERS).unwrap().output;
        assert!(!output.muted);
        assert_eq!(output.level, 0.9);
    }

    #[test]
    fn test_scopes_are_independent() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry.projection(MIC).unwrap().set_muted(Scope::Input, true).unwrap();
        registry.projection(SPEAKERS).unwrap().set_output_volume(0.1).unwrap();

        assert!(registry.device(MIC).unwrap().input.muted);
        assert!(!registry.device(SPEAKERS).unwrap().output.muted);
        assert_eq!(registry.device(MIC).unwrap().input.level, 0.7);
    }

    #[test]
    fn test_step_volume() {
        let hw = hardware();
        let mut registry = registry(&hw);
        let mut projection = registry.projection(SPEAKERS).unwrap();

        let up = projection.step_volume(Scope::Output, 2).unwrap();
        assert!((up - 0.6).abs() < 1e-6);
        let down = projection.step_volume(Scope::Output, -10).unwrap();
        assert_eq!(down, 0.0);
    }

    #[test]
    fn test_unsupported_sample_rate_is_rejected() {
        let hw = hardware();
        let mut registry = registry(&hw);

        let err = registry
            .projection(SPEAKERS)
            .unwrap()
            .set_sample_rate(96000)
            .unwrap_err();

        assert_eq!(
            err,
            AudioBackendError::UnsupportedSampleRate {
                device: SPEAKERS,
                rate: 96000
            }
        );
        assert!(hw.writes().is_empty());
        assert_eq!(registry.device(SPEAKERS).unwrap().sample_rate, 44100);
    }

    #[test]
    fn test_sample_rate_applies_on_confirmation() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry.projection(SPEAKERS).unwrap().set_sample_rate(48000).unwrap();
        assert_eq!(registry.device(SPEAKERS).unwrap().sample_rate, 44100);

        registry.process_pending();
        assert_eq!(registry.device(SPEAKERS).unwrap().sample_rate, 48000);
        assert_eq!(
            registry.device(SPEAKERS).unwrap().sample_rate_label(),
            "48.0 kHz"
        );
    }

    #[test]
    fn test_clock_source_validation() {
        let hw = hardware();
        let mut registry = registry(&hw);

        let err = registry
            .projection(SPEAKERS)
            .unwrap()
            .set_clock_source(9)
            .unwrap_err();
        assert!(err.is_invalid_value());
        assert!(hw.writes().is_empty());

        registry.projection(SPEAKERS).unwrap().set_clock_source(2).unwrap();
        registry.process_pending();
        let device = registry.device(SPEAKERS).unwrap();
        assert_eq!(device.clock_source_id, Some(2));
        assert_eq!(device.clock_source_name, "External");
    }

    #[test]
    fn test_write_to_vanished_device_is_noop() {
        let hw = hardware();
        let mut registry = registry(&hw);

        hw.disconnect(SPEAKERS);
        let mut projection = registry.projection(SPEAKERS).unwrap();
        projection.set_output_volume(0.9).unwrap();
        projection.set_muted(Scope::Output, true).unwrap();

        assert_eq!(projection.output_volume(), 0.4);
        assert!(!projection.is_muted(Scope::Output));
        assert!(hw.writes().is_empty());
    }

    #[test]
    fn test_default_projection_sets_default_output() {
        let hw = hardware();
        let mut registry = registry(&hw);

        registry
            .default_projection(Scope::Output)
            .unwrap()
            .set_output_volume(0.5)
            .unwrap();

        assert_eq!(hw.volume(SPEAKERS, Scope::Output).unwrap(), Some(0.5));
    }
}
