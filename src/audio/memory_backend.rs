//! In-memory audio hardware
//!
//! Simulates a HAL: a set of present devices, the three default device
//! assignments, and listeners. Writes update the simulated device and echo
//! the matching notification, the way the OS confirms a write. Used by the
//! test suites and by hosts running on a platform without a native backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::backend::AudioHardware;
use crate::audio::error::{AudioBackendError, Result};
use crate::audio::notifications::{EventSink, HardwareEvent, Subscription, SubscriptionSet};
use crate::audio::types::*;

/// A write the device model issued against the hardware
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareWrite {
    Volume {
        device: DeviceId,
        scope: Scope,
        volume: f32,
    },
    SampleRate { device: DeviceId, rate: u32 },
    ClockSource { device: DeviceId, source_id: u32 },
}

#[derive(Default)]
struct State {
    devices: BTreeMap<DeviceId, DeviceAttributes>,
    defaults: HashMap<DefaultRole, DeviceId>,
    system_sinks: BTreeMap<u64, EventSink>,
    device_sinks: BTreeMap<u64, (DeviceId, EventSink)>,
    next_token: u64,
    writes: Vec<HardwareWrite>,
    fail_enumeration: bool,
}

impl State {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn broadcast_system(&self, event: HardwareEvent) {
        for sink in self.system_sinks.values() {
            sink.send(event.clone());
        }
    }

    fn broadcast_device(&self, device: DeviceId, event: HardwareEvent) {
        for (id, sink) in self.device_sinks.values() {
            if *id == device {
                sink.send(event.clone());
            }
        }
    }

    fn device(&self, device: DeviceId) -> Result<&DeviceAttributes> {
        self.devices
            .get(&device)
            .ok_or(AudioBackendError::DeviceNotFound(device))
    }

    fn device_mut(&mut self, device: DeviceId) -> Result<&mut DeviceAttributes> {
        self.devices
            .get_mut(&device)
            .ok_or(AudioBackendError::DeviceNotFound(device))
    }
}

/// Simulated audio hardware
#[derive(Clone, Default)]
pub struct MemoryHardware {
    state: Arc<Mutex<State>>,
}

impl MemoryHardware {
    pub fn new() -> Self {
        Self::default()
    }

    // === Simulation controls ===

    /// Make a device present without notifying listeners (startup state)
    pub fn insert_device(&self, device: DeviceId, attrs: DeviceAttributes) {
        self.state.lock().devices.insert(device, attrs);
    }

    /// Set a default assignment without notifying listeners (startup state)
    pub fn insert_default(&self, role: DefaultRole, device: Option<DeviceId>) {
        let mut state = self.state.lock();
        match device {
            Some(id) => state.defaults.insert(role, id),
            None => state.defaults.remove(&role),
        };
    }

    /// Plug a device in and notify listeners
    pub fn connect(&self, device: DeviceId, attrs: DeviceAttributes) {
        let mut state = self.state.lock();
        state.devices.insert(device, attrs);
        state.broadcast_system(HardwareEvent::DeviceListChanged {
            added: vec![device],
            removed: Vec::new(),
        });
    }

    /// Unplug a device and notify listeners. Default assignments it held are
    /// dropped silently; the OS reports the new default separately. Listeners
    /// on the device stay registered until their subscriptions are released.
    pub fn disconnect(&self, device: DeviceId) {
        let mut state = self.state.lock();
        if state.devices.remove(&device).is_none() {
            return;
        }
        state.defaults.retain(|_, id| *id != device);
        state.broadcast_system(HardwareEvent::DeviceListChanged {
            added: Vec::new(),
            removed: vec![device],
        });
    }

    /// Change a default assignment and notify listeners
    pub fn change_default(&self, role: DefaultRole, device: Option<DeviceId>) {
        self.insert_default(role, device);
        self.state
            .lock()
            .broadcast_system(HardwareEvent::DefaultDeviceChanged { role, device });
    }

    /// Change a device's rate from outside the device model (another app,
    /// Audio MIDI Setup) and notify listeners. The rate is not validated.
    pub fn change_sample_rate(&self, device: DeviceId, rate: u32) {
        let mut state = self.state.lock();
        if let Ok(attrs) = state.device_mut(device) {
            attrs.sample_rate = Some(rate);
            state.broadcast_device(device, HardwareEvent::SampleRateChanged { device, rate });
        }
    }

    /// Change a device's volume from outside (keyboard volume keys)
    pub fn change_volume(&self, device: DeviceId, scope: Scope, volume: f32) {
        let mut state = self.state.lock();
        if let Ok(attrs) = state.device_mut(device) {
            *volume_slot(attrs, scope) = Some(volume);
            state.broadcast_device(
                device,
                HardwareEvent::VolumeChanged {
                    device,
                    scope,
                    volume,
                },
            );
        }
    }

    /// Deliver an arbitrary event to every matching listener
    pub fn emit(&self, event: HardwareEvent) {
        let target = match &event {
            HardwareEvent::DeviceListChanged { .. } | HardwareEvent::DefaultDeviceChanged { .. } => {
                None
            }
            HardwareEvent::SampleRateChanged { device, .. }
            | HardwareEvent::ClockSourceChanged { device, .. }
            | HardwareEvent::VolumeChanged { device, .. } => Some(*device),
        };
        let state = self.state.lock();
        match target {
            None => state.broadcast_system(event),
            Some(device) => state.broadcast_device(device, event),
        }
    }

    /// Make `list_devices` fail until cleared
    pub fn set_enumeration_failure(&self, fail: bool) {
        self.state.lock().fail_enumeration = fail;
    }

    // === Inspection ===

    /// Writes issued so far, oldest first
    pub fn writes(&self) -> Vec<HardwareWrite> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Registered listeners that have not been released
    pub fn active_listeners(&self) -> usize {
        let state = self.state.lock();
        state.system_sinks.len() + state.device_sinks.len()
    }

    /// Registered, unreleased listeners for one device
    pub fn device_listeners(&self, device: DeviceId) -> usize {
        self.state
            .lock()
            .device_sinks
            .values()
            .filter(|(id, _)| *id == device)
            .count()
    }
}

fn volume_slot(attrs: &mut DeviceAttributes, scope: Scope) -> &mut Option<f32> {
    match scope {
        Scope::Input => &mut attrs.input_volume,
        Scope::Output => &mut attrs.output_volume,
    }
}

impl AudioHardware for MemoryHardware {
    fn list_devices(&self) -> Result<Vec<DeviceId>> {
        let state = self.state.lock();
        if state.fail_enumeration {
            return Err(AudioBackendError::DeviceEnumerationFailed(
                "simulated enumeration failure".to_string(),
            ));
        }
        Ok(state.devices.keys().copied().collect())
    }

    fn device_attributes(&self, device: DeviceId) -> Result<DeviceAttributes> {
        self.state.lock().device(device).cloned()
    }

    fn default_device(&self, role: DefaultRole) -> Result<Option<DeviceId>> {
        Ok(self.state.lock().defaults.get(&role).copied())
    }

    fn volume(&self, device: DeviceId, scope: Scope) -> Result<Option<f32>> {
        let state = self.state.lock();
        let attrs = state.device(device)?;
        Ok(match scope {
            Scope::Input => attrs.input_volume,
            Scope::Output => attrs.output_volume,
        })
    }

    fn clock_source_name(&self, device: DeviceId, source_id: u32) -> Result<Option<String>> {
        let state = self.state.lock();
        Ok(state
            .device(device)?
            .clock_sources
            .iter()
            .find(|c| c.id == source_id)
            .map(|c| c.name.clone()))
    }

    fn set_volume(&self, device: DeviceId, scope: Scope, volume: f32) -> Result<()> {
        let mut state = self.state.lock();
        *volume_slot(state.device_mut(device)?, scope) = Some(volume);
        state.writes.push(HardwareWrite::Volume {
            device,
            scope,
            volume,
        });
        state.broadcast_device(
            device,
            HardwareEvent::VolumeChanged {
                device,
                scope,
                volume,
            },
        );
        Ok(())
    }

    fn set_sample_rate(&self, device: DeviceId, rate: u32) -> Result<()> {
        let mut state = self.state.lock();
        let attrs = state.device_mut(device)?;
        if !attrs.supported_sample_rates.contains(&rate) {
            return Err(AudioBackendError::SystemError {
                code: -1,
                message: format!("rate {} Hz rejected by device {}", rate, device),
            });
        }
        attrs.sample_rate = Some(rate);
        state.writes.push(HardwareWrite::SampleRate { device, rate });
        state.broadcast_device(device, HardwareEvent::SampleRateChanged { device, rate });
        Ok(())
    }

    fn set_clock_source(&self, device: DeviceId, source_id: u32) -> Result<()> {
        let mut state = self.state.lock();
        let attrs = state.device_mut(device)?;
        let name = attrs
            .clock_sources
            .iter()
            .find(|c| c.id == source_id)
            .map(|c| c.name.clone());
        if name.is_none() {
            return Err(AudioBackendError::SystemError {
                code: -1,
                message: format!("clock source {} rejected by device {}", source_id, device),
            });
        }
        attrs.clock_source_id = Some(source_id);
        attrs.clock_source_name = name;
        state.writes.push(HardwareWrite::ClockSource { device, source_id });
        state.broadcast_device(device, HardwareEvent::ClockSourceChanged { device, source_id });
        Ok(())
    }

    fn subscribe_system(&self, sink: EventSink) -> Result<SubscriptionSet> {
        let token = {
            let mut state = self.state.lock();
            let token = state.token();
            state.system_sinks.insert(token, sink);
            token
        };
        let state = Arc::clone(&self.state);
        let mut set = SubscriptionSet::new();
        set.push(Subscription::new("memory:system", move || {
            state.lock().system_sinks.remove(&token);
        }));
        Ok(set)
    }

    fn subscribe_device(&self, device: DeviceId, sink: EventSink) -> Result<SubscriptionSet> {
        let token = {
            let mut state = self.state.lock();
            state.device(device)?;
            let token = state.token();
            state.device_sinks.insert(token, (device, sink));
            token
        };
        let state = Arc::clone(&self.state);
        let mut set = SubscriptionSet::new();
        set.push(Subscription::new(format!("memory:device:{}", device), move || {
            state.lock().device_sinks.remove(&token);
        }));
        Ok(set)
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::notifications::event_queue;

    fn speakers() -> DeviceAttributes {
        DeviceAttributes {
            name: "Speakers".to_string(),
            supported_sample_rates: vec![44100, 48000],
            sample_rate: Some(44100),
            output_volume: Some(0.25),
            ..Default::default()
        }
    }

    #[test]
    fn test_write_is_recorded_and_echoed() {
        let hw = MemoryHardware::new();
        hw.insert_device(DeviceId(1), speakers());
        let (sink, queue) = event_queue(8);
        let _subs = hw.subscribe_device(DeviceId(1), sink).unwrap();

        hw.set_volume(DeviceId(1), Scope::Output, 0.75).unwrap();

        assert_eq!(
            hw.writes(),
            vec![HardwareWrite::Volume {
                device: DeviceId(1),
                scope: Scope::Output,
                volume: 0.75
            }]
        );
        assert_eq!(hw.volume(DeviceId(1), Scope::Output).unwrap(), Some(0.75));
        assert_eq!(
            queue.try_next(),
            Some(HardwareEvent::VolumeChanged {
                device: DeviceId(1),
                scope: Scope::Output,
                volume: 0.75
            })
        );
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let hw = MemoryHardware::new();
        assert_eq!(
            hw.set_sample_rate(DeviceId(9), 48000),
            Err(AudioBackendError::DeviceNotFound(DeviceId(9)))
        );
        let (sink, _queue) = event_queue(8);
        assert!(hw.subscribe_device(DeviceId(9), sink).is_err());
    }

    #[test]
    fn test_released_subscription_stops_delivery() {
        let hw = MemoryHardware::new();
        let (sink, queue) = event_queue(8);
        let subs = hw.subscribe_system(sink).unwrap();
        assert_eq!(hw.active_listeners(), 1);
        drop(subs);
        assert_eq!(hw.active_listeners(), 0);

        hw.connect(DeviceId(1), speakers());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_disconnect_drops_defaults_but_keeps_listeners() {
        let hw = MemoryHardware::new();
        hw.insert_device(DeviceId(1), speakers());
        hw.insert_default(DefaultRole::Output, Some(DeviceId(1)));
        let (sink, _queue) = event_queue(8);
        let subs = hw.subscribe_device(DeviceId(1), sink).unwrap();

        hw.disconnect(DeviceId(1));

        assert_eq!(hw.device_listeners(DeviceId(1)), 1);
        drop(subs);
        assert_eq!(hw.device_listeners(DeviceId(1)), 0);
        assert_eq!(hw.default_device(DefaultRole::Output).unwrap(), None);
        assert!(hw.list_devices().unwrap().is_empty());
    }
}
