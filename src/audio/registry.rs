//! Device registry
//!
//! Owns the authoritative mapping from device id to [`Device`] record and
//! keeps the default-role flags consistent with the OS-reported defaults.
//!
//! The registry is single-owner: hardware listeners only queue
//! [`HardwareEvent`]s, and the owning thread applies them with
//! [`DeviceRegistry::process_pending`]. Every applied change bumps the
//! revision counter and is broadcast as a [`RegistryChange`] to receivers
//! obtained from [`DeviceRegistry::subscribe_changes`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::audio::backend::AudioHardware;
use crate::audio::notifications::{event_queue, EventQueue, EventSink, HardwareEvent, SubscriptionSet};
use crate::audio::projection::DeviceProjection;
use crate::audio::types::*;
use crate::config::Config;

/// What changed in the registry, for UI layers that redraw on change
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryChange {
    DevicesAdded(Vec<DeviceId>),
    DevicesRemoved(Vec<DeviceId>),
    DefaultChanged {
        role: DefaultRole,
        device: Option<DeviceId>,
    },
    /// A field of one device changed (rate, clock source, volume, mute)
    DeviceUpdated(DeviceId),
    /// State was re-read from the hardware after dropped notifications
    Resynced,
}

/// Revision counter plus change receivers
#[derive(Debug, Default)]
pub(crate) struct ChangeFeed {
    revision: u64,
    listeners: Vec<Sender<RegistryChange>>,
}

impl ChangeFeed {
    pub(crate) fn publish(&mut self, change: RegistryChange) {
        self.revision += 1;
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn subscribe(&mut self) -> Receiver<RegistryChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.listeners.push(tx);
        rx
    }
}

/// The set of known audio devices
pub struct DeviceRegistry {
    hardware: Arc<dyn AudioHardware>,
    config: Config,
    devices: HashMap<DeviceId, Device>,
    /// Ids ordered by display name, then id
    sorted: Vec<DeviceId>,
    sink: EventSink,
    queue: EventQueue,
    system_subscriptions: SubscriptionSet,
    device_subscriptions: HashMap<DeviceId, SubscriptionSet>,
    changes: ChangeFeed,
}

impl DeviceRegistry {
    /// Subscribe to hardware notifications, enumerate the present devices and
    /// compute the default-role flags.
    ///
    /// Nothing here is fatal: failed subscriptions and a failed enumeration
    /// are logged, and the registry starts with whatever could be read.
    pub fn initialize(hardware: Arc<dyn AudioHardware>, config: Config) -> Self {
        let config = config.sanitized();
        let (sink, queue) = event_queue(config.event_queue_capacity);

        let system_subscriptions = match hardware.subscribe_system(sink.clone()) {
            Ok(subs) => subs,
            Err(e) => {
                log::warn!("[Registry] System notifications unavailable: {}", e);
                SubscriptionSet::new()
            }
        };

        let mut registry = Self {
            hardware,
            config,
            devices: HashMap::new(),
            sorted: Vec::new(),
            sink,
            queue,
            system_subscriptions,
            device_subscriptions: HashMap::new(),
            changes: ChangeFeed::default(),
        };

        let ids = match registry.hardware.list_devices() {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("[Registry] Device enumeration failed, starting empty: {}", e);
                Vec::new()
            }
        };
        for id in ids {
            registry.insert_device(id);
        }
        registry.rebuild_sorted();
        registry.recompute_default_roles();

        log::info!(
            "[Registry] Initialized with {} device(s) via {}",
            registry.devices.len(),
            registry.hardware.name()
        );

        registry
    }

    // === Read path: hardware notifications ===

    /// Insert records for newly reported devices. Role flags of new records
    /// stay cleared until the next default-changed event or recompute.
    ///
    /// The OS does not order default-changed and device-list notifications.
    /// A default change naming a device that is not registered yet gives the
    /// role to nobody, and the device stays without it once added. Callers
    /// that need the role right away call [`Self::recompute_default_roles`]
    /// after the add.
    pub fn on_devices_added(&mut self, ids: &[DeviceId]) {
        let added: Vec<DeviceId> = ids
            .iter()
            .copied()
            .filter(|&id| self.insert_device(id))
            .collect();

        if added.is_empty() {
            return;
        }
        self.rebuild_sorted();
        self.changes.publish(RegistryChange::DevicesAdded(added));
    }

    /// Drop records for removed devices. Role flags they held stay unset
    /// until the OS reports the new default.
    pub fn on_devices_removed(&mut self, ids: &[DeviceId]) {
        let mut removed = Vec::new();
        for &id in ids {
            let Some(device) = self.devices.remove(&id) else {
                continue;
            };
            if let Some(mut subs) = self.device_subscriptions.remove(&id) {
                subs.release_all();
            }
            if device.is_default_device() {
                log::info!(
                    "[Registry] Removed device {} held default roles {:?}",
                    device.name,
                    device.roles
                );
            }
            log::info!("[Registry] Device removed: {} (ID: {})", device.name, id);
            removed.push(id);
        }

        if removed.is_empty() {
            return;
        }
        self.rebuild_sorted();
        self.changes.publish(RegistryChange::DevicesRemoved(removed));
    }

    /// Give `role` to `new_default` and take it from every other device.
    ///
    /// Always a full sweep, so duplicated or reordered notifications still
    /// leave at most one holder.
    pub fn on_default_changed(&mut self, role: DefaultRole, new_default: Option<DeviceId>) {
        let flag = role.flag();
        let mut changed = false;
        for device in self.devices.values_mut() {
            let holds = Some(device.id) == new_default;
            if device.roles.contains(flag) != holds {
                device.roles.set(flag, holds);
                changed = true;
            }
        }

        let holder = new_default.filter(|id| self.devices.contains_key(id));
        if new_default.is_some() && holder.is_none() {
            log::debug!(
                "[Registry] Default {:?} device {:?} is not registered",
                role,
                new_default
            );
        }

        if changed {
            log::info!("[Registry] Default {:?} device -> {:?}", role, holder);
            self.changes
                .publish(RegistryChange::DefaultChanged { role, device: holder });
        }
    }

    /// Hardware-origin rate change, trusted verbatim
    pub fn on_sample_rate_changed(&mut self, id: DeviceId, rate: u32) {
        let Some(device) = self.devices.get_mut(&id) else {
            log::debug!("[Registry] Sample rate change for unknown device {}", id);
            return;
        };
        if device.sample_rate == rate {
            return;
        }
        if !device.supports_sample_rate(rate) {
            log::debug!(
                "[Registry] Device {} reports {} Hz outside its advertised rates",
                id,
                rate
            );
        }
        device.sample_rate = rate;
        self.changes.publish(RegistryChange::DeviceUpdated(id));
    }

    /// Hardware-origin clock source change, trusted verbatim
    pub fn on_clock_source_changed(&mut self, id: DeviceId, source_id: u32) {
        let Some(device) = self.devices.get_mut(&id) else {
            log::debug!("[Registry] Clock source change for unknown device {}", id);
            return;
        };

        let name = device
            .clock_sources
            .iter()
            .find(|c| c.id == source_id)
            .map(|c| c.name.clone())
            .or_else(|| {
                self.hardware
                    .clock_source_name(id, source_id)
                    .ok()
                    .flatten()
            })
            .unwrap_or_else(|| DEFAULT_CLOCK_SOURCE_LABEL.to_string());

        device.clock_source_id = Some(source_id);
        device.clock_source_name = name;
        self.changes.publish(RegistryChange::DeviceUpdated(id));
    }

    /// Hardware-origin volume change; see [`VolumeState::sync`] for how it
    /// interacts with mute
    pub fn on_volume_changed(&mut self, id: DeviceId, scope: Scope, volume: f32) {
        if !volume.is_finite() {
            log::warn!("[Registry] Ignoring non-finite volume {} for device {}", volume, id);
            return;
        }
        let Some(device) = self.devices.get_mut(&id) else {
            log::debug!("[Registry] Volume change for unknown device {}", id);
            return;
        };

        let state = device.volume_mut(scope);
        let before = *state;
        state.sync(volume);
        if *state != before {
            self.changes.publish(RegistryChange::DeviceUpdated(id));
        }
    }

    /// Re-query the three OS defaults and apply them. A role whose query
    /// fails keeps its current holder.
    pub fn recompute_default_roles(&mut self) {
        for role in DefaultRole::ALL {
            match self.hardware.default_device(role) {
                Ok(device) => self.on_default_changed(role, device),
                Err(e) => log::warn!("[Registry] Failed to query default {:?} device: {}", role, e),
            }
        }
    }

    /// Apply one hardware event
    pub fn handle_event(&mut self, event: HardwareEvent) {
        log::debug!("[Registry] Event: {:?}", event);
        match event {
            HardwareEvent::DeviceListChanged { added, removed } => {
                self.on_devices_added(&added);
                self.on_devices_removed(&removed);
            }
            HardwareEvent::DefaultDeviceChanged { role, device } => {
                self.on_default_changed(role, device)
            }
            HardwareEvent::SampleRateChanged { device, rate } => {
                self.on_sample_rate_changed(device, rate)
            }
            HardwareEvent::ClockSourceChanged { device, source_id } => {
                self.on_clock_source_changed(device, source_id)
            }
            HardwareEvent::VolumeChanged {
                device,
                scope,
                volume,
            } => self.on_volume_changed(device, scope, volume),
        }
    }

    /// Apply every queued hardware event without blocking. Returns the number
    /// of events consumed.
    ///
    /// If events were dropped because the queue was full, the queued ones are
    /// discarded and the whole state is re-read with [`Self::resync`].
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        if self.queue.take_overflow() {
            while self.queue.try_next().is_some() {
                count += 1;
            }
            self.resync();
            return count;
        }

        while let Some(event) = self.queue.try_next() {
            self.handle_event(event);
            count += 1;
        }
        count
    }

    /// Re-read the device list, every device's current state, and the
    /// default roles from the hardware
    pub fn resync(&mut self) {
        log::info!("[Registry] Resynchronizing with {}", self.hardware.name());

        let present: HashSet<DeviceId> = match self.hardware.list_devices() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                log::warn!("[Registry] Resync enumeration failed: {}", e);
                return;
            }
        };

        let gone: Vec<DeviceId> = self
            .devices
            .keys()
            .copied()
            .filter(|id| !present.contains(id))
            .collect();
        self.on_devices_removed(&gone);

        let known: Vec<DeviceId> = self.devices.keys().copied().collect();
        for id in known {
            self.refresh_device(id);
        }

        let mut new: Vec<DeviceId> = present
            .into_iter()
            .filter(|id| !self.devices.contains_key(id))
            .collect();
        new.sort_unstable();
        self.on_devices_added(&new);

        self.rebuild_sorted();
        self.recompute_default_roles();
        self.changes.publish(RegistryChange::Resynced);
    }

    // === Write path ===

    /// Editable view of one device
    pub fn projection(&mut self, id: DeviceId) -> Option<DeviceProjection<'_>> {
        let device = self.devices.get_mut(&id)?;
        Some(DeviceProjection::new(
            device,
            self.hardware.as_ref(),
            self.config.volume_step,
            &mut self.changes,
        ))
    }

    /// Editable view of the default input (`Scope::Input`) or default output
    /// (`Scope::Output`) device
    pub fn default_projection(&mut self, scope: Scope) -> Option<DeviceProjection<'_>> {
        let id = self.default_device(scope.into())?.id;
        self.projection(id)
    }

    // === Queries ===

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Devices ordered by display name
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.sorted.iter().filter_map(|id| self.devices.get(id))
    }

    /// Ids ordered by display name
    pub fn ids(&self) -> &[DeviceId] {
        &self.sorted
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device currently holding `role`
    pub fn default_device(&self, role: DefaultRole) -> Option<&Device> {
        self.devices.values().find(|d| d.is_default(role))
    }

    /// Owned copy of every device, ordered by display name
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices().cloned().collect()
    }

    /// Incremented on every applied change; UI layers can poll this
    pub fn revision(&self) -> u64 {
        self.changes.revision
    }

    /// Receive every future [`RegistryChange`]. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_changes(&mut self) -> Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hardware_name(&self) -> &'static str {
        self.hardware.name()
    }

    /// Release every hardware listener. Also runs on drop; calling it twice
    /// is harmless.
    pub fn release_subscriptions(&mut self) {
        for (_, mut subs) in self.device_subscriptions.drain() {
            subs.release_all();
        }
        self.system_subscriptions.release_all();
    }

    // === Internals ===

    /// Build and insert a record. Returns false if the device is already
    /// known or its attributes could not be read.
    fn insert_device(&mut self, id: DeviceId) -> bool {
        if self.devices.contains_key(&id) {
            return false;
        }

        let attrs = match self.hardware.device_attributes(id) {
            Ok(attrs) => attrs,
            Err(e) if e.is_device_gone() => {
                log::debug!("[Registry] Device {} vanished before it could be read", id);
                return false;
            }
            Err(e) => {
                log::warn!("[Registry] Skipping device {}: {}", id, e);
                return false;
            }
        };

        match self.hardware.subscribe_device(id, self.sink.clone()) {
            Ok(subs) => {
                self.device_subscriptions.insert(id, subs);
            }
            Err(e) => log::warn!("[Registry] No change notifications for device {}: {}", id, e),
        }

        let device = Device::from_attributes(id, attrs);
        log::info!(
            "[Registry] Device added: {} (ID: {}, {}, {})",
            device.name,
            id,
            device.transport,
            device.channels_description()
        );
        self.devices.insert(id, device);
        true
    }

    /// Re-read a known device's current state. Mute state survives.
    fn refresh_device(&mut self, id: DeviceId) {
        let attrs = match self.hardware.device_attributes(id) {
            Ok(attrs) => attrs,
            Err(e) => {
                log::debug!("[Registry] Could not refresh device {}: {}", id, e);
                return;
            }
        };
        let Some(device) = self.devices.get_mut(&id) else {
            return;
        };

        let mut fresh = Device::from_attributes(id, attrs);
        fresh.roles = device.roles;
        fresh.input = device.input;
        fresh.output = device.output;
        if let Some(level) = self.hardware.volume(id, Scope::Input).ok().flatten() {
            fresh.input.sync(level);
        }
        if let Some(level) = self.hardware.volume(id, Scope::Output).ok().flatten() {
            fresh.output.sync(level);
        }

        // Always store the record so settled writes are forgotten
        let changed = *device != fresh;
        *device = fresh;
        if changed {
            self.changes.publish(RegistryChange::DeviceUpdated(id));
        }
    }

    fn rebuild_sorted(&mut self) {
        let mut sorted: Vec<&Device> = self.devices.values().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        self.sorted = sorted.into_iter().map(|d| d.id).collect();
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.release_subscriptions();
        log::debug!("[Registry] Released hardware listeners");
    }
}
