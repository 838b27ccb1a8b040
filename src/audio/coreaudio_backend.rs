//! CoreAudio HAL backend for macOS
//!
//! Uses coreaudio-sys for direct HAL access to:
//! - Enumerate audio devices and their attributes
//! - Read and write volume (kAudioDevicePropertyVolumeScalar)
//! - Change hardware sample rate (kAudioDevicePropertyNominalSampleRate)
//! - Select the clock source (kAudioDevicePropertyClockSource)
//! - Listen for device list, default device and per-device property changes
//!
//! This file is only compiled on macOS via #[cfg(target_os = "macos")]

use std::any::Any;
use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::Arc;

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::*;
use parking_lot::Mutex;

use crate::audio::backend::AudioHardware;
use crate::audio::error::{AudioBackendError, Result};
use crate::audio::notifications::{EventSink, HardwareEvent, Subscription, SubscriptionSet};
use crate::audio::types::*;

/// Contexts of removed listeners. The HAL may still be running a callback
/// on one when removal returns, so they are only freed with the backend.
type RetiredContexts = Arc<Mutex<Vec<Arc<dyn Any + Send + Sync>>>>;

/// CoreAudio HAL backend
///
/// Every call goes to the HAL; nothing is cached.
pub struct CoreAudioBackend {
    retired: RetiredContexts,
}

impl CoreAudioBackend {
    pub fn new() -> Self {
        log::info!("[CoreAudio] Backend initialized");
        Self {
            retired: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for CoreAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

// === Private HAL Functions ===

fn address(
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
    element: AudioObjectPropertyElement,
) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: element,
    }
}

fn global(selector: AudioObjectPropertySelector) -> AudioObjectPropertyAddress {
    address(
        selector,
        kAudioObjectPropertyScopeGlobal,
        kAudioObjectPropertyElementMain,
    )
}

fn hal_scope(scope: Scope) -> AudioObjectPropertyScope {
    match scope {
        Scope::Input => kAudioDevicePropertyScopeInput,
        Scope::Output => kAudioDevicePropertyScopeOutput,
    }
}

/// Map a HAL status to our error type. A bad object means the device is gone.
fn check(status: OSStatus, device: DeviceId, what: &str) -> Result<()> {
    if status == 0 {
        Ok(())
    } else if status == kAudioHardwareBadObjectError as OSStatus
        || status == kAudioHardwareBadDeviceError as OSStatus
    {
        Err(AudioBackendError::DeviceNotFound(device))
    } else {
        Err(AudioBackendError::SystemError {
            code: status,
            message: format!("{} failed on device {}", what, device),
        })
    }
}

fn has_property(object: AudioObjectID, address: &AudioObjectPropertyAddress) -> bool {
    unsafe { AudioObjectHasProperty(object, address) != 0 }
}

fn is_settable(object: AudioObjectID, address: &AudioObjectPropertyAddress) -> bool {
    let mut settable: Boolean = 0;
    let status = unsafe { AudioObjectIsPropertySettable(object, address, &mut settable) };
    status == 0 && settable != 0
}

/// Read a fixed-size property value
fn get_value<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> std::result::Result<T, OSStatus> {
    unsafe {
        let mut value: T = std::mem::zeroed();
        let mut size = std::mem::size_of::<T>() as u32;
        let status = AudioObjectGetPropertyData(
            object,
            address,
            0,
            std::ptr::null(),
            &mut size,
            &mut value as *mut T as *mut c_void,
        );
        if status != 0 {
            return Err(status);
        }
        Ok(value)
    }
}

/// Read a variable-length array property
fn get_array<T: Copy>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> std::result::Result<Vec<T>, OSStatus> {
    unsafe {
        let mut size: u32 = 0;
        let status =
            AudioObjectGetPropertyDataSize(object, address, 0, std::ptr::null(), &mut size);
        if status != 0 {
            return Err(status);
        }

        let count = size as usize / std::mem::size_of::<T>();
        let mut items: Vec<T> = Vec::with_capacity(count);
        let status = AudioObjectGetPropertyData(
            object,
            address,
            0,
            std::ptr::null(),
            &mut size,
            items.as_mut_ptr() as *mut c_void,
        );
        if status != 0 {
            return Err(status);
        }
        items.set_len(size as usize / std::mem::size_of::<T>());
        Ok(items)
    }
}

/// Read a CFString property. The HAL hands out a retained reference.
fn get_string(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> std::result::Result<String, OSStatus> {
    let cf_ref: CFStringRef = get_value(object, address)?;
    if cf_ref.is_null() {
        return Err(kAudioHardwareUnspecifiedError as OSStatus);
    }
    let cf_string = unsafe { CFString::wrap_under_create_rule(cf_ref) };
    Ok(cf_string.to_string())
}

fn set_value<T>(object: AudioObjectID, address: &AudioObjectPropertyAddress, value: &T) -> OSStatus {
    unsafe {
        AudioObjectSetPropertyData(
            object,
            address,
            0,
            std::ptr::null(),
            std::mem::size_of::<T>() as u32,
            value as *const T as *const c_void,
        )
    }
}

fn optional_string(device: AudioObjectID, selector: AudioObjectPropertySelector) -> Option<String> {
    get_string(device, &global(selector))
        .ok()
        .filter(|s| !s.is_empty())
}

fn all_device_ids() -> std::result::Result<Vec<AudioObjectID>, OSStatus> {
    get_array(
        kAudioObjectSystemObject,
        &global(kAudioHardwarePropertyDevices),
    )
}

fn default_selector(role: DefaultRole) -> AudioObjectPropertySelector {
    match role {
        DefaultRole::Input => kAudioHardwarePropertyDefaultInputDevice,
        DefaultRole::Output => kAudioHardwarePropertyDefaultOutputDevice,
        DefaultRole::SystemOutput => kAudioHardwarePropertyDefaultSystemOutputDevice,
    }
}

fn read_default(role: DefaultRole) -> std::result::Result<Option<DeviceId>, OSStatus> {
    let id: AudioObjectID = get_value(
        kAudioObjectSystemObject,
        &global(default_selector(role)),
    )?;
    Ok((id != kAudioObjectUnknown).then_some(DeviceId(id)))
}

#[allow(non_upper_case_globals)]
fn transport_kind(raw: u32) -> TransportKind {
    match raw {
        kAudioDeviceTransportTypeBuiltIn => TransportKind::BuiltIn,
        kAudioDeviceTransportTypeUSB => TransportKind::Usb,
        kAudioDeviceTransportTypeBluetooth | kAudioDeviceTransportTypeBluetoothLE => {
            TransportKind::Bluetooth
        }
        kAudioDeviceTransportTypeUnknown => TransportKind::Unknown,
        _ => TransportKind::Other,
    }
}

/// Sum channels across all streams of one direction
fn channel_count(device: AudioObjectID, scope: Scope) -> u32 {
    let address = address(
        kAudioDevicePropertyStreamConfiguration,
        hal_scope(scope),
        kAudioObjectPropertyElementMain,
    );
    unsafe {
        let mut size: u32 = 0;
        let status =
            AudioObjectGetPropertyDataSize(device, &address, 0, std::ptr::null(), &mut size);
        if status != 0 || size == 0 {
            return 0;
        }

        // Allocate buffer for AudioBufferList
        let mut buffer = vec![0u8; size as usize];
        let buffer_list = buffer.as_mut_ptr() as *mut AudioBufferList;
        let status = AudioObjectGetPropertyData(
            device,
            &address,
            0,
            std::ptr::null(),
            &mut size,
            buffer_list as *mut c_void,
        );
        if status != 0 {
            return 0;
        }

        let num_buffers = (*buffer_list).mNumberBuffers as usize;
        let buffers = std::slice::from_raw_parts((*buffer_list).mBuffers.as_ptr(), num_buffers);
        buffers.iter().map(|b| b.mNumberChannels).sum()
    }
}

/// Standard rates covered by any of the reported ranges
fn rates_in_ranges(ranges: &[(f64, f64)]) -> Vec<u32> {
    SampleRate::STANDARD_RATES
        .iter()
        .copied()
        .filter(|&rate| {
            let rate = rate as f64;
            ranges.iter().any(|&(min, max)| rate >= min && rate <= max)
        })
        .collect()
}

fn supported_sample_rates(device: AudioObjectID) -> Vec<u32> {
    let address = global(kAudioDevicePropertyAvailableNominalSampleRates);
    match get_array::<AudioValueRange>(device, &address) {
        Ok(ranges) => {
            let ranges: Vec<(f64, f64)> =
                ranges.iter().map(|r| (r.mMinimum, r.mMaximum)).collect();
            rates_in_ranges(&ranges)
        }
        Err(_) => Vec::new(),
    }
}

fn nominal_sample_rate(device: AudioObjectID) -> std::result::Result<u32, OSStatus> {
    let rate: f64 = get_value(device, &global(kAudioDevicePropertyNominalSampleRate))?;
    Ok(rate.round() as u32)
}

fn current_clock_source(device: AudioObjectID) -> Option<u32> {
    let address = global(kAudioDevicePropertyClockSource);
    if !has_property(device, &address) {
        return None;
    }
    get_value(device, &address).ok()
}

fn clock_source_label(device: AudioObjectID, source_id: u32) -> Option<String> {
    let mut source_id = source_id;
    let mut cf_ref: CFStringRef = std::ptr::null();
    let mut translation = AudioValueTranslation {
        mInputData: &mut source_id as *mut u32 as *mut c_void,
        mInputDataSize: std::mem::size_of::<u32>() as u32,
        mOutputData: &mut cf_ref as *mut CFStringRef as *mut c_void,
        mOutputDataSize: std::mem::size_of::<CFStringRef>() as u32,
    };
    let address = global(kAudioDevicePropertyClockSourceNameForIDCFString);
    let mut size = std::mem::size_of::<AudioValueTranslation>() as u32;

    let status = unsafe {
        AudioObjectGetPropertyData(
            device,
            &address,
            0,
            std::ptr::null(),
            &mut size,
            &mut translation as *mut AudioValueTranslation as *mut c_void,
        )
    };
    if status != 0 || cf_ref.is_null() {
        return None;
    }
    let name = unsafe { CFString::wrap_under_create_rule(cf_ref) }.to_string();
    (!name.is_empty()).then_some(name)
}

fn clock_sources(device: AudioObjectID) -> Vec<ClockSource> {
    let address = global(kAudioDevicePropertyClockSources);
    if !has_property(device, &address) {
        return Vec::new();
    }
    get_array::<u32>(device, &address)
        .unwrap_or_default()
        .into_iter()
        .map(|id| ClockSource {
            id,
            name: clock_source_label(device, id)
                .unwrap_or_else(|| DEFAULT_CLOCK_SOURCE_LABEL.to_string()),
        })
        .collect()
}

/// Elements carrying the volume control of one direction: the main element
/// when the device has one, otherwise every channel element.
fn volume_elements(device: AudioObjectID, scope: Scope) -> Vec<AudioObjectPropertyElement> {
    let main = address(
        kAudioDevicePropertyVolumeScalar,
        hal_scope(scope),
        kAudioObjectPropertyElementMain,
    );
    if has_property(device, &main) {
        return vec![kAudioObjectPropertyElementMain];
    }
    (1..=channel_count(device, scope))
        .filter(|&element| {
            has_property(
                device,
                &address(kAudioDevicePropertyVolumeScalar, hal_scope(scope), element),
            )
        })
        .collect()
}

fn read_volume(device: AudioObjectID, scope: Scope) -> std::result::Result<Option<f32>, OSStatus> {
    let elements = volume_elements(device, scope);
    if elements.is_empty() {
        return Ok(None);
    }

    let mut total = 0.0f32;
    for &element in &elements {
        let value: f32 = get_value(
            device,
            &address(kAudioDevicePropertyVolumeScalar, hal_scope(scope), element),
        )?;
        total += value;
    }
    Ok(Some(clamp_volume(total / elements.len() as f32)))
}

// === Listeners ===

/// Context for system-object listeners
struct SystemContext {
    sink: EventSink,
    known: Mutex<HashSet<AudioObjectID>>,
}

/// Context for one device's property listeners
struct DeviceContext {
    device: AudioObjectID,
    sink: EventSink,
}

fn diff_devices(
    known: &HashSet<AudioObjectID>,
    current: &HashSet<AudioObjectID>,
) -> (Vec<DeviceId>, Vec<DeviceId>) {
    let mut added: Vec<DeviceId> = current.difference(known).map(|&id| DeviceId(id)).collect();
    let mut removed: Vec<DeviceId> = known.difference(current).map(|&id| DeviceId(id)).collect();
    added.sort();
    removed.sort();
    (added, removed)
}

#[allow(non_upper_case_globals)]
unsafe extern "C" fn system_listener(
    _object: AudioObjectID,
    count: u32,
    addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    if addresses.is_null() || client_data.is_null() {
        return 0;
    }
    let context = &*(client_data as *const SystemContext);
    let addresses = std::slice::from_raw_parts(addresses, count as usize);

    for address in addresses {
        match address.mSelector {
            kAudioHardwarePropertyDevices => {
                let Ok(ids) = all_device_ids() else { continue };
                let current: HashSet<AudioObjectID> = ids.into_iter().collect();
                let (added, removed) = {
                    let mut known = context.known.lock();
                    let diff = diff_devices(&known, &current);
                    *known = current;
                    diff
                };
                if !added.is_empty() || !removed.is_empty() {
                    context
                        .sink
                        .send(HardwareEvent::DeviceListChanged { added, removed });
                }
            }
            selector => {
                let Some(role) = DefaultRole::ALL
                    .iter()
                    .copied()
                    .find(|&role| default_selector(role) == selector)
                else {
                    continue;
                };
                if let Ok(device) = read_default(role) {
                    context
                        .sink
                        .send(HardwareEvent::DefaultDeviceChanged { role, device });
                }
            }
        }
    }
    0
}

#[allow(non_upper_case_globals)]
unsafe extern "C" fn device_listener(
    _object: AudioObjectID,
    count: u32,
    addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    if addresses.is_null() || client_data.is_null() {
        return 0;
    }
    let context = &*(client_data as *const DeviceContext);
    let device = DeviceId(context.device);
    let addresses = std::slice::from_raw_parts(addresses, count as usize);

    for address in addresses {
        let event = match address.mSelector {
            kAudioDevicePropertyNominalSampleRate => nominal_sample_rate(context.device)
                .ok()
                .map(|rate| HardwareEvent::SampleRateChanged { device, rate }),
            kAudioDevicePropertyClockSource => current_clock_source(context.device)
                .map(|source_id| HardwareEvent::ClockSourceChanged { device, source_id }),
            kAudioDevicePropertyVolumeScalar => {
                let scope = if address.mScope == kAudioDevicePropertyScopeInput {
                    Scope::Input
                } else {
                    Scope::Output
                };
                read_volume(context.device, scope)
                    .ok()
                    .flatten()
                    .map(|volume| HardwareEvent::VolumeChanged {
                        device,
                        scope,
                        volume,
                    })
            }
            _ => None,
        };
        if let Some(event) = event {
            context.sink.send(event);
        }
    }
    0
}

type ListenerProc = unsafe extern "C" fn(
    AudioObjectID,
    u32,
    *const AudioObjectPropertyAddress,
    *mut c_void,
) -> OSStatus;

/// Register `listener` on one address. Releasing the subscription removes
/// the listener and hands the context to `retired`.
fn add_listener<C: Send + Sync + 'static>(
    object: AudioObjectID,
    address: AudioObjectPropertyAddress,
    listener: ListenerProc,
    context: &Arc<C>,
    retired: &RetiredContexts,
    label: String,
) -> Result<Subscription> {
    let client_data = Arc::as_ptr(context) as *mut c_void;
    let status =
        unsafe { AudioObjectAddPropertyListener(object, &address, Some(listener), client_data) };
    if status != 0 {
        return Err(AudioBackendError::SubscriptionFailed(format!(
            "{}: CoreAudio error {}",
            label, status
        )));
    }

    let context = Arc::clone(context);
    let retired = Arc::clone(retired);
    Ok(Subscription::new(label.clone(), move || {
        let client_data = Arc::as_ptr(&context) as *mut c_void;
        let status = unsafe {
            AudioObjectRemovePropertyListener(object, &address, Some(listener), client_data)
        };
        if status != 0 {
            log::warn!("[CoreAudio] Failed to remove listener {}: {}", label, status);
        }

        // Several listeners share one context
        let mut retired = retired.lock();
        let ptr = Arc::as_ptr(&context) as *const ();
        if !retired.iter().any(|c| Arc::as_ptr(c) as *const () == ptr) {
            retired.push(context);
        }
    }))
}

impl AudioHardware for CoreAudioBackend {
    fn list_devices(&self) -> Result<Vec<DeviceId>> {
        let ids = all_device_ids().map_err(|status| {
            AudioBackendError::DeviceEnumerationFailed(format!(
                "Failed to get device list: {}",
                status
            ))
        })?;
        Ok(ids.into_iter().map(DeviceId).collect())
    }

    fn device_attributes(&self, device: DeviceId) -> Result<DeviceAttributes> {
        let id = device.0;
        // The name doubles as the presence check
        let name = match get_string(id, &global(kAudioObjectPropertyName)) {
            Ok(name) if !name.is_empty() => name,
            Err(status) if check(status, device, "Reading name").is_err_and(|e| e.is_device_gone()) => {
                return Err(AudioBackendError::DeviceNotFound(device));
            }
            _ => UNKNOWN_LABEL.to_string(),
        };

        let clock_source_id = current_clock_source(id);
        let clock_sources = clock_sources(id);
        let clock_source_name = clock_source_id.and_then(|sid| clock_source_label(id, sid));

        let attrs = DeviceAttributes {
            name,
            manufacturer: optional_string(id, kAudioObjectPropertyManufacturer),
            uid: optional_string(id, kAudioDevicePropertyDeviceUID),
            model_uid: optional_string(id, kAudioDevicePropertyModelUID),
            transport: get_value::<u32>(id, &global(kAudioDevicePropertyTransportType))
                .map(transport_kind)
                .unwrap_or_default(),
            channels: ChannelCounts {
                input: channel_count(id, Scope::Input),
                output: channel_count(id, Scope::Output),
            },
            supported_sample_rates: supported_sample_rates(id),
            clock_sources,
            sample_rate: nominal_sample_rate(id).ok().filter(|&rate| rate > 0),
            clock_source_id,
            clock_source_name,
            input_volume: read_volume(id, Scope::Input).ok().flatten(),
            output_volume: read_volume(id, Scope::Output).ok().flatten(),
        };

        log::debug!(
            "[CoreAudio] Device {}: {} ({}, {:?})",
            device,
            attrs.name,
            attrs.transport,
            attrs.supported_sample_rates
        );
        Ok(attrs)
    }

    fn default_device(&self, role: DefaultRole) -> Result<Option<DeviceId>> {
        read_default(role).map_err(|status| AudioBackendError::SystemError {
            code: status,
            message: format!("Failed to read default {:?} device", role),
        })
    }

    fn volume(&self, device: DeviceId, scope: Scope) -> Result<Option<f32>> {
        read_volume(device.0, scope)
            .or_else(|status| check(status, device, "Reading volume").map(|_| None))
    }

    fn clock_source_name(&self, device: DeviceId, source_id: u32) -> Result<Option<String>> {
        Ok(clock_source_label(device.0, source_id))
    }

    fn set_volume(&self, device: DeviceId, scope: Scope, volume: f32) -> Result<()> {
        let elements = volume_elements(device.0, scope);
        if elements.is_empty() {
            return Err(AudioBackendError::NotSupported(format!(
                "Device {} has no {:?} volume control",
                device, scope
            )));
        }

        let value: f32 = clamp_volume(volume);
        for element in elements {
            let address = address(kAudioDevicePropertyVolumeScalar, hal_scope(scope), element);
            if !is_settable(device.0, &address) {
                continue;
            }
            check(set_value(device.0, &address, &value), device, "Setting volume")?;
        }
        Ok(())
    }

    fn set_sample_rate(&self, device: DeviceId, rate: u32) -> Result<()> {
        log::info!("[CoreAudio] Setting device {} sample rate to {} Hz", device, rate);
        let sample_rate: f64 = rate as f64;
        let status = set_value(
            device.0,
            &global(kAudioDevicePropertyNominalSampleRate),
            &sample_rate,
        );
        check(status, device, "Setting sample rate")
    }

    fn set_clock_source(&self, device: DeviceId, source_id: u32) -> Result<()> {
        log::info!("[CoreAudio] Setting device {} clock source to {}", device, source_id);
        let status = set_value(device.0, &global(kAudioDevicePropertyClockSource), &source_id);
        check(status, device, "Setting clock source")
    }

    fn subscribe_system(&self, sink: EventSink) -> Result<SubscriptionSet> {
        let known: HashSet<AudioObjectID> = all_device_ids()
            .unwrap_or_default()
            .into_iter()
            .collect();
        let context = Arc::new(SystemContext {
            sink,
            known: Mutex::new(known),
        });

        let mut selectors = vec![kAudioHardwarePropertyDevices];
        selectors.extend(DefaultRole::ALL.iter().map(|&role| default_selector(role)));

        let mut set = SubscriptionSet::new();
        for selector in selectors {
            // On failure `set` drops and removes what was already registered
            set.push(add_listener(
                kAudioObjectSystemObject,
                global(selector),
                system_listener,
                &context,
                &self.retired,
                format!("system:{}", selector),
            )?);
        }
        Ok(set)
    }

    fn subscribe_device(&self, device: DeviceId, sink: EventSink) -> Result<SubscriptionSet> {
        let context = Arc::new(DeviceContext {
            device: device.0,
            sink,
        });

        let mut addresses = vec![
            global(kAudioDevicePropertyNominalSampleRate),
            global(kAudioDevicePropertyClockSource),
        ];
        for scope in [Scope::Input, Scope::Output] {
            for element in volume_elements(device.0, scope) {
                addresses.push(address(
                    kAudioDevicePropertyVolumeScalar,
                    hal_scope(scope),
                    element,
                ));
            }
        }

        let mut set = SubscriptionSet::new();
        for address in addresses {
            if !has_property(device.0, &address) {
                continue;
            }
            let label = format!("device:{}:{}:{}", device, address.mSelector, address.mScope);
            match add_listener(device.0, address, device_listener, &context, &self.retired, label) {
                Ok(subscription) => set.push(subscription),
                Err(e) if !has_property(device.0, &global(kAudioObjectPropertyName)) => {
                    log::debug!("[CoreAudio] Device {} vanished while subscribing: {}", device, e);
                    return Err(AudioBackendError::DeviceNotFound(device));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }

    fn name(&self) -> &'static str {
        "CoreAudio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_in_ranges() {
        let ranges = [(44100.0, 48000.0), (96000.0, 96000.0)];
        assert_eq!(rates_in_ranges(&ranges), vec![44100, 48000, 96000]);
        assert!(rates_in_ranges(&[]).is_empty());
    }

    #[test]
    fn test_diff_devices() {
        let known: HashSet<AudioObjectID> = [1, 2, 3].into_iter().collect();
        let current: HashSet<AudioObjectID> = [2, 3, 4, 5].into_iter().collect();
        let (added, removed) = diff_devices(&known, &current);
        assert_eq!(added, vec![DeviceId(4), DeviceId(5)]);
        assert_eq!(removed, vec![DeviceId(1)]);
    }

    #[test]
    fn test_transport_kind() {
        assert_eq!(transport_kind(kAudioDeviceTransportTypeUSB), TransportKind::Usb);
        assert_eq!(
            transport_kind(kAudioDeviceTransportTypeBluetoothLE),
            TransportKind::Bluetooth
        );
        assert_eq!(transport_kind(0x7a7a7a7a), TransportKind::Other);
    }

    #[test]
    fn test_bad_object_maps_to_device_gone() {
        let err = check(kAudioHardwareBadObjectError as OSStatus, DeviceId(7), "Reading")
            .unwrap_err();
        assert!(err.is_device_gone());
    }

    #[test]
    fn test_device_enumeration() {
        let backend = CoreAudioBackend::new();
        let devices = backend.list_devices().unwrap();

        for device in &devices {
            let attrs = backend.device_attributes(*device).unwrap();
            println!(
                "Device: {} (ID: {}, Transport: {}, Rates: {:?})",
                attrs.name, device, attrs.transport, attrs.supported_sample_rates
            );
        }
    }

    #[test]
    fn test_system_subscription_releases() {
        let backend = CoreAudioBackend::new();
        let (sink, _queue) = crate::audio::notifications::event_queue(16);
        let mut set = backend.subscribe_system(sink).unwrap();
        assert_eq!(set.len(), 4);
        assert!(backend.retired.lock().is_empty());

        set.release_all();
        assert!(set.is_empty());
        assert_eq!(backend.retired.lock().len(), 1);
    }
}
