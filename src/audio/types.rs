//! Shared audio types used by all backends
//!
//! This module contains platform-agnostic types for audio device management.
//! NO platform-specific imports allowed here.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Fallback for descriptive attributes the hardware declines to supply
pub const UNKNOWN_LABEL: &str = "Unknown";
/// Fallback for an unresolvable clock source name
pub const DEFAULT_CLOCK_SOURCE_LABEL: &str = "Default";

/// Opaque hardware device identifier (an `AudioObjectID` on macOS)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a volume operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Input,
    Output,
}

/// One of the three system-wide default device assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefaultRole {
    Input,
    Output,
    /// Device used for alerts and sound effects
    SystemOutput,
}

impl DefaultRole {
    pub const ALL: [DefaultRole; 3] = [Self::Input, Self::Output, Self::SystemOutput];

    /// The role flag this role maps to
    pub fn flag(self) -> DefaultRoles {
        match self {
            Self::Input => DefaultRoles::INPUT,
            Self::Output => DefaultRoles::OUTPUT,
            Self::SystemOutput => DefaultRoles::SYSTEM_OUTPUT,
        }
    }
}

impl From<Scope> for DefaultRole {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Input => Self::Input,
            Scope::Output => Self::Output,
        }
    }
}

bitflags! {
    /// Default-role flags held by a device. Each flag has at most one holder
    /// across the registry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DefaultRoles: u8 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
        const SYSTEM_OUTPUT = 1 << 2;
    }
}

/// Physical/logical connection category of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportKind {
    BuiltIn,
    Usb,
    Bluetooth,
    #[default]
    Unknown,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BuiltIn => "Built-In",
            Self::Usb => "USB",
            Self::Bluetooth => "Bluetooth",
            Self::Unknown => UNKNOWN_LABEL,
            Self::Other => "Other",
        };
        f.write_str(label)
    }
}

/// Channel counts per direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub input: u32,
    pub output: u32,
}

/// A selectable clock source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSource {
    pub id: u32,
    pub name: String,
}

/// Standard audiophile sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRate(pub u32);

impl SampleRate {
    pub const CD_QUALITY: Self = Self(44100);

    /// Rates probed against a device's reported ranges
    pub const STANDARD_RATES: [u32; 14] = [
        8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000,
        352800, 384000, 768000,
    ];

    /// Label in kilohertz with one decimal, e.g. "44.1 kHz"
    pub fn khz_label(self) -> String {
        format!("{:.1} kHz", self.0 as f64 / 1000.0)
    }
}

/// Everything the hardware reports about a device.
///
/// `None` means the hardware declined to supply the attribute; the registry
/// resolves these to fallback labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceAttributes {
    pub name: String,
    pub manufacturer: Option<String>,
    pub uid: Option<String>,
    pub model_uid: Option<String>,
    pub transport: TransportKind,
    pub channels: ChannelCounts,
    pub supported_sample_rates: Vec<u32>,
    pub clock_sources: Vec<ClockSource>,
    pub sample_rate: Option<u32>,
    pub clock_source_id: Option<u32>,
    pub clock_source_name: Option<String>,
    pub input_volume: Option<f32>,
    pub output_volume: Option<f32>,
}

/// Own volume writes not yet confirmed by a hardware notification
const MAX_PENDING_WRITES: usize = 4;
/// Largest difference between a written and a reported level that still
/// counts as the echo of that write
const ECHO_TOLERANCE: f32 = 1e-3;

/// Levels written to the hardware whose notifications have not arrived yet,
/// oldest first. When full, the oldest entry is forgotten.
#[derive(Debug, Clone, Copy, Default)]
struct PendingWrites {
    values: [f32; MAX_PENDING_WRITES],
    len: usize,
}

impl PendingWrites {
    fn push(&mut self, value: f32) {
        if self.len == MAX_PENDING_WRITES {
            self.values.copy_within(1.., 0);
            self.len -= 1;
        }
        self.values[self.len] = value;
        self.len += 1;
    }

    /// Settle the oldest write matching `reported`, together with every
    /// write before it. Returns false when nothing matches.
    fn settle(&mut self, reported: f32) -> bool {
        let Some(pos) = self.values[..self.len]
            .iter()
            .position(|&written| (written - reported).abs() <= ECHO_TOLERANCE)
        else {
            return false;
        };
        self.values.copy_within(pos + 1..self.len, 0);
        self.len -= pos + 1;
        true
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Volume state of one direction of a device
///
/// While muted the hardware sits at 0.0 and `level` keeps the pre-mute
/// level that unmuting restores.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VolumeState {
    /// Hardware level at last sync or last write; the pre-mute level while muted
    pub level: f32,
    /// Transient UI mute; never written to the device as a mute property
    pub muted: bool,
    #[serde(skip)]
    pending: PendingWrites,
}

impl PartialEq for VolumeState {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.muted == other.muted
    }
}

impl VolumeState {
    pub fn new(level: f32) -> Self {
        Self {
            level: clamp_volume(level),
            muted: false,
            pending: PendingWrites::default(),
        }
    }

    /// Note a level just written to the hardware, so its notification is
    /// taken as a confirmation rather than an outside change
    pub fn record_write(&mut self, written: f32) {
        self.pending.push(clamp_volume(written));
    }

    /// Number of own writes still waiting for their notification
    pub fn pending_writes(&self) -> usize {
        self.pending.len
    }

    /// Apply a hardware-reported level.
    ///
    /// A report matching one of our outstanding writes only confirms it.
    /// Any other report is an outside change: it replaces the level, and ends
    /// the mute unless it is zero.
    pub fn sync(&mut self, reported: f32) {
        let reported = clamp_volume(reported);
        if self.pending.settle(reported) {
            return;
        }
        self.pending.clear();
        if self.muted {
            if reported > 0.0 {
                self.muted = false;
                self.level = reported;
            }
        } else {
            self.level = reported;
        }
    }

    /// Level currently audible on the hardware
    pub fn effective(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.level
        }
    }

    /// Percent label of the effective level, e.g. "50%"
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.effective() * 100.0)
    }
}

/// Clamp to [0.0, 1.0]; NaN maps to 0.0
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Registry record for one audio device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub manufacturer: String,
    pub uid: String,
    pub model_uid: String,
    pub transport: TransportKind,
    pub channels: ChannelCounts,
    /// Ascending, deduplicated, in Hz
    pub supported_sample_rates: Vec<u32>,
    pub clock_sources: Vec<ClockSource>,
    /// Current nominal rate in Hz (0 when the hardware did not report one)
    pub sample_rate: u32,
    pub clock_source_id: Option<u32>,
    pub clock_source_name: String,
    pub input: VolumeState,
    pub output: VolumeState,
    pub roles: DefaultRoles,
}

impl Device {
    /// Build a record from hardware attributes, applying fallback labels.
    /// Role flags start cleared.
    pub fn from_attributes(id: DeviceId, attrs: DeviceAttributes) -> Self {
        let mut supported_sample_rates = attrs.supported_sample_rates;
        supported_sample_rates.sort_unstable();
        supported_sample_rates.dedup();

        let clock_source_name = attrs
            .clock_source_name
            .or_else(|| {
                attrs.clock_source_id.and_then(|sid| {
                    attrs
                        .clock_sources
                        .iter()
                        .find(|c| c.id == sid)
                        .map(|c| c.name.clone())
                })
            })
            .unwrap_or_else(|| DEFAULT_CLOCK_SOURCE_LABEL.to_string());

        Self {
            id,
            name: attrs.name,
            manufacturer: attrs.manufacturer.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            uid: attrs.uid.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            model_uid: attrs.model_uid.unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            transport: attrs.transport,
            channels: attrs.channels,
            supported_sample_rates,
            clock_sources: attrs.clock_sources,
            sample_rate: attrs.sample_rate.unwrap_or(0),
            clock_source_id: attrs.clock_source_id,
            clock_source_name,
            input: VolumeState::new(attrs.input_volume.unwrap_or(0.0)),
            output: VolumeState::new(attrs.output_volume.unwrap_or(0.0)),
            roles: DefaultRoles::empty(),
        }
    }

    pub fn is_default(&self, role: DefaultRole) -> bool {
        self.roles.contains(role.flag())
    }

    /// Holds at least one default role
    pub fn is_default_device(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn is_input_only(&self) -> bool {
        self.channels.input > 0 && self.channels.output == 0
    }

    pub fn is_output_only(&self) -> bool {
        self.channels.output > 0 && self.channels.input == 0
    }

    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.supported_sample_rates.contains(&rate)
    }

    pub fn supports_clock_source(&self, source_id: u32) -> bool {
        self.clock_sources.iter().any(|c| c.id == source_id)
    }

    /// Name of a clock source offered by this device
    pub fn clock_source_label(&self, source_id: u32) -> &str {
        self.clock_sources
            .iter()
            .find(|c| c.id == source_id)
            .map(|c| c.name.as_str())
            .unwrap_or(DEFAULT_CLOCK_SOURCE_LABEL)
    }

    /// Current rate as "48.0 kHz", or "Unknown" when not reported
    pub fn sample_rate_label(&self) -> String {
        if self.sample_rate == 0 {
            UNKNOWN_LABEL.to_string()
        } else {
            SampleRate(self.sample_rate).khz_label()
        }
    }

    /// e.g. "2 ins / 1 out"
    pub fn channels_description(&self) -> String {
        let plural = |n: u32| if n != 1 { "s" } else { "" };
        format!(
            "{} in{} / {} out{}",
            self.channels.input,
            plural(self.channels.input),
            self.channels.output,
            plural(self.channels.output)
        )
    }

    pub fn volume(&self, scope: Scope) -> &VolumeState {
        match scope {
            Scope::Input => &self.input,
            Scope::Output => &self.output,
        }
    }

    pub fn volume_mut(&mut self, scope: Scope) -> &mut VolumeState {
        match scope {
            Scope::Input => &mut self.input,
            Scope::Output => &mut self.output,
        }
    }
}
