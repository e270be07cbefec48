//! Audio endpoint data models.
//!
//! Defines the core data structures for representing audio endpoints,
//! their cached state, audio format, backend notifications and errors.

use thiserror::Error;

/// Cached snapshot of one active audio endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Opaque endpoint ID reported by the backend. Compared by string equality only.
    pub id: String,

    /// Human-readable device name (informational)
    pub name: String,

    /// Whether the endpoint renders or captures audio. Fixed for the record's lifetime.
    pub direction: Direction,

    /// Whether this is the OS default endpoint for its direction and the tracked role
    pub is_default: bool,

    /// Cached master volume, rounded to a whole percent (0 to 100)
    pub volume_percent: u8,

    /// Cached mute state
    pub is_muted: bool,

    /// Number of channels in the mix format (0 if unknown)
    pub channels: u16,

    /// Bits per sample in the mix format (0 if unknown)
    pub bit_depth: u16,

    /// Sample rate of the mix format in Hz (0 if unknown)
    pub sample_rate_hz: u32,
}

impl DeviceRecord {
    /// Build a record from the backend's description of an endpoint and its volume.
    pub fn from_parts(info: EndpointInfo, volume: VolumeState, is_default: bool) -> Self {
        let format = info.format.unwrap_or_default();
        Self {
            id: info.id,
            name: info.name,
            direction: info.direction,
            is_default,
            volume_percent: volume.rounded_percent(),
            is_muted: volume.muted,
            channels: format.channels,
            bit_depth: format.bit_depth,
            sample_rate_hz: format.sample_rate,
        }
    }

    /// Mix format, if the backend reported one at discovery.
    pub fn format(&self) -> Option<AudioFormat> {
        if self.sample_rate_hz == 0 && self.channels == 0 {
            None
        } else {
            Some(AudioFormat {
                sample_rate: self.sample_rate_hz,
                bit_depth: self.bit_depth,
                channels: self.channels,
            })
        }
    }

    /// Apply a volume notification. Returns true if the rounded percent or
    /// the mute state actually changed.
    pub fn apply_volume(&mut self, volume: VolumeState) -> bool {
        let percent = volume.rounded_percent();
        if percent == self.volume_percent && volume.muted == self.is_muted {
            return false;
        }
        self.volume_percent = percent;
        self.is_muted = volume.muted;
        true
    }
}

/// Audio format (sample rate, bit depth, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Bits per sample (e.g., 16, 24, 32)
    pub bit_depth: u16,

    /// Number of audio channels
    pub channels: u16,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rate_khz = self.sample_rate as f64 / 1000.0;
        if rate_khz.fract() == 0.0 {
            write!(
                f,
                "{}kHz/{}-bit/{}ch",
                rate_khz as u32, self.bit_depth, self.channels
            )
        } else {
            write!(
                f,
                "{:.1}kHz/{}-bit/{}ch",
                rate_khz, self.bit_depth, self.channels
            )
        }
    }
}

/// Volume and mute as read from (or reported by) the hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeState {
    /// Master volume in percent, unrounded (0.0 to 100.0)
    pub percent: f32,

    /// Mute state
    pub muted: bool,
}

impl VolumeState {
    pub fn new(percent: f32, muted: bool) -> Self {
        Self { percent, muted }
    }

    /// Volume as a whole percent, clamped to 0-100.
    pub fn rounded_percent(&self) -> u8 {
        if self.percent.is_nan() {
            return 0;
        }
        self.percent.clamp(0.0, 100.0).round() as u8
    }
}

/// Backend description of an endpoint, read once at discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointInfo {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub state: DeviceState,
    pub format: Option<AudioFormat>,
}

/// Data flow direction of an endpoint (maps to Windows EDataFlow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Playback endpoint
    Render,

    /// Recording endpoint
    Capture,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Render, Direction::Capture];
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Render => f.write_str("Render"),
            Direction::Capture => f.write_str("Capture"),
        }
    }
}

/// Audio device role (maps to Windows ERole enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    Console = 0,

    /// Used by music players, video players
    Multimedia = 1,

    /// Used by Teams, Zoom, Discord, and other VoIP applications
    Communications = 2,
}

impl std::str::FromStr for DeviceRole {
    type Err = AudioError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(DeviceRole::Console),
            "multimedia" => Ok(DeviceRole::Multimedia),
            "communications" => Ok(DeviceRole::Communications),
            other => Err(AudioError::InvalidArgument(format!(
                "unknown device role '{other}'"
            ))),
        }
    }
}

/// Endpoint state flags reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in Sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

impl DeviceState {
    pub fn is_active(&self) -> bool {
        matches!(self, DeviceState::Active)
    }
}

/// Notifications delivered by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A new audio endpoint was connected
    DeviceAdded { device_id: String },

    /// An audio endpoint was disconnected
    DeviceRemoved { device_id: String },

    /// Endpoint state changed (active, disabled, not present, unplugged)
    DeviceStateChanged {
        device_id: String,
        new_state: DeviceState,
    },

    /// Default endpoint changed for a direction and role
    DefaultDeviceChanged {
        direction: Direction,
        role: DeviceRole,
        device_id: Option<String>, // None if no default device
    },

    /// An endpoint property changed. Accepted and ignored.
    PropertyValueChanged { device_id: String },

    /// Volume or mute state changed on an endpoint
    VolumeChanged {
        device_id: String,
        volume: VolumeState,
    },
}

/// Audio service error types.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No default {direction} device available")]
    NoDefaultDevice { direction: Direction },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Volume subscription already attached for device: {device_id}")]
    AlreadyAttached { device_id: String },

    #[error("Endpoint manager has been shut down")]
    ShutDown,

    #[error("String conversion error: {0}")]
    StringConversion(String),
}

impl AudioError {
    /// Wrap any backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        AudioError::BackendUnavailable(err.to_string())
    }

    /// True for failures that originate in the backend rather than in the caller's input.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            AudioError::BackendUnavailable(_)
                | AudioError::NoDefaultDevice { .. }
                | AudioError::StringConversion(_)
        )
    }
}

/// Result type alias for endpoint operations.
pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> EndpointInfo {
        EndpointInfo {
            id: id.to_string(),
            name: "Speakers".to_string(),
            direction: Direction::Render,
            state: DeviceState::Active,
            format: Some(AudioFormat {
                sample_rate: 48000,
                bit_depth: 24,
                channels: 2,
            }),
        }
    }

    #[test]
    fn test_rounded_percent() {
        assert_eq!(VolumeState::new(49.6, false).rounded_percent(), 50);
        assert_eq!(VolumeState::new(49.4, false).rounded_percent(), 49);
        assert_eq!(VolumeState::new(120.0, false).rounded_percent(), 100);
        assert_eq!(VolumeState::new(-3.0, false).rounded_percent(), 0);
        assert_eq!(VolumeState::new(f32::NAN, false).rounded_percent(), 0);
    }

    #[test]
    fn test_record_from_parts() {
        let record = DeviceRecord::from_parts(info("a"), VolumeState::new(33.3, true), true);
        assert_eq!(record.volume_percent, 33);
        assert!(record.is_muted);
        assert!(record.is_default);
        assert_eq!(record.sample_rate_hz, 48000);
        assert_eq!(record.format().map(|f| f.to_string()).as_deref(), Some("48kHz/24-bit/2ch"));
    }

    #[test]
    fn test_record_without_format() {
        let mut endpoint = info("a");
        endpoint.format = None;
        let record = DeviceRecord::from_parts(endpoint, VolumeState::new(0.0, false), false);
        assert_eq!(record.format(), None);
    }

    #[test]
    fn test_apply_volume_ignores_sub_percent_ticks() {
        let mut record = DeviceRecord::from_parts(info("a"), VolumeState::new(50.0, false), false);
        assert!(!record.apply_volume(VolumeState::new(50.2, false)));
        assert!(record.apply_volume(VolumeState::new(50.2, true)));
        assert!(record.apply_volume(VolumeState::new(51.0, true)));
        assert_eq!(record.volume_percent, 51);
    }

    #[test]
    fn test_fractional_sample_rate_display() {
        let format = AudioFormat {
            sample_rate: 44100,
            bit_depth: 16,
            channels: 1,
        };
        assert_eq!(format.to_string(), "44.1kHz/16-bit/1ch");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Multimedia".parse::<DeviceRole>().unwrap(), DeviceRole::Multimedia);
        assert_eq!("COMMUNICATIONS".parse::<DeviceRole>().unwrap(), DeviceRole::Communications);
        assert!("speaker".parse::<DeviceRole>().is_err());
    }
}
