//! # Decode State
//!
//! The record shared between the decode loop and the control path. It is only
//! ever touched through the decode-state mutex owned by
//! [`DecodeCore`](crate::worker::DecodeCore).

use serde::{Deserialize, Serialize};

/// Size in bytes of one output frame (16-bit stereo).
pub const BYTES_PER_FRAME: usize = 4;

/// Current phase of the decode state machine.
///
/// ```text
/// Stopped ──start_decoding──▶ Running ──decode()──▶ Complete | Error
///    ▲                                                  │
///    └─────────────── codec_open / flush ───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodePhase {
    /// No stream is being decoded.
    Stopped,
    /// Decoding is in progress.
    Running,
    /// The stream ended cleanly with all input consumed.
    Complete,
    /// The codec reported a failure.
    Error,
}

impl DecodePhase {
    /// Returns `true` for `Complete` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Maps a phase returned by a codec onto the phases a decode call may
    /// produce. Anything other than `Running` or `Complete` is a failure.
    pub fn after_decode(self) -> Self {
        match self {
            Self::Running | Self::Complete => self,
            Self::Stopped | Self::Error => Self::Error,
        }
    }
}

impl Default for DecodePhase {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Byte order of the incoming PCM samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Big,
    Little,
}

impl Endianness {
    /// Decode the endianness flag as carried by the stream-open command
    /// (`0` big, `1` little). Unknown values fall back to little-endian.
    pub fn from_wire(flag: u8) -> Self {
        match flag {
            0 => Self::Big,
            _ => Self::Little,
        }
    }

    /// Inverse of [`Endianness::from_wire`].
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Big => 0,
            Self::Little => 1,
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::Little
    }
}

/// Sample geometry negotiated when a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGeometry {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample of the incoming stream (16 or 24).
    pub sample_size: u8,
    /// Channel count of the incoming stream (1 or 2).
    pub channels: u8,
    /// Byte order of the incoming samples.
    pub endianness: Endianness,
}

impl StreamGeometry {
    pub fn new(sample_rate: u32, sample_size: u8, channels: u8, endianness: Endianness) -> Self {
        Self {
            sample_rate,
            sample_size,
            channels,
            endianness,
        }
    }

    /// CD quality: 44.1 kHz, 16-bit, stereo, little-endian.
    pub fn cd_quality() -> Self {
        Self::new(44100, 16, 2, Endianness::Little)
    }

    /// Bytes occupied by one incoming sample for a single channel.
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.sample_size / 8)
    }
}

impl Default for StreamGeometry {
    fn default() -> Self {
        Self::cd_quality()
    }
}

/// Mutable decode record guarded by the decode-state mutex.
#[derive(Debug, Clone)]
pub struct DecodeState {
    /// Current phase of the state machine.
    pub phase: DecodePhase,
    /// Set on every `codec_open`, cleared once the track start has been
    /// published to the output stage.
    pub new_stream: bool,
    /// Geometry of the current stream.
    pub geometry: StreamGeometry,
}

impl DecodeState {
    /// State as created when the decode worker starts.
    pub fn new() -> Self {
        Self {
            phase: DecodePhase::Stopped,
            new_stream: true,
            geometry: StreamGeometry::default(),
        }
    }
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::new()
    }
}
