//! Linear PCM codec (`'p'`).
//!
//! Reformats raw 16/24-bit PCM into 16-bit little-endian output through the
//! codec path. Unlike the pass-through path it honours big-endian input.

use crate::decoder::sample_converter::SampleConverter;
use crate::state::{DecodePhase, StreamGeometry};
use crate::traits::{Codec, CodecContext};
use tracing::{debug, trace};

const DEFAULT_MIN_READ_BYTES: usize = 4096;
const DEFAULT_MIN_SPACE: usize = 8192;

/// Codec plugin for uncompressed PCM streams.
#[derive(Debug, Clone)]
pub struct PcmCodec {
    min_read_bytes: usize,
    min_space: usize,
    geometry: Option<StreamGeometry>,
}

impl PcmCodec {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_MIN_READ_BYTES, DEFAULT_MIN_SPACE)
    }

    /// Create a codec with custom admission thresholds.
    pub fn with_thresholds(min_read_bytes: usize, min_space: usize) -> Self {
        Self {
            min_read_bytes,
            min_space,
            geometry: None,
        }
    }

    /// Returns `true` between `open` and `close`.
    pub fn is_open(&self) -> bool {
        self.geometry.is_some()
    }
}

impl Default for PcmCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for PcmCodec {
    fn format_id(&self) -> char {
        'p'
    }

    fn name(&self) -> &str {
        "pcm"
    }

    fn min_read_bytes(&self) -> usize {
        self.min_read_bytes
    }

    fn min_space(&self) -> usize {
        self.min_space
    }

    fn open(&mut self, geometry: &StreamGeometry) {
        debug!(?geometry, "Opening pcm codec");
        self.geometry = Some(*geometry);
    }

    fn decode(&mut self, ctx: &mut CodecContext<'_>) -> DecodePhase {
        let Some(geometry) = self.geometry else {
            return DecodePhase::Error;
        };
        if !matches!(
            (geometry.sample_size, geometry.channels),
            (16, 1) | (16, 2) | (24, _)
        ) {
            debug!(?geometry, "Unsupported pcm layout");
            return DecodePhase::Error;
        }

        ctx.begin_track();

        let mut input = ctx.input().lock();
        let mut output = ctx.output().lock();
        let conversion =
            SampleConverter::convert(&geometry, geometry.endianness, &mut input, &mut output);
        trace!(
            consumed = conversion.consumed,
            produced = conversion.produced,
            "pcm decode step"
        );

        if input.ext.state.is_end_of_input() && conversion.is_empty() {
            // Less than one sample left and nothing more coming.
            let frame = geometry.bytes_per_sample() * usize::from(geometry.channels);
            if input.used() < frame.max(1) {
                let leftover = input.used();
                input.inc_readp(leftover);
                return DecodePhase::Complete;
            }
        }

        DecodePhase::Running
    }

    fn close(&mut self) {
        debug!("Closing pcm codec");
        self.geometry = None;
    }
}
