//! # Sample Format Converter
//!
//! Byte-level reformatting of linear PCM into 16-bit little-endian output.
//!
//! Supported layouts:
//!
//! | Input | Output | Consumed : Produced |
//! |-------|--------|---------------------|
//! | 16-bit stereo | copied | 1 : 1 |
//! | 16-bit mono | sample duplicated into both channels | 1 : 2 |
//! | 24-bit | least significant byte dropped | 3 : 2 |
//!
//! The input side of a step is bounded by the input's contiguous readable span,
//! the output side by the output's contiguous writable span and its free
//! space. The spans are shorter than the logical occupancy whenever a cursor
//! sits near the wrap boundary, and the output never reports itself full, so
//! none of these counts can be assumed to be a multiple of a sample. A sample
//! cut in two by either wrap point is staged through a small scratch array.

use crate::ring_buffer::{InputState, OutputState};
use crate::state::{Endianness, StreamGeometry};
use tracing::trace;

/// Bytes moved by one conversion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conversion {
    /// Bytes taken from the input buffer.
    pub consumed: usize,
    /// Bytes written to the output buffer.
    pub produced: usize,
}

impl Conversion {
    /// Returns `true` if nothing moved.
    pub fn is_empty(&self) -> bool {
        self.consumed == 0 && self.produced == 0
    }
}

/// Converts raw PCM between the input and output buffers.
pub struct SampleConverter;

/// Largest sample, in bytes, on either side of a conversion.
const MAX_STAGED: usize = 4;

impl SampleConverter {
    /// Convert as much as one contiguous step allows, advancing both cursors.
    ///
    /// Must be called with both buffer mutexes held, input locked first.
    /// `endianness` is the byte order assumed for the input; the pass-through
    /// path always uses little-endian.
    ///
    /// When a whole sample is buffered but straddles the wrap point of either
    /// buffer, that one sample is staged through scratch storage instead.
    pub fn convert(
        geometry: &StreamGeometry,
        endianness: Endianness,
        input: &mut InputState,
        output: &mut OutputState,
    ) -> Conversion {
        match (geometry.sample_size, geometry.channels) {
            (16, 2) => Self::step(input, output, 2, 2, |src, dst| {
                let copied = Self::copy_stereo16(src, dst, endianness);
                Conversion {
                    consumed: copied,
                    produced: copied,
                }
            }),
            (16, 1) => Self::step(input, output, 2, 4, |src, dst| {
                Self::duplicate_mono16(src, dst, endianness)
            }),
            (24, _) => Self::step(input, output, 3, 2, |src, dst| {
                Self::narrow24(src, dst, endianness)
            }),
            (sample_size, channels) => {
                trace!(sample_size, channels, "Unsupported layout for direct conversion");
                Conversion::default()
            }
        }
    }

    /// Run `convert` over the contiguous spans of both buffers, bounding the
    /// input side by `cont_read` and the output side by
    /// `min(cont_write, space)`. Falls back to a single staged sample of
    /// `in_size` input bytes and `out_size` output bytes when the spans hold
    /// no whole sample.
    fn step(
        input: &mut InputState,
        output: &mut OutputState,
        in_size: usize,
        out_size: usize,
        convert: impl Fn(&[u8], &mut [u8]) -> Conversion,
    ) -> Conversion {
        let writable = output.cont_write().min(output.space());
        let conversion = convert(input.read_slice(), &mut output.write_slice()[..writable]);
        if !conversion.is_empty() {
            input.inc_readp(conversion.consumed);
            output.inc_writep(conversion.produced);
            return conversion;
        }

        if input.used() < in_size || output.space() < out_size {
            return conversion;
        }

        let mut src = [0u8; MAX_STAGED];
        let mut dst = [0u8; MAX_STAGED];
        input.read(&mut src[..in_size]);
        let staged = convert(&src[..in_size], &mut dst[..out_size]);
        output.write(&dst[..staged.produced]);
        trace!(
            consumed = staged.consumed,
            produced = staged.produced,
            "Staged sample across wrap"
        );
        staged
    }

    /// Copy 16-bit stereo samples, swapping bytes for big-endian input.
    ///
    /// Returns the number of bytes copied (`min(src.len(), dst.len())`).
    pub fn copy_stereo16(src: &[u8], dst: &mut [u8], endianness: Endianness) -> usize {
        let len = src.len().min(dst.len());
        match endianness {
            Endianness::Little => {
                dst[..len].copy_from_slice(&src[..len]);
                len
            }
            Endianness::Big => {
                let len = len - len % 2;
                for (out, sample) in dst[..len].chunks_exact_mut(2).zip(src.chunks_exact(2)) {
                    out[0] = sample[1];
                    out[1] = sample[0];
                }
                len
            }
        }
    }

    /// Duplicate each 16-bit mono sample into a left/right pair.
    ///
    /// `[S0, S1]` becomes `[S0, S1, S0, S1]` for little-endian input.
    pub fn duplicate_mono16(src: &[u8], dst: &mut [u8], endianness: Endianness) -> Conversion {
        let samples = (src.len() / 2).min(dst.len() / 4);
        for (out, sample) in dst
            .chunks_exact_mut(4)
            .zip(src.chunks_exact(2))
            .take(samples)
        {
            let (lo, hi) = match endianness {
                Endianness::Little => (sample[0], sample[1]),
                Endianness::Big => (sample[1], sample[0]),
            };
            out.copy_from_slice(&[lo, hi, lo, hi]);
        }
        Conversion {
            consumed: samples * 2,
            produced: samples * 4,
        }
    }

    /// Narrow 24-bit samples to 16 bits by dropping the least significant
    /// byte.
    ///
    /// Little-endian `[B0, B1, B2]` (B0 least significant) becomes `[B1, B2]`.
    pub fn narrow24(src: &[u8], dst: &mut [u8], endianness: Endianness) -> Conversion {
        let count = (src.len() / 3).min(dst.len() / 2);
        for (out, sample) in dst
            .chunks_exact_mut(2)
            .zip(src.chunks_exact(3))
            .take(count)
        {
            match endianness {
                Endianness::Little => out.copy_from_slice(&sample[1..3]),
                Endianness::Big => out.copy_from_slice(&[sample[1], sample[0]]),
            }
        }
        Conversion {
            consumed: count * 3,
            produced: count * 2,
        }
    }
}
