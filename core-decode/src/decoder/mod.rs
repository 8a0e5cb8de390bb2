//! # Codec Layer
//!
//! Codec registry, the built-in PCM codec and the byte-level sample converter
//! used both by that codec and by the pass-through path of the decode loop.
//!
//! ## Overview
//!
//! Compressed formats are decoded by plugins implementing
//! [`Codec`](crate::traits::Codec). Which families may be registered is fixed
//! at build time through cargo features and narrowed at startup by the
//! include/exclude filters of [`DecoderConfig`](crate::config::DecoderConfig):
//!
//! | Feature Flag | Families |
//! |--------------|----------|
//! | `decoder-core` | aac, ogg, flac, pcm, mp3 |
//! | `decoder-dsd` | dsd |
//! | `decoder-ffmpeg` | alac, wma |
//!
//! When `decoder-core` is disabled the loop defaults to pass-through mode and
//! reformats raw PCM with [`SampleConverter`] without consulting a codec.

mod pcm;
mod registry;
mod sample_converter;

pub use pcm::PcmCodec;
pub use registry::{
    BuiltinCodecs, CodecFamily, CodecFilter, CodecProvider, CodecRegistry, MAX_CODECS,
};
pub use sample_converter::{Conversion, SampleConverter};
