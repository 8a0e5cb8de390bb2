//! # Decode Core
//!
//! The decode stage of a network audio player: a worker that moves data from
//! the network input buffer, through a codec, into the output buffer feeding
//! the audio device.
//!
//! ## Overview
//!
//! This crate handles:
//! - The decode loop and its admission rule ([`worker`])
//! - Codec registration, selection and lifecycle ([`decoder`])
//! - Direct reformatting of raw PCM when no codec is used
//! - Stream-start signalling to the output stage and fade hooks
//! - Controller notification when a stream completes or fails
//!
//! ## Usage
//!
//! ```no_run
//! use core_decode::{
//!     DecodeCore, DecodeWorker, InputBuffer, OutputBuffer, StreamGeometry,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> core_decode::Result<()> {
//! let input = InputBuffer::new(2 * 1024 * 1024);
//! let output = OutputBuffer::new(4 * 1024 * 1024);
//! let core = Arc::new(
//!     DecodeCore::builder(input, output, Arc::new(|| println!("stream finished"))).build()?,
//! );
//!
//! let worker = DecodeWorker::start(Arc::clone(&core))?;
//! core.codec_open('p', StreamGeometry::cd_quality())?;
//! core.start_decoding();
//! // ... the stream stage fills the input buffer ...
//! worker.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod ring_buffer;
pub mod state;
pub mod traits;
pub mod worker;

pub use config::DecoderConfig;
pub use decoder::{
    BuiltinCodecs, CodecFamily, CodecFilter, CodecProvider, CodecRegistry, Conversion, PcmCodec,
    SampleConverter, MAX_CODECS,
};
pub use error::{DecodeError, Result};
pub use ring_buffer::{
    FadeMode, InputBuffer, InputState, OutputBuffer, OutputState, OutputStatus, RingBuffer,
    StreamState, StreamStatus,
};
pub use state::{DecodePhase, DecodeState, Endianness, StreamGeometry, BYTES_PER_FRAME};
pub use traits::{Codec, CodecContext, Controller, FadeHook, NegotiatedRate, ProcessingStage};
pub use worker::{admit, DecodeCore, DecodeCoreBuilder, DecodeWorker};
