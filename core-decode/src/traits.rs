//! # Decode Core Traits
//!
//! Contracts between the decode core and the collaborators around it.
//!
//! ## Architecture
//!
//! ```text
//!  stream reader ──▶ InputBuffer ──▶ [DecodeCore + Codec] ──▶ OutputBuffer ──▶ renderer
//!                                        │        │
//!                              Controller::wake   FadeHook / ProcessingStage
//! ```
//!
//! - **Codec**: one plugin per format tag. Called on the decode worker with the
//!   decode-state mutex held; it locks the buffers itself, input before output.
//! - **Controller**: woken once whenever a stream reaches a terminal phase.
//! - **FadeHook**: fade computation owned by the output stage, always invoked
//!   with the output buffer's mutex held.
//! - **ProcessingStage**: optional resampling/processing pipeline.
//!
//! ## Threading Model
//!
//! Codecs are `Send` so the registry can live inside the decode-state mutex.
//! Every other collaborator is shared between the control path and the worker
//! and must be `Send + Sync`.

use crate::ring_buffer::{InputBuffer, OutputBuffer, OutputState};
use crate::state::{DecodePhase, DecodeState, StreamGeometry};
use tracing::info;

// ============================================================================
// Codec Plugin
// ============================================================================

/// A codec plugin converting the input stream into PCM in the output buffer.
///
/// ## Lifecycle
///
/// `open` is called on every `codec_open` that resolves to this plugin.
/// `close` is called when another plugin becomes active or the worker stops,
/// and never twice without an intervening `open`.
pub trait Codec: Send {
    /// Format tag resolved by the registry (e.g. `'f'` for FLAC).
    fn format_id(&self) -> char;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Input bytes that must be buffered before a decode call is useful.
    fn min_read_bytes(&self) -> usize;

    /// Output space that must be free before a decode call is allowed.
    fn min_space(&self) -> usize;

    /// Prepare for a new stream. Failures surface through later decode calls.
    fn open(&mut self, geometry: &StreamGeometry);

    /// Perform one decode step and return the resulting phase.
    ///
    /// Must not block indefinitely.
    fn decode(&mut self, ctx: &mut CodecContext<'_>) -> DecodePhase;

    /// Release stream resources.
    fn close(&mut self);
}

/// Everything a codec may touch during a decode step.
pub struct CodecContext<'a> {
    state: &'a mut DecodeState,
    input: &'a InputBuffer,
    output: &'a OutputBuffer,
    fade: Option<&'a dyn FadeHook>,
}

impl<'a> CodecContext<'a> {
    pub fn new(
        state: &'a mut DecodeState,
        input: &'a InputBuffer,
        output: &'a OutputBuffer,
        fade: Option<&'a dyn FadeHook>,
    ) -> Self {
        Self {
            state,
            input,
            output,
            fade,
        }
    }

    /// The decode record, already locked by the caller.
    pub fn state(&self) -> &DecodeState {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut DecodeState {
        self.state
    }

    /// Geometry negotiated by the last `codec_open`.
    pub fn geometry(&self) -> StreamGeometry {
        self.state.geometry
    }

    pub fn input(&self) -> &InputBuffer {
        self.input
    }

    pub fn output(&self) -> &OutputBuffer {
        self.output
    }

    /// Publish the track start to the output stage if this is the first
    /// output of a new stream.
    ///
    /// Codecs call this right before writing their first samples. Returns
    /// `true` if the track start was published by this call.
    pub fn begin_track(&mut self) -> bool {
        if !self.state.new_stream {
            return false;
        }
        let mut output = self.output.lock();
        begin_track(self.state, &mut output, self.fade);
        true
    }
}

/// Mark the output write cursor as the start of the current track and start
/// the boundary fade when the renderer has one configured.
pub(crate) fn begin_track(
    state: &mut DecodeState,
    output: &mut OutputState,
    fade: Option<&dyn FadeHook>,
) {
    info!(writep = output.writep(), "Setting track start");
    output.ext.track_start = Some(output.writep());
    if output.ext.fade_mode.is_active() {
        if let Some(fade) = fade {
            fade.on_fade_start(output, true);
        }
    }
    state.new_stream = false;
}

// ============================================================================
// Collaborators
// ============================================================================

/// Top-level controller notified when a stream finishes.
#[cfg_attr(test, mockall::automock)]
pub trait Controller: Send + Sync {
    /// Wake the controller. Carries no payload: the phase is visible through
    /// [`DecodeCore::phase`](crate::worker::DecodeCore::phase). Called after
    /// the decode lock is released, so the controller may query the core.
    fn wake(&self);
}

impl<F> Controller for F
where
    F: Fn() + Send + Sync,
{
    fn wake(&self) {
        self()
    }
}

/// Fade computation owned by the output stage.
#[cfg_attr(test, mockall::automock)]
pub trait FadeHook: Send + Sync {
    /// Called before output begins for a new stream.
    fn on_fade_start(&self, output: &mut OutputState, at_boundary: bool);

    /// Called when the stream enters a terminal phase.
    fn on_fade_stop(&self, output: &mut OutputState);
}

/// Outcome of sample-rate negotiation for a new output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedRate {
    /// `true` if samples bypass the processing stage.
    pub direct: bool,
    /// Rate the output stage should run at.
    pub rate: u32,
}

/// Optional resampling/processing pipeline between codec and output.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessingStage: Send + Sync {
    /// Largest number of frames one processing step can emit.
    fn max_out_frames(&self) -> usize;

    /// Returns `true` if decoded frames are waiting to be processed.
    fn has_pending_input(&self) -> bool;

    /// Process pending frames into the output buffer.
    fn process_samples(&self);

    /// Flush the pipeline tail at the end of a stream.
    fn drain(&self);

    /// Drop any buffered state.
    fn flush(&self);

    /// Choose the output rate for a new stream.
    fn new_stream(&self, sample_rate: u32, supported_rates: &[u32]) -> NegotiatedRate;
}
