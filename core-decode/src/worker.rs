//! # Decode Worker
//!
//! The decode orchestration loop and the control path that drives it.
//!
//! ## Architecture
//!
//! [`DecodeCore`] owns the decode state and the codec registry. The control
//! path (stream open, flush, rate negotiation) calls into it from the caller's
//! thread; [`DecodeWorker`] runs [`DecodeCore::run_once`] on a dedicated thread
//! until stopped.
//!
//! ```text
//! loop {
//!   snapshot input used / end-of-input     (input lock, released)
//!   snapshot output space                  (output lock, released)
//!   decode lock
//!     Running + codec + admitted? ──▶ codec.decode() ──▶ terminal? fade stop + wake
//!   decode unlock
//!   no progress? sleep(backoff)
//! }
//! ```
//!
//! ## Lock Order
//!
//! When held together, the decode-state mutex is taken first, then the input
//! buffer's mutex, then the output buffer's mutex. The occupancy snapshot
//! takes the buffer mutexes without the decode-state mutex and releases them
//! before the decode step.
//!
//! ## Cancellation
//!
//! Stopping clears a running flag checked at the top of each iteration and
//! joins the thread, costing at most one backoff interval. Codec calls have
//! no timeout.

use crate::config::DecoderConfig;
use crate::decoder::{BuiltinCodecs, CodecProvider, CodecRegistry, SampleConverter};
use crate::error::{DecodeError, Result};
use crate::ring_buffer::{InputBuffer, OutputBuffer, OutputState};
use crate::state::{DecodePhase, DecodeState, Endianness, StreamGeometry, BYTES_PER_FRAME};
use crate::traits::{begin_track, CodecContext, Controller, FadeHook, ProcessingStage};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, instrument, trace};

/// Admission rule for a decode step.
///
/// Output space must strictly exceed `min_space`, and either more than
/// `min_read_bytes` of input is buffered or no more input will arrive.
pub fn admit(
    space: usize,
    bytes: usize,
    end_of_input: bool,
    min_space: usize,
    min_read_bytes: usize,
) -> bool {
    space > min_space && (bytes > min_read_bytes || end_of_input)
}

struct DecodeInner {
    state: DecodeState,
    registry: CodecRegistry,
    active: Option<usize>,
}

/// Decode state, codec registry and collaborators shared by the worker and
/// the control path.
pub struct DecodeCore {
    decode: Mutex<DecodeInner>,
    running: AtomicBool,
    // Read by rate negotiation while the caller holds the output lock, so they
    // live outside the decode-state mutex.
    direct: AtomicBool,
    process: AtomicBool,
    input: InputBuffer,
    output: OutputBuffer,
    controller: Arc<dyn Controller>,
    fade: Option<Arc<dyn FadeHook>>,
    processing: Option<Arc<dyn ProcessingStage>>,
    config: DecoderConfig,
}

impl DecodeCore {
    /// Start building a decode core around the two buffers.
    pub fn builder(
        input: InputBuffer,
        output: OutputBuffer,
        controller: Arc<dyn Controller>,
    ) -> DecodeCoreBuilder {
        DecodeCoreBuilder {
            input,
            output,
            controller,
            fade: None,
            processing: None,
            config: DecoderConfig::default(),
            provider: None,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    /// Current decode phase.
    pub fn phase(&self) -> DecodePhase {
        self.decode.lock().state.phase
    }

    /// Geometry negotiated by the last `codec_open`.
    pub fn geometry(&self) -> StreamGeometry {
        self.decode.lock().state.geometry
    }

    /// Returns `true` until the track start of the current stream has been
    /// published to the output stage.
    pub fn is_new_stream(&self) -> bool {
        self.decode.lock().state.new_stream
    }

    /// Format tag of the active codec.
    pub fn active_codec(&self) -> Option<char> {
        let inner = self.decode.lock();
        inner
            .active
            .and_then(|index| inner.registry.get(index))
            .map(|codec| codec.format_id())
    }

    /// Format tags of all registered codecs, in registration order.
    pub fn registered_codecs(&self) -> Vec<char> {
        self.decode.lock().registry.format_ids()
    }

    /// Returns `true` while a worker is expected to run the loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns `true` when decoded samples bypass the processing stage.
    pub fn is_direct(&self) -> bool {
        self.direct.load(Ordering::Acquire)
    }

    // ========================================================================
    // Control Path
    // ========================================================================

    /// Open a codec for a new stream.
    ///
    /// Resets the phase to `Stopped` and records the stream geometry. If a
    /// different codec was active it is closed first. An unknown format
    /// leaves the active codec untouched and decoding idle.
    #[instrument(skip(self))]
    pub fn codec_open(&self, format: char, geometry: StreamGeometry) -> Result<()> {
        debug!("codec open: '{}'", format);

        let mut guard = self.decode.lock();
        let inner = &mut *guard;

        inner.state.new_stream = true;
        inner.state.phase = DecodePhase::Stopped;
        inner.state.geometry = geometry;
        self.direct.store(true, Ordering::Release);

        if self.config.pass_through {
            return Ok(());
        }

        let Some(index) = inner.registry.position(format) else {
            drop(guard);
            error!("codec not found: '{}'", format);
            return Err(DecodeError::CodecNotFound(format));
        };

        if let Some(active) = inner.active.filter(|active| *active != index) {
            if let Some(codec) = inner.registry.get_mut(active) {
                debug!("closing codec: '{}'", codec.format_id());
                codec.close();
            }
        }

        inner.active = Some(index);
        if let Some(codec) = inner.registry.get_mut(index) {
            codec.open(&geometry);
        }

        Ok(())
    }

    /// Let the loop start decoding the opened stream.
    ///
    /// Called by the stream stage once data starts flowing.
    pub fn start_decoding(&self) {
        debug!("decode running");
        self.decode.lock().state.phase = DecodePhase::Running;
    }

    /// Stop decoding the current stream without re-opening the codec.
    pub fn flush(&self) {
        debug!("decode flush");
        let mut inner = self.decode.lock();
        inner.state.phase = DecodePhase::Stopped;
        if let Some(stage) = self.active_processing() {
            stage.flush();
        }
    }

    /// Enable or disable the processing stage, if one is configured.
    pub fn set_processing(&self, enabled: bool) {
        let enabled = enabled && self.processing.is_some();
        debug!(enabled, "decode processing");
        self.process.store(enabled, Ordering::Release);
    }

    /// Negotiate the output rate for a new stream.
    ///
    /// Must be called with the output buffer's mutex held. When processing
    /// is enabled the mutex is released for the negotiation and re-acquired
    /// before returning.
    pub fn new_stream_rate(
        &self,
        output: &mut MutexGuard<'_, OutputState>,
        sample_rate: u32,
        supported_rates: &[u32],
    ) -> u32 {
        if !self.process.load(Ordering::Acquire) {
            return sample_rate;
        }
        let Some(stage) = self.processing.as_deref() else {
            return sample_rate;
        };

        let negotiated =
            MutexGuard::unlocked(output, || stage.new_stream(sample_rate, supported_rates));
        debug!(
            direct = negotiated.direct,
            rate = negotiated.rate,
            "negotiated output rate"
        );
        self.direct.store(negotiated.direct, Ordering::Release);
        negotiated.rate
    }

    fn reset_for_worker(&self) {
        let mut inner = self.decode.lock();
        inner.state.new_stream = true;
        inner.state.phase = DecodePhase::Stopped;
        self.direct.store(true, Ordering::Release);
        self.process.store(false, Ordering::Release);
    }

    fn shutdown(&self) {
        debug!("close decode");
        let mut guard = self.decode.lock();
        let inner = &mut *guard;
        if let Some(index) = inner.active.take() {
            if let Some(codec) = inner.registry.get_mut(index) {
                codec.close();
            }
        }
        self.running.store(false, Ordering::Release);
    }

    // ========================================================================
    // Decode Loop
    // ========================================================================

    /// Run one loop iteration. Returns `true` if decode work was done.
    pub fn run_once(&self) -> bool {
        if self.config.pass_through {
            self.run_direct()
        } else {
            self.run_codec()
        }
    }

    fn run_codec(&self) -> bool {
        let (bytes, end_of_input) = {
            let input = self.input.lock();
            (input.used(), input.ext.state.is_end_of_input())
        };
        let space = self.output.lock().space();

        let mut guard = self.decode.lock();
        let DecodeInner {
            state,
            registry,
            active,
        } = &mut *guard;

        if state.phase != DecodePhase::Running {
            return false;
        }
        let Some(index) = *active else {
            return false;
        };
        let Some(codec) = registry.get_mut(index) else {
            return false;
        };

        trace!(bytes, space, "streambuf bytes / outputbuf space");

        let processing = self.active_processing();
        let min_space = match processing {
            Some(stage) => stage.max_out_frames() * BYTES_PER_FRAME,
            None => codec.min_space(),
        };

        if !admit(space, bytes, end_of_input, min_space, codec.min_read_bytes()) {
            return false;
        }

        let mut ctx = CodecContext::new(state, &self.input, &self.output, self.fade.as_deref());
        state.phase = codec.decode(&mut ctx).after_decode();

        if let Some(stage) = processing {
            if stage.has_pending_input() {
                stage.process_samples();
            }
            if state.phase == DecodePhase::Complete {
                stage.drain();
            }
        }

        let terminal = state.phase.is_terminal().then_some(state.phase);
        if let Some(phase) = terminal {
            self.end_stream(phase);
        }
        drop(guard);

        if terminal.is_some() {
            self.controller.wake();
        }
        true
    }

    fn run_direct(&self) -> bool {
        let (bytes, end_of_input) = {
            let input = self.input.lock();
            (input.used(), input.ext.state.is_end_of_input())
        };

        let mut guard = self.decode.lock();
        let state = &mut guard.state;

        if state.phase != DecodePhase::Running {
            return false;
        }

        if state.new_stream {
            let mut output = self.output.lock();
            begin_track(state, &mut output, self.fade.as_deref());
        }

        let (conversion, discarded) = {
            let mut input = self.input.lock();
            let mut output = self.output.lock();
            let conversion = SampleConverter::convert(
                &state.geometry,
                Endianness::Little,
                &mut input,
                &mut output,
            );

            // A partial sample left at end of input can never convert.
            let leftover = input.used();
            let discarded = end_of_input
                && conversion.is_empty()
                && leftover > 0
                && leftover < state.geometry.bytes_per_sample();
            if discarded {
                debug!(leftover, "discarding partial sample at end of input");
                input.inc_readp(leftover);
            }
            (conversion, discarded)
        };
        trace!(
            bytes,
            consumed = conversion.consumed,
            produced = conversion.produced,
            "direct conversion"
        );

        if !end_of_input {
            return !conversion.is_empty();
        }
        if bytes == 0 || discarded {
            state.phase = DecodePhase::Complete;
        }
        if state.phase == DecodePhase::Running {
            return !conversion.is_empty();
        }

        let phase = state.phase;
        self.end_stream(phase);
        drop(guard);

        self.controller.wake();
        true
    }

    /// Terminal transition: log it and stop any fade in progress. The caller
    /// wakes the controller once the decode lock is released.
    fn end_stream(&self, phase: DecodePhase) {
        info!(
            "decode {}",
            if phase == DecodePhase::Complete {
                "complete"
            } else {
                "error"
            }
        );

        {
            let mut output = self.output.lock();
            if output.ext.fade_mode.is_active() {
                if let Some(fade) = self.fade.as_deref() {
                    fade.on_fade_stop(&mut output);
                }
            }
        }
    }

    fn active_processing(&self) -> Option<&dyn ProcessingStage> {
        if self.process.load(Ordering::Acquire) && !self.direct.load(Ordering::Acquire) {
            self.processing.as_deref()
        } else {
            None
        }
    }
}

/// Builder for [`DecodeCore`].
pub struct DecodeCoreBuilder {
    input: InputBuffer,
    output: OutputBuffer,
    controller: Arc<dyn Controller>,
    fade: Option<Arc<dyn FadeHook>>,
    processing: Option<Arc<dyn ProcessingStage>>,
    config: DecoderConfig,
    provider: Option<Box<dyn CodecProvider>>,
}

impl DecodeCoreBuilder {
    /// Set the fade hook of the output stage.
    pub fn fade_hook(mut self, fade: Arc<dyn FadeHook>) -> Self {
        self.fade = Some(fade);
        self
    }

    /// Attach a processing stage. It stays inactive until
    /// [`DecodeCore::set_processing`] enables it.
    pub fn processing_stage(mut self, stage: Arc<dyn ProcessingStage>) -> Self {
        self.processing = Some(stage);
        self
    }

    /// Set the decoder configuration.
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the source of codec implementations.
    ///
    /// Defaults to [`BuiltinCodecs`].
    pub fn codec_provider(mut self, provider: impl CodecProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Validate the configuration and register codecs.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn build(self) -> Result<DecodeCore> {
        self.config.validate().map_err(DecodeError::InvalidConfig)?;

        let registry = if self.config.pass_through {
            CodecRegistry::new()
        } else {
            let provider = self.provider.as_deref().unwrap_or(&BuiltinCodecs);
            CodecRegistry::initialize(&self.config.codec_filter(), provider)
        };

        Ok(DecodeCore {
            decode: Mutex::new(DecodeInner {
                state: DecodeState::new(),
                registry,
                active: None,
            }),
            running: AtomicBool::new(false),
            direct: AtomicBool::new(true),
            process: AtomicBool::new(false),
            input: self.input,
            output: self.output,
            controller: self.controller,
            fade: self.fade,
            processing: self.processing,
            config: self.config,
        })
    }
}

// ============================================================================
// Worker Thread
// ============================================================================

/// Handle to the thread running the decode loop.
///
/// Dropping the handle stops and joins the worker.
pub struct DecodeWorker {
    core: Arc<DecodeCore>,
    join: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Reset the decode state and spawn the loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::WorkerAlreadyRunning`] if another worker is
    /// driving `core`, or [`DecodeError::WorkerSpawn`] if the thread cannot
    /// be created.
    pub fn start(core: Arc<DecodeCore>) -> Result<Self> {
        if core
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DecodeError::WorkerAlreadyRunning);
        }

        debug!("init decode");
        core.reset_for_worker();

        let worker_core = Arc::clone(&core);
        let spawned = thread::Builder::new()
            .name(core.config.thread_name.clone())
            .stack_size(core.config.thread_stack_size)
            .spawn(move || decode_main(worker_core));

        match spawned {
            Ok(join) => Ok(Self {
                core,
                join: Some(join),
            }),
            Err(e) => {
                core.running.store(false, Ordering::Release);
                Err(DecodeError::WorkerSpawn(e))
            }
        }
    }

    /// The core driven by this worker.
    pub fn core(&self) -> &Arc<DecodeCore> {
        &self.core
    }

    /// Close the active codec, stop the loop and join the thread.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::WorkerPanicked`] if the loop panicked.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        self.core.shutdown();
        join.join().map_err(|_| DecodeError::WorkerPanicked)
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("{}", e);
        }
    }
}

fn decode_main(core: Arc<DecodeCore>) {
    debug!("decode worker started");
    while core.is_running() {
        if !core.run_once() {
            thread::sleep(core.config.backoff);
        }
    }
    debug!("decode worker exiting");
}
