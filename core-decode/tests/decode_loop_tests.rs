//! Integration tests for the decode loop
//!
//! This test suite verifies:
//! - Admission gating and one decode call per admitted iteration
//! - Codec lifecycle across stream switches
//! - Terminal transitions and controller notification
//! - Registry filtering and the mp3 fallback
//! - The pass-through path, including samples split by the ring wrap
//! - Worker thread start/stop

use core_decode::{
    Codec, CodecContext, CodecFamily, Controller, DecodeCore, DecodeError, DecodePhase,
    DecodeWorker, DecoderConfig, Endianness, InputBuffer, OutputBuffer, PcmCodec, StreamGeometry,
    StreamState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Scripted Codec
// ============================================================================

type EventLog = Arc<Mutex<Vec<String>>>;

/// Codec that copies input to output in fixed chunks and records every call.
struct ScriptedCodec {
    format: char,
    name: &'static str,
    min_read_bytes: usize,
    min_space: usize,
    chunk: usize,
    fixed_phase: Option<DecodePhase>,
    log: EventLog,
}

impl ScriptedCodec {
    fn new(format: char, name: &'static str, log: EventLog) -> Self {
        Self {
            format,
            name,
            min_read_bytes: 0,
            min_space: 0,
            chunk: usize::MAX,
            fixed_phase: None,
            log,
        }
    }

    fn with_thresholds(mut self, min_read_bytes: usize, min_space: usize) -> Self {
        self.min_read_bytes = min_read_bytes;
        self.min_space = min_space;
        self
    }

    fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    fn always(mut self, phase: DecodePhase) -> Self {
        self.fixed_phase = Some(phase);
        self
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{}:{}", event, self.name));
    }
}

impl Codec for ScriptedCodec {
    fn format_id(&self) -> char {
        self.format
    }

    fn name(&self) -> &str {
        self.name
    }

    fn min_read_bytes(&self) -> usize {
        self.min_read_bytes
    }

    fn min_space(&self) -> usize {
        self.min_space
    }

    fn open(&mut self, _geometry: &StreamGeometry) {
        self.record("open");
    }

    fn decode(&mut self, ctx: &mut CodecContext<'_>) -> DecodePhase {
        self.record("decode");
        if let Some(phase) = self.fixed_phase {
            return phase;
        }

        ctx.begin_track();

        let mut input = ctx.input().lock();
        let mut output = ctx.output().lock();
        let len = input.used().min(output.space()).min(self.chunk);
        let mut chunk = vec![0u8; len];
        input.read(&mut chunk);
        output.write(&chunk);

        if input.ext.state.is_end_of_input() && input.used() == 0 {
            DecodePhase::Complete
        } else {
            DecodePhase::Running
        }
    }

    fn close(&mut self) {
        self.record("close");
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn counting_controller() -> (Arc<dyn Controller>, Arc<AtomicUsize>) {
    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&wakes);
    let controller: Arc<dyn Controller> = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (controller, wakes)
}

/// Provider for the flac, pcm and mp3 slots backed by scripted codecs.
fn scripted_provider(
    log: EventLog,
) -> impl Fn(CodecFamily) -> Option<Box<dyn Codec>> + 'static {
    move |family: CodecFamily| -> Option<Box<dyn Codec>> {
        let log = Arc::clone(&log);
        match family {
            CodecFamily::Flac => Some(Box::new(
                ScriptedCodec::new('f', "flac", log)
                    .with_thresholds(100, 50)
                    .with_chunk(64),
            )),
            CodecFamily::Pcm => Some(Box::new(ScriptedCodec::new('p', "pcm", log))),
            CodecFamily::Mad => Some(Box::new(ScriptedCodec::new('m', "mad", log))),
            CodecFamily::Mpg => Some(Box::new(ScriptedCodec::new('m', "mpg", log))),
            _ => None,
        }
    }
}

fn codec_core(config: DecoderConfig, log: &EventLog) -> (DecodeCore, Arc<AtomicUsize>) {
    let (controller, wakes) = counting_controller();
    let core = DecodeCore::builder(InputBuffer::new(1024), OutputBuffer::new(1024), controller)
        .config(DecoderConfig {
            pass_through: false,
            ..config
        })
        .codec_provider(scripted_provider(Arc::clone(log)))
        .build()
        .unwrap();
    (core, wakes)
}

fn count(log: &EventLog, event: &str) -> usize {
    log.lock().iter().filter(|e| e.as_str() == event).count()
}

fn drain_output(core: &DecodeCore) -> Vec<u8> {
    let mut output = core.output().lock();
    let mut bytes = vec![0u8; output.used()];
    output.read(&mut bytes);
    bytes
}

// ============================================================================
// Codec Path
// ============================================================================

#[test]
fn test_codec_stream_end_to_end() {
    let log = EventLog::default();
    let (core, wakes) = codec_core(DecoderConfig::default(), &log);

    core.codec_open('f', StreamGeometry::cd_quality()).unwrap();
    assert_eq!(core.active_codec(), Some('f'));
    core.start_decoding();

    {
        let mut input = core.input().lock();
        input.ext.state = StreamState::StreamingHttp;
        input.write(&[1; 50]);
    }

    // 50 buffered bytes do not exceed the 100 byte read threshold.
    assert!(!core.run_once());
    assert_eq!(count(&log, "decode:flac"), 0);

    core.input().lock().write(&[2; 100]);
    assert!(core.run_once());
    assert_eq!(count(&log, "decode:flac"), 1);
    assert_eq!(core.input().lock().used(), 86);

    // Back under the threshold while the stream is live.
    assert!(!core.run_once());
    assert_eq!(count(&log, "decode:flac"), 1);

    core.input().lock().ext.state = StreamState::Disconnect;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Running);
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(count(&log, "decode:flac"), 3);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);

    // Terminal phase: the loop idles and nobody is woken again.
    assert!(!core.run_once());
    assert_eq!(count(&log, "decode:flac"), 3);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);

    let output = core.output().lock();
    assert_eq!(output.used(), 150);
    assert_eq!(output.ext.track_start, Some(0));
    assert!(!core.is_new_stream());
}

#[test]
fn test_next_stream_resumes_after_complete() {
    let log = EventLog::default();
    let (core, wakes) = codec_core(DecoderConfig::default(), &log);

    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();
    core.start_decoding();
    core.input().lock().ext.state = StreamState::Disconnect;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);

    // Reopening parks the core until the control path starts it again.
    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();
    assert_eq!(core.phase(), DecodePhase::Stopped);
    {
        let mut input = core.input().lock();
        input.ext.state = StreamState::StreamingHttp;
        input.write(&[5; 8]);
    }
    assert!(!core.run_once());
    assert_eq!(core.input().lock().used(), 8);

    core.start_decoding();
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Running);
    core.input().lock().ext.state = StreamState::Disconnect;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(drain_output(&core), vec![5; 8]);
    assert_eq!(wakes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_output_space_gates_decode() {
    let log = EventLog::default();
    let (controller, _wakes) = counting_controller();
    // One byte of the 64 byte output is reserved, leaving exactly min_space.
    let core = DecodeCore::builder(InputBuffer::new(1024), OutputBuffer::new(64), controller)
        .config(DecoderConfig {
            pass_through: false,
            ..DecoderConfig::default()
        })
        .codec_provider(move |family: CodecFamily| -> Option<Box<dyn Codec>> {
            match family {
                CodecFamily::Flac => Some(Box::new(
                    ScriptedCodec::new('f', "flac", Arc::clone(&log)).with_thresholds(0, 63),
                )),
                _ => None,
            }
        })
        .build()
        .unwrap();

    core.codec_open('f', StreamGeometry::cd_quality()).unwrap();
    core.input().lock().write(&[0; 200]);
    core.start_decoding();

    assert!(!core.run_once());
    let output = core.output().lock();
    assert_eq!(output.space() + output.used(), output.capacity() - 1);
}

#[test]
fn test_codec_switch_closes_previous() {
    let log = EventLog::default();
    let (core, _wakes) = codec_core(DecoderConfig::default(), &log);

    core.codec_open('m', StreamGeometry::cd_quality()).unwrap();
    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();
    // Re-opening the active codec does not close it.
    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();

    assert_eq!(
        *log.lock(),
        vec!["open:mad", "close:mad", "open:pcm", "open:pcm"]
    );
    assert_eq!(core.active_codec(), Some('p'));
}

#[test]
fn test_unknown_format_keeps_decoding_idle() {
    let log = EventLog::default();
    let (core, wakes) = codec_core(DecoderConfig::default(), &log);

    let err = core
        .codec_open('x', StreamGeometry::cd_quality())
        .unwrap_err();
    assert!(matches!(err, DecodeError::CodecNotFound('x')));
    assert!(err.is_codec_error());
    assert_eq!(core.active_codec(), None);

    core.input().lock().write(&[0; 256]);
    assert!(!core.run_once());
    assert_eq!(core.phase(), DecodePhase::Stopped);
    assert!(log.lock().is_empty());
    assert_eq!(wakes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stopped_result_becomes_error() {
    let log = EventLog::default();
    let (controller, wakes) = counting_controller();
    let provider_log = Arc::clone(&log);
    let core = DecodeCore::builder(InputBuffer::new(256), OutputBuffer::new(256), controller)
        .config(DecoderConfig {
            pass_through: false,
            ..DecoderConfig::default()
        })
        .codec_provider(move |family: CodecFamily| -> Option<Box<dyn Codec>> {
            match family {
                CodecFamily::Aac => Some(Box::new(
                    ScriptedCodec::new('a', "aac", Arc::clone(&provider_log))
                        .always(DecodePhase::Stopped),
                )),
                _ => None,
            }
        })
        .build()
        .unwrap();

    core.codec_open('a', StreamGeometry::cd_quality()).unwrap();
    core.input().lock().write(&[0; 16]);
    core.start_decoding();

    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Error);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);

    assert!(!core.run_once());
    assert_eq!(count(&log, "decode:aac"), 1);
}

#[test]
fn test_flush_stops_and_is_idempotent() {
    let log = EventLog::default();
    let (core, wakes) = codec_core(DecoderConfig::default(), &log);

    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();
    core.start_decoding();
    core.flush();
    core.flush();

    core.input().lock().write(&[0; 64]);
    assert!(!core.run_once());
    assert_eq!(core.phase(), DecodePhase::Stopped);
    assert_eq!(count(&log, "decode:pcm"), 0);
    assert_eq!(count(&log, "close:pcm"), 0);
    assert_eq!(wakes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Registry Filtering
// ============================================================================

#[test]
fn test_exclude_filter_skips_codec() {
    let log = EventLog::default();
    let (core, _wakes) = codec_core(DecoderConfig::default().with_exclude_codecs("flac"), &log);

    assert_eq!(core.registered_codecs(), vec!['p', 'm']);
    assert!(matches!(
        core.codec_open('f', StreamGeometry::cd_quality()),
        Err(DecodeError::CodecNotFound('f'))
    ));
}

#[test]
fn test_mp3_registered_once() {
    let log = EventLog::default();
    let (core, _wakes) = codec_core(DecoderConfig::default().with_include_codecs("mp3"), &log);
    assert_eq!(core.registered_codecs(), vec!['m']);

    core.codec_open('m', StreamGeometry::cd_quality()).unwrap();
    assert_eq!(*log.lock(), vec!["open:mad"]);
}

#[test]
fn test_mpg_fallback_when_mad_excluded() {
    let log = EventLog::default();
    let (core, _wakes) = codec_core(
        DecoderConfig::default()
            .with_include_codecs("mp3")
            .with_exclude_codecs("mad"),
        &log,
    );
    assert_eq!(core.registered_codecs(), vec!['m']);

    core.codec_open('m', StreamGeometry::cd_quality()).unwrap();
    assert_eq!(*log.lock(), vec!["open:mpg"]);
}

// ============================================================================
// Pass-Through Path
// ============================================================================

fn direct_core(input_capacity: usize) -> (DecodeCore, Arc<AtomicUsize>) {
    let (controller, wakes) = counting_controller();
    let core = DecodeCore::builder(
        InputBuffer::new(input_capacity),
        OutputBuffer::new(64),
        controller,
    )
    .config(DecoderConfig::pass_through())
    .build()
    .unwrap();
    (core, wakes)
}

#[test]
fn test_direct_stereo_stream() {
    let (core, wakes) = direct_core(64);
    core.codec_open('p', StreamGeometry::cd_quality()).unwrap();
    {
        let mut input = core.input().lock();
        input.ext.state = StreamState::StreamingHttp;
        input.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
    }
    core.start_decoding();

    assert!(core.run_once());
    assert_eq!(drain_output(&core), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(!core.run_once());

    core.input().lock().ext.state = StreamState::Stopped;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_direct_24bit_across_wrap() {
    let (core, wakes) = direct_core(8);
    core.codec_open('p', StreamGeometry::new(96000, 24, 2, Endianness::Little))
        .unwrap();
    {
        let mut input = core.input().lock();
        input.ext.state = StreamState::StreamingHttp;
        input.reset_to(6);
        // First sample straddles the end of the storage.
        input.write(&[0xA0, 0xA1, 0xA2, 0xB0, 0xB1, 0xB2]);
    }
    core.start_decoding();

    assert!(core.run_once());
    assert_eq!(core.input().lock().readp(), 1);
    assert!(core.run_once());
    assert_eq!(core.input().lock().used(), 0);
    assert_eq!(drain_output(&core), vec![0xA1, 0xA2, 0xB1, 0xB2]);

    core.input().lock().ext.state = StreamState::Disconnect;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);
}

/// Push `input` through a pass-through core, draining the output after every
/// iteration so the write cursor wraps many times.
fn stream_direct(geometry: StreamGeometry, output_capacity: usize, input: &[u8]) -> Vec<u8> {
    let (controller, wakes) = counting_controller();
    let core = DecodeCore::builder(
        InputBuffer::new(input.len() + 1),
        OutputBuffer::new(output_capacity),
        controller,
    )
    .config(DecoderConfig::pass_through())
    .build()
    .unwrap();
    core.codec_open('p', geometry).unwrap();
    {
        let mut buf = core.input().lock();
        buf.ext.state = StreamState::StreamingHttp;
        assert_eq!(buf.write(input), input.len());
    }
    core.start_decoding();

    let mut out = Vec::new();
    for _ in 0..input.len() {
        if core.input().lock().used() == 0 {
            break;
        }
        assert!(core.run_once(), "no progress with {} bytes left", core.input().lock().used());
        out.extend(drain_output(&core));
    }
    assert_eq!(core.input().lock().used(), 0);

    core.input().lock().ext.state = StreamState::Disconnect;
    assert!(core.run_once());
    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);
    out
}

#[test]
fn test_direct_24bit_drains_across_output_wraps() {
    let input: Vec<u8> = (0..600).map(|i| i as u8).collect();
    let out = stream_direct(StreamGeometry::new(96000, 24, 2, Endianness::Little), 64, &input);

    let expected: Vec<u8> = input.chunks(3).flat_map(|s| [s[1], s[2]]).collect();
    assert_eq!(out, expected);
}

#[test]
fn test_direct_mono_drains_across_output_wraps() {
    let input: Vec<u8> = (0..400).map(|i| i as u8).collect();
    // 66 is not a whole number of output frames.
    let out = stream_direct(StreamGeometry::new(44100, 16, 1, Endianness::Little), 66, &input);

    let expected: Vec<u8> = input.chunks(2).flat_map(|s| [s[0], s[1], s[0], s[1]]).collect();
    assert_eq!(out, expected);
}

#[test]
fn test_direct_unsupported_layout_waits() {
    let (core, wakes) = direct_core(64);
    core.codec_open('p', StreamGeometry::new(44100, 8, 2, Endianness::Little))
        .unwrap();
    core.input().lock().write(&[0; 16]);
    core.start_decoding();

    assert!(!core.run_once());
    assert_eq!(core.input().lock().used(), 16);
    assert_eq!(core.phase(), DecodePhase::Running);
    assert_eq!(wakes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Worker Thread
// ============================================================================

#[test]
fn test_worker_decodes_pcm_stream() {
    let (controller, wakes) = counting_controller();
    let core = Arc::new(
        DecodeCore::builder(InputBuffer::new(4096), OutputBuffer::new(4096), controller)
            .config(DecoderConfig {
                pass_through: false,
                backoff: Duration::from_millis(2),
                ..DecoderConfig::default()
            })
            .codec_provider(|family: CodecFamily| -> Option<Box<dyn Codec>> {
                match family {
                    CodecFamily::Pcm => Some(Box::new(PcmCodec::with_thresholds(0, 0))),
                    _ => None,
                }
            })
            .build()
            .unwrap(),
    );

    let worker = DecodeWorker::start(Arc::clone(&core)).unwrap();
    core.codec_open('p', StreamGeometry::new(44100, 16, 1, Endianness::Little))
        .unwrap();
    {
        let mut input = core.input().lock();
        input.ext.state = StreamState::Disconnect;
        input.write(&[0x11, 0x22, 0x33, 0x44]);
    }
    core.start_decoding();

    let deadline = Instant::now() + Duration::from_secs(5);
    while core.phase() == DecodePhase::Running && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(core.phase(), DecodePhase::Complete);
    assert_eq!(wakes.load(Ordering::SeqCst), 1);
    assert_eq!(
        drain_output(&core),
        vec![0x11, 0x22, 0x11, 0x22, 0x33, 0x44, 0x33, 0x44]
    );

    worker.stop().unwrap();
    assert!(!core.is_running());
}

#[test]
fn test_dropping_worker_stops_loop() {
    let (controller, _wakes) = counting_controller();
    let core = Arc::new(
        DecodeCore::builder(InputBuffer::new(64), OutputBuffer::new(64), controller)
            .config(DecoderConfig::pass_through().with_backoff(Duration::from_millis(1)))
            .build()
            .unwrap(),
    );

    let worker = DecodeWorker::start(Arc::clone(&core)).unwrap();
    assert!(core.is_running());
    drop(worker);
    assert!(!core.is_running());
    assert_eq!(Arc::strong_count(&core), 1);
}
