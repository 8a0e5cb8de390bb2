//! # Decode Loop Example
//!
//! Drives the decode worker with the built-in PCM codec: a producer thread
//! plays the stream stage and fills the input buffer with a 16-bit mono sine
//! wave, the worker converts it to interleaved stereo, and the main thread
//! drains the output buffer like an audio device would.
//!
//! Run with: `cargo run --example decode_demo --package core-decode`
//!
//! Pass `json` or `compact` to change the log format and `trace` to see every
//! loop iteration.

use core_decode::{
    Codec, CodecFamily, DecodeCore, DecodePhase, DecodeWorker, DecoderConfig, Endianness,
    InputBuffer, OutputBuffer, PcmCodec, StreamGeometry, StreamState,
};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SAMPLE_RATE: u32 = 44100;
const DURATION_SECS: usize = 2;
const CHUNK_BYTES: usize = 4096;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };
    let level = match args.get(2) {
        Some(level) => level.parse()?,
        None => LogLevel::Debug,
    };

    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(level)
            .with_thread_info(true),
    )?;

    // ------------------------------------------------------------------------
    // Build the decode core
    // ------------------------------------------------------------------------

    let input = InputBuffer::new(64 * 1024);
    let output = OutputBuffer::new(128 * 1024);

    let finished = Arc::new(AtomicBool::new(false));
    let finished_flag = Arc::clone(&finished);

    let config = DecoderConfig {
        pass_through: false,
        backoff: Duration::from_millis(10),
        ..DecoderConfig::default()
    }
    .with_include_codecs("pcm");

    let core = Arc::new(
        DecodeCore::builder(
            input.clone(),
            output.clone(),
            Arc::new(move || finished_flag.store(true, Ordering::SeqCst)),
        )
        .config(config)
        .codec_provider(|family: CodecFamily| -> Option<Box<dyn Codec>> {
            match family {
                CodecFamily::Pcm => Some(Box::new(PcmCodec::with_thresholds(1024, 2048))),
                _ => None,
            }
        })
        .build()?,
    );
    info!(codecs = ?core.registered_codecs(), "Decode core ready");

    let worker = DecodeWorker::start(Arc::clone(&core))?;

    // ------------------------------------------------------------------------
    // Open a stream and start the producer
    // ------------------------------------------------------------------------

    core.codec_open(
        'p',
        StreamGeometry::new(SAMPLE_RATE, 16, 1, Endianness::Little),
    )?;
    input.lock().ext.state = StreamState::StreamingHttp;
    core.start_decoding();

    let producer_input = input.clone();
    let producer = thread::spawn(move || {
        let pcm = sine_wave(440.0, SAMPLE_RATE, DURATION_SECS);
        let mut offset = 0;
        while offset < pcm.len() {
            let end = (offset + CHUNK_BYTES).min(pcm.len());
            let written = {
                let mut buf = producer_input.lock();
                let written = buf.write(&pcm[offset..end]);
                buf.ext.bytes += written as u64;
                written
            };
            offset += written;
            if written == 0 {
                thread::sleep(Duration::from_millis(5));
            }
        }
        producer_input.lock().ext.state = StreamState::Disconnect;
        offset
    });

    // ------------------------------------------------------------------------
    // Play the output
    // ------------------------------------------------------------------------

    let started = Instant::now();
    let mut played = 0usize;
    let mut scratch = vec![0u8; CHUNK_BYTES];
    loop {
        let read = output.lock().read(&mut scratch);
        played += read;

        if finished.load(Ordering::SeqCst) && output.lock().used() == 0 {
            break;
        }
        if started.elapsed() > Duration::from_secs(30) {
            warn!("Giving up waiting for the stream to finish");
            break;
        }
        if read == 0 {
            thread::sleep(Duration::from_millis(5));
        }
    }

    let produced = producer.join().map_err(|_| "producer thread panicked")?;
    info!(
        phase = ?core.phase(),
        input_bytes = produced,
        output_bytes = played,
        track_start = ?output.lock().ext.track_start,
        "Stream finished"
    );
    if core.phase() == DecodePhase::Complete {
        info!("Mono input was expanded to {} stereo bytes", played);
    }

    worker.stop()?;
    Ok(())
}

/// 16-bit little-endian mono sine wave.
fn sine_wave(frequency: f64, sample_rate: u32, seconds: usize) -> Vec<u8> {
    let frames = sample_rate as usize * seconds;
    let mut pcm = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f64 / f64::from(sample_rate);
        let sample = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.3 * 32767.0) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}
