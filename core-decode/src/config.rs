//! # Decoder Configuration
//!
//! Configuration types for the decode core and its worker thread.

use crate::decoder::CodecFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decode core configuration.
///
/// Controls codec selection, idle backoff and the worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Comma separated codec short names to register (e.g. `"flac,pcm,mp3"`).
    ///
    /// `None` registers every compiled-in family not excluded.
    ///
    /// Default: `None`.
    #[serde(default)]
    pub include_codecs: Option<String>,

    /// Comma separated codec short names never to register.
    ///
    /// Takes precedence over `include_codecs`.
    ///
    /// Default: empty.
    #[serde(default)]
    pub exclude_codecs: String,

    /// Sleep between loop iterations that made no progress.
    ///
    /// Also bounds the extra latency of stopping the worker.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_backoff")]
    pub backoff: Duration,

    /// Stack size of the decode worker thread in bytes.
    ///
    /// Default: 128 KiB.
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,

    /// Name of the decode worker thread.
    ///
    /// Default: `"decode"`.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Reformat raw PCM directly instead of dispatching to codecs.
    ///
    /// Default: `true` only when the crate is built without `decoder-core`.
    #[serde(default = "default_pass_through")]
    pub pass_through: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            include_codecs: None,
            exclude_codecs: String::new(),
            backoff: default_backoff(),
            thread_stack_size: default_thread_stack_size(),
            thread_name: default_thread_name(),
            pass_through: default_pass_through(),
        }
    }
}

impl DecoderConfig {
    /// Create a configuration for raw PCM pass-through without codecs.
    pub fn pass_through() -> Self {
        Self {
            pass_through: true,
            ..Default::default()
        }
    }

    /// Restrict registration to the given codec short names.
    pub fn with_include_codecs(mut self, include: impl Into<String>) -> Self {
        self.include_codecs = Some(include.into());
        self
    }

    /// Exclude the given codec short names.
    pub fn with_exclude_codecs(mut self, exclude: impl Into<String>) -> Self {
        self.exclude_codecs = exclude.into();
        self
    }

    /// Set the idle backoff interval.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.backoff.is_zero() {
            return Err("backoff must be > 0".to_string());
        }

        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be > 0".to_string());
        }

        if self.thread_name.trim().is_empty() {
            return Err("thread_name cannot be empty".to_string());
        }

        Ok(())
    }

    /// Build the registry filter from the include/exclude lists.
    pub fn codec_filter(&self) -> CodecFilter {
        CodecFilter::new(self.include_codecs.as_deref(), &self.exclude_codecs)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_thread_stack_size() -> usize {
    128 * 1024
}

fn default_thread_name() -> String {
    "decode".to_string()
}

fn default_pass_through() -> bool {
    !cfg!(feature = "decoder-core")
}
