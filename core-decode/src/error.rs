//! # Decode Error Types
//!
//! Errors surfaced by the control path of the decode core. The decode loop
//! itself never fails: codec failures become a terminal [`DecodePhase`] and
//! are reported to the controller instead.
//!
//! [`DecodePhase`]: crate::state::DecodePhase

use thiserror::Error;

/// Errors that can occur while configuring or driving the decode core.
#[derive(Error, Debug)]
pub enum DecodeError {
    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// No registered codec handles the requested format tag.
    #[error("Codec not found for format '{0}'")]
    CodecNotFound(char),

    /// The registry already holds the maximum number of codecs.
    #[error("Codec registry full ({capacity} codecs), cannot register '{format}'")]
    RegistryFull { capacity: usize, format: char },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Decoder configuration failed validation.
    #[error("Invalid decoder config: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Worker Errors
    // ========================================================================
    /// The decode worker thread could not be spawned.
    #[error("Failed to spawn decode worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    /// A worker is already driving this core.
    #[error("Decode worker already running")]
    WorkerAlreadyRunning,

    /// The decode worker thread panicked before it was joined.
    #[error("Decode worker panicked")]
    WorkerPanicked,
}

impl DecodeError {
    /// Returns `true` if decoding can continue after this error.
    ///
    /// A missing codec only leaves decoding idle until the next successful
    /// `codec_open`.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::CodecNotFound(_))
    }

    /// Returns `true` if this error relates to codec lookup or registration.
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            DecodeError::CodecNotFound(_) | DecodeError::RegistryFull { .. }
        )
    }
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
