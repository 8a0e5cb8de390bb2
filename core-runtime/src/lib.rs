//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the player crates:
//! - Logging and tracing initialisation
//! - The runtime error type
//!
//! ## Overview
//!
//! Library crates only emit `tracing` events; binaries, demos and tests call
//! [`logging::init_logging`] once at startup to decide where those events go.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
