//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-decode`). Host applications can depend on
//! `player-workspace` and enable the documented codec families without needing
//! to wire each crate individually.

pub use core_decode;
