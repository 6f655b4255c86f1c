//! Crash testing framework for pitrestore
//!
//! This module provides:
//! - Staging helpers built on the library
//! - Subprocess management for the `pitrestore` binary
//! - Post-crash validation

pub mod harness;
pub mod scenarios;
pub mod utils;

pub use harness::*;
pub use utils::*;
