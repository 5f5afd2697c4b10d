//! VobReel - batch converter for DVD VOB title sets
//!
//! This library crate exposes the core functionality for integration testing.

pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod scanner;
