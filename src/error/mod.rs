//! Error handling
//!
//! Defines error types for the FTP client engine.

pub mod types;

pub use types::*;
