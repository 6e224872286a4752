//! Utility functions
//!
//! Provides logging, network, and remote path utilities.

pub mod logging;
pub mod network;
pub mod path;
