//! Directory navigation
//!
//! Working directory queries and changes on the remote server.

pub mod operations;
