//! Remote storage management
//!
//! Directory creation and removal, deletion, renaming, permissions, and
//! existence queries against the server's file system.

pub mod operations;

pub use operations::RenameStep;
