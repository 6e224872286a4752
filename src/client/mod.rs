//! FTP client session and shared handle
//!
//! `Session` is the single-owner engine; `FtpClient` wraps it for callers
//! that share one connection between tasks.

pub mod handle;
pub mod session;
pub mod state;

pub use handle::FtpClient;
pub use session::Session;
pub use state::SessionState;
