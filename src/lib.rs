//! RAX FTP Client
//!
//! An asynchronous FTP client engine (RFC 959, RFC 2428, RFC 3659 SIZE/MLST,
//! RFC 4217 explicit and implicit TLS).

pub mod auth;
pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod navigate;
pub mod protocol;
pub mod storage;
pub mod transfer;
pub mod utils;

pub use client::{FtpClient, Session, SessionState};
pub use config::{ClientConfig, ConnectionConfig, TransferConfig};
pub use error::{FilesystemErrorKind, FtpError, FtpResult};
pub use protocol::{Reply, ServerFeatures};
pub use transfer::{ChannelMode, TransferMode};
