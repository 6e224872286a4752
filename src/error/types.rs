//! Error types
//!
//! Defines the error kinds surfaced by the FTP client engine. Connection-level
//! errors invalidate the session; operation-level errors leave it usable.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::{Command, Reply};

pub type FtpResult<T> = Result<T, FtpError>;

/// The command, reply code and reply text that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub command: String,
    pub code: u16,
    pub text: String,
}

impl ReplyContext {
    pub fn new(command: &Command, reply: &Reply) -> Self {
        ReplyContext {
            command: command.redacted(),
            code: reply.code(),
            text: reply.text(),
        }
    }

    /// Context for a reply that did not answer an explicit command (greeting,
    /// final transfer confirmation).
    pub fn stage(stage: &str, reply: &Reply) -> Self {
        ReplyContext {
            command: stage.to_string(),
            code: reply.code(),
            text: reply.text(),
        }
    }
}

impl fmt::Display for ReplyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} {}", self.command, self.code, self.text)
    }
}

/// Failures while reaching the server or completing the handshake.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
    #[error("tcp connect to {0} failed: {1}")]
    Tcp(String, io::Error),
    #[error("tcp connect to {0} timed out")]
    TimedOut(String),
    #[error("invalid tls server name: {0}")]
    InvalidServerName(String),
    #[error("tls handshake failed: {0}")]
    TlsHandshake(io::Error),
    #[error("tls handshake timed out")]
    TlsHandshakeTimedOut,
    #[error("server refused AUTH TLS: {0}")]
    TlsRejected(ReplyContext),
    #[error("greeting failed: {0}")]
    Greeting(ReplyContext),
}

/// Malformed or unexpected reply framing. Always fatal to the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed by server")]
    ConnectionClosed,
    #[error("unable to send command: {0}")]
    SendFailed(io::Error),
    #[error("unable to read reply: {0}")]
    ReadFailed(io::Error),
    #[error("reply line too long")]
    LineTooLong,
    #[error("reply line truncated")]
    TruncatedLine,
    #[error("invalid line format")]
    InvalidLineFormat,
    #[error("invalid reply code {0}")]
    InvalidReplyCode(u16),
    #[error("line is not utf8")]
    LineIsNotUtf8,
    #[error("too many lines in multi-line reply")]
    TooManyLines,
    #[error("invalid reply syntax: {0}")]
    InvalidReplySyntax(ReplyContext),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(ReplyContext),
    #[error("service not available: {0}")]
    ServiceNotAvailable(ReplyContext),
}

/// Classification of a failed file or directory management command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilesystemErrorKind {
    AlreadyExists,
    NotFound,
    PermissionDenied,
    NameNotAllowed,
    Other,
}

impl FilesystemErrorKind {
    /// Derive the kind from the reply code and, when the code is ambiguous,
    /// from the server's message text.
    pub fn classify(reply: &ReplyContext) -> Self {
        if reply.code == 553 {
            return FilesystemErrorKind::NameNotAllowed;
        }
        let text = reply.text.to_ascii_lowercase();
        if text.contains("exist") && !text.contains("not exist") && !text.contains("n't exist") {
            FilesystemErrorKind::AlreadyExists
        } else if text.contains("not found")
            || text.contains("no such")
            || text.contains("not exist")
            || text.contains("n't exist")
        {
            FilesystemErrorKind::NotFound
        } else if text.contains("permission") || text.contains("denied") {
            FilesystemErrorKind::PermissionDenied
        } else {
            FilesystemErrorKind::Other
        }
    }
}

impl fmt::Display for FilesystemErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilesystemErrorKind::AlreadyExists => "already exists",
            FilesystemErrorKind::NotFound => "not found",
            FilesystemErrorKind::PermissionDenied => "permission denied",
            FilesystemErrorKind::NameNotAllowed => "name not allowed",
            FilesystemErrorKind::Other => "rejected",
        };
        f.write_str(s)
    }
}

/// Data connection setup failures.
#[derive(Debug, Error)]
pub enum DataChannelError {
    #[error("negotiation rejected: {0}")]
    Negotiation(ReplyContext),
    #[error("unable to parse data address: {0}")]
    InvalidAddress(ReplyContext),
    #[error("connect to {0} failed: {1}")]
    Connect(SocketAddr, io::Error),
    #[error("unable to bind local listener: {0}")]
    Bind(io::Error),
    #[error("accept failed: {0}")]
    Accept(io::Error),
    #[error("tls handshake on data channel failed: {0}")]
    Tls(io::Error),
    #[error("{0} timed out")]
    TimedOut(&'static str),
}

/// Failures after the server accepted a transfer command.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer not confirmed after {bytes} bytes: {reply}")]
    Unconfirmed { reply: ReplyContext, bytes: u64 },
    #[error("data stream failed after {bytes} bytes: {source}")]
    DataStream { source: io::Error, bytes: u64 },
}

/// General FTP client error that encompasses all error kinds
#[derive(Debug, Error)]
pub enum FtpError {
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),
    #[error("authentication failed: {0}")]
    Auth(ReplyContext),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("navigation failed: {0}")]
    Navigation(ReplyContext),
    #[error("filesystem operation failed ({kind}): {reply}")]
    Filesystem {
        kind: FilesystemErrorKind,
        reply: ReplyContext,
    },
    #[error("data channel error: {0}")]
    DataChannel(#[from] DataChannelError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("unsupported by server: {0}")]
    Unsupported(ReplyContext),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("local i/o error: {0}")]
    LocalIo(io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("session is closed")]
    SessionClosed,
}

impl FtpError {
    pub(crate) fn filesystem(reply: ReplyContext) -> Self {
        FtpError::Filesystem {
            kind: FilesystemErrorKind::classify(&reply),
            reply,
        }
    }

    /// Whether the error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            FtpError::Connect(_)
            | FtpError::Protocol(_)
            | FtpError::Timeout(_)
            | FtpError::SessionClosed => true,
            FtpError::DataChannel(DataChannelError::TimedOut(_)) => true,
            _ => false,
        }
    }

    /// The reply that caused the error, if the server sent one.
    pub fn reply(&self) -> Option<&ReplyContext> {
        match self {
            FtpError::Auth(r)
            | FtpError::Navigation(r)
            | FtpError::Unsupported(r)
            | FtpError::Filesystem { reply: r, .. } => Some(r),
            FtpError::Connect(ConnectError::TlsRejected(r) | ConnectError::Greeting(r)) => Some(r),
            FtpError::Protocol(
                ProtocolError::InvalidReplySyntax(r)
                | ProtocolError::UnexpectedReply(r)
                | ProtocolError::ServiceNotAvailable(r),
            ) => Some(r),
            FtpError::DataChannel(
                DataChannelError::Negotiation(r) | DataChannelError::InvalidAddress(r),
            ) => Some(r),
            FtpError::Transfer(TransferError::Unconfirmed { reply, .. }) => Some(reply),
            _ => None,
        }
    }
}
