//! Control connection
//!
//! Socket, TLS, and reply framing for the FTP control channel.

pub mod channel;
pub mod stream;
pub mod tls;

pub use channel::{ChannelLimits, ControlChannel};
pub use stream::FtpStream;
pub use tls::TlsContext;
