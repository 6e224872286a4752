//! Authentication
//!
//! Client side of the FTP login exchange.

pub mod login;

pub use login::LoginStep;
