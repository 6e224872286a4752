//! FTP Protocol implementation
//!
//! Handles command framing, reply parsing, and reply payload interpretation.

pub mod commands;
pub mod features;
pub mod parser;
pub mod responses;

pub use commands::{Command, Verb};
pub use features::ServerFeatures;
pub use parser::{ReplyParser, parse_reply};
pub use responses::{Reply, ReplyClass};
