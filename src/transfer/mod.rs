//! File transfers
//!
//! Data channel negotiation, the byte pumps with ASCII translation, and the
//! `get`/`put`/listing operations built on them.

pub mod ascii;
pub mod copy;
pub mod data_channel;
pub mod file_ops;
pub mod modes;
pub mod operations;

pub use modes::{ChannelMode, TransferMode};
