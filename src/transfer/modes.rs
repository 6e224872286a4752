//! FTP Transfer modes
//!
//! Representation type (binary/ASCII) and data channel direction
//! (passive/active).

use serde::Deserialize;

/// Representation type requested with `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Binary,
    Ascii,
}

impl TransferMode {
    /// Argument of the `TYPE` command.
    pub fn type_code(&self) -> &'static str {
        match self {
            TransferMode::Binary => "I",
            TransferMode::Ascii => "A",
        }
    }
}

/// Which side opens the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Client connects to the server (PASV/EPSV)
    Passive,
    /// Server connects to the client (PORT/EPRT)
    Active,
}

impl ChannelMode {
    pub fn from_passive(passive: bool) -> Self {
        if passive {
            ChannelMode::Passive
        } else {
            ChannelMode::Active
        }
    }
}
