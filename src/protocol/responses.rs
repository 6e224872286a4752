//! FTP replies
//!
//! Defines the reply type, standard reply codes, and parsers for the reply
//! payloads the client needs (passive addresses, quoted paths, sizes).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Standard FTP reply codes
pub const SERVICE_READY_SOON: u16 = 120;
pub const DATA_CONNECTION_OPEN: u16 = 125;
pub const FILE_STATUS_OK: u16 = 150;
pub const OK: u16 = 200;
pub const SUPERFLUOUS: u16 = 202;
pub const SYSTEM_STATUS: u16 = 211;
pub const FILE_STATUS: u16 = 213;
pub const READY: u16 = 220;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const PASSIVE_MODE: u16 = 227;
pub const EXTENDED_PASSIVE_MODE: u16 = 229;
pub const LOGGED_IN: u16 = 230;
pub const AUTH_OK: u16 = 234;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const NEED_PASSWORD: u16 = 331;
pub const NEED_ACCOUNT: u16 = 332;
pub const FILE_ACTION_PENDING: u16 = 350;
pub const SERVICE_NOT_AVAILABLE: u16 = 421;
pub const CANT_OPEN_DATA_CONNECTION: u16 = 425;
pub const FILE_BUSY: u16 = 450;
pub const SYNTAX_ERROR: u16 = 500;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
pub const FILE_UNAVAILABLE: u16 = 550;

/// Outcome class encoded by the first digit of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Preliminary,
    Success,
    Intermediate,
    TransientFailure,
    PermanentFailure,
}

/// A complete server reply: one code and every text line in order.
///
/// For multi-line replies the first and last entries have the code prefix
/// removed; continuation lines in between are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Reply { code, lines }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_multi_line(&self) -> bool {
        self.lines.len() > 1
    }

    /// All lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// The line carrying the final code, where servers put machine-readable
    /// payloads.
    pub fn last_line(&self) -> &str {
        self.lines.last().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn class(&self) -> ReplyClass {
        match self.code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Success,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::TransientFailure,
            _ => ReplyClass::PermanentFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::Success
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == ReplyClass::Intermediate
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.class(),
            ReplyClass::TransientFailure | ReplyClass::PermanentFailure
        )
    }

    /// Parses `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
    pub fn parse_pasv_227(&self) -> Option<SocketAddr> {
        let inner = parenthesized(self.last_line())?;
        let a: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
        if a.len() != 6 {
            return None;
        }

        let h1 = u8::from_str(a[0]).ok()?;
        let h2 = u8::from_str(a[1]).ok()?;
        let h3 = u8::from_str(a[2]).ok()?;
        let h4 = u8::from_str(a[3]).ok()?;
        let p1 = u8::from_str(a[4]).ok()?;
        let p2 = u8::from_str(a[5]).ok()?;

        let ip = IpAddr::V4(Ipv4Addr::new(h1, h2, h3, h4));
        let port = ((p1 as u16) << 8) + (p2 as u16);
        Some(SocketAddr::new(ip, port))
    }

    /// Parses `229 Entering Extended Passive Mode (|||port|)`.
    ///
    /// The delimiter is whatever character the server used in the first
    /// position, per RFC 2428.
    pub fn parse_epsv_229(&self) -> Option<u16> {
        let inner = parenthesized(self.last_line())?;
        let mut chars = inner.chars();
        let d = chars.next()?;
        let prefix: String = [d, d, d].iter().collect();
        let rest = inner.strip_prefix(prefix.as_str())?;
        let port = rest.strip_suffix(d)?;
        u16::from_str(port).ok().filter(|p| *p != 0)
    }

    /// Parses the quoted path out of a `257` reply. Embedded quotes are
    /// doubled by the server and unescaped here.
    pub fn parse_quoted_path(&self) -> Option<String> {
        let line = self.lines.first()?;
        let bytes = line.as_bytes();
        let start = memchr::memchr(b'"', bytes)?;

        let mut path = String::new();
        let mut chars = line[start + 1..].chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    path.push('"');
                } else {
                    return Some(path);
                }
            } else {
                path.push(c);
            }
        }
        None
    }

    /// Parses the numeric payload of a `213` SIZE reply.
    pub fn parse_size_213(&self) -> Option<u64> {
        u64::from_str(self.last_line().trim()).ok()
    }
}

fn parenthesized(line: &str) -> Option<&str> {
    let p_start = memchr::memchr(b'(', line.as_bytes())?;
    let p_end = memchr::memchr(b')', &line.as_bytes()[p_start..])? + p_start;
    Some(&line[p_start + 1..p_end])
}
