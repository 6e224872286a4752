//! Module `state`
//!
//! Authentication lifecycle of a session.

use std::fmt;

/// `Unauthenticated -> Authenticated -> Closed`. A session never leaves
/// `Closed`; callers reconnect instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}
