//! FTP commands
//!
//! A command is a verb plus an optional argument, framed with CRLF and sent
//! verbatim over the control channel.

use std::fmt;

use crate::error::FtpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verb(&'static str);

impl Verb {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

macro_rules! ftp_verbs {
    (
        $(
            $(#[$docs:meta])*
            ($konst:ident, $phrase:expr);
        )+
    ) => {
        impl Verb {
        $(
            $(#[$docs])*
            pub const $konst: Verb = Verb($phrase);
        )+
        }
    };
}

ftp_verbs! {
    (USER, "USER");
    (PASS, "PASS");
    (ACCT, "ACCT");
    (AUTH, "AUTH");
    (PBSZ, "PBSZ");
    (PROT, "PROT");
    (FEAT, "FEAT");
    (NOOP, "NOOP");
    (QUIT, "QUIT");
    (PWD, "PWD");
    (CWD, "CWD");
    (CDUP, "CDUP");
    (MKD, "MKD");
    (RMD, "RMD");
    (DELE, "DELE");
    (RNFR, "RNFR");
    (RNTO, "RNTO");
    /// only used with the CHMOD extension
    (SITE, "SITE");
    (SIZE, "SIZE");
    (MLST, "MLST");
    (TYPE, "TYPE");
    (PASV, "PASV");
    (EPSV, "EPSV");
    (PORT, "PORT");
    (EPRT, "EPRT");
    (RETR, "RETR");
    (STOR, "STOR");
    (LIST, "LIST");
    (NLST, "NLST");
}

/// A single control channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    arg: Option<String>,
}

impl Command {
    pub fn new(verb: Verb) -> Self {
        Command { verb, arg: None }
    }

    /// Builds a command with an argument.
    ///
    /// Fails if the argument contains CR or LF, which would let it smuggle a
    /// second command onto the control channel.
    pub fn with_arg(verb: Verb, arg: impl Into<String>) -> Result<Self, FtpError> {
        let arg = arg.into();
        if arg.contains(['\r', '\n']) {
            return Err(FtpError::InvalidArgument(format!(
                "{verb} argument contains a line break"
            )));
        }
        Ok(Command {
            verb,
            arg: Some(arg),
        })
    }

    /// Like `with_arg` but drops an empty argument, for commands where the
    /// argument is optional (LIST, NLST).
    pub fn with_optional_arg(verb: Verb, arg: Option<&str>) -> Result<Self, FtpError> {
        match arg {
            Some(a) if !a.is_empty() => Command::with_arg(verb, a),
            _ => Ok(Command::new(verb)),
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    /// Wire form of the command, including the terminating CRLF.
    pub fn encode(&self) -> Vec<u8> {
        let verb = self.verb.as_str();
        let arg_len = self.arg.as_ref().map(|a| a.len() + 1).unwrap_or(0);
        let mut buf: Vec<u8> = Vec::with_capacity(verb.len() + arg_len + 2);
        buf.extend_from_slice(verb.as_bytes());
        if let Some(arg) = &self.arg {
            buf.push(b' ');
            buf.extend_from_slice(arg.as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Text safe for logs and error messages: secrets are masked.
    pub fn redacted(&self) -> String {
        match (&self.arg, self.verb) {
            (Some(_), Verb::PASS) | (Some(_), Verb::ACCT) => format!("{} ***", self.verb),
            (Some(arg), _) => format!("{} {}", self.verb, arg),
            (None, _) => self.verb.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
