//! Remote file and directory management
//!
//! MKD/RMD/DELE, rename, SITE CHMOD, and the file existence probes. Failures
//! the server reports are `FtpError::Filesystem` with a classified kind; the
//! session stays usable.

use log::debug;

use crate::client::Session;
use crate::error::{FtpError, FtpResult, ProtocolError, ReplyContext};
use crate::protocol::responses::{
    FILE_ACTION_PENDING, FILE_BUSY, FILE_STATUS, FILE_UNAVAILABLE, NOT_IMPLEMENTED,
    PARAMETER_NOT_IMPLEMENTED, SUPERFLUOUS, SYNTAX_ERROR,
};
use crate::protocol::{Command, Reply, Verb};
use crate::transfer::TransferMode;
use crate::utils::path;

/// Progress of an RNFR/RNTO pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStep {
    Start,
    RenamedFromSet,
    RenamedToSent,
}

/// Outcome of one SIZE exchange.
enum SizeProbe {
    Known(u64),
    Missing,
    /// The server does not implement SIZE
    Unsupported(ReplyContext),
}

impl Session {
    pub async fn mkdir(&mut self, path: &str) -> FtpResult<()> {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::MKD, path)?;
        self.file_action(&cmd, "mkd").await
    }

    pub async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::RMD, path)?;
        self.file_action(&cmd, "rmd").await
    }

    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::DELE, path)?;
        self.file_action(&cmd, "dele").await
    }

    /// Creates every missing directory along `remote_path`, walking into each
    /// one. The working directory ends at the leaf.
    pub async fn mkdirs(&mut self, remote_path: &str) -> FtpResult<()> {
        self.require_login()?;
        if path::is_absolute(remote_path) {
            self.chdir("/").await?;
        }
        for component in path::components(remote_path) {
            match self.chdir(component).await {
                Ok(()) => {}
                Err(FtpError::Navigation(_)) => {
                    debug!("Creating missing directory {component}");
                    self.mkdir(component).await?;
                    self.chdir(component).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// RNFR then RNTO. Both arguments are validated before anything is sent.
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.require_login()?;
        let rnfr = Command::with_arg(Verb::RNFR, from)?;
        let rnto = Command::with_arg(Verb::RNTO, to)?;

        let mut step = RenameStep::Start;
        loop {
            step = match step {
                RenameStep::Start => {
                    let reply = self.execute(&rnfr, "rnfr").await?;
                    if reply.code() == FILE_ACTION_PENDING {
                        RenameStep::RenamedFromSet
                    } else if reply.is_failure() {
                        return Err(FtpError::filesystem(ReplyContext::new(&rnfr, &reply)));
                    } else {
                        return Err(self.violation(&rnfr, &reply));
                    }
                }
                RenameStep::RenamedFromSet => {
                    let reply = self.execute(&rnto, "rnto").await?;
                    if reply.is_success() {
                        RenameStep::RenamedToSent
                    } else if reply.is_failure() {
                        return Err(FtpError::filesystem(ReplyContext::new(&rnto, &reply)));
                    } else {
                        return Err(self.violation(&rnto, &reply));
                    }
                }
                RenameStep::RenamedToSent => {
                    debug!("Renamed {from} to {to}");
                    return Ok(());
                }
            };
        }
    }

    /// `SITE CHMOD` with `mode` rendered in octal.
    pub async fn chmod(&mut self, path: &str, mode: u32) -> FtpResult<()> {
        self.require_login()?;
        if mode > 0o7777 {
            return Err(FtpError::InvalidArgument(format!(
                "file mode {mode:o} out of range"
            )));
        }
        let cmd = Command::with_arg(Verb::SITE, format!("CHMOD {mode:o} {path}"))?;
        let reply = self.execute(&cmd, "site chmod").await?;
        match reply.code() {
            SUPERFLUOUS | SYNTAX_ERROR | NOT_IMPLEMENTED | PARAMETER_NOT_IMPLEMENTED => {
                Err(FtpError::Unsupported(ReplyContext::new(&cmd, &reply)))
            }
            _ if reply.is_success() => Ok(()),
            _ if reply.is_failure() => Err(FtpError::filesystem(ReplyContext::new(&cmd, &reply))),
            _ => Err(self.violation(&cmd, &reply)),
        }
    }

    /// Whether `path` names a regular file. Uses SIZE, or MLST on servers
    /// without SIZE.
    pub async fn file_exists(&mut self, path: &str) -> FtpResult<bool> {
        self.require_login()?;
        match self.size_probe(path).await? {
            SizeProbe::Known(_) => Ok(true),
            SizeProbe::Missing => Ok(false),
            SizeProbe::Unsupported(ctx) => {
                debug!("SIZE unsupported ({ctx}), probing {path} with MLST");
                self.mlst_is_file(path).await
            }
        }
    }

    /// Size in bytes as reported by SIZE, `None` if the file does not exist.
    ///
    /// SIZE depends on the representation type, so the session switches to
    /// binary first.
    pub async fn size(&mut self, path: &str) -> FtpResult<Option<u64>> {
        self.require_login()?;
        match self.size_probe(path).await? {
            SizeProbe::Known(size) => Ok(Some(size)),
            SizeProbe::Missing => Ok(None),
            SizeProbe::Unsupported(ctx) => Err(FtpError::Unsupported(ctx)),
        }
    }

    async fn size_probe(&mut self, path: &str) -> FtpResult<SizeProbe> {
        let cmd = Command::with_arg(Verb::SIZE, path)?;
        self.ensure_type(TransferMode::Binary).await?;

        let reply = self.execute(&cmd, "size").await?;
        match reply.code() {
            FILE_STATUS => match reply.parse_size_213() {
                Some(size) => Ok(SizeProbe::Known(size)),
                None => {
                    let err = ProtocolError::InvalidReplySyntax(ReplyContext::new(&cmd, &reply));
                    self.check(Err(err.into()))
                }
            },
            FILE_UNAVAILABLE | FILE_BUSY => Ok(SizeProbe::Missing),
            SYNTAX_ERROR | NOT_IMPLEMENTED => {
                Ok(SizeProbe::Unsupported(ReplyContext::new(&cmd, &reply)))
            }
            _ if reply.is_failure() => Err(FtpError::filesystem(ReplyContext::new(&cmd, &reply))),
            _ => Err(self.violation(&cmd, &reply)),
        }
    }

    async fn mlst_is_file(&mut self, path: &str) -> FtpResult<bool> {
        let cmd = Command::with_arg(Verb::MLST, path)?;
        let reply = self.execute(&cmd, "mlst").await?;
        match reply.code() {
            code if (200..300).contains(&code) => {
                Ok(mlst_entry_type(&reply).is_some_and(|t| t.eq_ignore_ascii_case("file")))
            }
            FILE_UNAVAILABLE | FILE_BUSY => Ok(false),
            SYNTAX_ERROR | NOT_IMPLEMENTED => {
                Err(FtpError::Unsupported(ReplyContext::new(&cmd, &reply)))
            }
            _ if reply.is_failure() => Err(FtpError::filesystem(ReplyContext::new(&cmd, &reply))),
            _ => Err(self.violation(&cmd, &reply)),
        }
    }

    async fn file_action(&mut self, cmd: &Command, stage: &'static str) -> FtpResult<()> {
        let reply = self.execute(cmd, stage).await?;
        if reply.is_success() {
            Ok(())
        } else if reply.is_failure() {
            Err(FtpError::filesystem(ReplyContext::new(cmd, &reply)))
        } else {
            Err(self.violation(cmd, &reply))
        }
    }
}

/// Value of the `type` fact in an MLST reply (RFC 3659 section 7).
///
/// The entry line is the one with a `fact=value;` list followed by a space
/// and the path name.
fn mlst_entry_type(reply: &Reply) -> Option<&str> {
    reply.lines().iter().find_map(|line| {
        let facts = line.trim_start().split(' ').next()?;
        facts.split(';').find_map(|fact| {
            let (name, value) = fact.split_once('=')?;
            name.eq_ignore_ascii_case("type").then_some(value)
        })
    })
}
