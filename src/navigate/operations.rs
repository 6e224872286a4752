//! Navigation operations
//!
//! PWD, CWD, CDUP, and the directory existence probe built on them. The
//! working directory is never cached; every query goes to the server.

use log::{debug, warn};

use crate::client::Session;
use crate::error::{FtpError, FtpResult, ProtocolError, ReplyContext};
use crate::protocol::responses::PATH_CREATED;
use crate::protocol::{Command, Verb};

impl Session {
    /// Current remote working directory.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        self.require_login()?;
        let cmd = Command::new(Verb::PWD);
        let reply = self.execute(&cmd, "pwd").await?;

        if reply.code() != PATH_CREATED {
            if reply.is_failure() {
                return Err(FtpError::Navigation(ReplyContext::new(&cmd, &reply)));
            }
            return Err(self.violation(&cmd, &reply));
        }
        match reply.parse_quoted_path() {
            Some(path) => Ok(path),
            None => {
                let err = ProtocolError::InvalidReplySyntax(ReplyContext::new(&cmd, &reply));
                self.check(Err(err.into()))
            }
        }
    }

    pub async fn chdir(&mut self, path: &str) -> FtpResult<()> {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::CWD, path)?;
        self.navigate(cmd, "cwd").await
    }

    /// Moves to the parent directory.
    pub async fn cdup(&mut self) -> FtpResult<()> {
        self.require_login()?;
        self.navigate(Command::new(Verb::CDUP), "cdup").await
    }

    /// Probes `path` with a CWD round trip. The working directory is restored
    /// before returning; if that restore fails, the error is returned and the
    /// session is left in `path`.
    pub async fn dir_exists(&mut self, path: &str) -> FtpResult<bool> {
        let previous = self.pwd().await?;
        match self.chdir(path).await {
            Ok(()) => {
                if let Err(e) = self.chdir(&previous).await {
                    warn!(
                        "Could not return to {previous} after probing {path}, \
                         working directory is now {path}: {e}"
                    );
                    return Err(e);
                }
                Ok(true)
            }
            Err(FtpError::Navigation(ctx)) => {
                debug!("{path} is not a directory: {ctx}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn navigate(&mut self, cmd: Command, stage: &'static str) -> FtpResult<()> {
        let reply = self.execute(&cmd, stage).await?;
        if reply.is_success() {
            Ok(())
        } else if reply.is_failure() {
            Err(FtpError::Navigation(ReplyContext::new(&cmd, &reply)))
        } else {
            Err(self.violation(&cmd, &reply))
        }
    }
}
