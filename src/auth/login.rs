//! Login sequence
//!
//! USER, then PASS and ACCT as the server asks for them (RFC 959 section 5.4),
//! followed by data channel protection on TLS sessions.

use log::{debug, info, warn};

use crate::client::{Session, SessionState};
use crate::error::{FtpError, FtpResult, ReplyContext};
use crate::protocol::responses::{LOGGED_IN, NEED_ACCOUNT, NEED_PASSWORD, SUPERFLUOUS};
use crate::protocol::{Command, Verb};

/// Where the login exchange stands after the last reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    AwaitingUser,
    AwaitingPassword,
    AwaitingAccount,
    LoggedIn,
}

/// What to do with a reply received in `step`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LoginTransition {
    Send(LoginStep, Verb),
    Done,
    Rejected,
    MissingAccount,
    OutOfSequence,
}

pub(crate) fn next_step(step: LoginStep, code: u16, has_account: bool) -> LoginTransition {
    match (step, code) {
        (LoginStep::LoggedIn, _) => LoginTransition::OutOfSequence,
        (_, LOGGED_IN | SUPERFLUOUS) => LoginTransition::Done,
        (LoginStep::AwaitingUser, NEED_PASSWORD) => {
            LoginTransition::Send(LoginStep::AwaitingPassword, Verb::PASS)
        }
        (LoginStep::AwaitingUser | LoginStep::AwaitingPassword, NEED_ACCOUNT) => {
            if has_account {
                LoginTransition::Send(LoginStep::AwaitingAccount, Verb::ACCT)
            } else {
                LoginTransition::MissingAccount
            }
        }
        (_, code) if code >= 400 => LoginTransition::Rejected,
        _ => LoginTransition::OutOfSequence,
    }
}

impl Session {
    /// Logs in with the configured account (if any) for servers that ask for
    /// one.
    pub async fn login(&mut self, username: &str, password: &str) -> FtpResult<()> {
        let account = self.config.connection.account.clone();
        self.login_with_account(username, password, account.as_deref())
            .await
    }

    pub async fn login_with_account(
        &mut self,
        username: &str,
        password: &str,
        account: Option<&str>,
    ) -> FtpResult<()> {
        match self.state {
            SessionState::Unauthenticated => {}
            SessionState::Authenticated => {
                return Err(FtpError::InvalidArgument(
                    "session is already logged in".to_string(),
                ));
            }
            SessionState::Closed => return Err(FtpError::SessionClosed),
        }

        let mut step = LoginStep::AwaitingUser;
        let mut cmd = Command::with_arg(Verb::USER, username)?;
        while step != LoginStep::LoggedIn {
            let reply = self.execute(&cmd, "login").await?;
            match next_step(step, reply.code(), account.is_some()) {
                LoginTransition::Done => step = LoginStep::LoggedIn,
                LoginTransition::Send(next, verb) => {
                    let arg = if verb == Verb::PASS {
                        password
                    } else {
                        account.unwrap_or_default()
                    };
                    cmd = Command::with_arg(verb, arg)?;
                    step = next;
                }
                LoginTransition::Rejected | LoginTransition::MissingAccount => {
                    return Err(FtpError::Auth(ReplyContext::new(&cmd, &reply)));
                }
                LoginTransition::OutOfSequence => return Err(self.violation(&cmd, &reply)),
            }
        }

        self.state = SessionState::Authenticated;
        self.transfer_mode = None;
        info!("Logged in as {username}");

        if self.is_secure() {
            self.protect_data_channel().await?;
        }
        Ok(())
    }

    /// `PBSZ 0` + `PROT P` (RFC 4217). A refusal leaves data connections
    /// unencrypted.
    async fn protect_data_channel(&mut self) -> FtpResult<()> {
        let pbsz = Command::with_arg(Verb::PBSZ, "0")?;
        let reply = self.execute(&pbsz, "pbsz").await?;
        if !reply.is_success() {
            warn!(
                "PBSZ refused with {}, data connections stay unprotected",
                reply.code()
            );
            return Ok(());
        }

        let prot = Command::with_arg(Verb::PROT, "P")?;
        let reply = self.execute(&prot, "prot").await?;
        if reply.is_success() {
            self.protected_data = true;
            debug!("Data connections protected");
        } else {
            warn!(
                "PROT P refused with {}, data connections stay unprotected",
                reply.code()
            );
        }
        Ok(())
    }
}
