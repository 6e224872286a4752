//! Client session management
//!
//! A `Session` owns one control connection and every piece of protocol state
//! tied to it. Operations are spread over the `auth`, `navigate`, `storage`
//! and `transfer` modules as further `impl Session` blocks; this module holds
//! connection setup, reply screening, and teardown.

use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::client::SessionState;
use crate::config::ClientConfig;
use crate::control::{ChannelLimits, ControlChannel, FtpStream, TlsContext};
use crate::error::{ConnectError, FtpError, FtpResult, ProtocolError, ReplyContext};
use crate::protocol::responses::{
    AUTH_OK, NOT_IMPLEMENTED, READY, SERVICE_NOT_AVAILABLE, SERVICE_READY_SOON,
    SYNTAX_ERROR, SYSTEM_STATUS,
};
use crate::protocol::{Command, Reply, ServerFeatures, Verb};
use crate::transfer::{ChannelMode, TransferMode};
use crate::utils::network;

pub struct Session {
    pub(crate) config: ClientConfig,
    pub(crate) control: Option<ControlChannel<FtpStream>>,
    pub(crate) state: SessionState,
    /// `None` until the first TYPE command succeeds
    pub(crate) transfer_mode: Option<TransferMode>,
    pub(crate) channel_mode: ChannelMode,
    pub(crate) tls: Option<TlsContext>,
    /// PROT P accepted: data connections are TLS-wrapped
    pub(crate) protected_data: bool,
}

impl Session {
    /// Opens the control connection, performs the TLS handshake if
    /// configured, and waits for the server greeting.
    ///
    /// The returned session is connected but not yet logged in.
    pub async fn connect(config: ClientConfig) -> FtpResult<Session> {
        let conn = &config.connection;
        let (host, port) = network::split_host_port(&conn.address, conn.default_port())?;

        info!("Connecting to {}", config.display_url());

        let tcp = match timeout(conn.connect_timeout(), TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(ConnectError::Tcp(conn.address.clone(), e).into()),
            Err(_) => return Err(ConnectError::TimedOut(conn.address.clone()).into()),
        };
        if let Err(e) = tcp.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on control connection: {e}");
        }

        let tls = if conn.use_tls {
            Some(TlsContext::new(&host, conn.accept_invalid_certs)?)
        } else {
            None
        };

        let limits = ChannelLimits {
            max_line_len: conn.max_line_length,
            max_reply_lines: conn.max_reply_lines,
            reply_timeout: conn.reply_timeout(),
        };

        let stream = match &tls {
            Some(ctx) if conn.implicit_tls => {
                let secured = ctx
                    .handshake(tcp, conn.connect_timeout())
                    .await
                    .map_err(ConnectError::from)?;
                FtpStream::Tls(Box::new(secured))
            }
            _ => FtpStream::Plain(tcp),
        };

        let mut control = ControlChannel::new(stream, limits);
        wait_greeting(&mut control).await?;

        if let Some(ctx) = &tls {
            if !conn.implicit_tls {
                control = upgrade_explicit(control, ctx, limits, conn.connect_timeout()).await?;
            }
        }

        info!(
            "Connected to {} ({})",
            conn.address,
            if tls.is_some() { "tls" } else { "plain" }
        );

        let channel_mode = ChannelMode::from_passive(config.transfer.passive);
        Ok(Session {
            config,
            control: Some(control),
            state: SessionState::Unauthenticated,
            transfer_mode: None,
            channel_mode,
            tls,
            protected_data: false,
        })
    }

    /// Connects and logs in with the configured credentials.
    pub async fn open(config: ClientConfig) -> FtpResult<Session> {
        let username = config.connection.username.clone();
        let password = config.connection.password.clone();
        let mut session = Session::connect(config).await?;
        if let Err(e) = session.login(&username, &password).await {
            session.disconnect().await;
            return Err(e);
        }
        Ok(session)
    }

    // --------------------
    // Accessors
    // --------------------

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Whether the control channel runs over TLS.
    pub fn is_secure(&self) -> bool {
        self.control
            .as_ref()
            .map(|c| c.get_ref().is_secure())
            .unwrap_or(false)
    }

    /// Whether data connections are TLS-wrapped (PROT P accepted).
    pub fn is_data_protected(&self) -> bool {
        self.protected_data
    }

    /// Last representation type acknowledged by the server.
    pub fn transfer_mode(&self) -> Option<TransferMode> {
        self.transfer_mode
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    /// Chooses passive or active data connections. Takes effect on the next
    /// data channel; nothing is sent to the server.
    pub fn set_passive_mode(&mut self, enabled: bool) {
        self.channel_mode = ChannelMode::from_passive(enabled);
        debug!("Data channel mode set to {:?}", self.channel_mode);
    }

    pub fn display_url(&self) -> String {
        self.config.display_url()
    }

    // --------------------
    // Simple commands
    // --------------------

    pub async fn noop(&mut self) -> FtpResult<()> {
        self.ensure_open()?;
        let cmd = Command::new(Verb::NOOP);
        let reply = self.execute(&cmd, "noop").await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(self.violation(&cmd, &reply))
        }
    }

    /// Queries the server's extension list with FEAT. Servers that do not
    /// know FEAT yield an empty list.
    pub async fn features(&mut self) -> FtpResult<ServerFeatures> {
        self.ensure_open()?;
        let cmd = Command::new(Verb::FEAT);
        let reply = self.execute(&cmd, "feat").await?;
        match reply.code() {
            SYSTEM_STATUS => Ok(ServerFeatures::from_reply(&reply)),
            SYNTAX_ERROR | NOT_IMPLEMENTED => Ok(ServerFeatures::default()),
            _ => Err(self.violation(&cmd, &reply)),
        }
    }

    /// Sends QUIT and closes the control connection regardless of the reply.
    ///
    /// Safe to call repeatedly: a closed session sends nothing.
    pub async fn disconnect(&mut self) {
        self.state = SessionState::Closed;
        let Some(mut control) = self.control.take() else {
            return;
        };

        let cmd = Command::new(Verb::QUIT);
        match control.execute(&cmd, "quit").await {
            Ok(reply) => debug!("QUIT answered with {}", reply.code()),
            Err(e) => debug!("QUIT failed: {e}"),
        }
        control.shutdown().await;
        info!("Disconnected from {}", self.config.connection.address);
    }

    // --------------------
    // Reply screening
    // --------------------

    pub(crate) fn ensure_open(&self) -> FtpResult<()> {
        if self.state.is_open() && self.control.is_some() {
            Ok(())
        } else {
            Err(FtpError::SessionClosed)
        }
    }

    pub(crate) fn require_login(&self) -> FtpResult<()> {
        match self.state {
            SessionState::Authenticated => Ok(()),
            SessionState::Unauthenticated => Err(FtpError::NotLoggedIn),
            SessionState::Closed => Err(FtpError::SessionClosed),
        }
    }

    /// Sends one command and reads its complete reply.
    pub(crate) async fn execute(&mut self, cmd: &Command, stage: &'static str) -> FtpResult<Reply> {
        let control = self.control.as_mut().ok_or(FtpError::SessionClosed)?;
        let result = control.execute(cmd, stage).await;
        self.screen(result, || cmd.redacted())
    }

    /// Reads a reply that was not preceded by a command of ours, such as the
    /// final confirmation of a transfer.
    pub(crate) async fn read_reply(&mut self, stage: &'static str) -> FtpResult<Reply> {
        let control = self.control.as_mut().ok_or(FtpError::SessionClosed)?;
        let result = control.timed_read_reply(stage).await;
        self.screen(result, || stage.to_string())
    }

    fn screen<F>(&mut self, result: FtpResult<Reply>, label: F) -> FtpResult<Reply>
    where
        F: FnOnce() -> String,
    {
        let reply = self.check(result)?;
        if reply.code() == SERVICE_NOT_AVAILABLE {
            let ctx = ReplyContext {
                command: label(),
                code: reply.code(),
                text: reply.text(),
            };
            return self.check(Err(ProtocolError::ServiceNotAvailable(ctx).into()));
        }
        Ok(reply)
    }

    /// Closes the session if `result` carries a fatal error.
    pub(crate) fn check<T>(&mut self, result: FtpResult<T>) -> FtpResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.state.is_open() {
                warn!(
                    "Closing session to {} after fatal error: {e}",
                    self.config.connection.address
                );
                self.abandon();
            }
        }
        result
    }

    /// Builds the error for a reply that makes no sense at this point of the
    /// exchange and closes the session, since the protocol is out of sync.
    pub(crate) fn violation(&mut self, cmd: &Command, reply: &Reply) -> FtpError {
        let err: FtpError = ProtocolError::UnexpectedReply(ReplyContext::new(cmd, reply)).into();
        warn!("Unexpected reply, closing session: {err}");
        self.abandon();
        err
    }

    /// Drops the control connection without QUIT.
    pub(crate) fn abandon(&mut self) {
        self.control = None;
        self.state = SessionState::Closed;
    }
}

async fn wait_greeting(control: &mut ControlChannel<FtpStream>) -> FtpResult<()> {
    loop {
        let reply = control.timed_read_reply("greeting").await?;
        match reply.code() {
            SERVICE_READY_SOON => continue,
            READY => return Ok(()),
            _ => {
                return Err(
                    ConnectError::Greeting(ReplyContext::stage("greeting", &reply)).into(),
                );
            }
        }
    }
}

/// `AUTH TLS` then a handshake over the same socket (RFC 4217).
async fn upgrade_explicit(
    mut control: ControlChannel<FtpStream>,
    ctx: &TlsContext,
    limits: ChannelLimits,
    handshake_timeout: std::time::Duration,
) -> FtpResult<ControlChannel<FtpStream>> {
    let cmd = Command::with_arg(Verb::AUTH, "TLS")?;
    let reply = control.execute(&cmd, "auth tls").await?;
    if reply.code() != AUTH_OK {
        return Err(ConnectError::TlsRejected(ReplyContext::new(&cmd, &reply)).into());
    }

    let tcp = control.into_inner().into_plain().ok_or_else(|| {
        ConnectError::TlsHandshake(std::io::Error::other("control channel already secured"))
    })?;
    let secured = ctx
        .handshake(tcp, handshake_timeout)
        .await
        .map_err(ConnectError::from)?;
    debug!("Control channel upgraded to TLS");
    Ok(ControlChannel::new(FtpStream::Tls(Box::new(secured)), limits))
}
