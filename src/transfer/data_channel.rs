//! Data channel negotiation
//!
//! Opens the secondary connection used by one transfer or listing. Passive
//! mode (`EPSV`/`PASV`) connects out before the transfer command is sent;
//! active mode (`EPRT`/`PORT`) binds a listener and accepts once the server
//! has acknowledged the transfer command. Either way the connection is only
//! TLS-wrapped after that acknowledgement.

use std::net::{IpAddr, SocketAddr};

use log::debug;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::client::Session;
use crate::control::FtpStream;
use crate::control::tls::HandshakeError;
use crate::error::{DataChannelError, FtpError, FtpResult, ReplyContext};
use crate::protocol::responses::{EXTENDED_PASSIVE_MODE, NOT_IMPLEMENTED, PASSIVE_MODE, SYNTAX_ERROR};
use crate::protocol::{Command, Verb};
use crate::transfer::ChannelMode;
use crate::utils::network;

/// A data connection that has been negotiated but not yet handed over to a
/// transfer.
#[derive(Debug)]
pub(crate) enum PendingData {
    /// Passive: already connected to the server
    Connected(TcpStream),
    /// Active: waiting for the server to connect
    Listening(TcpListener),
}

impl Session {
    /// Negotiates a data connection in the session's current channel mode.
    pub(crate) async fn open_data_channel(&mut self) -> FtpResult<PendingData> {
        let result = match self.channel_mode {
            ChannelMode::Passive => self.negotiate_passive().await.map(PendingData::Connected),
            ChannelMode::Active => self.negotiate_active().await.map(PendingData::Listening),
        };
        self.check(result)
    }

    /// Completes a negotiated connection after the server's preliminary reply
    /// to the transfer command.
    pub(crate) async fn finish_data_channel(&mut self, pending: PendingData) -> FtpResult<FtpStream> {
        let result = self.establish(pending).await;
        self.check(result)
    }

    fn control_addrs(&self) -> FtpResult<(SocketAddr, SocketAddr)> {
        let control = self.control.as_ref().ok_or(FtpError::SessionClosed)?;
        let stream = control.get_ref();
        let local = stream.local_addr().map_err(FtpError::LocalIo)?;
        let peer = stream.peer_addr().map_err(FtpError::LocalIo)?;
        Ok((local, peer))
    }

    async fn negotiate_passive(&mut self) -> FtpResult<TcpStream> {
        let (_, peer) = self.control_addrs()?;

        let mut target = None;
        if self.config.transfer.extended_passive || peer.is_ipv6() {
            target = self.request_epsv(peer).await?;
        }
        let target = match target {
            Some(addr) => addr,
            None => self.request_pasv(peer).await?,
        };

        debug!("Opening passive data connection to {target}");
        match timeout(self.config.transfer.data_timeout(), TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(DataChannelError::Connect(target, e).into()),
            Err(_) => Err(DataChannelError::TimedOut("data connect").into()),
        }
    }

    /// `None` when an IPv4 server does not know EPSV and PASV should be tried.
    async fn request_epsv(&mut self, peer: SocketAddr) -> FtpResult<Option<SocketAddr>> {
        let cmd = Command::new(Verb::EPSV);
        let reply = self.execute(&cmd, "epsv").await?;
        match reply.code() {
            EXTENDED_PASSIVE_MODE => {
                let port = reply.parse_epsv_229().ok_or_else(|| {
                    DataChannelError::InvalidAddress(ReplyContext::new(&cmd, &reply))
                })?;
                Ok(Some(SocketAddr::new(peer.ip(), port)))
            }
            SYNTAX_ERROR | NOT_IMPLEMENTED if peer.is_ipv4() => {
                debug!("EPSV not supported, falling back to PASV");
                Ok(None)
            }
            _ => Err(DataChannelError::Negotiation(ReplyContext::new(&cmd, &reply)).into()),
        }
    }

    async fn request_pasv(&mut self, peer: SocketAddr) -> FtpResult<SocketAddr> {
        let cmd = Command::new(Verb::PASV);
        let reply = self.execute(&cmd, "pasv").await?;
        if reply.code() != PASSIVE_MODE {
            return Err(DataChannelError::Negotiation(ReplyContext::new(&cmd, &reply)).into());
        }
        let announced = reply
            .parse_pasv_227()
            .ok_or_else(|| DataChannelError::InvalidAddress(ReplyContext::new(&cmd, &reply)))?;

        if self.config.transfer.trust_pasv_address {
            return Ok(announced);
        }
        // servers behind NAT often announce a private address
        if announced.ip() != peer.ip() {
            debug!(
                "PASV announced {}, connecting to control peer {} instead",
                announced.ip(),
                peer.ip()
            );
        }
        Ok(SocketAddr::new(peer.ip(), announced.port()))
    }

    async fn negotiate_active(&mut self) -> FtpResult<TcpListener> {
        let (local, _) = self.control_addrs()?;
        let bind_ip = match &self.config.transfer.active_bind_address {
            Some(s) => s.parse::<IpAddr>().map_err(|_| {
                FtpError::InvalidArgument(format!("invalid active bind address: {s}"))
            })?,
            None => local.ip(),
        };

        let listener = TcpListener::bind(SocketAddr::new(bind_ip, 0))
            .await
            .map_err(DataChannelError::Bind)?;
        let mut addr = listener.local_addr().map_err(DataChannelError::Bind)?;
        // a wildcard bind cannot be announced; the server reaches us where the
        // control connection came from
        if addr.ip().is_unspecified() {
            addr.set_ip(local.ip());
        }

        let port_arg = if self.config.transfer.extended_passive {
            None
        } else {
            network::format_port_argument(&addr)
        };
        let cmd = match port_arg {
            Some(arg) => Command::with_arg(Verb::PORT, arg)?,
            None => Command::with_arg(Verb::EPRT, network::format_eprt_argument(&addr))?,
        };

        let reply = self.execute(&cmd, "port").await?;
        if !reply.is_success() {
            return Err(DataChannelError::Negotiation(ReplyContext::new(&cmd, &reply)).into());
        }
        debug!("Listening for active data connection on {addr}");
        Ok(listener)
    }

    async fn establish(&mut self, pending: PendingData) -> FtpResult<FtpStream> {
        let limit = self.config.transfer.data_timeout();
        let tcp = match pending {
            PendingData::Connected(stream) => stream,
            PendingData::Listening(listener) => match timeout(limit, listener.accept()).await {
                Ok(Ok((stream, from))) => {
                    debug!("Accepted active data connection from {from}");
                    stream
                }
                Ok(Err(e)) => return Err(DataChannelError::Accept(e).into()),
                Err(_) => return Err(DataChannelError::TimedOut("data accept").into()),
            },
        };

        match (&self.tls, self.protected_data) {
            (Some(ctx), true) => match ctx.handshake(tcp, limit).await {
                Ok(stream) => Ok(FtpStream::Tls(Box::new(stream))),
                Err(HandshakeError::Failed(e)) => Err(DataChannelError::Tls(e).into()),
                Err(HandshakeError::TimedOut) => {
                    Err(DataChannelError::TimedOut("data tls handshake").into())
                }
            },
            _ => Ok(FtpStream::Plain(tcp)),
        }
    }
}
