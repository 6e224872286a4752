//! Transfer operations
//!
//! `get`, `put`, and the directory listings. Every transfer follows the same
//! sequence: TYPE if the representation changes, data channel negotiation, the
//! transfer command with its preliminary reply, the byte copy, closing the data
//! connection, and finally the completion reply.

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::client::Session;
use crate::control::FtpStream;
use crate::error::{DataChannelError, FtpError, FtpResult, ReplyContext, TransferError};
use crate::protocol::responses::{
    CANT_OPEN_DATA_CONNECTION, DATA_CONNECTION_OPEN, FILE_ACTION_OK, FILE_STATUS_OK,
    TRANSFER_COMPLETE,
};
use crate::protocol::{Command, Verb};
use crate::transfer::TransferMode;
use crate::transfer::copy::{self, CopyError, CopyErrorKind};

impl Session {
    /// Downloads `remote` into `sink`. Returns the number of bytes written to
    /// the sink.
    pub async fn get<W>(&mut self, remote: &str, sink: &mut W, mode: TransferMode) -> FtpResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::RETR, remote)?;
        self.ensure_type(mode).await?;

        let mut data = self.start_transfer(&cmd).await?;
        let copied = copy::receive(
            &mut data,
            sink,
            mode,
            self.config.transfer.buffer_size,
            self.config.transfer.idle_timeout(),
        )
        .await;
        self.close_data(data).await;

        let bytes = self.conclude(&cmd, copied).await?;
        info!("Downloaded {remote} ({bytes} bytes)");
        Ok(bytes)
    }

    /// Uploads everything `source` yields to `remote`. Returns the number of
    /// bytes read from the source.
    pub async fn put<R>(&mut self, source: &mut R, remote: &str, mode: TransferMode) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.require_login()?;
        let cmd = Command::with_arg(Verb::STOR, remote)?;
        self.ensure_type(mode).await?;

        let mut data = self.start_transfer(&cmd).await?;
        let copied = copy::send(
            source,
            &mut data,
            mode,
            self.config.transfer.buffer_size,
            self.config.transfer.idle_timeout(),
        )
        .await;
        drop(data);

        let bytes = self.conclude(&cmd, copied).await?;
        info!("Uploaded {remote} ({bytes} bytes)");
        Ok(bytes)
    }

    /// `LIST`: server-formatted directory listing, one entry per line.
    pub async fn list(&mut self, path: Option<&str>) -> FtpResult<Vec<String>> {
        self.listing(Verb::LIST, path).await
    }

    /// `NLST`: bare names.
    pub async fn nlst(&mut self, path: Option<&str>) -> FtpResult<Vec<String>> {
        self.listing(Verb::NLST, path).await
    }

    async fn listing(&mut self, verb: Verb, path: Option<&str>) -> FtpResult<Vec<String>> {
        self.require_login()?;
        let cmd = Command::with_optional_arg(verb, path)?;

        // listings are read as-is; the current TYPE is left alone
        let mut data = self.start_transfer(&cmd).await?;
        let mut raw = Vec::new();
        let copied = copy::receive(
            &mut data,
            &mut raw,
            TransferMode::Binary,
            self.config.transfer.buffer_size,
            self.config.transfer.idle_timeout(),
        )
        .await;
        self.close_data(data).await;
        self.conclude(&cmd, copied).await?;

        let text = String::from_utf8_lossy(&raw);
        Ok(text
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Sends `TYPE` only when `mode` differs from the last acknowledged type.
    pub(crate) async fn ensure_type(&mut self, mode: TransferMode) -> FtpResult<()> {
        if self.transfer_mode == Some(mode) {
            return Ok(());
        }
        let cmd = Command::with_arg(Verb::TYPE, mode.type_code())?;
        let reply = self.execute(&cmd, "type").await?;
        if reply.is_success() {
            self.transfer_mode = Some(mode);
            Ok(())
        } else if reply.is_failure() {
            self.transfer_mode = None;
            Err(FtpError::Unsupported(ReplyContext::new(&cmd, &reply)))
        } else {
            Err(self.violation(&cmd, &reply))
        }
    }

    /// Negotiates the data channel, sends `cmd` and waits for its preliminary
    /// reply, then completes the data connection.
    async fn start_transfer(&mut self, cmd: &Command) -> FtpResult<FtpStream> {
        let pending = self.open_data_channel().await?;
        let reply = self.execute(cmd, "transfer start").await?;
        match reply.code() {
            DATA_CONNECTION_OPEN | FILE_STATUS_OK => {}
            CANT_OPEN_DATA_CONNECTION => {
                return Err(DataChannelError::Negotiation(ReplyContext::new(cmd, &reply)).into());
            }
            _ if reply.is_failure() => {
                return Err(FtpError::filesystem(ReplyContext::new(cmd, &reply)));
            }
            _ => return Err(self.violation(cmd, &reply)),
        }

        match self.finish_data_channel(pending).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // the server still owes a completion reply for the command
                if self.is_connected() {
                    self.drain_completion().await;
                }
                Err(e)
            }
        }
    }

    async fn close_data(&mut self, mut data: FtpStream) {
        match timeout(self.config.transfer.idle_timeout(), data.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("data connection shutdown failed: {e}"),
            Err(_) => debug!("data connection shutdown timed out"),
        }
    }

    /// Turns the copy outcome into the operation result, reading the
    /// completion reply whenever the control channel is still in sync.
    async fn conclude(&mut self, cmd: &Command, copied: Result<u64, CopyError>) -> FtpResult<u64> {
        match copied {
            Ok(bytes) => {
                let reply = self.read_reply("transfer completion").await?;
                match reply.code() {
                    TRANSFER_COMPLETE | FILE_ACTION_OK => Ok(bytes),
                    _ => Err(TransferError::Unconfirmed {
                        reply: ReplyContext::new(cmd, &reply),
                        bytes,
                    }
                    .into()),
                }
            }
            Err(CopyError {
                kind: CopyErrorKind::Idle,
                bytes,
            }) => {
                debug!("{} stalled after {bytes} bytes", cmd.verb().as_str());
                self.check(Err(FtpError::Timeout("transfer idle")))
            }
            Err(CopyError {
                kind: CopyErrorKind::Data(source),
                bytes,
            }) => {
                self.drain_completion().await;
                Err(TransferError::DataStream { source, bytes }.into())
            }
            Err(CopyError {
                kind: CopyErrorKind::Local(e),
                ..
            }) => {
                self.drain_completion().await;
                Err(FtpError::LocalIo(e))
            }
        }
    }

    /// Reads and discards the completion reply of a failed transfer.
    async fn drain_completion(&mut self) {
        match self.read_reply("transfer completion").await {
            Ok(reply) => debug!("failed transfer completed with {}", reply.code()),
            Err(e) => debug!("no completion reply after failed transfer: {e}"),
        }
    }
}
