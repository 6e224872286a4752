//! Control channel
//!
//! Owns the buffered control connection, writes commands, and reads complete
//! (possibly multi-line) replies with a bounded line length and line count.

use std::time::Duration;

use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use crate::error::{FtpError, FtpResult, ProtocolError};
use crate::protocol::{Command, Reply, ReplyParser};

/// Framing limits and the per-reply read timeout.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLimits {
    pub max_line_len: usize,
    pub max_reply_lines: usize,
    pub reply_timeout: Duration,
}

pub struct ControlChannel<S>
where
    S: AsyncRead + AsyncWrite,
{
    stream: BufStream<S>,
    limits: ChannelLimits,
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, limits: ChannelLimits) -> Self {
        ControlChannel {
            stream: BufStream::new(stream),
            limits,
        }
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Unwraps the underlying stream. Only call between replies: anything
    /// still buffered is discarded.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Writes one command and flushes it.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<(), ProtocolError> {
        debug!("> {}", cmd.redacted());
        let buf = cmd.encode();
        self.stream
            .write_all(&buf)
            .await
            .map_err(ProtocolError::SendFailed)?;
        self.stream
            .flush()
            .await
            .map_err(ProtocolError::SendFailed)?;
        Ok(())
    }

    async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        buf.clear();
        let limit = self.limits.max_line_len as u64;
        let len = (&mut self.stream)
            .take(limit)
            .read_until(b'\n', buf)
            .await
            .map_err(ProtocolError::ReadFailed)?;

        if len == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        if buf.last() != Some(&b'\n') {
            return if len as u64 >= limit {
                Err(ProtocolError::LineTooLong)
            } else {
                Err(ProtocolError::TruncatedLine)
            };
        }
        Ok(())
    }

    /// Reads one complete reply, accumulating continuation lines.
    pub async fn read_reply(&mut self) -> Result<Reply, ProtocolError> {
        let mut parser = ReplyParser::new(self.limits.max_reply_lines);
        let mut buf = Vec::<u8>::with_capacity(128);
        loop {
            self.read_line(&mut buf).await?;
            if let Some(reply) = parser.feed_line(&buf)? {
                debug!("< {} {}", reply.code(), reply.last_line());
                return Ok(reply);
            }
        }
    }

    /// `read_reply` bounded by the configured reply timeout.
    pub async fn timed_read_reply(&mut self, stage: &'static str) -> FtpResult<Reply> {
        match tokio::time::timeout(self.limits.reply_timeout, self.read_reply()).await {
            Ok(r) => r.map_err(FtpError::from),
            Err(_) => Err(FtpError::Timeout(stage)),
        }
    }

    /// Sends a command and reads its reply.
    pub async fn execute(&mut self, cmd: &Command, stage: &'static str) -> FtpResult<Reply> {
        self.send_command(cmd).await?;
        self.timed_read_reply(stage).await
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("control channel shutdown failed: {e}");
        }
    }
}
