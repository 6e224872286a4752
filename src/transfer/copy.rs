//! Byte pumps between the data connection and caller streams
//!
//! Each read from the data side (downloads) or the local source (uploads) is
//! bounded by the idle timeout. Byte counts are local bytes, after ASCII
//! translation.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::transfer::TransferMode;
use crate::transfer::ascii::{AsciiDecoder, AsciiEncoder};

/// Where a copy stopped and how far it got.
#[derive(Debug)]
pub struct CopyError {
    pub kind: CopyErrorKind,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum CopyErrorKind {
    /// No progress within the idle timeout
    Idle,
    /// Read or write on the data connection failed
    Data(io::Error),
    /// Caller's sink or source failed
    Local(io::Error),
}

impl CopyError {
    fn new(kind: CopyErrorKind, bytes: u64) -> Self {
        CopyError { kind, bytes }
    }
}

/// Copies the data connection into `sink` until EOF.
pub async fn receive<R, W>(
    data: &mut R,
    sink: &mut W,
    mode: TransferMode,
    buf_size: usize,
    idle: Duration,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buf_size];
    let mut decoded = Vec::new();
    let mut decoder = AsciiDecoder::new();
    let mut total = 0u64;

    loop {
        let n = match timeout(idle, data.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(CopyError::new(CopyErrorKind::Data(e), total)),
            Err(_) => return Err(CopyError::new(CopyErrorKind::Idle, total)),
        };

        let chunk: &[u8] = match mode {
            TransferMode::Binary => &buf[..n],
            TransferMode::Ascii => {
                decoded.clear();
                if n == 0 {
                    decoder.finish(&mut decoded);
                } else {
                    decoder.decode(&buf[..n], &mut decoded);
                }
                &decoded
            }
        };

        if !chunk.is_empty() {
            sink.write_all(chunk)
                .await
                .map_err(|e| CopyError::new(CopyErrorKind::Local(e), total))?;
            total += chunk.len() as u64;
        }

        if n == 0 {
            break;
        }
    }

    sink.flush()
        .await
        .map_err(|e| CopyError::new(CopyErrorKind::Local(e), total))?;
    Ok(total)
}

/// Copies `source` into the data connection until the source is exhausted,
/// then shuts down the write side so the server sees end of file.
pub async fn send<R, W>(
    source: &mut R,
    data: &mut W,
    mode: TransferMode,
    buf_size: usize,
    idle: Duration,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buf_size];
    let mut encoded = Vec::new();
    let mut encoder = AsciiEncoder::new();
    let mut total = 0u64;

    loop {
        let n = match timeout(idle, source.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(CopyError::new(CopyErrorKind::Local(e), total)),
            Err(_) => return Err(CopyError::new(CopyErrorKind::Idle, total)),
        };

        let chunk: &[u8] = match mode {
            TransferMode::Binary => &buf[..n],
            TransferMode::Ascii => {
                encoded.clear();
                encoder.encode(&buf[..n], &mut encoded);
                &encoded
            }
        };

        match timeout(idle, data.write_all(chunk)).await {
            Ok(Ok(())) => total += n as u64,
            Ok(Err(e)) => return Err(CopyError::new(CopyErrorKind::Data(e), total)),
            Err(_) => return Err(CopyError::new(CopyErrorKind::Idle, total)),
        }
    }

    match timeout(idle, data.shutdown()).await {
        Ok(Ok(())) => Ok(total),
        Ok(Err(e)) => Err(CopyError::new(CopyErrorKind::Data(e), total)),
        Err(_) => Err(CopyError::new(CopyErrorKind::Idle, total)),
    }
}
