// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Malware scanning of uploads before any crypto or persistence.
//!
//! [`ClamdScanner`] speaks the clamd `zINSTREAM` protocol over TCP:
//!
//! ```text
//! zINSTREAM\0  (<u32 BE len><chunk>)*  <0u32>   →   "stream: OK\0"
//!                                               →   "stream: <sig> FOUND\0"
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_REPLY_BYTES: u64 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    #[error("scan timed out after {0:?}")]
    Timeout(Duration),

    #[error("scanner error: {0}")]
    Scanner(String),
}

/// Outcome of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanVerdict {
    pub infected: bool,
    pub signatures: Vec<String>,
}

impl ScanVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn infected(signatures: Vec<String>) -> Self {
        Self {
            infected: true,
            signatures,
        }
    }
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError>;

    /// Short name for logs and readiness output.
    fn name(&self) -> &'static str;
}

/// clamd over TCP.
pub struct ClamdScanner {
    addr: String,
    timeout: Duration,
}

impl ClamdScanner {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn instream(&self, bytes: &[u8]) -> Result<String, ScanError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ScanError::Unavailable(format!("{}: {e}", self.addr)))?;

        let io_err = |e: std::io::Error| ScanError::Unavailable(e.to_string());

        stream.write_all(b"zINSTREAM\0").await.map_err(io_err)?;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            // Chunks are at most CHUNK_SIZE, which fits in u32.
            let len = chunk.len() as u32;
            stream.write_all(&len.to_be_bytes()).await.map_err(io_err)?;
            stream.write_all(chunk).await.map_err(io_err)?;
        }
        stream.write_all(&0u32.to_be_bytes()).await.map_err(io_err)?;
        stream.flush().await.map_err(io_err)?;

        let mut reply = Vec::new();
        (&mut stream)
            .take(MAX_REPLY_BYTES)
            .read_to_end(&mut reply)
            .await
            .map_err(io_err)?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }
}

#[async_trait]
impl MalwareScanner for ClamdScanner {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        let reply = tokio::time::timeout(self.timeout, self.instream(bytes))
            .await
            .map_err(|_| ScanError::Timeout(self.timeout))??;
        debug!(reply = %reply.trim_end_matches('\0').trim(), "clamd replied");
        parse_reply(&reply)
    }

    fn name(&self) -> &'static str {
        "clamd"
    }
}

/// Accepts everything. Used when no scanner is configured.
pub struct DisabledScanner;

#[async_trait]
impl MalwareScanner for DisabledScanner {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        debug!(size = bytes.len(), "Malware scanning disabled; accepting upload");
        Ok(ScanVerdict::clean())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Parse a clamd reply line such as `stream: OK` or
/// `stream: Win.Test.EICAR_HDB-1 FOUND`.
pub fn parse_reply(reply: &str) -> Result<ScanVerdict, ScanError> {
    let line = reply.trim_end_matches('\0').trim();
    let body = line
        .split_once(": ")
        .map(|(_, rest)| rest)
        .unwrap_or(line);

    if body == "OK" {
        return Ok(ScanVerdict::clean());
    }
    if let Some(signature) = body.strip_suffix(" FOUND") {
        return Ok(ScanVerdict::infected(vec![signature.to_string()]));
    }
    if body.ends_with("ERROR") {
        warn!(reply = %line, "clamd reported an error");
        return Err(ScanError::Scanner(line.to_string()));
    }
    Err(ScanError::Scanner(format!("unexpected reply: {line}")))
}
