//! Credential material transfer
//!
//! Strategies fetch key material, certificates, and provisioning profiles
//! from declared locations into transient work areas. Remote locations go
//! through `curl` with a bounded budget; downloads retry with exponential
//! backoff, export invocations never do.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::tool::run_with_timeout;

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("source not found: {0}")]
    SourceMissing(String),

    #[error("download of {url} failed after {attempts} attempt(s): {detail}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        detail: String,
    },

    #[error("download tool '{0}' is not installed or not on PATH")]
    ToolMissing(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (must be >= 1)
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each retry
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `n` (1-based; attempt 1 has no delay)
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            // initial * 2^(attempt - 2), saturating
            let shift = (attempt - 2).min(16);
            self.initial_backoff
                .checked_mul(1u32 << shift)
                .unwrap_or(Duration::from_secs(300))
        }
    }
}

/// Fetches a declared source into a local destination file
pub trait Fetcher {
    fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError>;
}

/// Production fetcher: local paths are copied, remote URLs go through curl
pub struct CurlFetcher {
    timeout: Duration,
    retry: RetryPolicy,
}

impl CurlFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    fn is_remote(source: &str) -> bool {
        source.starts_with("http://") || source.starts_with("https://")
    }

    fn download_once(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        let max_time = self.timeout.as_secs().to_string();
        let mut command = Command::new("curl");
        command.args([
            "-fsSL",
            "--connect-timeout",
            "30",
            "--max-time",
            max_time.as_str(),
            "-o",
        ]);
        command.arg(dest);
        command.arg(url);

        let outcome = run_with_timeout(command, self.timeout + Duration::from_secs(10))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    TransferError::ToolMissing("curl".to_string())
                } else {
                    TransferError::Io(e)
                }
            })?;

        if !outcome.success() {
            return Err(TransferError::DownloadFailed {
                url: url.to_string(),
                attempts: 1,
                detail: outcome.stderr_tail(3),
            });
        }
        Ok(())
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        if !Self::is_remote(source) {
            let path = Path::new(source);
            if !path.exists() {
                return Err(TransferError::SourceMissing(source.to_string()));
            }
            fs::copy(path, dest)?;
            debug!("copied {} -> {}", source, dest.display());
            return Ok(());
        }

        let mut last_detail = String::new();
        for attempt in 1..=self.retry.max_attempts {
            let backoff = self.retry.backoff_before(attempt);
            if !backoff.is_zero() {
                warn!(
                    "retrying download (attempt {}/{}) after {:?}",
                    attempt, self.retry.max_attempts, backoff
                );
                thread::sleep(backoff);
            }

            match self.download_once(source, dest) {
                Ok(()) => {
                    debug!("downloaded {} -> {}", source, dest.display());
                    return Ok(());
                }
                // Missing curl will not fix itself between attempts.
                Err(TransferError::ToolMissing(t)) => {
                    return Err(TransferError::ToolMissing(t))
                }
                Err(e) => {
                    last_detail = e.to_string();
                }
            }
        }

        Err(TransferError::DownloadFailed {
            url: source.to_string(),
            attempts: self.retry.max_attempts,
            detail: last_detail,
        })
    }
}
