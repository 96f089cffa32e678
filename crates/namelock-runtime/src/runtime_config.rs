use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::reconciliation_loop::ReconciliationLoopConfig;

pub const DEFAULT_CREDENTIAL_FILE: &str = "appstate.json";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_LOG_CAPACITY: usize = 500;
pub const DEFAULT_STATUS_LOG_LIMIT: usize = 20;

/// Process-level settings for one `NameLockContext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLockRuntimeConfig {
    pub credential_path: PathBuf,
    pub poll_interval: Duration,
    pub correction_delay: Duration,
    pub call_timeout: Duration,
    pub log_capacity: usize,
    pub status_log_limit: usize,
}

impl Default for NameLockRuntimeConfig {
    fn default() -> Self {
        Self {
            credential_path: PathBuf::from(DEFAULT_CREDENTIAL_FILE),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            correction_delay: Duration::ZERO,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            status_log_limit: DEFAULT_STATUS_LOG_LIMIT,
        }
    }
}

impl NameLockRuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.credential_path.as_os_str().is_empty() {
            bail!("credential path cannot be empty");
        }
        if self.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        if self.call_timeout.is_zero() {
            bail!("call timeout must be greater than zero");
        }
        if self.log_capacity == 0 {
            bail!("log capacity must be greater than zero");
        }
        Ok(())
    }

    pub fn loop_config(&self) -> ReconciliationLoopConfig {
        ReconciliationLoopConfig {
            poll_interval: self.poll_interval,
            correction_delay: self.correction_delay,
            call_timeout: self.call_timeout,
        }
    }
}
