//! Drift detection and reconciliation loop.
//!
//! One tick is Query → Compare → (Reconcile)? → Sleep. The loop owns its
//! session for the duration of a run and observes a per-run cancellation
//! signal before every external call and while sleeping. Corrections are
//! fire-and-forget: a slow `set_title` never delays the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity_log::ActivityLog;
use crate::messenger::{extract_thread_name, FetchError, MessengerSession, SetTitleError};

const RAW_INFO_LOG_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockConfigError {
    #[error("groupID and lockedName required.")]
    Missing,
    #[error("groupID must not contain whitespace or control characters.")]
    MalformedThreadId,
    #[error("lockedName must not contain control characters.")]
    MalformedTargetName,
}

/// Target thread and the exact name it must keep. Immutable for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    pub thread_id: String,
    pub target_name: String,
}

impl LockConfig {
    /// Trims surrounding whitespace from both fields; inner whitespace and
    /// symbols in the name are kept verbatim.
    pub fn new(thread_id: &str, target_name: &str) -> Result<Self, LockConfigError> {
        let thread_id = thread_id.trim();
        let target_name = target_name.trim();
        if thread_id.is_empty() || target_name.is_empty() {
            return Err(LockConfigError::Missing);
        }
        if thread_id
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
        {
            return Err(LockConfigError::MalformedThreadId);
        }
        if target_name.chars().any(char::is_control) {
            return Err(LockConfigError::MalformedTargetName);
        }
        Ok(Self {
            thread_id: thread_id.to_string(),
            target_name: target_name.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationLoopConfig {
    pub poll_interval: Duration,
    /// Extra wait before a corrective rename; zero disables it.
    pub correction_delay: Duration,
    /// Upper bound for each external call issued by the loop.
    pub call_timeout: Duration,
}

impl Default for ReconciliationLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            correction_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoopCounters {
    ticks: AtomicU64,
    drift_detected: AtomicU64,
    corrections_succeeded: AtomicU64,
    corrections_failed: AtomicU64,
    fetch_failures: AtomicU64,
    unreadable_names: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCountersSnapshot {
    pub ticks: u64,
    pub drift_detected: u64,
    pub corrections_succeeded: u64,
    pub corrections_failed: u64,
    pub fetch_failures: u64,
    pub unreadable_names: u64,
}

impl LoopCounters {
    pub fn snapshot(&self) -> LoopCountersSnapshot {
        LoopCountersSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            drift_detected: self.drift_detected.load(Ordering::Relaxed),
            corrections_succeeded: self.corrections_succeeded.load(Ordering::Relaxed),
            corrections_failed: self.corrections_failed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            unreadable_names: self.unreadable_names.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Correct,
    NameUnreadable,
    FetchFailed(FetchError),
    /// The platform invalidated the session; the run cannot continue.
    SessionRejected(FetchError),
    /// Stop was observed before an external call was issued.
    Cancelled,
    /// Drift detected; the correction runs detached on this handle.
    Reconciling(JoinHandle<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    SessionRejected,
}

pub struct ReconciliationLoop {
    session: Arc<dyn MessengerSession>,
    lock: LockConfig,
    config: ReconciliationLoopConfig,
    log: Arc<ActivityLog>,
    counters: Arc<LoopCounters>,
    cancel_rx: watch::Receiver<bool>,
}

impl ReconciliationLoop {
    pub fn new(
        session: Arc<dyn MessengerSession>,
        lock: LockConfig,
        config: ReconciliationLoopConfig,
        log: Arc<ActivityLog>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            lock,
            config,
            log,
            counters: Arc::new(LoopCounters::default()),
            cancel_rx,
        }
    }

    pub fn counters(&self) -> Arc<LoopCounters> {
        Arc::clone(&self.counters)
    }

    pub fn lock_config(&self) -> &LockConfig {
        &self.lock
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Runs ticks until cancellation or session rejection. A finished loop is
    /// never resumed; a new run needs a new loop.
    pub async fn run(mut self) -> LoopExit {
        self.log.info(format!(
            "Locker loop initialized. Monitoring thread: {}",
            self.lock.thread_id
        ));
        loop {
            if self.is_cancelled() {
                self.log
                    .info("Bot running flag false; locker loop stopped.");
                return LoopExit::Stopped;
            }

            if let TickOutcome::SessionRejected(error) = self.tick().await {
                self.log.error(format!(
                    "Locker stopped: {error}. Upload a fresh appstate and start again."
                ));
                return LoopExit::SessionRejected;
            }

            let woke_by_signal = tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => None,
                changed = self.cancel_rx.changed() => Some(changed.is_ok()),
            };
            if woke_by_signal == Some(false) {
                self.log
                    .info("Locker controller dropped; locker loop stopped.");
                return LoopExit::Stopped;
            }
        }
    }

    /// Executes one Query → Compare → (Reconcile)? step without sleeping.
    pub async fn tick(&self) -> TickOutcome {
        if self.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        LoopCounters::bump(&self.counters.ticks);

        let info = match self.fetch_thread_info().await {
            Ok(info) => info,
            Err(error) if error.is_session_rejected() => {
                LoopCounters::bump(&self.counters.fetch_failures);
                return TickOutcome::SessionRejected(error);
            }
            Err(error) => {
                LoopCounters::bump(&self.counters.fetch_failures);
                self.log
                    .warn(format!("Error fetching thread info: {error}"));
                return TickOutcome::FetchFailed(error);
            }
        };

        let Some(actual_name) = extract_thread_name(&info) else {
            LoopCounters::bump(&self.counters.unreadable_names);
            self.log.warn(format!(
                "Could not read group name from thread info. Raw info: {}",
                truncate_raw_info(&info)
            ));
            return TickOutcome::NameUnreadable;
        };

        if actual_name == self.lock.target_name {
            self.log
                .info(format!("Group name is correct: {actual_name}"));
            return TickOutcome::Correct;
        }

        if self.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        LoopCounters::bump(&self.counters.drift_detected);
        self.log.warn(format!(
            "Detected name change: \"{actual_name}\" → resetting to \"{}\"",
            self.lock.target_name
        ));
        TickOutcome::Reconciling(self.spawn_correction())
    }

    async fn fetch_thread_info(&self) -> Result<Value, FetchError> {
        match tokio::time::timeout(
            self.config.call_timeout,
            self.session.get_thread_info(&self.lock.thread_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(duration_ms(self.config.call_timeout))),
        }
    }

    fn spawn_correction(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let lock = self.lock.clone();
        let log = Arc::clone(&self.log);
        let counters = Arc::clone(&self.counters);
        let cancel_rx = self.cancel_rx.clone();
        let correction_delay = self.config.correction_delay;
        let call_timeout = self.config.call_timeout;

        tokio::spawn(async move {
            if !correction_delay.is_zero() {
                tokio::time::sleep(correction_delay).await;
            }
            if *cancel_rx.borrow() {
                log.info("Pending name reset skipped: locker stopped.");
                return;
            }

            let result = match tokio::time::timeout(
                call_timeout,
                session.set_title(&lock.target_name, &lock.thread_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(SetTitleError::Timeout(duration_ms(call_timeout))),
            };
            match result {
                Ok(()) => {
                    LoopCounters::bump(&counters.corrections_succeeded);
                    log.info("Group name reset successfully.");
                }
                Err(error) => {
                    LoopCounters::bump(&counters.corrections_failed);
                    log.error(format!("Failed to reset group name: {error}"));
                }
            }
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn truncate_raw_info(info: &Value) -> String {
    let raw = info.to_string();
    if raw.chars().count() <= RAW_INFO_LOG_MAX_CHARS {
        return raw;
    }
    let mut truncated = raw.chars().take(RAW_INFO_LOG_MAX_CHARS).collect::<String>();
    truncated.push('…');
    truncated
}
