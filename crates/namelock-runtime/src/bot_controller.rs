//! Process-wide run state and the single authority allowed to start or stop
//! the reconciliation loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity_log::ActivityLog;
use crate::credential_store::Credential;
use crate::messenger::LoginError;
use crate::reconciliation_loop::{
    LockConfig, LoopCounters, LoopCountersSnapshot, LoopExit, ReconciliationLoop,
    ReconciliationLoopConfig,
};
use crate::session_manager::SessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("Login failed: {0}")]
    Login(#[from] LoginError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// `stop()` arrived while the login was in flight; the session was dropped.
    CancelledDuringLogin,
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Started => "Bot started and logged in successfully.",
            Self::AlreadyRunning => "Bot already running.",
            Self::CancelledDuringLogin => {
                "Bot stop requested while logging in; locker not started."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyIdle,
}

impl StopOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Stopped => "Bot stop requested.",
            Self::AlreadyIdle => "Bot is not running.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub state: RunState,
    pub generation: u64,
    pub lock: Option<LockConfig>,
    pub counters: Option<LoopCountersSnapshot>,
    pub login_backend: Option<String>,
}

struct ActiveRun {
    generation: u64,
    lock: LockConfig,
    counters: Arc<LoopCounters>,
    cancel_tx: watch::Sender<bool>,
}

struct ControllerState {
    run_state: RunState,
    generation: u64,
    active: Option<ActiveRun>,
    tasks: Vec<JoinHandle<()>>,
}

struct ControllerShared {
    state: Mutex<ControllerState>,
    state_tx: watch::Sender<RunState>,
    sessions: Option<SessionManager>,
    loop_config: ReconciliationLoopConfig,
    log: Arc<ActivityLog>,
}

impl ControllerShared {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut ControllerState, run_state: RunState) {
        state.run_state = run_state;
        self.state_tx.send_replace(run_state);
    }

    /// Called by a loop task that exited on its own. Ignored when the run has
    /// already been superseded by `stop()` or a newer `start()`.
    fn finish_run(&self, generation: u64, exit: LoopExit) {
        let mut state = self.lock_state();
        let is_current = state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if !is_current {
            return;
        }
        state.active = None;
        self.publish(&mut state, RunState::Idle);
        if exit == LoopExit::SessionRejected {
            self.log
                .warn("Locker returned to idle after the session was rejected.");
        }
    }
}

/// Returns a `Starting` run to Idle when `start()` is dropped mid-login.
struct PendingLogin<'a> {
    shared: &'a ControllerShared,
    generation: u64,
    armed: bool,
}

impl PendingLogin<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.lock_state();
        if state.generation != self.generation || state.run_state != RunState::Starting {
            return;
        }
        self.shared.publish(&mut state, RunState::Idle);
        drop(state);
        self.shared
            .log
            .warn("Start request abandoned during login; locker returned to idle.");
    }
}

/// Owns [`RunState`] and guarantees at most one active reconciliation loop.
#[derive(Clone)]
pub struct BotController {
    shared: Arc<ControllerShared>,
}

impl BotController {
    pub fn new(
        sessions: Option<SessionManager>,
        loop_config: ReconciliationLoopConfig,
        log: Arc<ActivityLog>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            shared: Arc::new(ControllerShared {
                state: Mutex::new(ControllerState {
                    run_state: RunState::Idle,
                    generation: 0,
                    active: None,
                    tasks: Vec::new(),
                }),
                state_tx,
                sessions,
                loop_config,
                log,
            }),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock_state().run_state
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.shared.state_tx.subscribe()
    }

    pub fn session_manager(&self) -> Option<&SessionManager> {
        self.shared.sessions.as_ref()
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.shared.lock_state();
        ControllerStatus {
            state: state.run_state,
            generation: state.generation,
            lock: state.active.as_ref().map(|active| active.lock.clone()),
            counters: state
                .active
                .as_ref()
                .map(|active| active.counters.snapshot()),
            login_backend: self
                .shared
                .sessions
                .as_ref()
                .map(|sessions| sessions.backend_name().to_string()),
        }
    }

    /// Idle → Starting → Running (or back to Idle on login failure).
    ///
    /// Re-entrant calls while Starting or Running are successful no-ops and
    /// never trigger a second login.
    pub async fn start(
        &self,
        credential: Option<Credential>,
        thread_id: &str,
        target_name: &str,
    ) -> Result<StartOutcome, StartError> {
        let credential = credential.ok_or_else(|| {
            StartError::PreconditionFailed(
                "No appstate.json found. Upload or paste it first.".to_string(),
            )
        })?;
        let lock = LockConfig::new(thread_id, target_name)
            .map_err(|error| StartError::PreconditionFailed(error.to_string()))?;
        let Some(sessions) = self.shared.sessions.clone() else {
            self.shared
                .log
                .error("Login backend not available. Cannot start.");
            return Err(StartError::PreconditionFailed(
                "Login backend not configured on server.".to_string(),
            ));
        };

        let generation = {
            let mut state = self.shared.lock_state();
            if state.run_state != RunState::Idle {
                return Ok(StartOutcome::AlreadyRunning);
            }
            state.generation = state.generation.saturating_add(1);
            self.shared.publish(&mut state, RunState::Starting);
            state.generation
        };

        let mut pending = PendingLogin {
            shared: &self.shared,
            generation,
            armed: true,
        };
        self.shared
            .log
            .info("Attempting login using stored appstate...");
        let login = sessions.login(&credential).await;
        pending.disarm();
        drop(pending);

        let mut state = self.shared.lock_state();
        if state.generation != generation || state.run_state != RunState::Starting {
            self.shared
                .log
                .info("Login finished after stop was requested; session discarded.");
            return Ok(StartOutcome::CancelledDuringLogin);
        }

        let session = match login {
            Ok(session) => session,
            Err(error) => {
                self.shared.publish(&mut state, RunState::Idle);
                self.shared.log.error(format!("Login failed: {error}"));
                return Err(StartError::Login(error));
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let locker = ReconciliationLoop::new(
            session,
            lock.clone(),
            self.shared.loop_config,
            Arc::clone(&self.shared.log),
            cancel_rx,
        );
        let counters = locker.counters();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let exit = locker.run().await;
            shared.finish_run(generation, exit);
        });

        state.tasks.retain(|task| !task.is_finished());
        state.tasks.push(task);
        state.active = Some(ActiveRun {
            generation,
            lock: lock.clone(),
            counters,
            cancel_tx,
        });
        self.shared.publish(&mut state, RunState::Running);
        self.shared.log.info(format!(
            "Login successful. Starting group name locker for thread: {}",
            lock.thread_id
        ));
        Ok(StartOutcome::Started)
    }

    /// Any state → Stopping → Idle, synchronously. The loop observes the stop
    /// before its next external call.
    pub fn stop(&self) -> StopOutcome {
        let mut state = self.shared.lock_state();
        if state.run_state == RunState::Idle {
            return StopOutcome::AlreadyIdle;
        }
        self.shared.publish(&mut state, RunState::Stopping);
        if let Some(active) = state.active.take() {
            let _ = active.cancel_tx.send(true);
        }
        self.shared.publish(&mut state, RunState::Idle);
        drop(state);
        self.shared.log.info("Bot locker loop requested to stop.");
        StopOutcome::Stopped
    }

    /// Stops the locker and waits for every loop task spawned so far.
    pub async fn shutdown(&self) {
        self.stop();
        let tasks = std::mem::take(&mut self.shared.lock_state().tasks);
        for task in tasks {
            let _ = task.await;
        }
    }
}
