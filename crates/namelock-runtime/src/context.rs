//! Per-process wiring of the credential slot, activity log and controller.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::activity_log::{ActivityLog, LogEntry};
use crate::bot_controller::{
    BotController, RunState, StartError, StartOutcome, StopOutcome,
};
use crate::credential_store::{
    CredentialLoadOutcome, CredentialStore, CredentialStoreError,
};
use crate::messenger::{LoginError, MessengerBackend};
use crate::reconciliation_loop::{LockConfig, LoopCountersSnapshot};
use crate::runtime_config::NameLockRuntimeConfig;
use crate::session_manager::SessionManager;

/// Where a credential save came from; only changes the log wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSaveSource {
    Upload,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameLockStatus {
    pub running: bool,
    pub state: RunState,
    pub credential_present: bool,
    pub generation: u64,
    pub lock: Option<LockConfig>,
    pub counters: Option<LoopCountersSnapshot>,
    pub login_backend: Option<String>,
    /// Most recent entries, oldest first, rendered as `[timestamp] message`.
    pub logs: Vec<String>,
}

/// Everything one locker process shares between its control surface and the
/// background loop. Tests build a fresh context per case.
#[derive(Clone)]
pub struct NameLockContext {
    config: NameLockRuntimeConfig,
    log: Arc<ActivityLog>,
    credentials: Arc<CredentialStore>,
    controller: BotController,
}

impl NameLockContext {
    /// Opens the credential slot and logs what was found on disk. A missing
    /// backend is accepted here; `start` reports it as a precondition failure.
    pub fn new(
        config: NameLockRuntimeConfig,
        backend: Option<Arc<dyn MessengerBackend>>,
    ) -> Self {
        let log = Arc::new(ActivityLog::new(config.log_capacity));
        let (credentials, outcome) = CredentialStore::open(config.credential_path.clone());
        match outcome {
            CredentialLoadOutcome::Loaded => {
                log.info("Found existing appstate.json on disk; loaded for auto login.");
            }
            CredentialLoadOutcome::Missing => {
                log.info("No appstate.json found on disk. Use UI to upload or paste it.");
            }
            CredentialLoadOutcome::Failed(reason) => {
                log.error(format!("Error reading appstate.json at startup: {reason}"));
            }
        }
        if backend.is_none() {
            log.warn("Login backend not available. Locker cannot start until one is configured.");
        }

        let sessions = backend.map(|backend| {
            SessionManager::new(backend, config.call_timeout, Arc::clone(&log))
        });
        let controller = BotController::new(sessions, config.loop_config(), Arc::clone(&log));
        Self {
            config,
            log,
            credentials: Arc::new(credentials),
            controller,
        }
    }

    pub fn config(&self) -> &NameLockRuntimeConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.credentials.as_ref()
    }

    pub fn controller(&self) -> &BotController {
        &self.controller
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.controller.subscribe_state()
    }

    pub fn save_credential(
        &self,
        text: &str,
        source: CredentialSaveSource,
    ) -> Result<(), CredentialStoreError> {
        match self.credentials.save(text) {
            Ok(_) => {
                self.log.info(match source {
                    CredentialSaveSource::Upload => "appstate.json uploaded and saved to disk.",
                    CredentialSaveSource::Text => "appstate.json saved from pasted text.",
                });
                Ok(())
            }
            Err(error) => {
                let label = match source {
                    CredentialSaveSource::Upload => "Upload",
                    CredentialSaveSource::Text => "Save-text",
                };
                self.log.error(format!("{label} error: {error}"));
                Err(error)
            }
        }
    }

    /// Deletes the stored credential. An active run keeps its session.
    pub fn clear_credential(&self) -> Result<bool, CredentialStoreError> {
        match self.credentials.clear() {
            Ok(removed) => {
                if removed {
                    self.log.info("Deleted appstate.json from disk.");
                } else {
                    self.log.info("No appstate.json on disk to delete.");
                }
                Ok(removed)
            }
            Err(error) => {
                self.log.error(format!("Delete appstate error: {error}"));
                Err(error)
            }
        }
    }

    pub async fn start(
        &self,
        thread_id: &str,
        target_name: &str,
    ) -> Result<StartOutcome, StartError> {
        self.controller
            .start(self.credentials.load(), thread_id, target_name)
            .await
    }

    pub fn stop(&self) -> StopOutcome {
        self.controller.stop()
    }

    /// Validates the stored credential at startup without starting the locker.
    /// Returns `None` when there was nothing to probe.
    pub async fn auto_login_probe(&self) -> Option<Result<(), LoginError>> {
        let credential = self.credentials.load()?;
        let Some(sessions) = self.controller.session_manager() else {
            self.log
                .warn("Skipping auto login: login backend not available.");
            return None;
        };
        Some(sessions.probe(&credential).await)
    }

    pub fn status(&self) -> NameLockStatus {
        let controller = self.controller.status();
        NameLockStatus {
            running: controller.state == RunState::Running,
            state: controller.state,
            credential_present: self.credentials.has(),
            generation: controller.generation,
            lock: controller.lock,
            counters: controller.counters,
            login_backend: controller.login_backend,
            logs: self
                .log
                .recent(self.config.status_log_limit)
                .iter()
                .map(LogEntry::render)
                .collect(),
        }
    }

    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::tempdir;

    use super::{CredentialSaveSource, NameLockContext};
    use crate::bot_controller::{RunState, StartError, StartOutcome};
    use crate::credential_store::CredentialStoreError;
    use crate::messenger::{LoginError, MessengerBackend};
    use crate::runtime_config::NameLockRuntimeConfig;
    use crate::test_support::{StubBackend, StubSession};

    fn config(dir: &std::path::Path) -> NameLockRuntimeConfig {
        NameLockRuntimeConfig {
            credential_path: dir.join("appstate.json"),
            poll_interval: Duration::from_millis(10),
            call_timeout: Duration::from_millis(500),
            ..NameLockRuntimeConfig::default()
        }
    }

    fn context_with(dir: &std::path::Path, backend: Arc<StubBackend>) -> NameLockContext {
        NameLockContext::new(config(dir), Some(backend as Arc<dyn MessengerBackend>))
    }

    #[tokio::test]
    async fn functional_context_start_uses_saved_credential() {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(StubBackend::accepting(StubSession::with_names(&["Locked"])));
        let context = context_with(temp.path(), Arc::clone(&backend));

        let error = context
            .start("123", "Locked")
            .await
            .expect_err("no credential yet");
        assert!(matches!(
            error,
            StartError::PreconditionFailed(message) if message.contains("No appstate.json")
        ));

        context
            .save_credential(r#"[{"key":"c_user","value":"1"}]"#, CredentialSaveSource::Text)
            .expect("save");
        let outcome = context.start("123", "Locked").await.expect("start");
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(
            backend.last_credential().expect("credential").into_value(),
            json!([{"key": "c_user", "value": "1"}])
        );
        let status = context.status();
        assert!(status.running);
        assert!(status.credential_present);
        context.shutdown().await;
        assert_eq!(context.status().state, RunState::Idle);
    }

    #[tokio::test]
    async fn functional_context_status_caps_rendered_logs() {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(StubBackend::accepting(StubSession::with_names(&["x"])));
        let context = context_with(temp.path(), backend);
        for index in 0..40 {
            context.log().info(format!("entry {index}"));
        }
        let status = context.status();
        assert_eq!(status.logs.len(), 20);
        assert!(status.logs[19].ends_with("entry 39"));
        assert!(status.logs[0].starts_with('['));
        assert!(!status.running);
        assert!(!status.credential_present);
    }

    #[tokio::test]
    async fn unit_context_rejects_invalid_credential_and_logs_it() {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(StubBackend::accepting(StubSession::with_names(&["x"])));
        let context = context_with(temp.path(), backend);
        let error = context
            .save_credential("not json", CredentialSaveSource::Upload)
            .expect_err("invalid");
        assert!(matches!(error, CredentialStoreError::InvalidCredentialFormat(_)));
        assert!(!context.credentials().has());
        let last = context.log().recent(1).pop().expect("log entry");
        assert!(last.message.starts_with("Upload error"));
    }

    #[tokio::test]
    async fn functional_clear_credential_keeps_active_run() {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(StubBackend::accepting(StubSession::with_names(&["Locked"])));
        let context = context_with(temp.path(), backend);
        context
            .save_credential("{\"token\":\"a\"}", CredentialSaveSource::Text)
            .expect("save");
        context.start("123", "Locked").await.expect("start");

        assert!(context.clear_credential().expect("clear"));
        assert!(!context.credentials().has());
        assert_eq!(context.status().state, RunState::Running);
        assert!(!context.clear_credential().expect("second clear"));
        context.shutdown().await;
    }

    #[tokio::test]
    async fn functional_auto_login_probe_never_starts_locker() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("appstate.json"), "[]").expect("seed credential");
        let session = StubSession::with_names(&["x"]);
        let backend = Arc::new(StubBackend::accepting(Arc::clone(&session)));
        let context = context_with(temp.path(), Arc::clone(&backend));

        let result = context.auto_login_probe().await;
        assert_eq!(result, Some(Ok(())));
        assert_eq!(backend.login_calls(), 1);
        assert_eq!(context.status().state, RunState::Idle);
        assert_eq!(session.thread_info_calls(), 0);
        let messages = context
            .log()
            .recent(10)
            .into_iter()
            .map(|entry| entry.message)
            .collect::<Vec<_>>();
        assert!(messages.iter().any(|message| message.contains("loaded for auto login")));
        assert!(messages.iter().any(|message| message.starts_with("Auto login success")));
    }

    #[tokio::test]
    async fn unit_auto_login_probe_reports_rejection_and_skips_without_credential() {
        let temp = tempdir().expect("tempdir");
        let backend = Arc::new(StubBackend::rejecting(LoginError::CredentialRejected(
            "expired".to_string(),
        )));
        let context = context_with(temp.path(), Arc::clone(&backend));
        assert_eq!(context.auto_login_probe().await, None);
        assert_eq!(backend.login_calls(), 0);

        context
            .save_credential("[]", CredentialSaveSource::Text)
            .expect("save");
        let result = context.auto_login_probe().await.expect("probe ran");
        assert_eq!(
            result,
            Err(LoginError::CredentialRejected("expired".to_string()))
        );
        assert_eq!(context.status().state, RunState::Idle);
    }

    #[tokio::test]
    async fn regression_context_without_backend_reports_precondition() {
        let temp = tempdir().expect("tempdir");
        let context = NameLockContext::new(config(temp.path()), None);
        context
            .save_credential("[]", CredentialSaveSource::Text)
            .expect("save");
        let error = context.start("123", "Locked").await.expect_err("no backend");
        assert!(matches!(error, StartError::PreconditionFailed(_)));
        assert_eq!(context.auto_login_probe().await, None);
    }

    #[tokio::test]
    async fn regression_corrupt_credential_file_is_logged_at_startup() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join("appstate.json"), "{broken").expect("seed");
        let backend = Arc::new(StubBackend::accepting(StubSession::with_names(&["x"])));
        let context = context_with(temp.path(), backend);
        assert!(!context.credentials().has());
        let first = context.log().recent(5).remove(0);
        assert!(first.message.starts_with("Error reading appstate.json at startup"));
    }
}
