//! Login wrapper turning a credential blob into a session handle.

use std::sync::Arc;
use std::time::Duration;

use crate::activity_log::ActivityLog;
use crate::credential_store::Credential;
use crate::messenger::{LoginError, MessengerBackend, MessengerSession};

#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn MessengerBackend>,
    login_timeout: Duration,
    log: Arc<ActivityLog>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn MessengerBackend>,
        login_timeout: Duration,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            backend,
            login_timeout,
            log,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Performs exactly one login attempt; never retries.
    pub async fn login(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn MessengerSession>, LoginError> {
        let timeout_ms = u64::try_from(self.login_timeout.as_millis()).unwrap_or(u64::MAX);
        match tokio::time::timeout(self.login_timeout, self.backend.login(credential)).await {
            Ok(result) => result,
            Err(_) => Err(LoginError::TransportFailure(format!(
                "login timed out after {timeout_ms} ms"
            ))),
        }
    }

    /// Startup auto-login: validates the stored credential and drops the
    /// session. Never starts the locker.
    pub async fn probe(&self, credential: &Credential) -> Result<(), LoginError> {
        self.log
            .info("Attempting auto login using existing appstate...");
        match self.login(credential).await {
            Ok(_session) => {
                self.log.info(
                    "Auto login success. You may now provide groupID & lockedName and click Start.",
                );
                Ok(())
            }
            Err(error) => {
                self.log.warn(format!("Auto login failed: {error}"));
                Err(error)
            }
        }
    }
}
