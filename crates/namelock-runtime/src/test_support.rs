//! Scripted messenger doubles shared by runtime unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::credential_store::Credential;
use crate::messenger::{FetchError, LoginError, MessengerBackend, MessengerSession, SetTitleError};

/// Session answering `get_thread_info` from a script; the last scripted
/// response repeats once the script is exhausted.
#[derive(Default)]
pub(crate) struct StubSession {
    script: Mutex<VecDeque<Result<Value, FetchError>>>,
    last: Mutex<Option<Result<Value, FetchError>>>,
    set_title_result: Mutex<Option<SetTitleError>>,
    set_title_delay: Mutex<Duration>,
    thread_info_calls: AtomicUsize,
    set_title_calls: Mutex<Vec<(String, String)>>,
}

impl StubSession {
    pub(crate) fn with_names(names: &[&str]) -> Arc<Self> {
        let responses = names
            .iter()
            .map(|name| Ok(json!({ "thread_name": name })))
            .collect::<Vec<_>>();
        Self::with_responses(responses)
    }

    pub(crate) fn with_responses(responses: Vec<Result<Value, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn fail_set_title(&self, error: SetTitleError) {
        *self.set_title_result.lock().expect("set title result lock") = Some(error);
    }

    pub(crate) fn delay_set_title(&self, delay: Duration) {
        *self.set_title_delay.lock().expect("set title delay lock") = delay;
    }

    pub(crate) fn thread_info_calls(&self) -> usize {
        self.thread_info_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_title_calls(&self) -> Vec<(String, String)> {
        self.set_title_calls.lock().expect("set title calls lock").clone()
    }
}

#[async_trait]
impl MessengerSession for StubSession {
    async fn get_thread_info(&self, _thread_id: &str) -> Result<Value, FetchError> {
        self.thread_info_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("script lock").pop_front();
        let mut last = self.last.lock().expect("last response lock");
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(FetchError::InvalidResponse("empty script".to_string())))
    }

    async fn set_title(&self, title: &str, thread_id: &str) -> Result<(), SetTitleError> {
        self.set_title_calls
            .lock()
            .expect("set title calls lock")
            .push((title.to_string(), thread_id.to_string()));
        let delay = *self.set_title_delay.lock().expect("set title delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.set_title_result.lock().expect("set title result lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub(crate) struct StubBackend {
    session: Option<Arc<StubSession>>,
    rejection: Option<LoginError>,
    login_delay: Duration,
    login_calls: AtomicUsize,
    last_credential: Mutex<Option<Credential>>,
}

impl StubBackend {
    pub(crate) fn accepting(session: Arc<StubSession>) -> Self {
        Self {
            session: Some(session),
            rejection: None,
            login_delay: Duration::ZERO,
            login_calls: AtomicUsize::new(0),
            last_credential: Mutex::new(None),
        }
    }

    pub(crate) fn rejecting(error: LoginError) -> Self {
        Self {
            session: None,
            rejection: Some(error),
            login_delay: Duration::ZERO,
            login_calls: AtomicUsize::new(0),
            last_credential: Mutex::new(None),
        }
    }

    pub(crate) fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = delay;
        self
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_credential(&self) -> Option<Credential> {
        self.last_credential.lock().expect("credential lock").clone()
    }
}

#[async_trait]
impl MessengerBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn login(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn MessengerSession>, LoginError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credential.lock().expect("credential lock") = Some(credential.clone());
        if !self.login_delay.is_zero() {
            tokio::time::sleep(self.login_delay).await;
        }
        if let Some(error) = &self.rejection {
            return Err(error.clone());
        }
        match &self.session {
            Some(session) => Ok(Arc::clone(session) as Arc<dyn MessengerSession>),
            None => Err(LoginError::TransportFailure("no stub session".to_string())),
        }
    }
}
