use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use httpmock::prelude::*;
use namelock_messenger::{BridgeClientConfig, HttpMessengerBackend, MessengerClientVariant};
use namelock_runtime::{
    Credential, CredentialSaveSource, FetchError, LoginError, MessengerBackend, MessengerSession,
    NameLockContext, NameLockRuntimeConfig, RunState, SetTitleError, StartError, StartOutcome,
};
use serde_json::{json, Value};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "namelock-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// Answers thread info from a script of names; the last name repeats.
struct ScriptedSession {
    names: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    fetches: AtomicUsize,
    titles: Mutex<Vec<String>>,
}

#[async_trait]
impl MessengerSession for ScriptedSession {
    async fn get_thread_info(&self, _thread_id: &str) -> Result<Value, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().expect("last name lock");
        if let Some(next) = self.names.lock().expect("names lock").pop_front() {
            *last = next;
        }
        Ok(json!({ "threadID": "900", "thread_name": last.clone() }))
    }

    async fn set_title(&self, title: &str, _thread_id: &str) -> Result<(), SetTitleError> {
        self.titles.lock().expect("titles lock").push(title.to_string());
        Ok(())
    }
}

struct ScriptedBackend {
    session: Arc<ScriptedSession>,
    logins: AtomicUsize,
}

impl ScriptedBackend {
    fn new(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(ScriptedSession {
                names: Mutex::new(names.iter().map(|name| name.to_string()).collect()),
                last: Mutex::new(String::new()),
                fetches: AtomicUsize::new(0),
                titles: Mutex::new(Vec::new()),
            }),
            logins: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MessengerBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn login(
        &self,
        _credential: &Credential,
    ) -> Result<Arc<dyn MessengerSession>, LoginError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.session) as Arc<dyn MessengerSession>)
    }
}

fn runtime_config(root: &Path) -> NameLockRuntimeConfig {
    NameLockRuntimeConfig {
        credential_path: root.join("appstate.json"),
        poll_interval: Duration::from_millis(15),
        call_timeout: Duration::from_millis(1_000),
        ..NameLockRuntimeConfig::default()
    }
}

async fn wait_until<F: Fn() -> bool>(label: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {label}");
}

#[tokio::test]
async fn integration_drift_sequence_triggers_exactly_two_corrections() {
    let workspace = IsolatedWorkspace::new("drift");
    let backend = ScriptedBackend::new(&["A", "B", "TARGET", "TARGET"]);
    let context = NameLockContext::new(
        runtime_config(workspace.root()),
        Some(Arc::clone(&backend) as Arc<dyn MessengerBackend>),
    );
    context
        .save_credential(r#"[{"key":"c_user","value":"900"}]"#, CredentialSaveSource::Text)
        .expect("save credential");

    let outcome = context.start("900", "TARGET").await.expect("start");
    assert_eq!(outcome, StartOutcome::Started);
    let session = Arc::clone(&backend.session);
    wait_until("six polls", move || session.fetches.load(Ordering::SeqCst) >= 6).await;
    context.stop();
    context.shutdown().await;

    let titles = backend.session.titles.lock().expect("titles").clone();
    assert_eq!(titles, vec!["TARGET".to_string(), "TARGET".to_string()]);
    let messages = context
        .log()
        .recent(100)
        .into_iter()
        .map(|entry| entry.message)
        .collect::<Vec<_>>();
    assert!(messages
        .iter()
        .any(|message| message.contains("Detected name change: \"A\"")));
    assert!(messages.iter().any(|message| message == "Group name reset successfully."));
}

#[tokio::test]
async fn integration_credential_persists_across_context_restart() {
    let workspace = IsolatedWorkspace::new("restart");
    let blob = json!([{"key": "xs", "value": "token"}, {"key": "c_user", "value": "1"}]);
    {
        let context = NameLockContext::new(runtime_config(workspace.root()), None);
        context
            .save_credential(&blob.to_string(), CredentialSaveSource::Upload)
            .expect("save credential");
    }

    let backend = ScriptedBackend::new(&["Locked"]);
    let context = NameLockContext::new(
        runtime_config(workspace.root()),
        Some(Arc::clone(&backend) as Arc<dyn MessengerBackend>),
    );
    assert_eq!(context.credentials().load().map(Credential::into_value), Some(blob));
    assert_eq!(context.auto_login_probe().await, Some(Ok(())));
    assert_eq!(context.status().state, RunState::Idle);

    context.clear_credential().expect("clear");
    let error = context.start("900", "Locked").await.expect_err("no credential");
    assert!(matches!(error, StartError::PreconditionFailed(_)));
    assert_eq!(backend.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn integration_http_bridge_locker_corrects_and_freezes_after_stop() {
    let workspace = IsolatedWorkspace::new("bridge");
    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(POST).path("/login");
        then.status(200)
            .json_body(json!({"ok": true, "session": "bridge-session", "client": "ws3-fca"}));
    });
    let thread_info = server.mock(|when, then| {
        when.method(POST)
            .path("/getThreadInfo")
            .body_includes("\"session\":\"bridge-session\"");
        then.status(200)
            .json_body(json!({"threadID": "900", "name": "Intruder Name"}));
    });
    let set_title = server.mock(|when, then| {
        when.method(POST)
            .path("/setTitle")
            .body_includes("\"args\":[\"900\",\"Locked Name\"]");
        then.status(200).json_body(json!({"ok": true}));
    });

    let backend = HttpMessengerBackend::new(BridgeClientConfig {
        api_base: server.base_url(),
        client: MessengerClientVariant::Auto,
        request_timeout_ms: 1_000,
    })
    .expect("bridge backend");
    let context = NameLockContext::new(
        runtime_config(workspace.root()),
        Some(Arc::new(backend) as Arc<dyn MessengerBackend>),
    );
    context
        .save_credential("[]", CredentialSaveSource::Text)
        .expect("save credential");
    context.start("900", "Locked Name").await.expect("start");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while set_title.calls() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(set_title.calls() >= 2, "corrections were not issued");

    context.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let fetches = thread_info.calls();
    let corrections = set_title.calls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(thread_info.calls(), fetches);
    assert_eq!(set_title.calls(), corrections);
    login.assert_calls(1);

    let status = context.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.login_backend.as_deref(), Some("auto"));
    context.shutdown().await;
}
