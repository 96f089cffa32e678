//! HTTP adapter for a messenger bridge exposing the unofficial client API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use namelock_runtime::{
    Credential, FetchError, LoginError, MessengerBackend, MessengerSession, SetTitleError,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client_variant::{MessengerClientVariant, PinnedArgumentOrder, SetTitleArgumentOrder};

const ERROR_BODY_MAX_CHARS: usize = 240;
const CREDENTIAL_REJECTED_CODE: &str = "credential_rejected";
const SESSION_REJECTED_CODE: &str = "session_rejected";
const INVALID_ARGUMENTS_CODE: &str = "invalid_arguments";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeClientConfig {
    pub api_base: String,
    pub client: MessengerClientVariant,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl BridgeErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn has_code(&self, code: &str) -> bool {
        self.error_code.as_deref() == Some(code)
    }

    fn describe(&self, status: StatusCode, body: &str) -> String {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("status {status}: {}", truncate_for_error(body)))
    }
}

#[derive(Debug, Deserialize)]
struct BridgeLoginResponse {
    ok: bool,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    client: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

fn truncate_for_error(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= ERROR_BODY_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(ERROR_BODY_MAX_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}

fn build_http_client(request_timeout_ms: u64) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static("namelock-bridge-client"),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_millis(request_timeout_ms.max(1)))
        .build()
        .context("failed to create messenger bridge client")
}

/// Logs in through `POST {api_base}/login`.
#[derive(Clone)]
pub struct HttpMessengerBackend {
    http: reqwest::Client,
    api_base: String,
    client: MessengerClientVariant,
    request_timeout_ms: u64,
}

impl HttpMessengerBackend {
    pub fn new(config: BridgeClientConfig) -> Result<Self> {
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            anyhow::bail!("messenger api base cannot be empty");
        }
        Ok(Self {
            http: build_http_client(config.request_timeout_ms)?,
            api_base,
            client: config.client,
            request_timeout_ms: config.request_timeout_ms.max(1),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl MessengerBackend for HttpMessengerBackend {
    fn name(&self) -> &str {
        self.client.as_str()
    }

    async fn login(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn MessengerSession>, LoginError> {
        let response = self
            .http
            .post(format!("{}/login", self.api_base))
            .json(&json!({
                "appState": credential.as_value(),
                "client": self.client.as_str(),
            }))
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LoginError::TransportFailure(format!(
                        "login timed out after {} ms",
                        self.request_timeout_ms
                    ))
                } else {
                    LoginError::TransportFailure(error.to_string())
                }
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| LoginError::TransportFailure(error.to_string()))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = BridgeErrorBody::parse(&body).describe(status, &body);
            return Err(LoginError::CredentialRejected(detail));
        }

        let parsed = match serde_json::from_str::<BridgeLoginResponse>(&body) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(LoginError::TransportFailure(format!(
                    "unexpected login response (status {status}): {}",
                    truncate_for_error(&body)
                )))
            }
        };
        if !status.is_success() || !parsed.ok {
            let detail = parsed
                .error
                .clone()
                .unwrap_or_else(|| format!("login failed with status {status}"));
            return Err(
                if parsed.error_code.as_deref() == Some(CREDENTIAL_REJECTED_CODE) {
                    LoginError::CredentialRejected(detail)
                } else {
                    LoginError::TransportFailure(detail)
                },
            );
        }

        let session_token = parsed
            .session
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                LoginError::TransportFailure("login response did not include a session".to_string())
            })?;
        let variant = match self.client {
            MessengerClientVariant::Auto => {
                MessengerClientVariant::from_reported(parsed.client.as_deref())
            }
            configured => configured,
        };
        info!(client = %variant, "messenger bridge login accepted");

        Ok(Arc::new(HttpMessengerSession {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            session_token,
            variant,
            request_timeout_ms: self.request_timeout_ms,
            order: PinnedArgumentOrder::new(variant.set_title_order()),
        }))
    }
}

/// Authenticated bridge session. Owns the resolved `setTitle` argument order.
pub struct HttpMessengerSession {
    http: reqwest::Client,
    api_base: String,
    session_token: String,
    variant: MessengerClientVariant,
    request_timeout_ms: u64,
    order: PinnedArgumentOrder,
}

impl HttpMessengerSession {
    async fn call(
        &self,
        method: &str,
        args: &[&str],
    ) -> std::result::Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .json(&json!({
                "session": self.session_token,
                "args": args,
            }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn post_set_title(
        &self,
        order: SetTitleArgumentOrder,
        title: &str,
        thread_id: &str,
    ) -> std::result::Result<(), SetTitleError> {
        let (status, body) = self
            .call("setTitle", &order.arguments(title, thread_id))
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    SetTitleError::Timeout(self.request_timeout_ms)
                } else {
                    SetTitleError::Transport(error.to_string())
                }
            })?;
        if status.is_success() {
            return Ok(());
        }
        let parsed = BridgeErrorBody::parse(&body);
        let detail = parsed.describe(status, &body);
        if status == StatusCode::BAD_REQUEST && parsed.has_code(INVALID_ARGUMENTS_CODE) {
            return Err(SetTitleError::InvalidArguments(detail));
        }
        if status.is_client_error() {
            return Err(SetTitleError::Rejected(detail));
        }
        Err(SetTitleError::Transport(detail))
    }
}

#[async_trait]
impl MessengerSession for HttpMessengerSession {
    async fn get_thread_info(&self, thread_id: &str) -> std::result::Result<Value, FetchError> {
        let (status, body) = self
            .call("getThreadInfo", &[thread_id])
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FetchError::Timeout(self.request_timeout_ms)
                } else {
                    FetchError::Transport(error.to_string())
                }
            })?;
        if !status.is_success() {
            let parsed = BridgeErrorBody::parse(&body);
            let detail = parsed.describe(status, &body);
            if status == StatusCode::UNAUTHORIZED || parsed.has_code(SESSION_REJECTED_CODE) {
                return Err(FetchError::SessionRejected(detail));
            }
            return Err(FetchError::Transport(detail));
        }
        serde_json::from_str::<Value>(&body)
            .map_err(|error| FetchError::InvalidResponse(error.to_string()))
    }

    /// Tries the pinned order (title first when unresolved) and falls back to
    /// the alternate order once when the bridge rejects the call signature.
    async fn set_title(
        &self,
        title: &str,
        thread_id: &str,
    ) -> std::result::Result<(), SetTitleError> {
        let first = self.order.get().unwrap_or(SetTitleArgumentOrder::TitleFirst);
        match self.post_set_title(first, title, thread_id).await {
            Ok(()) => {
                self.order.pin(first);
                Ok(())
            }
            Err(SetTitleError::InvalidArguments(reason)) => {
                let alternate = first.alternate();
                debug!(
                    client = %self.variant,
                    ?first,
                    ?alternate,
                    reason = %reason,
                    "setTitle signature rejected; retrying with alternate argument order"
                );
                self.post_set_title(alternate, title, thread_id).await?;
                self.order.pin(alternate);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
