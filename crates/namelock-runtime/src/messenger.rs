//! Capability traits for the external messaging platform.
//!
//! The locker depends on exactly three platform operations: log in with a
//! credential blob, read a thread's metadata and set a thread's title. Each
//! supported backend provides one adapter implementing these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::credential_store::Credential;

/// Keys probed, in order, when reading a thread's display name.
pub const THREAD_NAME_KEYS: [&str; 3] = ["thread_name", "name", "title"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("credential rejected: {0}")]
    CredentialRejected(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl LoginError {
    /// Rejected credentials must never be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("session rejected by messaging platform: {0}")]
    SessionRejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    #[error("invalid thread info response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    pub fn is_session_rejected(&self) -> bool {
        matches!(self, Self::SessionRejected(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetTitleError {
    /// The client refused the call signature itself; the alternate argument
    /// order may still succeed.
    #[error("set title arguments rejected: {0}")]
    InvalidArguments(String),
    #[error("set title rejected by messaging platform: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

/// Login entry point of one messaging backend.
#[async_trait]
pub trait MessengerBackend: Send + Sync {
    /// Short label used in logs and status output.
    fn name(&self) -> &str;

    async fn login(&self, credential: &Credential)
        -> Result<Arc<dyn MessengerSession>, LoginError>;
}

/// Authenticated session handle returned by [`MessengerBackend::login`].
#[async_trait]
pub trait MessengerSession: Send + Sync {
    async fn get_thread_info(&self, thread_id: &str) -> Result<Value, FetchError>;

    async fn set_title(&self, title: &str, thread_id: &str) -> Result<(), SetTitleError>;
}

/// Reads the display name out of a thread info payload.
///
/// Different backends answer with different keys; the first key in
/// [`THREAD_NAME_KEYS`] holding a non-null scalar wins.
pub fn extract_thread_name(info: &Value) -> Option<String> {
    let object = info.as_object()?;
    THREAD_NAME_KEYS
        .iter()
        .find_map(|key| match object.get(*key) {
            Some(Value::String(value)) => Some(value.clone()),
            Some(Value::Number(value)) => Some(value.to_string()),
            Some(Value::Bool(value)) => Some(value.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_thread_name, FetchError, LoginError};

    #[test]
    fn unit_extract_thread_name_probes_keys_in_order() {
        assert_eq!(
            extract_thread_name(&json!({"thread_name": "X"})),
            Some("X".to_string())
        );
        assert_eq!(extract_thread_name(&json!({"name": "Y"})), Some("Y".to_string()));
        assert_eq!(extract_thread_name(&json!({"title": "Z"})), Some("Z".to_string()));
        assert_eq!(extract_thread_name(&json!({})), None);
    }

    #[test]
    fn unit_extract_thread_name_skips_null_values_and_prefers_thread_name() {
        assert_eq!(
            extract_thread_name(&json!({"thread_name": null, "name": "fallback"})),
            Some("fallback".to_string())
        );
        assert_eq!(
            extract_thread_name(&json!({"title": "c", "name": "b", "thread_name": "a"})),
            Some("a".to_string())
        );
    }

    #[test]
    fn unit_extract_thread_name_ignores_non_object_payloads() {
        assert_eq!(extract_thread_name(&json!("Group")), None);
        assert_eq!(extract_thread_name(&json!(null)), None);
        assert_eq!(extract_thread_name(&json!([{"name": "x"}])), None);
        assert_eq!(extract_thread_name(&json!({"name": {"nested": "x"}})), None);
    }

    #[test]
    fn unit_extract_thread_name_keeps_whitespace_and_symbols_verbatim() {
        assert_eq!(
            extract_thread_name(&json!({"thread_name": "  Team 🔒 [A]  "})),
            Some("  Team 🔒 [A]  ".to_string())
        );
    }

    #[test]
    fn unit_error_classification_helpers() {
        assert!(!LoginError::CredentialRejected("expired".to_string()).is_retryable());
        assert!(LoginError::TransportFailure("reset".to_string()).is_retryable());
        assert!(FetchError::SessionRejected("logged out".to_string()).is_session_rejected());
        assert!(!FetchError::Timeout(10).is_session_rejected());
    }
}
