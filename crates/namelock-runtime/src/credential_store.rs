//! Single-slot credential persistence.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use namelock_core::{remove_file_if_exists, write_text_atomic};
use serde_json::Value;
use thiserror::Error;

/// Opaque session credential blob (serialized cookies/tokens).
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    raw: Value,
}

impl Credential {
    pub fn parse(text: &str) -> Result<Self, CredentialStoreError> {
        if text.trim().is_empty() {
            return Err(CredentialStoreError::InvalidCredentialFormat(
                "no appstate content provided".to_string(),
            ));
        }
        let raw = serde_json::from_str::<Value>(text)
            .map_err(|error| CredentialStoreError::InvalidCredentialFormat(error.to_string()))?;
        if is_blank_document(&raw) {
            return Err(CredentialStoreError::InvalidCredentialFormat(format!(
                "appstate document `{raw}` holds no session"
            )));
        }
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        Self { raw }
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn into_value(self) -> Value {
        self.raw
    }
}

/// `null`, `false`, `0` and `""` parse as JSON but carry no session.
fn is_blank_document(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Bool(value) => !value,
        Value::Number(value) => value.as_f64() == Some(0.0),
        Value::String(value) => value.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("invalid credential format: {0}")]
    InvalidCredentialFormat(String),
    #[error("failed to persist credential: {0:#}")]
    Persist(anyhow::Error),
    #[error("failed to delete credential: {0:#}")]
    Delete(anyhow::Error),
}

/// Result of reading the credential slot at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLoadOutcome {
    Loaded,
    Missing,
    Failed(String),
}

/// Holds the current credential and mirrors it to one JSON document on disk.
///
/// Saves replace the file through a temp file + rename while the write lock is
/// held, so readers observe either the previous or the new credential.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Opens the slot at `path`. Read or parse failures leave the slot empty.
    pub fn open(path: impl Into<PathBuf>) -> (Self, CredentialLoadOutcome) {
        let path = path.into();
        let (current, outcome) = match std::fs::read_to_string(&path) {
            Ok(raw) => match Credential::parse(&raw) {
                Ok(credential) => (Some(credential), CredentialLoadOutcome::Loaded),
                Err(error) => (None, CredentialLoadOutcome::Failed(error.to_string())),
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                (None, CredentialLoadOutcome::Missing)
            }
            Err(error) => (
                None,
                CredentialLoadOutcome::Failed(format!(
                    "failed to read {}: {error}",
                    path.display()
                )),
            ),
        };
        (
            Self {
                path,
                current: RwLock::new(current),
            },
            outcome,
        )
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn save(&self, text: &str) -> Result<Credential, CredentialStoreError> {
        let credential = Credential::parse(text)?;
        self.save_credential(credential.clone())?;
        Ok(credential)
    }

    pub fn save_credential(&self, credential: Credential) -> Result<(), CredentialStoreError> {
        let mut payload = serde_json::to_string_pretty(credential.as_value())
            .map_err(|error| CredentialStoreError::Persist(error.into()))?;
        payload.push('\n');

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        write_text_atomic(&self.path, &payload).map_err(CredentialStoreError::Persist)?;
        *current = Some(credential);
        Ok(())
    }

    pub fn load(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Removes the credential from memory and disk. Returns whether anything
    /// was present.
    pub fn clear(&self) -> Result<bool, CredentialStoreError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let removed_file = remove_file_if_exists(&self.path).map_err(CredentialStoreError::Delete)?;
        let had_credential = current.take().is_some();
        Ok(removed_file || had_credential)
    }
}
