use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ok, message}` body shared by every control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct ApiEnvelope {
    pub(super) ok: bool,
    pub(super) message: String,
}

impl ApiEnvelope {
    pub(super) fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    /// Soft failure reported with HTTP 200, as the panel expects.
    pub(super) fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiEnvelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ControlApiError {
    pub(super) status: StatusCode,
    pub(super) message: String,
}

impl ControlApiError {
    pub(super) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ControlApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiEnvelope {
                ok: false,
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SaveTextRequest {
    #[serde(default)]
    appstate: Option<Value>,
}

impl SaveTextRequest {
    /// Pasted text, or a JSON document sent inline. Blank input yields `None`.
    pub(super) fn appstate_text(&self) -> Option<String> {
        let text = match self.appstate.as_ref()? {
            Value::Null => return None,
            Value::String(text) => text.trim().to_string(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct StartRequest {
    #[serde(default, rename = "groupID")]
    group_id: Option<Value>,
    #[serde(default, rename = "lockedName")]
    locked_name: Option<Value>,
}

/// Numeric ids are accepted as well as strings.
fn field_as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

impl StartRequest {
    pub(super) fn group_id(&self) -> String {
        field_as_text(self.group_id.as_ref())
    }

    pub(super) fn locked_name(&self) -> String {
        field_as_text(self.locked_name.as_ref())
    }
}
