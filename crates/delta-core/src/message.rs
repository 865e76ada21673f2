//! Messages exchanged per round trip.

use crate::codec;
use crate::error::DecodeResult;
use crate::patch::Patch;
use crate::types::ComponentId;
use crate::{FieldErrors, JsonValue, StateMap};
use serde::{Deserialize, Serialize};

/// What a request asks the server to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Invoke a component method.
    Call {
        method: String,
        #[serde(default)]
        params: StateMap,
    },
    /// Set one bound property.
    Update { property: String, value: JsonValue },
}

impl Action {
    pub fn is_update(&self) -> bool {
        matches!(self, Action::Update { .. })
    }

    /// The method or property name.
    pub fn target(&self) -> &str {
        match self {
            Action::Call { method, .. } => method,
            Action::Update { property, .. } => property,
        }
    }
}

/// A client request for one component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    #[serde(flatten)]
    pub action: Action,
    pub component_id: ComponentId,
    pub component_class: String,
    #[serde(default)]
    pub state: StateMap,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub signature: String,
}

impl RequestMessage {
    pub fn new(action: Action, component_id: ComponentId, component_class: impl Into<String>) -> Self {
        Self {
            action,
            component_id,
            component_class: component_class.into(),
            state: StateMap::new(),
            fingerprint: String::new(),
            signature: String::new(),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: StateMap) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_stamp(mut self, fingerprint: impl Into<String>, signature: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self.signature = signature.into();
        self
    }
}

/// Client-side navigation requested by a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
    /// Navigate in place instead of a full page load.
    #[serde(default)]
    pub spa: bool,
}

/// Patch payload and new stamps for the component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseContent {
    /// Patch envelope (or a bare array from older engines).
    pub p: JsonValue,
    pub st: StateMap,
    pub f: String,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<FieldErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl ResponseContent {
    /// Decodes the carried patches.
    ///
    /// # Errors
    ///
    /// See [`codec::decode`].
    pub fn patches(&self) -> DecodeResult<Vec<Patch>> {
        codec::decode(&self.p)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub s: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<ResponseContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<JsonValue>,
    #[serde(
        default,
        rename = "browserEvents",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub browser_events: Vec<JsonValue>,
}

impl ResponseMessage {
    pub fn success(content: ResponseContent) -> Self {
        Self {
            s: true,
            c: Some(content),
            redirect: None,
            events: Vec::new(),
            browser_events: Vec::new(),
        }
    }

    /// Field errors carried by a validation failure, if any.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        self.c.as_ref().and_then(|c| c.e.as_ref())
    }
}

/// Wire error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    MethodError,
    PropertyError,
    SecurityError,
    Exception,
    ServerError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::MethodError => "method_error",
            ErrorKind::PropertyError => "property_error",
            ErrorKind::SecurityError => "security_error",
            ErrorKind::Exception => "exception",
            ErrorKind::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            errors: None,
            details: None,
        }
    }
}

/// Anything the server may answer with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Response(ResponseMessage),
    Error(ErrorPayload),
}

impl From<ResponseMessage> for Reply {
    fn from(response: ResponseMessage) -> Self {
        Reply::Response(response)
    }
}

impl From<ErrorPayload> for Reply {
    fn from(error: ErrorPayload) -> Self {
        Reply::Error(error)
    }
}

/// Initial render of a component, used by the client to hydrate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub component_id: ComponentId,
    pub component_class: String,
    pub state: StateMap,
    pub fingerprint: String,
    pub signature: String,
    pub html: String,
}
