//! Error types for the server side of the engine.
//!
//! [`RequestError`] is the top-level error of one request round trip. Every
//! variant maps onto one wire error class through [`RequestError::kind`], and
//! [`RequestError::to_payload`] produces the [`ErrorPayload`] sent back to
//! the client. Internal details only leave the server in debug mode.
//!
//! # Example
//!
//! ```rust
//! use delta_server::error::RequestError;
//! use delta_core::message::ErrorKind;
//!
//! let err = RequestError::UnknownMethod {
//!     class: "Counter".into(),
//!     method: "explode".into(),
//! };
//! assert_eq!(err.kind(), ErrorKind::MethodError);
//! ```

use delta_core::message::{ErrorKind, ErrorPayload};
use delta_core::{FieldErrors, JsonValue};
use serde_json::json;
use thiserror::Error;

/// Message sent in place of internal details outside debug mode.
pub const OPAQUE_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Top-level errors from handling one request.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    /// The resulting state failed component validation.
    ///
    /// Recovered by the client: field errors are attached and state is left
    /// untouched.
    #[error("validation failed for {} field(s)", errors.len())]
    Validation {
        /// Field name to error messages.
        errors: FieldErrors,
    },

    /// No component class with this name is registered.
    #[error("unknown component class '{class}'")]
    UnknownComponent {
        /// The requested class name.
        class: String,
    },

    /// The class exists but does not expose the method.
    #[error("component '{class}' has no callable method '{method}'")]
    UnknownMethod {
        /// Component class name.
        class: String,
        /// The requested method.
        method: String,
    },

    /// The class exists but the property is not bound.
    #[error("component '{class}' has no bound property '{property}'")]
    UnknownProperty {
        /// Component class name.
        class: String,
        /// The requested property.
        property: String,
    },

    /// The state signature did not verify.
    #[error("state signature rejected: {reason}")]
    Security {
        /// Why verification failed.
        reason: String,
    },

    /// A component method failed.
    #[error("{message}")]
    Method {
        /// Error message.
        message: String,
        /// Optional source error for chaining.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request was cancelled before it completed.
    #[error("request aborted: {reason}")]
    Aborted {
        /// Human-readable reason for the abort.
        reason: String,
    },

    /// State management operation failed.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Patch encoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodeError),

    /// Unexpected condition inside the engine.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
        /// Location in code where the error originated (`file:line`).
        location: &'static str,
    },
}

impl RequestError {
    /// Create a method error with a message.
    #[must_use]
    pub fn method(message: impl Into<String>) -> Self {
        Self::Method {
            message: message.into(),
            source: None,
        }
    }

    /// Create a method error with a message and source.
    #[must_use]
    pub fn method_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Method {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a security error.
    #[must_use]
    pub fn security(reason: impl Into<String>) -> Self {
        Self::Security {
            reason: reason.into(),
        }
    }

    /// Create an internal error with location tracking.
    ///
    /// Use the `internal_error!` macro instead of calling this directly.
    #[doc(hidden)]
    #[must_use]
    pub fn internal(message: impl Into<String>, location: &'static str) -> Self {
        Self::Internal {
            message: message.into(),
            location,
        }
    }

    /// The wire error class for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::UnknownMethod { .. } => ErrorKind::MethodError,
            Self::UnknownProperty { .. } => ErrorKind::PropertyError,
            Self::Security { .. } => ErrorKind::SecurityError,
            Self::UnknownComponent { .. } | Self::Method { .. } => ErrorKind::Exception,
            Self::Aborted { .. } | Self::State(_) | Self::Encoding(_) | Self::Internal { .. } => {
                ErrorKind::ServerError
            }
        }
    }

    /// Check if this error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Build the wire payload.
    ///
    /// `exception` and `server_error` messages are replaced by an opaque
    /// message unless `debug` is set, in which case the full source chain
    /// is attached as `details`.
    #[must_use]
    pub fn to_payload(&self, debug: bool) -> ErrorPayload {
        let kind = self.kind();
        let mut payload = ErrorPayload::new(kind, self.to_string());

        match (self, kind) {
            (Self::Validation { errors }, _) => {
                payload.errors = Some(errors.clone());
            }
            (_, ErrorKind::Exception | ErrorKind::ServerError) if !debug => {
                payload.error = OPAQUE_ERROR_MESSAGE.to_owned();
            }
            (_, ErrorKind::Exception | ErrorKind::ServerError) => {
                payload.details = Some(self.debug_details());
            }
            _ => {}
        }
        payload
    }

    fn debug_details(&self) -> JsonValue {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        let mut details = json!({ "chain": chain });
        if let Self::Internal { location, .. } = self {
            details["location"] = json!(location);
        }
        details
    }
}

/// Macro for creating internal errors with automatic location tracking.
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::RequestError::internal($msg, concat!(file!(), ":", line!()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RequestError::internal(format!($fmt, $($arg)*), concat!(file!(), ":", line!()))
    };
}

/// Errors during patch encoding.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EncodeError {
    /// JSON serialization failed.
    #[error("JSON serialization failed for {what}: {source}")]
    Json {
        /// What was being serialized.
        what: &'static str,
        /// The underlying `serde_json` error.
        #[source]
        source: serde_json::Error,
    },

    /// The encoded patch list exceeds the maximum allowed size.
    #[error("patches exceed max size: {size} bytes > {max} bytes limit")]
    PatchesTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

impl EncodeError {
    /// Create a JSON encoding error.
    #[must_use]
    pub fn json(what: &'static str, source: serde_json::Error) -> Self {
        Self::Json { what, source }
    }
}

impl From<delta_core::EncodeError> for EncodeError {
    fn from(err: delta_core::EncodeError) -> Self {
        match err {
            delta_core::EncodeError::Json { what, source } => Self::Json { what, source },
        }
    }
}

/// Errors during component state handling.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StateError {
    /// Component state must be a JSON object.
    #[error("component state must be an object, found {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// Errors in engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No signing secret was configured.
    #[error("a non-empty secret key is required to sign component state")]
    EmptySecret,

    /// The secret key was rejected by the MAC implementation.
    #[error("invalid secret key: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// A component class was registered twice.
    #[error("component class '{class}' is already registered")]
    DuplicateComponent {
        /// The duplicated class name.
        class: String,
    },
}

/// Result type alias for request handling.
pub type RequestResult<T> = Result<T, RequestError>;

/// Result type alias for encoding operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;
