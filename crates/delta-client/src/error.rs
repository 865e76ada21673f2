use delta_core::DecodeError;
use delta_core::message::ErrorPayload;
use delta_core::types::ComponentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No mounted component instance {id}")]
    UnknownInstance { id: ComponentId },
    #[error("Transport failed: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("Malformed patches: {0}")]
    Decode(#[from] DecodeError),
    #[error("Server reported {}: {}", payload.kind, payload.error)]
    Server { payload: ErrorPayload },
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The server's error payload, if the server answered with one.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Server { payload } => Some(payload),
            _ => None,
        }
    }
}

impl From<ErrorPayload> for ClientError {
    fn from(payload: ErrorPayload) -> Self {
        Self::Server { payload }
    }
}
