use crate::error::ClientError;
use delta_core::message::{Reply, RequestMessage};

/// Carries requests to the server.
///
/// HTTP, WebSocket or in-process hosts all fit behind this trait. An
/// implementation reports network-level failures as
/// [`ClientError::Transport`]; error payloads the server answered with are
/// a successful [`Reply::Error`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestMessage) -> Result<Reply, ClientError>;
}
