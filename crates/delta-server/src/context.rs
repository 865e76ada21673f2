//! Per-request context handed to component methods.
//!
//! Besides identifying the page and session a request comes from, the
//! context carries the request's cancellation. A host cancels it when the
//! client disconnects or supersedes the request, and [`Engine::handle`]
//! abandons the call at its next await point. Methods doing long work of
//! their own can race it against [`RequestContext::cancelled`]:
//!
//! ```rust,ignore
//! tokio::select! {
//!     () = ctx.cancelled() => Err(RequestError::Aborted { reason: "superseded".into() }),
//!     rows = repository.search(query) => Ok(render_rows(rows)),
//! }
//! ```
//!
//! [`Engine::handle`]: crate::Engine::handle

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context for one request.
///
/// Clones share the cancellation and the origin.
#[derive(Clone, Default)]
pub struct RequestContext {
    cancellation: CancellationToken,
    origin: Arc<RequestOrigin>,
}

impl RequestContext {
    /// A context for a request coming from `origin`.
    #[must_use]
    pub fn new(origin: RequestOrigin) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            origin: Arc::new(origin),
        }
    }

    /// A context with no known origin.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tie cancellation to a token owned by the host, for example one per
    /// connection.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Completes once the request is cancelled.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// Cancel the request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Where the request comes from.
    #[must_use]
    pub fn origin(&self) -> &RequestOrigin {
        &self.origin
    }

    /// URL of the page hosting the component.
    #[must_use]
    pub fn page_url(&self) -> Option<&str> {
        self.origin.page_url.as_deref()
    }

    /// Host-defined session identity.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.origin.session_id.as_deref()
    }

    /// Header value by lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.origin.headers.get(name).map(String::as_str)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("cancelled", &self.is_cancelled())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Where a request comes from, as reported by the host.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    /// URL of the page the component is mounted on.
    pub page_url: Option<String>,
    /// Host-defined session identity.
    pub session_id: Option<String>,
    /// Transport headers, lowercase keys.
    pub headers: HashMap<String, String>,
}

impl RequestOrigin {
    /// An origin on the page at `url`.
    #[must_use]
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            page_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set the session identity.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Add a header; the name is lowercased.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }
}
