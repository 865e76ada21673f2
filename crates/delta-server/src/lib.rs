//! Server side of the delta-rendering engine.
//!
//! Components render their state to HTML. On every request the engine
//! re-renders the affected component, diffs the new tree against the tree
//! the client holds, and answers with a compact list of structural patches
//! plus the new state, signed so the client cannot forge it.
//!
//! # Architecture
//!
//! 1. **[`Component`]** trait - render, validate, and the callable methods of
//!    a component class
//! 2. **[`ComponentRegistry`]** - classes by name, each with a dispatch table
//!    fixed at registration
//! 3. **[`Engine`]** - the request pipeline: verify, run, validate, diff,
//!    encode, sign
//! 4. **[`StateGuard`]** - HMAC-SHA256 signatures over canonicalized state
//!
//! The diff itself is available on its own through [`diff::diff`] and
//! [`builder::parse`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use delta_server::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Component for Greeter {
//!     fn class_name(&self) -> &'static str {
//!         "Greeter"
//!     }
//!
//!     fn methods(&self) -> &'static [&'static str] {
//!         &[]
//!     }
//!
//!     fn properties(&self) -> &'static [&'static str] {
//!         &["name"]
//!     }
//!
//!     fn render(&self, state: &StateMap, _errors: &FieldErrors) -> String {
//!         format!("<p>Hello {}</p>", state["name"].as_str().unwrap_or("you"))
//!     }
//!
//!     async fn call(
//!         &self,
//!         method: &str,
//!         _params: &StateMap,
//!         _state: &mut StateMap,
//!         _ctx: &RequestContext,
//!     ) -> RequestResult<CallEffects> {
//!         Err(RequestError::method(format!("no method {method}")))
//!     }
//! }
//!
//! # async fn run(request: RequestMessage) -> Result<(), ConfigError> {
//! let mut registry = ComponentRegistry::new();
//! registry.register(Greeter)?;
//! let engine = Engine::new(EngineConfig::new("change me"), registry)?;
//! let reply = engine.handle(request, &RequestContext::empty()).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Request failures are [`RequestError`]s. [`Engine::handle`] never fails: it
//! turns errors into their wire payload, hiding internal detail unless the
//! engine runs in debug mode.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod component;
pub mod config;
pub mod context;
pub mod diff;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod state;

pub use component::{CallEffects, Component, ComponentRegistry, DispatchTable};
pub use config::{EngineConfig, VerificationPolicy};
pub use context::{RequestContext, RequestOrigin};
pub use encoder::PatchEncoder;
pub use engine::Engine;
pub use error::{
    ConfigError, EncodeError, EncodeResult, RequestError, RequestResult, StateError, StateResult,
};
pub use guard::{StateGuard, Verification};
pub use state::{StateManager, StatePatch};

// Re-export the entire delta-core crate for full access
pub use delta_core;

pub use delta_core::message::{Reply, RequestMessage, ResponseMessage};
pub use delta_core::types::ComponentId;
pub use delta_core::vnode::VNode;
pub use delta_core::{FieldErrors, StateMap};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use delta_server::prelude::*;
/// ```
pub mod prelude {
    pub use crate::component::{CallEffects, Component, ComponentRegistry};
    pub use crate::config::{EngineConfig, VerificationPolicy};
    pub use crate::context::RequestContext;
    pub use crate::engine::Engine;
    pub use crate::error::{ConfigError, RequestError, RequestResult};

    pub use delta_core::message::{Action, Reply, RequestMessage, ResponseMessage};
    pub use delta_core::types::ComponentId;
    pub use delta_core::{FieldErrors, JsonValue, StateMap};

    pub use async_trait::async_trait;
}
