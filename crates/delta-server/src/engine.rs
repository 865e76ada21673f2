//! The request pipeline.
//!
//! For every request [`Engine::handle`]:
//!
//! 1. resolves the component class and checks the action against its
//!    dispatch table;
//! 2. verifies the state signature per the configured policy;
//! 3. renders the incoming state and parses it as the old snapshot;
//! 4. runs the method call or property update through a [`StateManager`];
//! 5. validates the resulting state;
//! 6. renders the new state, diffs it against the snapshot (falling back to
//!    a full region replacement when the client's fingerprint is stale),
//!    encodes the patches and signs the new state.
//!
//! A validation failure answers `s: false` with the old state, field errors
//! and the patches that display them. Any other failure answers with an
//! [`ErrorPayload`](delta_core::message::ErrorPayload).

use crate::builder::parse_region;
use crate::component::{CallEffects, ComponentRegistry, Registered};
use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::diff::diff_with_fingerprint;
use crate::encoder::PatchEncoder;
use crate::error::{ConfigError, RequestError, RequestResult};
use crate::fingerprint::fingerprint;
use crate::guard::{StateGuard, Verification};
use crate::state::StateManager;
use delta_core::message::{
    Action, ErrorKind, Mount, Reply, RequestMessage, ResponseContent, ResponseMessage,
};
use delta_core::types::ComponentId;
use delta_core::{FieldErrors, StateMap};
use std::sync::Arc;
use tracing::instrument;

/// Server side of the delta-rendering engine.
///
/// Cheap to clone; clones share the component registry.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ComponentRegistry>,
    guard: StateGuard,
    encoder: PatchEncoder,
}

impl Engine {
    /// Create an engine over a fully populated registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the signing secret is unusable.
    pub fn new(
        config: EngineConfig,
        registry: impl Into<Arc<ComponentRegistry>>,
    ) -> Result<Self, ConfigError> {
        let guard = StateGuard::from_config(&config)?;
        let encoder = PatchEncoder::from_config(&config);
        Ok(Self {
            config,
            registry: registry.into(),
            guard,
            encoder,
        })
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The component registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The state guard used for signing.
    #[must_use]
    pub fn guard(&self) -> &StateGuard {
        &self.guard
    }

    /// Render a new instance of `class` with its initial state.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownComponent`] for unregistered classes.
    pub fn mount(&self, class: &str, component_id: ComponentId) -> RequestResult<Mount> {
        let registered = self.registry.get(class)?;
        let state = registered.component.initial_state();
        Ok(self.mount_registered(registered, component_id, state))
    }

    /// Render an instance of `class` with the given state.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownComponent`] for unregistered classes.
    pub fn mount_with_state(
        &self,
        class: &str,
        component_id: ComponentId,
        state: StateMap,
    ) -> RequestResult<Mount> {
        let registered = self.registry.get(class)?;
        Ok(self.mount_registered(registered, component_id, state))
    }

    fn mount_registered(
        &self,
        registered: &Registered,
        component_id: ComponentId,
        state: StateMap,
    ) -> Mount {
        let tree = render(registered, &state, &FieldErrors::new());
        Mount {
            signature: self.guard.sign(&state, &component_id),
            fingerprint: fingerprint(&tree),
            html: tree.to_html(),
            component_class: registered.table.class().to_owned(),
            component_id,
            state,
        }
    }

    /// Handle one request.
    ///
    /// Never fails: errors are turned into their wire payload.
    #[instrument(
        skip_all,
        fields(
            component_id = %request.component_id,
            class = %request.component_class,
            target = request.action.target(),
        )
    )]
    pub async fn handle(&self, request: RequestMessage, ctx: &RequestContext) -> Reply {
        match self.process(&request, ctx).await {
            Ok(response) => Reply::Response(response),
            Err(err) => {
                match err.kind() {
                    ErrorKind::SecurityError => tracing::warn!(error = %err, "request rejected"),
                    ErrorKind::Exception | ErrorKind::ServerError => {
                        tracing::error!(error = %err, "request failed");
                    }
                    _ => tracing::debug!(error = %err, "request refused"),
                }
                Reply::Error(err.to_payload(self.config.debug()))
            }
        }
    }

    async fn process(
        &self,
        request: &RequestMessage,
        ctx: &RequestContext,
    ) -> RequestResult<ResponseMessage> {
        let registered = self.registry.resolve(request)?;
        let verification = self.guard.check(
            request,
            self.config.verification(),
            self.config.lenient_field_limit(),
        )?;
        if let Verification::Lenient { reset_fields } = &verification {
            tracing::debug!(?reset_fields, "continuing with client-supplied state");
        }

        let old_tree = render(registered, &request.state, &FieldErrors::new());
        let old_fingerprint = fingerprint(&old_tree);
        let manager = StateManager::new(request.state.clone());

        let (delta, effects) = match &request.action {
            Action::Call { method, params } => {
                abort_if_cancelled(ctx)?;
                let mut working = manager.snapshot();
                let outcome = tokio::select! {
                    biased;
                    () = ctx.cancelled() => return Err(aborted()),
                    outcome = registered.component.call(method, params, &mut working, ctx) => outcome,
                };
                let effects = match outcome {
                    Ok(effects) => effects,
                    Err(RequestError::Validation { errors }) if errors.is_empty() => {
                        return Err(crate::internal_error!(
                            "'{}' failed validation without naming a field",
                            registered.table.class()
                        ));
                    }
                    Err(RequestError::Validation { errors }) => {
                        return self.reject(registered, request, &old_tree, errors);
                    }
                    Err(err) => return Err(err),
                };
                (manager.replace(working), effects)
            }
            Action::Update { property, value } => (
                manager.set_property(property, value.clone()),
                CallEffects::default(),
            ),
        };

        let new_state = manager.snapshot();
        let errors = registered.component.validate(&new_state);
        if !errors.is_empty() {
            return self.reject(registered, request, &old_tree, errors);
        }

        let (patches, new_fingerprint) =
            if delta.is_empty() && request.fingerprint == old_fingerprint {
                (Vec::new(), old_fingerprint)
            } else {
                let new_tree = render(registered, &new_state, &FieldErrors::new());
                let patches = diff_with_fingerprint(&old_tree, &new_tree, &request.fingerprint);
                (patches, fingerprint(&new_tree))
            };
        tracing::debug!(
            changed = ?delta.changed_keys(),
            patches = patches.len(),
            "request applied"
        );

        Ok(ResponseMessage {
            s: true,
            c: Some(ResponseContent {
                p: self.encoder.encode(&patches)?,
                sig: self.guard.sign(&new_state, &request.component_id),
                st: new_state,
                f: new_fingerprint,
                e: None,
                q: effects.query,
            }),
            redirect: effects.redirect,
            events: effects.events,
            browser_events: effects.browser_events,
        })
    }

    /// Answer a validation failure: old state, errors, and the patches that
    /// render them.
    fn reject(
        &self,
        registered: &Registered,
        request: &RequestMessage,
        old_tree: &delta_core::vnode::VNode,
        errors: FieldErrors,
    ) -> RequestResult<ResponseMessage> {
        let error_tree = render(registered, &request.state, &errors);
        let patches = diff_with_fingerprint(old_tree, &error_tree, &request.fingerprint);
        tracing::debug!(fields = errors.len(), "validation failed");

        Ok(ResponseMessage {
            s: false,
            c: Some(ResponseContent {
                p: self.encoder.encode(&patches)?,
                st: request.state.clone(),
                f: fingerprint(&error_tree),
                sig: self.guard.sign(&request.state, &request.component_id),
                e: Some(errors),
                q: None,
            }),
            redirect: None,
            events: Vec::new(),
            browser_events: Vec::new(),
        })
    }
}

fn render(
    registered: &Registered,
    state: &StateMap,
    errors: &FieldErrors,
) -> delta_core::vnode::VNode {
    let markup = registered.component.render(state, errors);
    parse_region(&markup, registered.table.host_tag())
}

fn abort_if_cancelled(ctx: &RequestContext) -> RequestResult<()> {
    if ctx.is_cancelled() {
        return Err(aborted());
    }
    Ok(())
}

fn aborted() -> RequestError {
    RequestError::Aborted {
        reason: "request cancelled".into(),
    }
}
