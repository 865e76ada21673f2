//! Request sequencing and response merging.
//!
//! Every request issued for an instance gets the next number of that
//! instance's sequence and cancels the request it supersedes. Only the
//! response to the most recently issued request is merged; anything older is
//! reported as [`Outcome::Stale`] and leaves the instance untouched.
//!
//! Merging follows the request kind:
//!
//! - a **call** response replaces both the authoritative snapshot and the
//!   local state;
//! - an **update** response only merges the updated property, so other
//!   properties the user is editing keep their local values;
//! - a **validation failure** attaches field errors and applies the patches
//!   that render them, without touching state;
//! - any other **error** is reported and local edits are kept.

use crate::apply::{ApplyReport, apply_patches};
use crate::error::ClientError;
use crate::live::{LiveTree, NodeId};
use crate::registry::{ComponentInstance, ComponentRegistry};
use crate::subscriber::CoordinatorSubscriber;
use crate::transport::Transport;
use delta_core::message::{
    Action, ErrorKind, ErrorPayload, Mount, Redirect, Reply, RequestMessage,
};
use delta_core::types::ComponentId;
use delta_core::{FieldErrors, JsonValue, StateMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Log every outcome.
    pub debug: bool,
    /// Passed to [`CoordinatorSubscriber::on_divergence`] so the host can
    /// re-mount diverged components.
    pub resync_on_divergence: bool,
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_resync_on_divergence(mut self, resync: bool) -> Self {
        self.resync_on_divergence = resync;
        self
    }
}

/// An issued request, ready to be sent.
#[derive(Debug, Clone)]
pub struct Ticket {
    component_id: ComponentId,
    sequence: u64,
    request: RequestMessage,
    cancellation: CancellationToken,
}

impl Ticket {
    pub fn component_id(&self) -> &ComponentId {
        &self.component_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The message to send.
    pub fn request(&self) -> &RequestMessage {
        &self.request
    }

    /// Cancelled when a newer request supersedes this one or the instance
    /// is torn down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What happened to a request.
#[derive(Debug)]
pub enum Outcome {
    /// The response was merged and its patches applied.
    Applied { report: ApplyReport },
    /// A newer request was issued; the response was dropped.
    Stale { sequence: u64, current: u64 },
    /// The request was cancelled or its instance is gone.
    Cancelled,
    /// The server rejected the new state. `report` is set when the error UI
    /// was patched in.
    ValidationFailed {
        errors: FieldErrors,
        report: Option<ApplyReport>,
    },
    /// The response was merged and asks for navigation.
    Redirect {
        redirect: Redirect,
        report: ApplyReport,
    },
    Failed { error: ClientError },
}

impl Outcome {
    /// The apply report, for outcomes that patched the tree.
    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            Outcome::Applied { report } | Outcome::Redirect { report, .. } => Some(report),
            Outcome::ValidationFailed { report, .. } => report.as_ref(),
            _ => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. } | Outcome::Redirect { .. })
    }
}

/// Owns the live tree and the mounted instances, and runs every request
/// cycle against them.
pub struct RequestCoordinator {
    tree: LiveTree,
    registry: ComponentRegistry,
    config: CoordinatorConfig,
    subscribers: Vec<Arc<dyn CoordinatorSubscriber>>,
}

impl RequestCoordinator {
    pub fn new(tree: LiveTree, config: CoordinatorConfig) -> Self {
        Self {
            tree,
            registry: ComponentRegistry::new(),
            config,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn CoordinatorSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn tree(&self) -> &LiveTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut LiveTree {
        &mut self.tree
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    pub fn instance(&self, id: &ComponentId) -> Option<&ComponentInstance> {
        self.registry.get(id)
    }

    /// Hydrates a server-rendered instance whose region is rooted at `host`.
    pub fn mount(&mut self, mount: &Mount, host: NodeId) -> &mut ComponentInstance {
        self.registry.hydrate(mount, host)
    }

    /// Records a local edit without contacting the server.
    pub fn edit(&mut self, id: &ComponentId, property: &str, value: JsonValue) -> Result<(), ClientError> {
        let instance = self.instance_mut(id)?;
        instance.state.insert(property.to_owned(), value);
        Ok(())
    }

    /// Issues a method call carrying the instance's local state.
    pub fn issue_call(
        &mut self,
        id: &ComponentId,
        method: impl Into<String>,
        params: StateMap,
    ) -> Result<Ticket, ClientError> {
        self.issue(
            id,
            Action::Call {
                method: method.into(),
                params,
            },
        )
    }

    /// Issues a property update.
    ///
    /// The property is set on the local state right away. The request
    /// carries the authoritative snapshot, which is what the signature
    /// covers.
    pub fn issue_update(
        &mut self,
        id: &ComponentId,
        property: impl Into<String>,
        value: JsonValue,
    ) -> Result<Ticket, ClientError> {
        self.issue(
            id,
            Action::Update {
                property: property.into(),
                value,
            },
        )
    }

    fn issue(&mut self, id: &ComponentId, action: Action) -> Result<Ticket, ClientError> {
        let instance = self.instance_mut(id)?;
        if let Action::Update { property, value } = &action {
            instance.state.insert(property.clone(), value.clone());
        }

        instance.cancel_pending();
        instance.sequence += 1;
        let cancellation = CancellationToken::new();
        instance.pending = Some(cancellation.clone());

        let state = if action.is_update() {
            instance.authoritative.clone()
        } else {
            instance.state.clone()
        };
        log::debug!(
            "issuing {} '{}' for {} as #{}",
            if action.is_update() { "update" } else { "call" },
            action.target(),
            instance.id,
            instance.sequence
        );
        let request = RequestMessage::new(action, instance.id.clone(), instance.class.clone())
            .with_state(state)
            .with_stamp(instance.fingerprint.clone(), instance.signature.clone());

        Ok(Ticket {
            component_id: instance.id.clone(),
            sequence: instance.sequence,
            request,
            cancellation,
        })
    }

    fn instance_mut(&mut self, id: &ComponentId) -> Result<&mut ComponentInstance, ClientError> {
        self.registry
            .get_mut(id)
            .ok_or_else(|| ClientError::UnknownInstance { id: id.clone() })
    }

    /// Merges the reply to `ticket`.
    pub async fn complete(&mut self, ticket: &Ticket, reply: Reply) -> Outcome {
        let outcome = self.merge(ticket, reply);
        self.finish(ticket, outcome).await
    }

    /// Sends `ticket` and merges the reply. Cancelling the ticket while the
    /// transport is busy abandons the request.
    pub async fn dispatch<T>(&mut self, transport: &T, ticket: Ticket) -> Outcome
    where
        T: Transport + ?Sized,
    {
        let cancellation = ticket.cancellation.clone();
        let sent = tokio::select! {
            biased;
            () = cancellation.cancelled() => None,
            reply = transport.send(&ticket.request) => Some(reply),
        };

        match sent {
            Some(Ok(reply)) => self.complete(&ticket, reply).await,
            Some(Err(error)) => {
                self.settle(&ticket);
                self.finish(&ticket, Outcome::Failed { error }).await
            }
            None => {
                self.settle(&ticket);
                self.finish(&ticket, Outcome::Cancelled).await
            }
        }
    }

    /// Issues and dispatches a method call.
    pub async fn call<T>(
        &mut self,
        transport: &T,
        id: &ComponentId,
        method: impl Into<String>,
        params: StateMap,
    ) -> Result<Outcome, ClientError>
    where
        T: Transport + ?Sized,
    {
        let ticket = self.issue_call(id, method, params)?;
        Ok(self.dispatch(transport, ticket).await)
    }

    /// Issues and dispatches a property update.
    pub async fn update<T>(
        &mut self,
        transport: &T,
        id: &ComponentId,
        property: impl Into<String>,
        value: JsonValue,
    ) -> Result<Outcome, ClientError>
    where
        T: Transport + ?Sized,
    {
        let ticket = self.issue_update(id, property, value)?;
        Ok(self.dispatch(transport, ticket).await)
    }

    /// Clears the pending handle if `ticket` is still the current request.
    fn settle(&mut self, ticket: &Ticket) {
        if let Some(instance) = self.registry.get_mut(&ticket.component_id) {
            if instance.sequence == ticket.sequence {
                instance.pending = None;
            }
        }
    }

    fn merge(&mut self, ticket: &Ticket, reply: Reply) -> Outcome {
        let Some(instance) = self.registry.get_mut(&ticket.component_id) else {
            return Outcome::Cancelled;
        };
        if ticket.sequence != instance.sequence {
            log::debug!(
                "discarding stale response #{} for {} (current #{})",
                ticket.sequence,
                instance.id,
                instance.sequence
            );
            return Outcome::Stale {
                sequence: ticket.sequence,
                current: instance.sequence,
            };
        }
        instance.pending = None;

        let response = match reply {
            Reply::Response(response) => response,
            Reply::Error(payload) => {
                if payload.kind == ErrorKind::ValidationError {
                    if let Some(errors) = &payload.errors {
                        instance.errors = errors.clone();
                        return Outcome::ValidationFailed {
                            errors: errors.clone(),
                            report: None,
                        };
                    }
                }
                return Outcome::Failed {
                    error: payload.into(),
                };
            }
        };

        let report = match response.c {
            Some(content) => {
                let patches = match content.patches() {
                    Ok(patches) => patches,
                    Err(err) => return Outcome::Failed { error: err.into() },
                };
                let report = apply_patches(&mut self.tree, instance.host, &patches);
                if report.diverged() {
                    log::warn!(
                        "{} of {} patches for {} could not be applied",
                        report.skipped.len(),
                        patches.len(),
                        instance.id
                    );
                }
                instance.host = report.root;
                instance.fingerprint = content.f;
                instance.signature = content.sig;

                if !response.s {
                    let errors = content.e.unwrap_or_default();
                    instance.errors = errors.clone();
                    return Outcome::ValidationFailed {
                        errors,
                        report: Some(report),
                    };
                }

                instance.errors.clear();
                if content.q.is_some() {
                    instance.query = content.q;
                }
                merge_state(instance, &ticket.request.action, content.st);
                report
            }
            None if !response.s => {
                let payload = ErrorPayload::new(
                    ErrorKind::ServerError,
                    "request rejected without content",
                );
                return Outcome::Failed {
                    error: payload.into(),
                };
            }
            None => ApplyReport::untouched(instance.host),
        };

        match response.redirect {
            Some(redirect) => {
                if !redirect.spa {
                    log::debug!("navigating to {}, dropping all instances", redirect.url);
                    self.registry.clear();
                }
                Outcome::Redirect { redirect, report }
            }
            None => Outcome::Applied { report },
        }
    }

    async fn finish(&self, ticket: &Ticket, outcome: Outcome) -> Outcome {
        let id = &ticket.component_id;
        if self.config.debug {
            log::info!("request #{} for {id}: {outcome:?}", ticket.sequence);
        }

        for subscriber in &self.subscribers {
            match &outcome {
                Outcome::Applied { report } => subscriber.on_patched(id, report).await,
                Outcome::Redirect { redirect, report } => {
                    subscriber.on_patched(id, report).await;
                    subscriber.on_redirect(id, redirect).await;
                }
                Outcome::Stale { sequence, current } => {
                    subscriber.on_stale(id, *sequence, *current).await;
                }
                Outcome::ValidationFailed { errors, report } => {
                    if let Some(report) = report {
                        subscriber.on_patched(id, report).await;
                    }
                    subscriber.on_validation_errors(id, errors).await;
                }
                Outcome::Failed { error } => subscriber.on_error(id, error).await,
                Outcome::Cancelled => {}
            }
            if let Some(report) = outcome.report().filter(|r| r.diverged()) {
                subscriber
                    .on_divergence(id, report, self.config.resync_on_divergence)
                    .await;
            }
        }
        outcome
    }
}

fn merge_state(instance: &mut ComponentInstance, action: &Action, accepted: StateMap) {
    match action {
        Action::Update { property, .. } => match accepted.get(property) {
            Some(value) => {
                instance.authoritative.insert(property.clone(), value.clone());
                instance.state.insert(property.clone(), value.clone());
            }
            None => {
                instance.authoritative.remove(property);
                instance.state.remove(property);
            }
        },
        Action::Call { .. } => {
            instance.authoritative = accepted.clone();
            instance.state = accepted;
        }
    }
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}
