//! Mounted component instances.

use crate::live::{LiveTree, NodeId};
use delta_core::message::Mount;
use delta_core::types::ComponentId;
use delta_core::{FieldErrors, StateMap};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Client-side record of one mounted component.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    pub id: ComponentId,
    pub class: String,
    /// Local state, including edits not yet confirmed by the server.
    pub state: StateMap,
    /// The last state the server accepted and signed.
    pub authoritative: StateMap,
    pub fingerprint: String,
    pub signature: String,
    /// Field errors from the last rejected request.
    pub errors: FieldErrors,
    /// Root of the component's region in the live tree.
    pub host: NodeId,
    /// Query string the server last asked the page to show.
    pub query: Option<String>,
    pub(crate) sequence: u64,
    pub(crate) pending: Option<CancellationToken>,
}

impl ComponentInstance {
    fn from_mount(mount: &Mount, host: NodeId) -> Self {
        Self {
            id: mount.component_id.clone(),
            class: mount.component_class.clone(),
            state: mount.state.clone(),
            authoritative: mount.state.clone(),
            fingerprint: mount.fingerprint.clone(),
            signature: mount.signature.clone(),
            errors: FieldErrors::new(),
            host,
            query: None,
            sequence: 0,
            pending: None,
        }
    }

    /// Sequence number of the most recently issued request.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn cancel_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

/// Instances by id. Teardown cancels whatever request an instance has in
/// flight.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    instances: HashMap<ComponentId, ComponentInstance>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the instance described by `mount`, rooted at `host`.
    ///
    /// Re-hydrating an id replaces the previous instance.
    pub fn hydrate(&mut self, mount: &Mount, host: NodeId) -> &mut ComponentInstance {
        if let Some(mut previous) = self.instances.remove(&mount.component_id) {
            log::debug!("re-hydrating component {}", previous.id);
            previous.cancel_pending();
        }
        self.instances
            .entry(mount.component_id.clone())
            .or_insert_with(|| ComponentInstance::from_mount(mount, host))
    }

    pub fn get(&self, id: &ComponentId) -> Option<&ComponentInstance> {
        self.instances.get(id)
    }

    pub fn get_mut(&mut self, id: &ComponentId) -> Option<&mut ComponentInstance> {
        self.instances.get_mut(id)
    }

    pub fn remove(&mut self, id: &ComponentId) -> Option<ComponentInstance> {
        let mut instance = self.instances.remove(id)?;
        instance.cancel_pending();
        Some(instance)
    }

    /// Removes the instance whose region is rooted at `host`.
    pub fn remove_by_host(&mut self, host: NodeId) -> Option<ComponentInstance> {
        let id = self
            .instances
            .values()
            .find(|instance| instance.host == host)
            .map(|instance| instance.id.clone())?;
        self.remove(&id)
    }

    /// Drops every instance whose host is no longer in `tree`.
    pub fn retain_live(&mut self, tree: &LiveTree) -> usize {
        let gone: Vec<ComponentId> = self
            .instances
            .values()
            .filter(|instance| !tree.contains(instance.host))
            .map(|instance| instance.id.clone())
            .collect();
        for id in &gone {
            self.remove(id);
        }
        gone.len()
    }

    pub fn clear(&mut self) {
        for (_, mut instance) in self.instances.drain() {
            instance.cancel_pending();
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.instances.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(id: &str) -> Mount {
        Mount {
            component_id: ComponentId::new(id),
            component_class: "Counter".into(),
            state: StateMap::new(),
            fingerprint: "f".into(),
            signature: "s".into(),
            html: "<div></div>".into(),
        }
    }

    #[test]
    fn teardown_cancels_pending_requests() {
        let mut tree = LiveTree::new();
        let host = tree.create_element("div");
        let mut registry = ComponentRegistry::new();

        let token = CancellationToken::new();
        registry.hydrate(&mount("c1"), host).pending = Some(token.clone());
        assert_eq!(registry.len(), 1);

        let removed = registry.remove_by_host(host).expect("instance");
        assert_eq!(removed.id, ComponentId::new("c1"));
        assert!(token.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn retain_live_drops_detached_hosts() {
        let mut tree = LiveTree::new();
        let kept = tree.create_element("div");
        let dropped = tree.create_element("div");
        let mut registry = ComponentRegistry::new();
        registry.hydrate(&mount("kept"), kept);
        registry.hydrate(&mount("dropped"), dropped);

        tree.remove(dropped);
        assert_eq!(registry.retain_live(&tree), 1);
        assert!(registry.get(&ComponentId::new("kept")).is_some());
        assert!(registry.get(&ComponentId::new("dropped")).is_none());
    }

    #[test]
    fn rehydrate_replaces_instance() {
        let mut tree = LiveTree::new();
        let first = tree.create_element("div");
        let second = tree.create_element("div");
        let mut registry = ComponentRegistry::new();

        let token = CancellationToken::new();
        registry.hydrate(&mount("c1"), first).pending = Some(token.clone());
        registry.hydrate(&mount("c1"), second);

        assert!(token.is_cancelled());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&ComponentId::new("c1")).map(|i| i.host), Some(second));

        registry.clear();
        assert!(registry.is_empty());
    }
}
