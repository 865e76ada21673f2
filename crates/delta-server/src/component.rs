//! Component abstraction and per-class dispatch tables.
//!
//! A component renders its state to markup and exposes a fixed set of
//! callable methods and bound properties. Which names are exposed is read
//! once, when the class is registered, into a [`DispatchTable`]. Requests are
//! checked against that table before any component code runs.
//!
//! # Example
//!
//! ```rust
//! use delta_server::component::{CallEffects, Component, ComponentRegistry};
//! use delta_server::{RequestContext, RequestError, RequestResult};
//! use delta_core::{FieldErrors, StateMap};
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct Counter;
//!
//! #[async_trait]
//! impl Component for Counter {
//!     fn class_name(&self) -> &'static str {
//!         "Counter"
//!     }
//!
//!     fn methods(&self) -> &'static [&'static str] {
//!         &["increment"]
//!     }
//!
//!     fn render(&self, state: &StateMap, _errors: &FieldErrors) -> String {
//!         format!("<span>{}</span>", state["count"])
//!     }
//!
//!     async fn call(
//!         &self,
//!         method: &str,
//!         _params: &StateMap,
//!         state: &mut StateMap,
//!         _ctx: &RequestContext,
//!     ) -> RequestResult<CallEffects> {
//!         match method {
//!             "increment" => {
//!                 let count = state["count"].as_i64().unwrap_or(0);
//!                 state.insert("count".into(), json!(count + 1));
//!                 Ok(CallEffects::default())
//!             }
//!             other => Err(RequestError::method(format!("unhandled method {other}"))),
//!         }
//!     }
//! }
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register(Counter).unwrap();
//! assert!(registry.table("Counter").unwrap().allows_method("increment"));
//! ```

use crate::context::RequestContext;
use crate::error::{ConfigError, RequestError, RequestResult};
use async_trait::async_trait;
use delta_core::message::{Action, Redirect, RequestMessage};
use delta_core::{FieldErrors, JsonValue, StateMap};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A server-rendered UI component.
#[async_trait]
pub trait Component: Send + Sync {
    /// Class name used on the wire.
    fn class_name(&self) -> &'static str;

    /// Methods clients may call.
    fn methods(&self) -> &'static [&'static str];

    /// Properties clients may set directly.
    fn properties(&self) -> &'static [&'static str] {
        &[]
    }

    /// Tag of the host element wrapping the rendered markup.
    fn host_tag(&self) -> &'static str {
        "div"
    }

    /// State of a freshly mounted instance.
    fn initial_state(&self) -> StateMap {
        StateMap::new()
    }

    /// Render the contents of the host element.
    fn render(&self, state: &StateMap, errors: &FieldErrors) -> String;

    /// Validate state after a change. An empty map means valid.
    fn validate(&self, _state: &StateMap) -> FieldErrors {
        FieldErrors::new()
    }

    /// Run a method against the instance state.
    ///
    /// # Errors
    ///
    /// Errors are reported to the client; the state is left unchanged.
    async fn call(
        &self,
        method: &str,
        params: &StateMap,
        state: &mut StateMap,
        ctx: &RequestContext,
    ) -> RequestResult<CallEffects>;
}

/// Side effects of a method call besides its state change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallEffects {
    /// Navigation requested by the method.
    pub redirect: Option<Redirect>,
    /// Events for other components.
    pub events: Vec<JsonValue>,
    /// Events dispatched in the client's host environment.
    pub browser_events: Vec<JsonValue>,
    /// Query string the client should show in its address bar.
    pub query: Option<String>,
}

impl CallEffects {
    /// Navigate to `url` after the call.
    #[must_use]
    pub fn redirect(url: impl Into<String>, spa: bool) -> Self {
        Self {
            redirect: Some(Redirect {
                url: url.into(),
                spa,
            }),
            ..Self::default()
        }
    }

    /// Add a browser event.
    #[must_use]
    pub fn with_browser_event(mut self, event: JsonValue) -> Self {
        self.browser_events.push(event);
        self
    }

    /// Add a component event.
    #[must_use]
    pub fn with_event(mut self, event: JsonValue) -> Self {
        self.events.push(event);
        self
    }

    /// Replace the page's query string without navigating.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// The externally reachable surface of one component class.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    class: &'static str,
    host_tag: &'static str,
    methods: HashSet<&'static str>,
    properties: HashSet<&'static str>,
}

impl DispatchTable {
    /// Build the table for a component.
    #[must_use]
    pub fn of(component: &dyn Component) -> Self {
        Self {
            class: component.class_name(),
            host_tag: component.host_tag(),
            methods: component.methods().iter().copied().collect(),
            properties: component.properties().iter().copied().collect(),
        }
    }

    /// Class name.
    #[must_use]
    pub fn class(&self) -> &'static str {
        self.class
    }

    /// Host element tag.
    #[must_use]
    pub fn host_tag(&self) -> &'static str {
        self.host_tag
    }

    /// Whether `method` may be called.
    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.contains(method)
    }

    /// Whether `property` may be set.
    #[must_use]
    pub fn allows_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    /// Check a request action against the table.
    ///
    /// # Errors
    ///
    /// [`RequestError::UnknownMethod`] or [`RequestError::UnknownProperty`].
    pub fn check(&self, action: &Action) -> RequestResult<()> {
        match action {
            Action::Call { method, .. } if !self.allows_method(method) => {
                Err(RequestError::UnknownMethod {
                    class: self.class.to_owned(),
                    method: method.clone(),
                })
            }
            Action::Update { property, .. } if !self.allows_property(property) => {
                Err(RequestError::UnknownProperty {
                    class: self.class.to_owned(),
                    property: property.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// A registered component class.
#[derive(Clone)]
pub struct Registered {
    /// The dispatch table built at registration.
    pub table: DispatchTable,
    /// The component implementation.
    pub component: Arc<dyn Component>,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Component classes by name. Immutable once the engine is built.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    classes: HashMap<&'static str, Registered>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component class and build its dispatch table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateComponent`] if the class name is taken.
    pub fn register<C: Component + 'static>(&mut self, component: C) -> Result<&mut Self, ConfigError> {
        let class = component.class_name();
        if self.classes.contains_key(class) {
            return Err(ConfigError::DuplicateComponent {
                class: class.to_owned(),
            });
        }
        let table = DispatchTable::of(&component);
        tracing::debug!(
            class,
            methods = table.methods.len(),
            properties = table.properties.len(),
            "registered component"
        );
        self.classes.insert(
            class,
            Registered {
                table,
                component: Arc::new(component),
            },
        );
        Ok(self)
    }

    /// The dispatch table of a class.
    #[must_use]
    pub fn table(&self, class: &str) -> Option<&DispatchTable> {
        self.classes.get(class).map(|r| &r.table)
    }

    /// Look up a class.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownComponent`] for unregistered classes.
    pub fn get(&self, class: &str) -> RequestResult<&Registered> {
        self.classes
            .get(class)
            .ok_or_else(|| RequestError::UnknownComponent {
                class: class.to_owned(),
            })
    }

    /// Look up the class of a request and check its action.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::get`] and [`DispatchTable::check`].
    pub fn resolve(&self, request: &RequestMessage) -> RequestResult<&Registered> {
        let registered = self.get(&request.component_class)?;
        registered.table.check(&request.action)?;
        Ok(registered)
    }

    /// Number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use delta_core::types::ComponentId;
    use serde_json::json;

    struct Profile;

    #[async_trait]
    impl Component for Profile {
        fn class_name(&self) -> &'static str {
            "Profile"
        }

        fn methods(&self) -> &'static [&'static str] {
            &["save"]
        }

        fn properties(&self) -> &'static [&'static str] {
            &["name"]
        }

        fn host_tag(&self) -> &'static str {
            "form"
        }

        fn render(&self, _state: &StateMap, _errors: &FieldErrors) -> String {
            String::new()
        }

        async fn call(
            &self,
            _method: &str,
            _params: &StateMap,
            _state: &mut StateMap,
            _ctx: &RequestContext,
        ) -> RequestResult<CallEffects> {
            Ok(CallEffects::default())
        }
    }

    fn request(action: Action, class: &str) -> RequestMessage {
        RequestMessage::new(action, ComponentId::new("p1"), class)
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register(Profile).expect("first registration");
        registry
    }

    #[test]
    fn table_is_built_at_registration() {
        let registry = registry();
        let table = registry.table("Profile").expect("registered");
        assert_eq!(table.host_tag(), "form");
        assert!(table.allows_method("save"));
        assert!(!table.allows_method("name"));
        assert!(table.allows_property("name"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        assert_matches!(
            registry.register(Profile),
            Err(ConfigError::DuplicateComponent { .. })
        );
    }

    #[test]
    fn resolve_checks_the_action() {
        let registry = registry();
        let call = |method: &str| Action::Call {
            method: method.into(),
            params: StateMap::new(),
        };
        let update = |property: &str| Action::Update {
            property: property.into(),
            value: json!(1),
        };

        assert!(registry.resolve(&request(call("save"), "Profile")).is_ok());
        assert!(registry.resolve(&request(update("name"), "Profile")).is_ok());
        assert_matches!(
            registry.resolve(&request(call("drop"), "Profile")),
            Err(RequestError::UnknownMethod { .. })
        );
        assert_matches!(
            registry.resolve(&request(update("email"), "Profile")),
            Err(RequestError::UnknownProperty { .. })
        );
        assert_matches!(
            registry.resolve(&request(call("save"), "Missing")),
            Err(RequestError::UnknownComponent { .. })
        );
    }

    #[test]
    fn effects_builders() {
        let effects = CallEffects::redirect("/done", true).with_browser_event(json!({"name": "saved"}));
        assert_eq!(effects.redirect.map(|r| r.url), Some("/done".to_owned()));
        assert_eq!(effects.browser_events.len(), 1);
    }
}
