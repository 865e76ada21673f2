use assert_matches::assert_matches;
use async_trait::async_trait;
use delta_client::builder::build;
use delta_client::{
    ApplyReport, ClientError, CoordinatorConfig, CoordinatorSubscriber, LiveTree, Outcome,
    RequestCoordinator, Transport,
};
use delta_core::message::{ErrorKind, Reply, RequestMessage, ResponseMessage};
use delta_core::types::ComponentId;
use delta_core::{FieldErrors, JsonValue, StateMap};
use delta_server::builder::parse;
use delta_server::component::{CallEffects, Component, ComponentRegistry};
use delta_server::{Engine, EngineConfig, RequestContext, RequestResult};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

struct Counter;

#[async_trait]
impl Component for Counter {
    fn class_name(&self) -> &'static str {
        "Counter"
    }

    fn methods(&self) -> &'static [&'static str] {
        &["increment", "leave", "open", "sort"]
    }

    fn properties(&self) -> &'static [&'static str] {
        &["label"]
    }

    fn initial_state(&self) -> StateMap {
        state(json!({"count": 0, "label": "clicks"}))
    }

    fn render(&self, state: &StateMap, errors: &FieldErrors) -> String {
        let count = state.get("count").and_then(JsonValue::as_i64).unwrap_or(0);
        let label = state.get("label").and_then(JsonValue::as_str).unwrap_or("");
        let mut html = format!("<span>{count}</span><label>{label}</label>");
        for (field, messages) in errors {
            for message in messages {
                let _ = write!(html, "<p data-field=\"{field}\">{message}</p>");
            }
        }
        html
    }

    fn validate(&self, state: &StateMap) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if state.get("count").and_then(JsonValue::as_i64).unwrap_or(0) > 3 {
            errors.insert("count".into(), vec!["too large".into()]);
        }
        errors
    }

    async fn call(
        &self,
        method: &str,
        _params: &StateMap,
        state: &mut StateMap,
        _ctx: &RequestContext,
    ) -> RequestResult<CallEffects> {
        match method {
            "increment" => {
                let count = state.get("count").and_then(JsonValue::as_i64).unwrap_or(0);
                state.insert("count".into(), json!(count + 1));
                Ok(CallEffects::default())
            }
            "leave" => Ok(CallEffects::redirect("/bye", false)),
            "sort" => Ok(CallEffects::default().with_query("sort=desc")),
            _ => Ok(CallEffects::redirect("/details", true)),
        }
    }
}

fn state(value: JsonValue) -> StateMap {
    value.as_object().cloned().expect("object state")
}

struct InProcess {
    engine: Engine,
}

#[async_trait]
impl Transport for InProcess {
    async fn send(&self, request: &RequestMessage) -> Result<Reply, ClientError> {
        Ok(self
            .engine
            .handle(request.clone(), &RequestContext::empty())
            .await)
    }
}

struct Offline;

#[async_trait]
impl Transport for Offline {
    async fn send(&self, _request: &RequestMessage) -> Result<Reply, ClientError> {
        Err(ClientError::transport("offline"))
    }
}

struct Stalled;

#[async_trait]
impl Transport for Stalled {
    async fn send(&self, _request: &RequestMessage) -> Result<Reply, ClientError> {
        std::future::pending().await
    }
}

/// Answers every request with a bare unsuccessful response.
struct Rejecting;

#[async_trait]
impl Transport for Rejecting {
    async fn send(&self, _request: &RequestMessage) -> Result<Reply, ClientError> {
        let response: ResponseMessage =
            serde_json::from_value(json!({ "s": false })).expect("response");
        Ok(Reply::Response(response))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().expect("recorder lock").push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("recorder lock").clone()
    }
}

#[async_trait]
impl CoordinatorSubscriber for Recorder {
    async fn on_patched(&self, _component_id: &ComponentId, report: &ApplyReport) {
        self.push(format!("patched {}", report.applied));
    }

    async fn on_stale(&self, _component_id: &ComponentId, sequence: u64, current: u64) {
        self.push(format!("stale {sequence} < {current}"));
    }

    async fn on_validation_errors(&self, _component_id: &ComponentId, errors: &FieldErrors) {
        self.push(format!("invalid {}", errors.len()));
    }

    async fn on_divergence(&self, _component_id: &ComponentId, report: &ApplyReport, resync: bool) {
        self.push(format!("diverged {} resync={resync}", report.skipped.len()));
    }
}

fn engine() -> Engine {
    let mut registry = ComponentRegistry::new();
    registry.register(Counter).expect("register");
    Engine::new(EngineConfig::new("client-tests"), registry).expect("engine")
}

struct Fixture {
    transport: InProcess,
    coordinator: RequestCoordinator,
    recorder: Arc<Recorder>,
    id: ComponentId,
}

fn fixture_with(initial: StateMap, config: CoordinatorConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let engine = engine();
    let id = ComponentId::new("counter-1");
    let mount = engine
        .mount_with_state("Counter", id.clone(), initial)
        .expect("mount");

    let (tree, host) = LiveTree::from_vnode(&parse(&mount.html));
    let mut coordinator = RequestCoordinator::new(tree, config);
    coordinator.mount(&mount, host);
    let recorder = Arc::new(Recorder::default());
    coordinator.subscribe(recorder.clone());

    Fixture {
        transport: InProcess { engine },
        coordinator,
        recorder,
        id,
    }
}

fn fixture() -> Fixture {
    fixture_with(Counter.initial_state(), CoordinatorConfig::new())
}

impl Fixture {
    fn rendered(&self) -> String {
        let host = self.coordinator.instance(&self.id).expect("mounted").host;
        build(self.coordinator.tree(), host).to_html()
    }

    fn local(&self, property: &str) -> Option<&JsonValue> {
        self.coordinator.instance(&self.id)?.state.get(property)
    }
}

#[tokio::test]
async fn call_applies_patches_and_replaces_state() {
    let mut f = fixture();
    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");

    assert_matches!(outcome, Outcome::Applied { ref report } if report.applied == 1);
    assert_eq!(f.rendered(), "<div><span>1</span><label>clicks</label></div>");

    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.authoritative["count"], json!(1));
    assert_eq!(instance.state, instance.authoritative);
    assert!(!instance.has_pending());

    // the stored stamp is good for the next round trip
    f.coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert_eq!(f.rendered(), "<div><span>2</span><label>clicks</label></div>");
    assert_eq!(f.recorder.events(), vec!["patched 1", "patched 1"]);
}

#[tokio::test]
async fn query_string_from_the_server_is_kept() {
    let mut f = fixture();
    assert_eq!(f.coordinator.instance(&f.id).expect("mounted").query, None);

    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "sort", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(outcome, Outcome::Applied { ref report } if report.applied == 0);

    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.query.as_deref(), Some("sort=desc"));

    // a response without a query leaves the last one in place
    f.coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.query.as_deref(), Some("sort=desc"));
}

#[tokio::test]
async fn late_response_is_discarded() {
    let mut f = fixture();

    let first = f
        .coordinator
        .issue_update(&f.id, "label", json!("first"))
        .expect("mounted");
    let second = f
        .coordinator
        .issue_update(&f.id, "label", json!("second"))
        .expect("mounted");
    assert!(first.is_cancelled());
    assert_eq!((first.sequence(), second.sequence()), (1, 2));

    let first_reply = f.transport.send(first.request()).await.expect("in process");
    let second_reply = f.transport.send(second.request()).await.expect("in process");

    let outcome = f.coordinator.complete(&second, second_reply).await;
    assert!(outcome.is_applied());
    let outcome = f.coordinator.complete(&first, first_reply).await;
    assert_matches!(outcome, Outcome::Stale { sequence: 1, current: 2 });

    assert_eq!(f.local("label"), Some(&json!("second")));
    assert_eq!(f.rendered(), "<div><span>0</span><label>second</label></div>");
    assert_eq!(f.recorder.events(), vec!["patched 1", "stale 1 < 2"]);
}

#[tokio::test]
async fn update_keeps_other_local_edits() {
    let mut f = fixture();
    f.coordinator
        .edit(&f.id, "draft", json!("unsent"))
        .expect("mounted");

    let outcome = f
        .coordinator
        .update(&f.transport, &f.id, "label", json!("taps"))
        .await
        .expect("mounted");
    assert!(outcome.is_applied());

    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.state["draft"], json!("unsent"));
    assert_eq!(instance.state["label"], json!("taps"));
    assert_eq!(instance.authoritative["label"], json!("taps"));
    assert!(!instance.authoritative.contains_key("draft"));
}

#[tokio::test]
async fn failed_call_keeps_optimistic_edits() {
    let mut f = fixture();
    f.coordinator
        .edit(&f.id, "count", json!(-7))
        .expect("mounted");
    f.coordinator
        .edit(&f.id, "label", json!("edited"))
        .expect("mounted");

    // both fields moved away from signed values, so no reset reproduces them
    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(
        &outcome,
        Outcome::Failed { error } if error.payload().map(|p| p.kind) == Some(ErrorKind::SecurityError)
    );
    assert_eq!(f.local("count"), Some(&json!(-7)));
    assert_eq!(f.local("label"), Some(&json!("edited")));
    assert_eq!(f.rendered(), "<div><span>0</span><label>clicks</label></div>");
}

#[tokio::test]
async fn call_after_filling_an_empty_field_is_accepted() {
    let mut f = fixture_with(state(json!({"count": 2, "label": ""})), CoordinatorConfig::new());
    f.coordinator
        .edit(&f.id, "label", json!("typed"))
        .expect("mounted");

    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(outcome, Outcome::Applied { ref report } if !report.diverged());
    assert_eq!(f.rendered(), "<div><span>3</span><label>typed</label></div>");

    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.authoritative, state(json!({"count": 3, "label": "typed"})));
}

#[tokio::test]
async fn validation_errors_render_without_touching_state() {
    let mut f = fixture_with(state(json!({"count": 3, "label": "x"})), CoordinatorConfig::new());
    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");

    assert_matches!(
        &outcome,
        Outcome::ValidationFailed { errors, report: Some(report) }
            if errors.contains_key("count") && !report.diverged()
    );
    let instance = f.coordinator.instance(&f.id).expect("mounted");
    assert_eq!(instance.state["count"], json!(3));
    assert_eq!(instance.errors["count"], vec!["too large".to_owned()]);
    assert_eq!(
        f.rendered(),
        "<div><span>3</span><label>x</label><p data-field=\"count\">too large</p></div>"
    );
    assert_eq!(f.recorder.events(), vec!["patched 1", "invalid 1"]);
}

#[tokio::test]
async fn divergence_is_reported() {
    let mut f = fixture_with(Counter.initial_state(), CoordinatorConfig::new().with_resync_on_divergence(true));

    // something outside the engine emptied the counter
    let host = f.coordinator.instance(&f.id).expect("mounted").host;
    let text = f.coordinator.tree().resolve(host, &[0, 0]).expect("count text");
    f.coordinator.tree_mut().remove(text);

    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert!(outcome.report().is_some_and(ApplyReport::diverged));
    assert_eq!(
        f.recorder.events(),
        vec!["patched 0", "diverged 1 resync=true"]
    );
}

#[tokio::test]
async fn full_navigation_clears_instances() {
    let mut f = fixture();
    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "open", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(&outcome, Outcome::Redirect { redirect, .. } if redirect.spa);
    assert_eq!(f.coordinator.registry().len(), 1);

    let outcome = f
        .coordinator
        .call(&f.transport, &f.id, "leave", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(&outcome, Outcome::Redirect { redirect, .. } if redirect.url == "/bye");
    assert!(f.coordinator.registry().is_empty());
}

#[tokio::test]
async fn transport_failures_and_cancellation() {
    let mut f = fixture();

    let outcome = f
        .coordinator
        .call(&Offline, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(outcome, Outcome::Failed { error: ClientError::Transport { .. } });
    assert!(!f.coordinator.instance(&f.id).expect("mounted").has_pending());

    let ticket = f
        .coordinator
        .issue_call(&f.id, "increment", StateMap::new())
        .expect("mounted");
    ticket.cancellation().cancel();
    let outcome = f.coordinator.dispatch(&Stalled, ticket).await;
    assert_matches!(outcome, Outcome::Cancelled);
    assert!(!f.coordinator.instance(&f.id).expect("mounted").has_pending());

    let missing = ComponentId::new("nope");
    assert_matches!(
        f.coordinator.issue_call(&missing, "increment", StateMap::new()),
        Err(ClientError::UnknownInstance { .. })
    );
}

#[tokio::test]
async fn rejection_without_content_is_a_failure() {
    let mut f = fixture();
    let before = f.rendered();

    let outcome = f
        .coordinator
        .call(&Rejecting, &f.id, "increment", StateMap::new())
        .await
        .expect("mounted");
    assert_matches!(
        outcome,
        Outcome::Failed { error: ClientError::Server { ref payload } }
            if payload.kind == ErrorKind::ServerError
    );
    assert_eq!(f.rendered(), before);
    assert_eq!(f.local("count"), Some(&json!(0)));
    assert!(!f.coordinator.instance(&f.id).expect("mounted").has_pending());
}
