use crate::apply::ApplyReport;
use crate::error::ClientError;
use delta_core::FieldErrors;
use delta_core::message::Redirect;
use delta_core::types::ComponentId;

/// Observer of request outcomes. Every hook defaults to doing nothing.
#[async_trait::async_trait]
pub trait CoordinatorSubscriber: Send + Sync {
    /// Patches from an accepted response were applied.
    async fn on_patched(&self, _component_id: &ComponentId, _report: &ApplyReport) {}

    /// A response arrived after a newer request was issued and was dropped.
    async fn on_stale(&self, _component_id: &ComponentId, _sequence: u64, _current: u64) {}

    async fn on_validation_errors(&self, _component_id: &ComponentId, _errors: &FieldErrors) {}

    async fn on_error(&self, _component_id: &ComponentId, _error: &ClientError) {}

    /// Some patches could not be applied; the live tree no longer matches
    /// the server's view. `resync` carries the coordinator's
    /// `resync_on_divergence` setting.
    async fn on_divergence(&self, _component_id: &ComponentId, _report: &ApplyReport, _resync: bool) {}

    async fn on_redirect(&self, _component_id: &ComponentId, _redirect: &Redirect) {}
}
