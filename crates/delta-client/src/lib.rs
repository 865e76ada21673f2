//! Client side of the delta-rendering engine.
//!
//! Holds the live node tree, applies the patches the server sends, and
//! coordinates requests per mounted component so that only the newest
//! response for an instance is ever merged.

pub mod apply;
pub mod builder;
pub mod coordinator;
pub mod error;
pub mod live;
pub mod registry;
pub mod subscriber;
pub mod transport;

pub use apply::{ApplyReport, SkipReason, apply_patches};
pub use coordinator::{CoordinatorConfig, Outcome, RequestCoordinator, Ticket};
pub use error::ClientError;
pub use live::{LiveTree, NodeId};
pub use registry::{ComponentInstance, ComponentRegistry};
pub use subscriber::CoordinatorSubscriber;
pub use transport::Transport;
