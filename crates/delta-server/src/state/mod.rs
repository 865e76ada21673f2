//! Component state with JSON Patch (RFC 6902) deltas.
//!
//! The engine runs every state-changing operation through a
//! [`StateManager`]. The returned [`StatePatch`] tells it whether anything
//! changed at all: an empty delta means the render cannot have changed
//! either, so diffing is skipped.
//!
//! # Example
//!
//! ```rust
//! use delta_server::state::StateManager;
//! use serde_json::json;
//!
//! let manager = StateManager::from_value(json!({"count": 0})).unwrap();
//!
//! let patch = manager.update(|s| {
//!     s.insert("count".into(), json!(1));
//! });
//! assert_eq!(patch.len(), 1);
//! assert_eq!(patch.changed_keys(), vec!["count"]);
//! ```

mod manager;

pub use manager::{StateManager, StatePatch};
