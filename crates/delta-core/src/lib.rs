//! Core type library for the delta-rendering protocol.
//!
//! Shared by the server (which builds, diffs and encodes trees) and the
//! client (which decodes and applies patches to its live tree):
//!
//! - [`vnode`]: the canonical tree model and the significance filter both
//!   tree builders must agree on
//! - [`patch`]: the structural edit operations
//! - [`codec`]: the versioned patch wire format
//! - [`message`]: request, response and error payloads exchanged per round trip

pub mod codec;
pub mod error;
pub mod message;
pub mod patch;
mod state;
pub mod types;
pub mod vnode;

pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use state::{FieldErrors, StateMap};

/// Re-export to ensure the same type is used
pub use serde_json::Value as JsonValue;
