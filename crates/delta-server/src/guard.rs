//! State signing and verification.
//!
//! Component state travels through the client between requests. The
//! [`StateGuard`] signs it with HMAC-SHA256 over the component id and a
//! canonical serialization of the state, and verifies the signature when the
//! state comes back.
//!
//! The canonical form sorts object keys recursively and writes `null` and
//! `""` as the same token, so a client that drops empty values or turns them
//! into empty strings still produces a matching signature.
//!
//! # Example
//!
//! ```rust
//! use delta_server::guard::StateGuard;
//! use delta_core::types::ComponentId;
//! use serde_json::json;
//!
//! let guard = StateGuard::new(b"secret").unwrap();
//! let id = ComponentId::new("abc");
//! let state = json!({"name": "Bob"}).as_object().cloned().unwrap();
//!
//! let signature = guard.sign(&state, &id);
//! assert!(guard.verify(&state, &id, &signature));
//! assert!(!guard.verify(&state, &id, "tampered"));
//! ```

use crate::config::{EngineConfig, VerificationPolicy};
use crate::error::{ConfigError, RequestError, RequestResult};
use delta_core::message::RequestMessage;
use delta_core::types::ComponentId;
use delta_core::{JsonValue, StateMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write as _;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a successful request check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The signature matched.
    Verified,
    /// The signature matched after resetting these fields to empty values.
    Lenient {
        /// Fields that were reset to reconstruct the signed state.
        reset_fields: Vec<String>,
    },
    /// The policy does not require verification for this request.
    Trusted,
}

/// HMAC-SHA256 signer for component state.
#[derive(Clone)]
pub struct StateGuard {
    mac: HmacSha256,
}

impl StateGuard {
    /// Create a guard keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySecret`] for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| ConfigError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Self { mac })
    }

    /// Create a guard from the engine configuration.
    ///
    /// # Errors
    ///
    /// See [`StateGuard::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config.secret_key())
    }

    /// Sign `state` for `component_id`, hex encoded.
    #[must_use]
    pub fn sign(&self, state: &StateMap, component_id: &ComponentId) -> String {
        hex::encode(self.digest(state, component_id).finalize().into_bytes())
    }

    /// Verify a hex signature in constant time.
    ///
    /// Malformed signatures never verify.
    #[must_use]
    pub fn verify(&self, state: &StateMap, component_id: &ComponentId, signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        self.digest(state, component_id).verify_slice(&bytes).is_ok()
    }

    /// Check a request against the verification policy.
    ///
    /// Under [`VerificationPolicy::Strict`] a method call whose signature
    /// does not match gets a bounded lenient retry: each non-empty scalar
    /// field is reset to its empty value on its own, then all of them
    /// together, and the signature is checked again each time. The retry
    /// only runs when there are at most `lenient_limit` such fields. A match
    /// accepts the request with the state the client sent.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Security`] if the signature does not verify.
    pub fn check(
        &self,
        request: &RequestMessage,
        policy: VerificationPolicy,
        lenient_limit: usize,
    ) -> RequestResult<Verification> {
        let is_update = request.action.is_update();
        if policy == VerificationPolicy::PropertyUpdates && !is_update {
            return Ok(Verification::Trusted);
        }

        let id = &request.component_id;
        if self.verify(&request.state, id, &request.signature) {
            return Ok(Verification::Verified);
        }

        if !is_update {
            if let Some(reset_fields) =
                self.lenient_match(&request.state, id, &request.signature, lenient_limit)
            {
                tracing::warn!(
                    component_id = %id,
                    fields = ?reset_fields,
                    "accepted state signature after lenient reconstruction"
                );
                return Ok(Verification::Lenient { reset_fields });
            }
        }

        tracing::warn!(
            component_id = %id,
            class = %request.component_class,
            "rejected state signature"
        );
        Err(RequestError::security("state signature does not match"))
    }

    fn lenient_match(
        &self,
        state: &StateMap,
        component_id: &ComponentId,
        signature: &str,
        limit: usize,
    ) -> Option<Vec<String>> {
        let candidates: Vec<&String> = state
            .iter()
            .filter(|(_, value)| empty_default(value).is_some())
            .map(|(name, _)| name)
            .collect();
        if candidates.is_empty() || candidates.len() > limit {
            return None;
        }

        // one field edited on its own is the common case; then all at once
        let singles = candidates.iter().map(|name| vec![*name]);
        let combined = (candidates.len() > 1).then(|| candidates.clone());
        singles.chain(combined).find_map(|fields| {
            let reconstructed = reset(state, &fields);
            self.verify(&reconstructed, component_id, signature)
                .then(|| fields.into_iter().cloned().collect())
        })
    }

    fn digest(&self, state: &StateMap, component_id: &ComponentId) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(component_id.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(canonicalize(state).as_bytes());
        mac
    }
}

impl std::fmt::Debug for StateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGuard").finish_non_exhaustive()
    }
}

/// `state` with `fields` set back to their empty values.
fn reset(state: &StateMap, fields: &[&String]) -> StateMap {
    let mut reconstructed = state.clone();
    for name in fields {
        if let Some(slot) = reconstructed.get_mut(name.as_str()) {
            if let Some(empty) = empty_default(slot) {
                *slot = empty;
            }
        }
    }
    reconstructed
}

/// The empty value for a non-empty scalar, `None` for anything else.
fn empty_default(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::String(s) if !s.is_empty() => Some(JsonValue::String(String::new())),
        JsonValue::Number(n) if n.as_f64() != Some(0.0) => Some(JsonValue::from(0)),
        JsonValue::Bool(true) => Some(JsonValue::Bool(false)),
        _ => None,
    }
}

/// Canonical serialization of a state map.
///
/// ```rust
/// use delta_server::guard::canonicalize;
/// use serde_json::json;
///
/// let a = json!({"b": null, "a": [1, {"y": 2, "x": ""}]});
/// let b = json!({"a": [1, {"x": null, "y": 2}], "b": ""});
/// assert_eq!(
///     canonicalize(a.as_object().unwrap()),
///     canonicalize(b.as_object().unwrap())
/// );
/// ```
#[must_use]
pub fn canonicalize(state: &StateMap) -> String {
    let mut out = String::new();
    write_object(state, &mut out);
    out
}

fn write_object(map: &StateMap, out: &mut String) {
    let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Null => out.push_str("\"\""),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) => {
            let _ = write!(out, "{n}");
        }
        JsonValue::String(s) => write_string(s, out),
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        JsonValue::Object(map) => write_object(map, out),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
