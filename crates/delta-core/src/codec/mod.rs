//! Patch wire format.
//!
//! The canonical value is a versioned envelope:
//!
//! ```json
//! {"v": 1, "min": false, "ops": [{"type": "UpdateText", "path": [1, 0], "text": "C"}]}
//! ```
//!
//! `min` selects between the verbose shape ([`Patch`]'s own serialization)
//! and the [`CompactPatch`] shape. Bare arrays written by older engines are
//! still accepted; their elements may use either shape and are detected one
//! by one.

mod compact;

pub use compact::{CompactNode, CompactPatch};

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::patch::Patch;
use crate::JsonValue;
use serde::{Deserialize, Serialize};

/// Current envelope version.
pub const WIRE_VERSION: u64 = 1;

/// Which patch shape goes into the envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    Verbose,
    Compact,
}

impl WireFormat {
    pub fn is_minified(self) -> bool {
        matches!(self, WireFormat::Compact)
    }
}

impl From<bool> for WireFormat {
    fn from(minify: bool) -> Self {
        if minify {
            WireFormat::Compact
        } else {
            WireFormat::Verbose
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u64,
    #[serde(default)]
    min: bool,
    ops: Vec<JsonValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnyPatch {
    Verbose(Patch),
    Compact(CompactPatch),
}

impl From<AnyPatch> for Patch {
    fn from(patch: AnyPatch) -> Self {
        match patch {
            AnyPatch::Verbose(patch) => patch,
            AnyPatch::Compact(compact) => compact.into(),
        }
    }
}

/// Encodes patches into the versioned envelope.
///
/// # Errors
///
/// Returns [`EncodeError::Json`] if a patch fails to serialize.
pub fn encode(patches: &[Patch], minify: bool) -> EncodeResult<JsonValue> {
    let format = WireFormat::from(minify);
    let ops = patches
        .iter()
        .map(|patch| match format {
            WireFormat::Verbose => serde_json::to_value(patch),
            WireFormat::Compact => serde_json::to_value(CompactPatch::from(patch)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| EncodeError::Json {
            what: "patch",
            source,
        })?;

    serde_json::to_value(Envelope {
        v: WIRE_VERSION,
        min: format.is_minified(),
        ops,
    })
    .map_err(|source| EncodeError::Json {
        what: "envelope",
        source,
    })
}

/// Decodes an envelope, or a bare legacy array of patches in either shape.
///
/// # Errors
///
/// Fails on an unknown envelope version, on a value that is neither an
/// envelope nor an array, and on any element that matches no patch shape.
pub fn decode(wire: &JsonValue) -> DecodeResult<Vec<Patch>> {
    match wire {
        JsonValue::Array(items) => items.iter().map(decode_any).collect(),
        JsonValue::Object(fields) if fields.contains_key("v") => {
            let envelope = Envelope::deserialize(wire)?;
            if envelope.v != WIRE_VERSION {
                return Err(DecodeError::UnsupportedVersion {
                    found: envelope.v,
                    supported: WIRE_VERSION,
                });
            }
            envelope
                .ops
                .iter()
                .map(|op| -> DecodeResult<Patch> {
                    if envelope.min {
                        Ok(CompactPatch::deserialize(op)?.into())
                    } else {
                        Ok(Patch::deserialize(op)?)
                    }
                })
                .collect()
        }
        JsonValue::Null => Ok(Vec::new()),
        other => Err(DecodeError::malformed(format!(
            "expected patch envelope or array, found {}",
            type_name(other)
        ))),
    }
}

/// Parses and decodes a wire string.
///
/// # Errors
///
/// See [`decode`]; also fails on invalid JSON.
pub fn decode_str(wire: &str) -> DecodeResult<Vec<Patch>> {
    let value: JsonValue = serde_json::from_str(wire)?;
    decode(&value)
}

fn decode_any(item: &JsonValue) -> DecodeResult<Patch> {
    AnyPatch::deserialize(item)
        .map(Patch::from)
        .map_err(|_| DecodeError::malformed(format!("unrecognized patch shape: {item}")))
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
