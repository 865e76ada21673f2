use crate::JsonValue;
use std::collections::BTreeMap;

/// Component state as carried on the wire: an ordered map of JSON values.
pub type StateMap = serde_json::Map<String, JsonValue>;

/// Field name to error messages, attached by validation failures.
pub type FieldErrors = BTreeMap<String, Vec<String>>;
