use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Namespace for deriving deterministic UUIDs from opaque id strings.
const ID_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

/// Identity of one mounted component instance.
///
/// Ids are opaque on the wire. Servers usually mint random UUIDs, but any
/// string (for example a template-assigned `"counter-1"`) is accepted: it is
/// hashed to a UUID v5 internally and the original string is kept so that
/// it serializes back unchanged. The id also keys the state signature, so
/// round-trip fidelity matters.
#[derive(Debug, Clone)]
pub struct ComponentId {
    uuid: Uuid,
    raw: Option<String>,
}

impl ComponentId {
    /// Creates a new random id.
    pub fn random() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            raw: None,
        }
    }

    /// Creates an id from a string, preserving non-UUID strings verbatim.
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        match Uuid::parse_str(s) {
            Ok(uuid) => Self { uuid, raw: None },
            Err(_) => Self {
                uuid: Uuid::new_v5(&ID_NAMESPACE, s.as_bytes()),
                raw: Some(s.to_owned()),
            },
        }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Returns `true` if this id was created from a non-UUID string.
    pub fn was_coerced(&self) -> bool {
        self.raw.is_some()
    }

    pub fn original_string(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

impl<'de> Deserialize<'de> for ComponentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl Serialize for ComponentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.raw {
            Some(original) => serializer.serialize_str(original),
            None => serializer.serialize_str(&self.uuid.to_string()),
        }
    }
}

// Equality and hashing only look at the UUID so that an id parsed from its
// original string matches the one it was serialized from.
impl PartialEq for ComponentId {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl Eq for ComponentId {}

impl Hash for ComponentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl From<Uuid> for ComponentId {
    fn from(uuid: Uuid) -> Self {
        Self { uuid, raw: None }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.raw {
            Some(original) => write!(f, "{original}"),
            None => write!(f, "{}", self.uuid),
        }
    }
}

impl std::str::FromStr for ComponentId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl PartialEq<str> for ComponentId {
    fn eq(&self, other: &str) -> bool {
        if self.raw.as_deref() == Some(other) {
            return true;
        }
        match Uuid::parse_str(other) {
            Ok(uuid) => self.uuid == uuid,
            Err(_) => self.uuid == Uuid::new_v5(&ID_NAMESPACE, other.as_bytes()),
        }
    }
}
