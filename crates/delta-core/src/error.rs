use thiserror::Error;

/// Errors while turning patches into their wire form.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JSON serialization failed for {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors while reading patches from the wire.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported patch wire version {found} (supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },
    #[error("malformed patch payload: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
