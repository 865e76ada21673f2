//! Engine configuration.
//!
//! # Example
//!
//! ```rust
//! use delta_server::config::{EngineConfig, VerificationPolicy};
//!
//! let config = EngineConfig::new("change-me")
//!     .with_verification(VerificationPolicy::PropertyUpdates)
//!     .with_lenient_field_limit(50)
//!     .with_minified_patches(true);
//!
//! // the limit is capped
//! assert_eq!(config.lenient_field_limit(), 20);
//! ```

use serde::{Deserialize, Serialize};

/// Upper bound on fields reset by lenient signature reconstruction.
pub const MAX_LENIENT_FIELDS: usize = 20;

/// Which requests must carry a valid state signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Every request is verified.
    #[default]
    Strict,
    /// Only property updates are verified; method calls are trusted.
    PropertyUpdates,
}

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Clone)]
pub struct EngineConfig {
    secret_key: Vec<u8>,
    verification: VerificationPolicy,
    lenient_field_limit: usize,
    debug: bool,
    minify_patches: bool,
}

impl EngineConfig {
    /// Create a configuration with the given signing secret and defaults
    /// for everything else.
    #[must_use]
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
            verification: VerificationPolicy::default(),
            lenient_field_limit: MAX_LENIENT_FIELDS,
            debug: false,
            minify_patches: false,
        }
    }

    /// Set the verification policy.
    #[must_use]
    pub fn with_verification(mut self, policy: VerificationPolicy) -> Self {
        self.verification = policy;
        self
    }

    /// Set the lenient reconstruction limit, capped at [`MAX_LENIENT_FIELDS`].
    #[must_use]
    pub fn with_lenient_field_limit(mut self, limit: usize) -> Self {
        self.lenient_field_limit = limit.min(MAX_LENIENT_FIELDS);
        self
    }

    /// Expose internal error details to clients.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Send patches in the compact wire shape.
    #[must_use]
    pub fn with_minified_patches(mut self, minify: bool) -> Self {
        self.minify_patches = minify;
        self
    }

    /// The signing secret.
    #[must_use]
    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }

    /// The verification policy.
    #[must_use]
    pub fn verification(&self) -> VerificationPolicy {
        self.verification
    }

    /// Maximum number of fields lenient reconstruction may reset.
    #[must_use]
    pub fn lenient_field_limit(&self) -> usize {
        self.lenient_field_limit
    }

    /// Whether debug details are sent to clients.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether patches use the compact wire shape.
    #[must_use]
    pub fn minify_patches(&self) -> bool {
        self.minify_patches
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("secret_key", &"<redacted>")
            .field("verification", &self.verification)
            .field("lenient_field_limit", &self.lenient_field_limit)
            .field("debug", &self.debug)
            .field("minify_patches", &self.minify_patches)
            .finish()
    }
}
