//! Patch encoding for responses.
//!
//! [`PatchEncoder`] wraps the wire codec from [`delta_core::codec`] with the
//! configured patch shape and a size guard.
//!
//! # Example
//!
//! ```rust
//! use delta_server::encoder::PatchEncoder;
//! use delta_core::codec::WireFormat;
//! use delta_core::patch::Patch;
//!
//! let encoder = PatchEncoder::new(WireFormat::Compact);
//! let patches = vec![Patch::Remove { path: [0].into() }];
//!
//! let bytes = encoder.encode_bytes(&patches).expect("encoding failed");
//! let wire: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
//! assert_eq!(wire, serde_json::json!({"v": 1, "min": true, "ops": [{"o": "x", "p": [0]}]}));
//! ```

use crate::config::EngineConfig;
use crate::error::{EncodeError, EncodeResult};
use bytes::Bytes;
use delta_core::JsonValue;
use delta_core::codec::{self, WireFormat};
use delta_core::patch::Patch;

/// Default maximum encoded size of one patch list.
pub const MAX_PATCH_BYTES: usize = 4 * 1024 * 1024;

/// Patch encoder with a fixed wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchEncoder {
    format: WireFormat,
    max_size: usize,
}

impl PatchEncoder {
    /// Create an encoder for the given shape.
    #[must_use]
    pub const fn new(format: WireFormat) -> Self {
        Self {
            format,
            max_size: MAX_PATCH_BYTES,
        }
    }

    /// Create an encoder using the configured shape.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(WireFormat::from(config.minify_patches()))
    }

    /// Override the maximum encoded size.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// The wire shape used.
    #[must_use]
    pub const fn format(&self) -> WireFormat {
        self.format
    }

    /// Encode patches to the envelope value carried in a response.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if serialization fails or the encoded size
    /// exceeds the limit.
    pub fn encode(&self, patches: &[Patch]) -> EncodeResult<JsonValue> {
        let value = codec::encode(patches, self.format.is_minified())?;
        self.check_size(&value)?;
        Ok(value)
    }

    /// Encode patches to raw JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`PatchEncoder::encode`].
    pub fn encode_bytes(&self, patches: &[Patch]) -> EncodeResult<Bytes> {
        let value = codec::encode(patches, self.format.is_minified())?;
        Ok(Bytes::from(self.check_size(&value)?))
    }

    fn check_size(&self, value: &JsonValue) -> EncodeResult<Vec<u8>> {
        let buf = serde_json::to_vec(value).map_err(|e| EncodeError::json("patch envelope", e))?;
        if buf.len() > self.max_size {
            tracing::warn!(size = buf.len(), max = self.max_size, "patch list too large");
            return Err(EncodeError::PatchesTooLarge {
                size: buf.len(),
                max: self.max_size,
            });
        }
        Ok(buf)
    }
}

impl Default for PatchEncoder {
    fn default() -> Self {
        Self::new(WireFormat::Verbose)
    }
}
