//! # Value Codec
//!
//! Purpose: Let callers store structured values under plain string commands by
//! plugging a codec into the client, without the protocol layer knowing about
//! it.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The codec is a trait object chosen at
//!    configuration time; the client never assumes a concrete format.
//! 2. **Best Effort**: Decoding is advisory. A payload that is not valid in
//!    the codec's format comes back as the raw string, never as an error.
//! 3. **Opt-In Scope**: The codec only touches commands the configuration
//!    names; everything else passes through untouched.

use std::fmt;

use serde_json::Value;

/// Pluggable encoder/decoder for structured command values.
///
/// `encode` runs on the value argument of configured write commands before it
/// hits the wire; `decode` runs on bulk replies of configured read commands.
/// A `decode` returning `None` means "not in this format" and leaves the raw
/// payload untouched.
pub trait ValueCodec: fmt::Debug + Send + Sync {
    /// Encodes a structured value into its wire payload.
    fn encode(&self, value: &Value) -> Vec<u8>;

    /// Attempts to decode a wire payload back into a structured value.
    fn decode(&self, raw: &[u8]) -> Option<Value>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Vec<u8> {
        // Serializing a `Value` cannot fail; the fallback is unreachable in
        // practice but keeps the trait infallible on the encode side.
        serde_json::to_vec(value).unwrap_or_default()
    }

    fn decode(&self, raw: &[u8]) -> Option<Value> {
        serde_json::from_slice(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_roundtrip() {
        let codec = JsonCodec;
        let value = json!({"name": "Alice", "age": 30});
        let encoded = codec.encode(&value);
        assert_eq!(codec.decode(&encoded), Some(value));
    }

    #[test]
    fn invalid_payload_decodes_to_none() {
        assert_eq!(JsonCodec.decode(b"plain text"), None);
    }
}
