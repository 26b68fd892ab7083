//! # Message Codecs
//!
//! The replay engine never looks inside wire bytes directly. Whenever it needs an
//! inspectable form (to extract a correlation value or to rewrite a response
//! template) it goes through a [`MessageCodec`], keyed by the full method name.

use serde_json::Value;

use crate::error::CodecError;

/// Converts between wire bytes and an inspectable value for a given method.
///
/// Implementations must be deterministic: identical input yields identical output.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, method: &str, raw: &[u8]) -> Result<Value, CodecError>;

    fn encode(&self, method: &str, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Encode a recorded message, preferring its decoded form and falling back
    /// to the bytes captured on the wire.
    fn encode_recorded(
        &self,
        method: &str,
        decoded: Option<&Value>,
        raw: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        match decoded {
            Some(value) => self.encode(method, value),
            None => Ok(raw.to_vec()),
        }
    }
}

/// Codec for services whose messages travel as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonCodec {
    fn decode(&self, method: &str, raw: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(raw).map_err(|e| CodecError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(&self, method: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_is_deterministic() {
        let codec = JsonCodec::new();
        let value = json!({"action": {"task": {"taskId": "t-1"}}, "count": 3});
        let first = codec.encode("/svc/Method", &value).unwrap();
        let second = codec.encode("/svc/Method", &value).unwrap();
        assert_eq!(first, second);
        assert_eq!(codec.decode("/svc/Method", &first).unwrap(), value);
    }

    #[test]
    fn test_decode_failure_names_method() {
        let codec = JsonCodec::new();
        let err = codec.decode("/svc/Broken", b"\x00\x01").unwrap_err();
        assert!(err.to_string().contains("/svc/Broken"));
    }

    #[test]
    fn test_encode_recorded_falls_back_to_raw_bytes() {
        let codec = JsonCodec::new();
        let raw = codec
            .encode_recorded("/svc/Method", None, b"opaque")
            .unwrap();
        assert_eq!(raw, b"opaque");

        let value = json!({"id": 7});
        let encoded = codec
            .encode_recorded("/svc/Method", Some(&value), b"ignored")
            .unwrap();
        assert_eq!(encoded, br#"{"id":7}"#);
    }
}
