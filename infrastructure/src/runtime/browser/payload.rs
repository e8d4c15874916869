//! Transport encoding for sandbox page payloads
//!
//! The body, the merged env, and the script source are embedded in the
//! rendered page as base64 so no JSON or HTML escaping can corrupt them.
//! Decode must reproduce the original exactly — the page-side decoder
//! mirrors these functions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use toolgate_application::RuntimeError;

/// Encode a JSON value for embedding in the page.
pub fn encode_json(value: &serde_json::Value) -> Result<String, RuntimeError> {
    let json = serde_json::to_string(value).map_err(|e| RuntimeError::Encoding(e.to_string()))?;
    Ok(STANDARD.encode(json.as_bytes()))
}

/// Encode raw text (script source) for embedding in the page.
pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a payload produced by [`encode_json`].
pub fn decode_json(encoded: &str) -> Result<serde_json::Value, RuntimeError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| RuntimeError::Encoding(e.to_string()))?;
    let json = String::from_utf8(bytes).map_err(|e| RuntimeError::Encoding(e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| RuntimeError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_is_lossless() {
        let body = json!({
            "text": "héllo wörld ✓",
            "nested": {"values": [1, 2.5, null, true]},
            "tricky": "</script><b>&amp;\"quotes\"\n\ttabs"
        });

        let encoded = encode_json(&body).unwrap();
        let decoded = decode_json(&encoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_round_trip_null_body() {
        let encoded = encode_json(&serde_json::Value::Null).unwrap();
        assert_eq!(decode_json(&encoded).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_json("not-base64!!!").is_err());
    }

    #[test]
    fn test_encode_text_is_plain_base64() {
        let encoded = encode_text("print('hi')");
        assert_eq!(
            base64::engine::general_purpose::STANDARD.decode(encoded).unwrap(),
            b"print('hi')"
        );
    }
}
