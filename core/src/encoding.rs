//! Deterministic effect keys and base64 helpers.

use crate::error::PipeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

/// Key identifying an invocation of `name` with `payload`
///
/// Base64 of the JSON text `{"name":..,"payload":..}`. A null payload is left
/// out, so an effect called without an argument keys as `{"name":..}`.
#[must_use]
pub fn effect_key(name: &str, payload: &Value) -> String {
    let mut fields = Map::new();
    fields.insert("name".to_owned(), Value::String(name.to_owned()));
    if !payload.is_null() {
        fields.insert("payload".to_owned(), payload.clone());
    }
    encode_base64(&Value::Object(fields).to_string())
}

/// Standard base64 of a UTF-8 string
#[must_use]
pub fn encode_base64(text: &str) -> String {
    STANDARD.encode(text)
}

/// Decode standard base64 back into a UTF-8 string
///
/// # Errors
///
/// Returns [`PipeError::Encoding`] for invalid base64 or non UTF-8 content.
pub fn decode_base64(encoded: &str) -> Result<String, PipeError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|err| PipeError::Encoding(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| PipeError::Encoding(err.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn key_is_base64_of_name_and_payload() {
        let key = effect_key("/users/:id [PATCH]", &json!({ "id": "7" }));
        assert_eq!(
            decode_base64(&key).unwrap(),
            r#"{"name":"/users/:id [PATCH]","payload":{"id":"7"}}"#
        );
    }

    #[test]
    fn null_payload_is_omitted() {
        let key = effect_key("/users", &Value::Null);
        assert_eq!(decode_base64(&key).unwrap(), r#"{"name":"/users"}"#);
    }

    #[test]
    fn invalid_base64_is_an_encoding_error() {
        assert!(matches!(decode_base64("not base64!"), Err(PipeError::Encoding(_))));
    }

    proptest! {
        #[test]
        fn key_is_deterministic(name in ".{0,24}", id in any::<u32>(), label in "[a-z]{0,8}") {
            let payload = json!({ "id": id, "label": label });
            prop_assert_eq!(effect_key(&name, &payload), effect_key(&name, &payload.clone()));
        }

        #[test]
        fn different_payloads_produce_different_keys(a in any::<u32>(), b in any::<u32>()) {
            prop_assume!(a != b);
            prop_assert_ne!(effect_key("/users", &json!({ "id": a })), effect_key("/users", &json!({ "id": b })));
        }
    }
}
