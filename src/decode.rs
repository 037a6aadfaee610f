use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ApiError;

const BODY_PREVIEW_LIMIT: usize = 256;

/// Keys checked, in order, when pulling a message out of an error body.
const MESSAGE_KEYS: [&str; 4] = ["error", "message", "detail", "description"];

/// Decodes a JSON body into `T`.
///
/// Errors carry the target type name, serde's line/column context and a
/// preview of the offending body.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice::<T>(body).map_err(|err| ApiError::Decode {
        type_name: std::any::type_name::<T>(),
        message: format!("{err}; body: {}", body_preview(body)),
    })
}

/// Extracts a human-readable message from an error response body.
///
/// JSON objects are searched for `error`, `message`, `detail` and
/// `description` (and `error.message` / `error.description` one level down);
/// anything else yields the trimmed raw body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_owned());
    };

    for key in MESSAGE_KEYS {
        match map.get(key) {
            Some(Value::String(message)) => return Some(message.clone()),
            Some(Value::Object(nested)) if key == "error" => {
                let nested_message = ["message", "description"]
                    .into_iter()
                    .find_map(|inner| nested.get(inner).and_then(Value::as_str));
                if let Some(message) = nested_message {
                    return Some(message.to_owned());
                }
            }
            _ => {}
        }
    }

    Some(trimmed.to_owned())
}

fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= BODY_PREVIEW_LIMIT {
        return text.into_owned();
    }
    let head: String = text.chars().take(BODY_PREVIEW_LIMIT).collect();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use crate::{decode, ApiError};

    #[derive(Debug, Deserialize)]
    struct Greeting {
        message: String,
    }

    #[test]
    fn decode_typed_body() {
        let greeting: Greeting =
            decode::decode_json(br#"{"message":"ok"}"#).expect("must decode");
        assert_eq!(greeting.message, "ok");
    }

    #[test]
    fn decode_error_names_type_and_position() {
        let err = decode::decode_json::<Greeting>(br#"{"msg":"ok"}"#).expect_err("must fail");
        match err {
            ApiError::Decode { type_name, message } => {
                assert!(type_name.ends_with("Greeting"));
                assert!(message.contains("missing field `message`"));
                assert!(message.contains("line 1"));
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn extract_top_level_error() {
        assert_eq!(
            decode::extract_error_message(r#"{"error":"Invalid credentials"}"#).as_deref(),
            Some("Invalid credentials")
        );
    }

    #[test]
    fn extract_nested_error_message() {
        assert_eq!(
            decode::extract_error_message(r#"{"error":{"message":"Nested error"}}"#).as_deref(),
            Some("Nested error")
        );
        assert_eq!(
            decode::extract_error_message(r#"{"error":{"description":"Nested description"}}"#)
                .as_deref(),
            Some("Nested description")
        );
    }

    #[test]
    fn extract_falls_through_keys_in_order() {
        assert_eq!(
            decode::extract_error_message(r#"{"detail":"Not allowed","code":3}"#).as_deref(),
            Some("Not allowed")
        );
        assert_eq!(
            decode::extract_error_message(r#"{"message":"first","description":"second"}"#)
                .as_deref(),
            Some("first")
        );
    }

    #[test]
    fn extract_plain_text_and_empty() {
        assert_eq!(
            decode::extract_error_message("  Bad Gateway \n").as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(decode::extract_error_message("   "), None);
    }
}
