//! Wire codec for commands and results.
//!
//! Both directions are UTF-8 JSON objects. Absent optional fields are left out
//! rather than sent as `null`, and screenshot bytes travel as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{ActionResult, ActionType, Command};

#[derive(Serialize)]
struct ResultOut<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

#[derive(Deserialize)]
struct ResultIn {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(cmd).map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode_command(bytes: &[u8]) -> Result<Command, ProtocolError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let Value::Object(map) = &value else {
        return Err(ProtocolError::InvalidJson(
            "expected a JSON object".to_string(),
        ));
    };

    match map.get("action_type") {
        None | Some(Value::Null) => return Err(ProtocolError::MissingActionType),
        Some(Value::String(tag)) if tag.is_empty() => {
            return Err(ProtocolError::MissingActionType)
        }
        Some(Value::String(tag)) => {
            tag.parse::<ActionType>()?;
        }
        Some(other) => return Err(ProtocolError::UnsupportedAction(other.to_string())),
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidField(e.to_string()))
}

pub fn encode_result(result: &ActionResult) -> Result<Vec<u8>, ProtocolError> {
    let out = ResultOut {
        success: result.success,
        error_message: result.error_message.as_deref().filter(|m| !m.is_empty()),
        image: result
            .image
            .as_deref()
            .filter(|img| !img.is_empty())
            .map(|img| STANDARD.encode(img)),
    };
    serde_json::to_vec(&out).map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode_result(bytes: &[u8]) -> Result<ActionResult, ProtocolError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::InvalidJson(
            "expected a JSON object".to_string(),
        ));
    }
    let raw: ResultIn =
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidField(e.to_string()))?;

    let image = match raw.image.as_deref() {
        None | Some("") => None,
        Some(b64) => Some(
            STANDARD
                .decode(b64)
                .map_err(|e| ProtocolError::InvalidImage(e.to_string()))?,
        ),
    };

    Ok(ActionResult {
        success: raw.success.unwrap_or(false),
        image,
        error_message: raw.error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_command_round_trip_keeps_set_fields() {
        let commands = [
            Command::goto("https://example.com").with_timeout(12_000),
            Command::click(10.25, 400.0),
            Command::type_text("hello world"),
            Command::scroll(-100, 250),
            Command::screenshot(),
            Command::set_viewport_size(1280, 720),
        ];
        for cmd in commands {
            let decoded = decode_command(&encode_command(&cmd).unwrap()).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn test_absent_fields_are_not_encoded() {
        let json = as_json(&encode_command(&Command::click(1.0, 2.0)).unwrap());
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(json["action_type"], "click");
        assert!(json.get("timeout").is_none());
        assert!(json.get("url").is_none());

        let json = as_json(&encode_command(&Command::screenshot()).unwrap());
        assert_eq!(json, serde_json::json!({ "action_type": "screenshot" }));
    }

    #[test]
    fn test_decode_command_requires_action_type() {
        for payload in [
            r#"{"url": "https://example.com"}"#,
            r#"{"action_type": null}"#,
            r#"{"action_type": ""}"#,
        ] {
            assert_eq!(
                decode_command(payload.as_bytes()),
                Err(ProtocolError::MissingActionType)
            );
        }
    }

    #[test]
    fn test_decode_command_rejects_unknown_action() {
        let err = decode_command(br#"{"action_type": "hover"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnsupportedAction("hover".into()));
        assert_eq!(err.to_string(), "Unsupported action type: hover");

        assert!(matches!(
            decode_command(br#"{"action_type": 3}"#),
            Err(ProtocolError::UnsupportedAction(_))
        ));
    }

    #[test]
    fn test_decode_command_rejects_malformed_payloads() {
        assert!(matches!(
            decode_command(b"not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_command(b"[1, 2]"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_command(br#"{"action_type": "click", "x": "left"}"#),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_decode_command_ignores_unknown_and_keeps_foreign_fields() {
        let cmd =
            decode_command(br#"{"action_type": "goto", "url": "https://a.b", "x": 3, "zoom": 2}"#)
                .unwrap();
        assert_eq!(cmd.action_type, ActionType::Goto);
        assert_eq!(cmd.url.as_deref(), Some("https://a.b"));
        assert_eq!(cmd.x, Some(3.0));
    }

    #[test]
    fn test_result_round_trip_without_image() {
        for result in [
            ActionResult::ok(),
            ActionResult::failure("Missing x or y for click action"),
        ] {
            assert_eq!(decode_result(&encode_result(&result).unwrap()).unwrap(), result);
        }
    }

    #[test]
    fn test_result_image_is_base64() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let encoded = encode_result(&ActionResult::with_image(bytes.clone())).unwrap();
        let json = as_json(&encoded);
        assert_eq!(json["image"], STANDARD.encode(&bytes));
        assert!(json.get("error_message").is_none());

        let decoded = decode_result(&encoded).unwrap();
        assert_eq!(decoded.image.unwrap(), bytes);
    }

    #[test]
    fn test_empty_error_message_is_omitted() {
        let result = ActionResult {
            success: true,
            image: None,
            error_message: Some(String::new()),
        };
        let json = as_json(&encode_result(&result).unwrap());
        assert_eq!(json, serde_json::json!({ "success": true }));
    }

    #[test]
    fn test_decode_result_defaults_and_errors() {
        let result = decode_result(br#"{"error_message": "nope"}"#).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("nope"));

        assert!(decode_result(br#"{"success": true, "image": ""}"#)
            .unwrap()
            .image
            .is_none());

        assert!(matches!(
            decode_result(br#"{"success": true, "image": "%%%not-base64"}"#),
            Err(ProtocolError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_null_success_reads_as_failure() {
        let result = decode_result(br#"{"success": null, "error_message": "boom"}"#).unwrap();
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
    }
}
