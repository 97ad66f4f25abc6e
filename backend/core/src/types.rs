use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Default navigation timeout applied when a command does not carry one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The closed set of actions a client can ask the browser to perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Click,
    Type,
    Scroll,
    Goto,
    Screenshot,
    SetViewportSize,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Click,
        ActionType::Type,
        ActionType::Scroll,
        ActionType::Goto,
        ActionType::Screenshot,
        ActionType::SetViewportSize,
    ];

    /// The tag used for this action on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::Type => "type",
            ActionType::Scroll => "scroll",
            ActionType::Goto => "goto",
            ActionType::Screenshot => "screenshot",
            ActionType::SetViewportSize => "set_viewport_size",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ProtocolError::UnsupportedAction(s.to_string()))
    }
}

/// One browser action requested by a client.
///
/// Only the fields relevant to `action_type` are expected to be set. Absent
/// fields are never serialized, so the wire form stays minimal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Milliseconds; only meaningful for `goto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Command {
    /// A command with only the action tag set.
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            x: None,
            y: None,
            text: None,
            delta_x: None,
            delta_y: None,
            url: None,
            width: None,
            height: None,
            timeout: None,
        }
    }

    pub fn goto(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(ActionType::Goto)
        }
    }

    pub fn click(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::new(ActionType::Click)
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(ActionType::Type)
        }
    }

    pub fn scroll(delta_x: i64, delta_y: i64) -> Self {
        Self {
            delta_x: Some(delta_x),
            delta_y: Some(delta_y),
            ..Self::new(ActionType::Scroll)
        }
    }

    pub fn screenshot() -> Self {
        Self::new(ActionType::Screenshot)
    }

    pub fn set_viewport_size(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::new(ActionType::SetViewportSize)
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Effective navigation timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms())
    }

    /// The parameters that are present, rendered for log lines.
    ///
    /// Typed text is reported by length only.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(x) = self.x {
            out.push(("x", x.to_string()));
        }
        if let Some(y) = self.y {
            out.push(("y", y.to_string()));
        }
        if let Some(text) = &self.text {
            out.push(("text_len", text.chars().count().to_string()));
        }
        if let Some(dx) = self.delta_x {
            out.push(("delta_x", dx.to_string()));
        }
        if let Some(dy) = self.delta_y {
            out.push(("delta_y", dy.to_string()));
        }
        if let Some(url) = &self.url {
            out.push(("url", url.clone()));
        }
        if let Some(w) = self.width {
            out.push(("width", w.to_string()));
        }
        if let Some(h) = self.height {
            out.push(("height", h.to_string()));
        }
        if let Some(t) = self.timeout {
            out.push(("timeout", t.to_string()));
        }
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({}", self.action_type)?;
        for (key, value) in self.params() {
            write!(f, ", {key}={value}")?;
        }
        f.write_str(")")
    }
}

/// Outcome of executing one [`Command`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub image: Option<Vec<u8>>,
    pub error_message: Option<String>,
}

impl ActionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_image(image: Vec<u8>) -> Self {
        Self {
            success: true,
            image: Some(image),
            error_message: None,
        }
    }

    /// A failed result. Never carries an image.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            image: None,
            error_message: Some(message.into()),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.as_ref().is_some_and(|img| !img.is_empty())
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "Success" } else { "Error" };
        let image = if self.has_image() {
            "[Image Present]"
        } else {
            "[No Image]"
        };
        write!(f, "Result(status={status}, image_status={image}")?;
        if let Some(msg) = self.error_message.as_deref().filter(|m| !m.is_empty()) {
            write!(f, ", Error: {msg}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_tags_round_trip() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        assert!("hover".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_constructors_only_set_relevant_fields() {
        let cmd = Command::click(10.5, 20.0);
        assert_eq!(cmd.x, Some(10.5));
        assert!(cmd.url.is_none() && cmd.text.is_none() && cmd.timeout.is_none());

        let cmd = Command::goto("https://example.com");
        assert_eq!(cmd.timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert_eq!(cmd.with_timeout(5_000).timeout_ms(), 5_000);
    }

    #[test]
    fn test_params_hide_typed_text() {
        let cmd = Command::type_text("hunter2");
        let params = cmd.params();
        assert_eq!(params, vec![("text_len", "7".to_string())]);
        assert!(!cmd.to_string().contains("hunter2"));
    }

    #[test]
    fn test_result_display() {
        assert_eq!(
            ActionResult::ok().to_string(),
            "Result(status=Success, image_status=[No Image])"
        );
        assert_eq!(
            ActionResult::with_image(vec![1, 2, 3]).to_string(),
            "Result(status=Success, image_status=[Image Present])"
        );
        assert_eq!(
            ActionResult::failure("boom").to_string(),
            "Result(status=Error, image_status=[No Image], Error: boom)"
        );
    }
}
