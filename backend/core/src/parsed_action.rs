//! Translation of model-produced actions into wire commands.
//!
//! Agents describe actions loosely (a coordinate pair, a scroll direction);
//! this turns them into concrete [`Command`]s, or drops them with a warning
//! when they cannot be executed.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatcher::sanitize_text;
use crate::types::{ActionType, Command};

/// Pixels scrolled per directional scroll step.
pub const DEFAULT_SCROLL_AMOUNT: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedAction {
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_coordinates: Option<(i64, i64, i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ParsedAction {
    pub fn new(action: ActionType) -> Self {
        Self {
            action,
            coordinates: None,
            drag_coordinates: None,
            text: None,
            direction: None,
            hotkey: None,
            url: None,
        }
    }

    /// Build the command for this action, or `None` if it lacks what the
    /// action needs.
    pub fn to_command(&self) -> Option<Command> {
        match self.action {
            ActionType::Click => match self.coordinates {
                Some((x, y)) => Some(Command::click(x as f64, y as f64)),
                None => {
                    warn!("click action missing coordinates, skipping");
                    None
                }
            },
            ActionType::Type => {
                let Some(text) = self.text.as_deref() else {
                    warn!("type action missing text, skipping");
                    return None;
                };
                let sanitized = sanitize_text(text);
                if sanitized.is_empty() {
                    warn!("type action has empty text after sanitization, skipping");
                    return None;
                }
                Some(Command::type_text(sanitized))
            }
            ActionType::Scroll => {
                let (dx, dy) = scroll_deltas(self.direction.as_deref().unwrap_or("down"));
                Some(Command::scroll(dx, dy))
            }
            ActionType::Goto => match self.url.as_deref() {
                Some(url) if !url.is_empty() => Some(Command::goto(url)),
                _ => {
                    warn!("goto action missing url, skipping");
                    None
                }
            },
            ActionType::Screenshot => Some(Command::screenshot()),
            ActionType::SetViewportSize => match self
                .coordinates
                .and_then(|(w, h)| Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?)))
            {
                Some((w, h)) if w > 0 && h > 0 => Some(Command::set_viewport_size(w, h)),
                _ => {
                    warn!("set_viewport_size action missing a positive size, skipping");
                    None
                }
            },
        }
    }
}

/// Map a scroll direction to pixel deltas. Unknown directions scroll down.
pub fn scroll_deltas(direction: &str) -> (i64, i64) {
    match direction {
        "down" => (0, DEFAULT_SCROLL_AMOUNT),
        "up" => (0, -DEFAULT_SCROLL_AMOUNT),
        "left" => (-DEFAULT_SCROLL_AMOUNT, 0),
        "right" => (DEFAULT_SCROLL_AMOUNT, 0),
        other => {
            warn!(direction = other, "unknown scroll direction, defaulting to down");
            (0, DEFAULT_SCROLL_AMOUNT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_directions() {
        assert_eq!(scroll_deltas("up"), (0, -100));
        assert_eq!(scroll_deltas("left"), (-100, 0));
        assert_eq!(scroll_deltas("right"), (100, 0));
        assert_eq!(scroll_deltas("sideways"), (0, 100));

        let cmd = ParsedAction::new(ActionType::Scroll).to_command().unwrap();
        assert_eq!((cmd.delta_x, cmd.delta_y), (Some(0), Some(100)));
    }

    #[test]
    fn test_click_needs_coordinates() {
        assert!(ParsedAction::new(ActionType::Click).to_command().is_none());

        let action = ParsedAction {
            coordinates: Some((12, 34)),
            ..ParsedAction::new(ActionType::Click)
        };
        assert_eq!(action.to_command(), Some(Command::click(12.0, 34.0)));
    }

    #[test]
    fn test_type_is_sanitized() {
        let action = ParsedAction {
            text: Some("search\nterms\r".into()),
            ..ParsedAction::new(ActionType::Type)
        };
        assert_eq!(action.to_command(), Some(Command::type_text("search terms")));

        let blank = ParsedAction {
            text: Some("\r".into()),
            ..ParsedAction::new(ActionType::Type)
        };
        assert!(blank.to_command().is_none());
    }

    #[test]
    fn test_viewport_size_must_fit() {
        let mut action = ParsedAction::new(ActionType::SetViewportSize);
        action.coordinates = Some((1280, 720));
        assert_eq!(action.to_command(), Some(Command::set_viewport_size(1280, 720)));

        action.coordinates = Some((i64::from(u32::MAX) + 1, 720));
        assert_eq!(action.to_command(), None);
        action.coordinates = Some((-5, 720));
        assert_eq!(action.to_command(), None);
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let action = ParsedAction {
            direction: Some("up".into()),
            ..ParsedAction::new(ActionType::Scroll)
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({ "action": "scroll", "direction": "up" })
        );
    }
}
