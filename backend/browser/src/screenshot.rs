//! Viewport Screenshot Generator
//!
//! Pulls an encoded frame of the visible viewport from the compositor.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::info;

use crate::error::BrowserError;
use crate::page_control::PageControl;

/// JPEG quality used for captures.
pub const JPEG_QUALITY: u8 = 80;

pub struct ScreenshotCapturer;

impl ScreenshotCapturer {
    /// Captures the viewport as JPEG bytes.
    pub async fn capture_viewport(page: &PageControl) -> Result<Vec<u8>, BrowserError> {
        info!(quality = JPEG_QUALITY, "capturing viewport screenshot");
        let response = page
            .send(
                "Page.captureScreenshot",
                json!({ "format": "jpeg", "quality": JPEG_QUALITY }),
            )
            .await?;
        decode_capture(&response)
    }
}

fn decode_capture(response: &Value) -> Result<Vec<u8>, BrowserError> {
    let data = response
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| BrowserError::Protocol("screenshot response has no data".into()))?;
    STANDARD
        .decode(data)
        .map_err(|e| BrowserError::Protocol(format!("screenshot data is not base64: {e}")))
}
