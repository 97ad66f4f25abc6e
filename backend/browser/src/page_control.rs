//! Page Control Actions
//!
//! Navigation, pointer and keyboard input, and viewport emulation for one
//! attached page.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::cdp_client::{CdpClient, CdpEvent, DEFAULT_COMMAND_TIMEOUT};
use crate::error::BrowserError;

/// Delay between typed characters.
pub const TYPING_DELAY: Duration = Duration::from_millis(20);

/// Lifecycle event that marks a finished navigation.
const SETTLED_EVENT: &str = "networkIdle";

pub struct PageControl {
    client: Arc<CdpClient>,
    /// `None` when the client is connected straight to a page endpoint.
    session_id: Option<String>,
    target_id: Option<String>,
    /// Last pointer position; wheel events are dispatched there.
    pointer: Mutex<(f64, f64)>,
}

impl PageControl {
    pub fn new(client: Arc<CdpClient>, session_id: Option<String>, target_id: Option<String>) -> Self {
        Self {
            client,
            session_id,
            target_id,
            pointer: Mutex::new((0.0, 0.0)),
        }
    }

    pub fn client(&self) -> &Arc<CdpClient> {
        &self.client
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub async fn send(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        self.client
            .send_command(method, params, self.session_id.as_deref(), timeout)
            .await
    }

    /// Turn on the domains navigation waits depend on.
    pub async fn enable(&self) -> Result<(), BrowserError> {
        self.send("Page.enable", json!({})).await?;
        self.send("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;
        Ok(())
    }

    /// Navigates to `url` and waits for the main frame's `networkIdle`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        info!(url, "navigating browser tab");
        let started = Instant::now();
        let events = self.client.subscribe();

        let response = self
            .send_with_timeout("Page.navigate", navigate_params(url), timeout)
            .await?;
        if let Some(error_text) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            return Err(BrowserError::NavigationFailed(format!("{error_text} at {url}")));
        }

        // Same-document navigations carry no loader and fire no lifecycle events.
        let Some(loader_id) = response.get("loaderId").and_then(Value::as_str) else {
            return Ok(());
        };
        let frame_id = response
            .get("frameId")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let remaining = timeout.saturating_sub(started.elapsed());
        tokio::time::timeout(
            remaining,
            self.wait_for_lifecycle(events, frame_id, loader_id, SETTLED_EVENT),
        )
        .await
        .map_err(|_| BrowserError::Timeout {
            operation: format!("navigation to {url}"),
            duration: timeout,
        })?
    }

    async fn wait_for_lifecycle(
        &self,
        mut events: broadcast::Receiver<CdpEvent>,
        frame_id: &str,
        loader_id: &str,
        name: &str,
    ) -> Result<(), BrowserError> {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if is_lifecycle_event(&event, self.session_id.as_deref(), frame_id, loader_id, name) {
                        debug!(frame_id, name, "page lifecycle reached");
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "lifecycle listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BrowserError::ConnectionClosed),
            }
        }
    }

    /// Left-click at viewport coordinates.
    pub async fn click(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        info!(x, y, "dispatching left-click");
        for params in click_sequence(x, y) {
            self.send("Input.dispatchMouseEvent", params).await?;
        }
        *self.pointer.lock().await = (x, y);
        Ok(())
    }

    /// Types text one character at a time with a short delay between keys.
    pub async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        info!(length = text.chars().count(), "typing into focused frame");
        for (i, ch) in text.chars().enumerate() {
            if i > 0 {
                tokio::time::sleep(TYPING_DELAY).await;
            }
            self.send("Input.insertText", json!({ "text": ch.to_string() }))
                .await?;
        }
        Ok(())
    }

    /// Wheel-scroll at the last pointer position.
    pub async fn scroll_by(&self, delta_x: i64, delta_y: i64) -> Result<(), BrowserError> {
        let (x, y) = *self.pointer.lock().await;
        info!(delta_x, delta_y, "dispatching mouse wheel");
        self.send("Input.dispatchMouseEvent", wheel_params(x, y, delta_x, delta_y))
            .await?;
        Ok(())
    }

    pub async fn set_viewport_size(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        info!(width, height, "overriding device metrics");
        self.send("Emulation.setDeviceMetricsOverride", viewport_params(width, height))
            .await?;
        Ok(())
    }
}

fn is_lifecycle_event(
    event: &CdpEvent,
    session_id: Option<&str>,
    frame_id: &str,
    loader_id: &str,
    name: &str,
) -> bool {
    if event.method != "Page.lifecycleEvent" || event.session_id.as_deref() != session_id {
        return false;
    }
    let params = &event.params;
    params["name"] == name
        && params["frameId"] == frame_id
        && params
            .get("loaderId")
            .and_then(Value::as_str)
            .map_or(true, |l| l == loader_id)
}

fn navigate_params(url: &str) -> Value {
    json!({ "url": url })
}

fn click_sequence(x: f64, y: f64) -> [Value; 3] {
    [
        json!({ "type": "mouseMoved", "x": x, "y": y }),
        json!({ "type": "mousePressed", "x": x, "y": y, "button": "left", "clickCount": 1 }),
        json!({ "type": "mouseReleased", "x": x, "y": y, "button": "left", "clickCount": 1 }),
    ]
}

fn wheel_params(x: f64, y: f64, delta_x: i64, delta_y: i64) -> Value {
    json!({
        "type": "mouseWheel",
        "x": x,
        "y": y,
        "deltaX": delta_x,
        "deltaY": delta_y,
    })
}

fn viewport_params(width: u32, height: u32) -> Value {
    json!({
        "width": width,
        "height": height,
        "deviceScaleFactor": 0,
        "mobile": false,
    })
}
