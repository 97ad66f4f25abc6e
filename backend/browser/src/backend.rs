//! [`AutomationBackend`] over a remote Chromium.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};
use wright_core::{AutomationBackend, BackendError};

use crate::cdp_client::{is_page_endpoint, resolve_ws_endpoint, CdpClient};
use crate::error::BrowserError;
use crate::page_control::PageControl;
use crate::screenshot::ScreenshotCapturer;

const BACKEND_NAME: &str = "Chrome DevTools";

struct Attached {
    page: Arc<PageControl>,
    /// Target opened by us, closed again on shutdown.
    created_target: Option<String>,
}

pub struct CdpBackend {
    endpoint: String,
    attached: RwLock<Option<Attached>>,
}

impl CdpBackend {
    /// `endpoint` is a DevTools address: `ws://…/devtools/browser/…`,
    /// `ws://…/devtools/page/…`, or `http://host:port`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            attached: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn page(&self) -> Result<Arc<PageControl>, BackendError> {
        self.attached
            .read()
            .await
            .as_ref()
            .map(|a| Arc::clone(&a.page))
            .ok_or(BackendError::NotInitialized)
    }

    async fn attach(&self) -> Result<Attached, BrowserError> {
        let ws_endpoint = resolve_ws_endpoint(&self.endpoint).await?;
        let client = Arc::new(CdpClient::connect(&ws_endpoint).await?);

        if is_page_endpoint(&ws_endpoint) {
            info!("connected directly to a page target");
            let page = Arc::new(PageControl::new(client, None, None));
            page.enable().await?;
            return Ok(Attached {
                page,
                created_target: None,
            });
        }

        let targets = client
            .send_command("Target.getTargets", json!({}), None, default_timeout())
            .await?;
        let (target_id, created) = match first_page_target(&targets) {
            Some(id) => {
                info!(target_id = %id, "using existing page");
                (id, false)
            }
            None => {
                info!("no pages found, creating one");
                let created = client
                    .send_command(
                        "Target.createTarget",
                        json!({ "url": "about:blank" }),
                        None,
                        default_timeout(),
                    )
                    .await?;
                let id = created
                    .get("targetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BrowserError::Protocol("createTarget returned no targetId".into()))?;
                (id.to_string(), true)
            }
        };

        let attach = client
            .send_command(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
                default_timeout(),
            )
            .await?;
        let session_id = attach
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol("attachToTarget returned no sessionId".into()))?
            .to_string();

        let page = Arc::new(PageControl::new(
            client,
            Some(session_id),
            Some(target_id.clone()),
        ));
        page.enable().await?;

        Ok(Attached {
            page,
            created_target: created.then_some(target_id),
        })
    }
}

fn default_timeout() -> Duration {
    crate::cdp_client::DEFAULT_COMMAND_TIMEOUT
}

/// The first `page` target in a `Target.getTargets` response.
fn first_page_target(targets: &Value) -> Option<String> {
    targets
        .get("targetInfos")?
        .as_array()?
        .iter()
        .find(|t| t["type"] == "page")
        .and_then(|t| t["targetId"].as_str())
        .map(String::from)
}

#[async_trait]
impl AutomationBackend for CdpBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn is_ready(&self) -> bool {
        self.attached
            .read()
            .await
            .as_ref()
            .is_some_and(|a| a.page.client().is_connected())
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        info!(endpoint = %self.endpoint, "initializing Chrome DevTools backend");
        if self.is_ready().await {
            return Ok(());
        }
        let attached = self.attach().await.map_err(|e| {
            warn!(error = %e, "Chrome DevTools initialization failed");
            BackendError::from(e)
        })?;
        *self.attached.write().await = Some(attached);
        info!("Chrome DevTools page ready");
        Ok(())
    }

    async fn shutdown(&self) {
        let Some(attached) = self.attached.write().await.take() else {
            info!("no browser resources to stop");
            return;
        };
        let client = Arc::clone(attached.page.client());
        if let Some(target_id) = attached.created_target {
            if let Err(e) = client
                .send_command(
                    "Target.closeTarget",
                    json!({ "targetId": target_id }),
                    None,
                    Duration::from_secs(5),
                )
                .await
            {
                warn!(error = %e, "error closing page");
            }
        }
        client.close().await;
        info!("Chrome DevTools backend stopped");
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BackendError> {
        Ok(self.page().await?.navigate(url, timeout).await?)
    }

    async fn click(&self, x: f64, y: f64) -> Result<(), BackendError> {
        Ok(self.page().await?.click(x, y).await?)
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        Ok(self.page().await?.type_text(text).await?)
    }

    async fn scroll_by(&self, delta_x: i64, delta_y: i64) -> Result<(), BackendError> {
        Ok(self.page().await?.scroll_by(delta_x, delta_y).await?)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, BackendError> {
        let page = self.page().await?;
        Ok(ScreenshotCapturer::capture_viewport(&page).await?)
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), BackendError> {
        Ok(self.page().await?.set_viewport_size(width, height).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_target_skips_workers() {
        let targets = json!({
            "targetInfos": [
                { "targetId": "W1", "type": "service_worker" },
                { "targetId": "P1", "type": "page" },
                { "targetId": "P2", "type": "page" }
            ]
        });
        assert_eq!(first_page_target(&targets).as_deref(), Some("P1"));
        assert_eq!(first_page_target(&json!({ "targetInfos": [] })), None);
    }

    #[tokio::test]
    async fn test_not_ready_before_initialize() {
        let backend = CdpBackend::new("ws://127.0.0.1:1/devtools/browser/x");
        assert!(!backend.is_ready().await);
        assert!(matches!(
            backend.click(1.0, 1.0).await,
            Err(BackendError::NotInitialized)
        ));
        backend.shutdown().await;
    }
}
