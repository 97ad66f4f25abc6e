use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// The capability surface the dispatcher drives.
///
/// One instance is shared by every connection of a server, so implementations
/// take `&self` and guard their own state. Concurrent callers act on the same
/// page; no isolation between clients is provided.
#[async_trait]
pub trait AutomationBackend: Send + Sync + 'static {
    /// Human-readable name used in error messages (e.g., "Chrome DevTools").
    fn name(&self) -> &str;

    /// Whether `initialize` has completed and the page can take commands.
    async fn is_ready(&self) -> bool;

    /// Attach to the browser and prepare a page.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Release every browser resource. Never fails; problems are logged.
    async fn shutdown(&self);

    /// Load `url` and wait for the page to settle, up to `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BackendError>;

    async fn click(&self, x: f64, y: f64) -> Result<(), BackendError>;

    async fn type_text(&self, text: &str) -> Result<(), BackendError>;

    async fn scroll_by(&self, delta_x: i64, delta_y: i64) -> Result<(), BackendError>;

    /// Capture the visible viewport as encoded image bytes.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, BackendError>;

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), BackendError>;
}
