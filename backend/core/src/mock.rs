//! In-memory automation backend.
//!
//! Records every capability call instead of driving a browser. Used by the test
//! suites and by `wright serve --backend mock`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::BackendError;
use crate::traits::AutomationBackend;

/// A capability call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Navigate(String, Duration),
    Click(f64, f64),
    TypeText(String),
    ScrollBy(i64, i64),
    CaptureScreenshot,
    ResizeViewport(u32, u32),
}

enum Fault {
    Error(String),
    Panic(String),
}

pub struct MockBackend {
    name: String,
    ready: AtomicBool,
    screenshot: Mutex<Vec<u8>>,
    calls: Mutex<Vec<BackendCall>>,
    fault: Mutex<Option<Fault>>,
    delay: Mutex<Option<Duration>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::named("Mock browser")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: AtomicBool::new(false),
            // JPEG SOI/EOI markers
            screenshot: Mutex::new(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            calls: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Bytes returned by the next screenshots.
    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        *lock(&self.screenshot) = bytes;
    }

    /// Make the next capability call return a backend error.
    pub fn fail_next(&self, message: impl Into<String>) {
        *lock(&self.fault) = Some(Fault::Error(message.into()));
    }

    /// Make the next capability call panic.
    pub fn panic_next(&self, message: impl Into<String>) {
        *lock(&self.fault) = Some(Fault::Panic(message.into()));
    }

    /// Delay every capability call, to simulate a slow page.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    async fn record(&self, call: BackendCall) -> Result<(), BackendError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fault = lock(&self.fault).take();
        match fault {
            Some(Fault::Error(message)) => return Err(BackendError::Operation(message)),
            Some(Fault::Panic(message)) => panic!("{message}"),
            None => {}
        }

        if !self.ready.load(Ordering::SeqCst) {
            return Err(BackendError::NotInitialized);
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AutomationBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        info!(backend = %self.name, "mock backend ready");
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BackendError> {
        self.record(BackendCall::Navigate(url.to_string(), timeout)).await
    }

    async fn click(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.record(BackendCall::Click(x, y)).await
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        self.record(BackendCall::TypeText(text.to_string())).await
    }

    async fn scroll_by(&self, delta_x: i64, delta_y: i64) -> Result<(), BackendError> {
        self.record(BackendCall::ScrollBy(delta_x, delta_y)).await
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, BackendError> {
        self.record(BackendCall::CaptureScreenshot).await?;
        Ok(lock(&self.screenshot).clone())
    }

    async fn resize_viewport(&self, width: u32, height: u32) -> Result<(), BackendError> {
        self.record(BackendCall::ResizeViewport(width, height)).await
    }
}
