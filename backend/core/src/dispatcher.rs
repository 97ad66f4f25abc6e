//! Command dispatcher.
//!
//! Validates a decoded [`Command`], drives the matching backend capability and
//! folds every outcome (including a panicking backend) into an [`ActionResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::{BackendError, ValidationError};
use crate::traits::AutomationBackend;
use crate::types::{ActionResult, ActionType, Command};

/// A validated backend call, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Navigate { url: String, timeout: Duration },
    Click { x: f64, y: f64 },
    Type { text: String },
    Scroll { delta_x: i64, delta_y: i64 },
    Screenshot,
    ResizeViewport { width: u32, height: u32 },
}

impl Invocation {
    /// Check the fields `cmd.action_type` needs. Fields belonging to other
    /// actions are ignored.
    pub fn from_command(cmd: &Command) -> Result<Self, ValidationError> {
        match cmd.action_type {
            ActionType::Goto => match cmd.url.as_deref() {
                Some(url) if !url.is_empty() => Ok(Invocation::Navigate {
                    url: url.to_string(),
                    timeout: cmd.timeout_duration(),
                }),
                _ => Err(ValidationError::MissingUrl),
            },
            ActionType::Click => match (cmd.x, cmd.y) {
                (Some(x), Some(y)) => Ok(Invocation::Click { x, y }),
                _ => Err(ValidationError::MissingCoordinates),
            },
            ActionType::Type => {
                let text = cmd.text.as_deref().map(sanitize_text).unwrap_or_default();
                if text.is_empty() {
                    Err(ValidationError::MissingText)
                } else {
                    Ok(Invocation::Type { text })
                }
            }
            ActionType::Scroll => Ok(Invocation::Scroll {
                delta_x: cmd.delta_x.unwrap_or(0),
                delta_y: cmd.delta_y.unwrap_or(0),
            }),
            ActionType::Screenshot => Ok(Invocation::Screenshot),
            ActionType::SetViewportSize => match (cmd.width, cmd.height) {
                (Some(width), Some(height)) => Ok(Invocation::ResizeViewport { width, height }),
                _ => Err(ValidationError::MissingViewportSize),
            },
        }
    }
}

/// Flatten line breaks so typed text stays on one line.
pub fn sanitize_text(text: &str) -> String {
    text.replace('\n', " ").replace('\r', "")
}

/// Runs commands against one shared backend.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn AutomationBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn AutomationBackend> {
        &self.backend
    }

    pub async fn dispatch(&self, cmd: &Command) -> ActionResult {
        let backend_name = self.backend.name();

        if !self.backend.is_ready().await {
            warn!(action = %cmd.action_type, backend = backend_name, "backend not ready");
            return ActionResult::failure(format!("{backend_name} is not initialized."));
        }

        let invocation = match Invocation::from_command(cmd) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(action = %cmd.action_type, error = %e, "rejected command");
                return ActionResult::failure(e.to_string());
            }
        };

        let outcome = AssertUnwindSafe(self.invoke(invocation)).catch_unwind().await;

        match outcome {
            Ok(Ok(Some(image))) => {
                debug!(bytes = image.len(), "screenshot captured");
                ActionResult::with_image(image)
            }
            Ok(Ok(None)) => ActionResult::ok(),
            Ok(Err(e)) => {
                warn!(action = %cmd.action_type, error = %e, "backend reported failure");
                ActionResult::failure(format!("{backend_name} error: {e}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(action = %cmd.action_type, panic = %message, "backend call panicked");
                ActionResult::failure(format!("Server execution error: {message}"))
            }
        }
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Option<Vec<u8>>, BackendError> {
        let backend = &self.backend;
        match invocation {
            Invocation::Navigate { url, timeout } => {
                info!(timeout_ms = timeout.as_millis() as u64, "navigating");
                backend.navigate(&url, timeout).await?;
            }
            Invocation::Click { x, y } => {
                info!(x, y, "clicking");
                backend.click(x, y).await?;
            }
            Invocation::Type { text } => {
                info!(length = text.chars().count(), "typing text");
                backend.type_text(&text).await?;
            }
            Invocation::Scroll { delta_x, delta_y } => {
                info!(delta_x, delta_y, "scrolling");
                backend.scroll_by(delta_x, delta_y).await?;
            }
            Invocation::Screenshot => {
                info!("taking screenshot");
                return backend.capture_screenshot().await.map(Some);
            }
            Invocation::ResizeViewport { width, height } => {
                info!(width, height, "setting viewport size");
                backend.resize_viewport(width, height).await?;
            }
        }
        Ok(None)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
