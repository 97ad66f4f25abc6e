//! Chrome DevTools Protocol backend for the Wright relay.
//!
//! Attaches to an already running Chromium over its remote-debugging socket
//! and implements [`wright_core::AutomationBackend`] on one page.

pub mod backend;
pub mod cdp_client;
pub mod error;
pub mod page_control;
pub mod screenshot;

pub use backend::CdpBackend;
pub use cdp_client::CdpClient;
pub use error::BrowserError;
pub use page_control::PageControl;
pub use screenshot::ScreenshotCapturer;
