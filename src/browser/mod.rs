//! Page driving.
//!
//! The engine talks to the browser only through [`PageDriver`]. One driver
//! instance wraps one live page; all adapter calls for a given runner are
//! serialized against it. The trait exists so extractors and applicators can
//! be exercised against canned HTML in tests — `CdpDriver` is the production
//! implementation over a chromiumoxide page.

pub mod cdp;
pub mod chrome;
pub mod session;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the page to settle.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Full HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Whether at least one element matches the selector right now.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Wait up to `timeout` for a matching element. Returns `false` on
    /// timeout instead of erroring — absence is a normal outcome.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the field and type `text` into it.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Evaluate a JS expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;
}

pub use cdp::CdpDriver;
pub use chrome::{build_headless_config, find_chrome_executable, launch_page};
