//! `PageDriver` over a live chromiumoxide page.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::{debug, info};

use super::PageDriver;

/// Protocol-level stealth injected on every new document, before any site
/// script runs. Covers the checks job boards actually perform: webdriver
/// flag, plugin/language probes, chrome runtime presence, and automation
/// framework markers.
const STEALTH_SCRIPT: &str = r#"
(() => {
    try {
        const proto = Navigator.prototype;
        try {
            Object.defineProperty(proto, 'webdriver', {
                get: () => undefined,
                configurable: true,
            });
        } catch (e) {}
        try { delete navigator.webdriver; } catch (e) {}
        try {
            Object.defineProperty(proto, 'languages', {
                get: () => ['en-US', 'en'],
                configurable: true,
            });
        } catch (e) {}
        try {
            Object.defineProperty(proto, 'plugins', {
                get: () => [1, 2, 3, 4, 5],
                configurable: true,
            });
        } catch (e) {}
    } catch (e) {}
})();

if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function() { return { onDisconnect: { addListener: function() {} } }; },
        sendMessage: function() {},
    };
}

delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
delete window.callPhantom;
delete window._phantom;
"#;

pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    /// Wrap a page, injecting the stealth script for all future documents.
    pub async fn new(page: Page) -> Result<Self> {
        page.execute(
            chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams::new(
                STEALTH_SCRIPT.to_string(),
            ),
        )
        .await
        .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;
        Ok(Self { page })
    }

    /// Wait until the page network goes idle (no new resource entries for
    /// `quiet_ms` consecutive ms) or until `timeout_ms` has elapsed.
    ///
    /// Polls `performance.getEntriesByType("resource").length` every 250 ms —
    /// a networkidle heuristic that works without CDP Network events.
    async fn wait_until_stable(&self, quiet_ms: u64, timeout_ms: u64) -> Result<()> {
        let poll_ms = 250u64;
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed().as_millis() as u64 >= timeout_ms {
                debug!("wait_until_stable: timeout after {}ms", timeout_ms);
                break;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready_complete: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready_complete {
                stable_since = std::time::Instant::now();
                last_count = count;
            } else if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
                break;
            }

            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Navigation failed for {}: {}", url, e))?;
        self.wait_until_stable(1_500, 15_000).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| anyhow!("Failed to read page url: {}", e))?
            .ok_or_else(|| anyhow!("Page has no url"))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("Failed to get page content: {}", e))
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Ok(false)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("No element for '{}': {}", selector, e))?;
        element
            .click()
            .await
            .map_err(|e| anyhow!("Click failed on '{}': {}", selector, e))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| anyhow!("No element for '{}': {}", selector, e))?;
        element
            .focus()
            .await
            .map_err(|e| anyhow!("Focus failed on '{}': {}", selector, e))?;
        // Clear any prefilled value so retries do not append.
        let sel_json = serde_json::to_string(selector)?;
        let _ = self
            .page
            .evaluate(format!(
                "(() => {{ const el = document.querySelector({sel_json}); if (el) el.value = ''; }})()"
            ))
            .await;
        element
            .type_str(text)
            .await
            .map_err(|e| anyhow!("Typing failed on '{}': {}", selector, e))?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| anyhow!("Evaluate failed: {}", e))?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow!("Evaluate result not JSON: {}", e))
    }
}
