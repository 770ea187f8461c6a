//! Browser process management using `chromiumoxide`.
//!
//! Finds a Chromium-family executable and launches the long-lived browser
//! plus the single page a runner drives. Parallel per-platform automation
//! means parallel runners, each with its own page.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

/// Current-generation desktop user agents. Job boards profile the UA
/// against other fingerprint surfaces, so only mainstream strings belong
/// here.
const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

const PATH_CANDIDATES: &[&str] = &[
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "linux")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/brave-browser",
    "/usr/local/bin/chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const INSTALL_CANDIDATES: &[&str] = &[];

/// Find a usable Chromium-family browser executable: the
/// `CHROME_EXECUTABLE` override first, then a PATH scan, then the
/// well-known install locations for the current OS.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var(crate::core::config::ENV_CHROME_EXECUTABLE) {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    let from_path = std::env::var("PATH").ok().and_then(|path_var| {
        std::env::split_paths(&path_var)
            .flat_map(|dir| PATH_CANDIDATES.iter().map(move |exe| dir.join(exe)))
            .find(|full| full.exists())
            .map(|full: PathBuf| full.to_string_lossy().into_owned())
    });
    if from_path.is_some() {
        return from_path;
    }

    INSTALL_CANDIDATES
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

/// Build a `BrowserConfig` with stealth defaults:
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag and the UA comes from the desktop pool.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", random_user_agent()))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Launch a browser and open the single page a runner will drive.
///
/// The returned `Browser` must outlive the page; the CDP event handler is
/// detached onto a background task.
pub async fn launch_page() -> Result<(Browser, Page)> {
    let exe = find_chrome_executable().ok_or_else(|| {
        anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
    })?;

    info!("Launching browser: {}", exe);
    let config = build_headless_config(&exe, 1920, 1080)?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| anyhow!("Failed to create page: {}", e))?;

    Ok((browser, page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_pool_is_realistic() {
        assert!(!DESKTOP_USER_AGENTS.is_empty());
        for ua in DESKTOP_USER_AGENTS {
            assert!(ua.contains("Mozilla/5.0"));
        }
        assert!(random_user_agent().contains("Mozilla"));
    }

    #[test]
    fn path_candidates_are_bare_names() {
        for c in PATH_CANDIDATES {
            assert!(!c.contains('/'), "PATH candidates must be bare names");
        }
    }
}
