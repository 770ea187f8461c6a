//! Session cookie persistence.
//!
//! A completed login is worth keeping: cookies for each supported site are
//! saved to `~/.applywright/sessions/<site>.json` and injected into the page
//! at the next launch, so a session survives process restarts and the
//! login-wait poll only triggers when the cookies have genuinely expired.
//! Cookies are stored as raw CDP JSON; any entry that fails to deserialize
//! on the way back in is skipped rather than blocking the run.

use std::path::PathBuf;

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::Page;
use tracing::{debug, info, warn};

use crate::core::types::Platform;

fn sessions_dir() -> Option<PathBuf> {
    crate::core::config::state_dir().map(|d| d.join("sessions"))
}

fn session_path(platform: Platform) -> Option<PathBuf> {
    sessions_dir().map(|d| d.join(format!("{}.json", platform.as_str())))
}

/// Cookies belonging to a site, matched by registrable-domain suffix so
/// host-scoped cookies (`www.linkedin.com`) and domain-scoped ones
/// (`.linkedin.com`) both land in the same jar.
fn cookies_for_site(raw: &[serde_json::Value], site_domain: &str) -> Vec<serde_json::Value> {
    raw.iter()
        .filter(|v| {
            v.get("domain")
                .and_then(|d| d.as_str())
                .map(|d| {
                    let host = d.trim_start_matches('.');
                    host == site_domain || host.ends_with(&format!(".{site_domain}"))
                })
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Stored cookies for a site, or `None` when no usable session file exists.
pub fn load_raw(platform: Platform) -> Option<Vec<serde_json::Value>> {
    let path = session_path(platform)?;
    let content = std::fs::read_to_string(&path).ok()?;
    let cookies: Vec<serde_json::Value> = serde_json::from_str(&content).ok()?;
    if cookies.is_empty() {
        return None;
    }
    info!(
        "loaded {} stored cookies for {} ({})",
        cookies.len(),
        platform,
        path.display()
    );
    Some(cookies)
}

/// Drop a site's stored session so the next run forces a fresh login.
pub fn invalidate(platform: Platform) {
    let Some(path) = session_path(platform) else { return };
    if path.exists() {
        match std::fs::remove_file(&path) {
            Ok(()) => info!("removed stale {} session ({})", platform, path.display()),
            Err(e) => warn!("failed to remove session file {}: {}", path.display(), e),
        }
    }
}

/// Inject every stored site session into a live page. Call before the first
/// navigation so the cookies ride along on the initial request.
pub async fn restore_all(page: &Page) {
    for platform in [Platform::Linkedin, Platform::Indeed, Platform::Upwork] {
        let Some(raw) = load_raw(platform) else { continue };
        let params: Vec<CookieParam> = raw
            .iter()
            .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
            .collect();
        if params.is_empty() {
            debug!("{} session file held no valid cookies, skipping", platform);
            continue;
        }
        let count = params.len();
        match page.execute(SetCookiesParams::new(params)).await {
            Ok(_) => info!("injected {} {} session cookies", count, platform),
            Err(e) => warn!("failed to inject {} session cookies: {}", platform, e),
        }
    }
}

/// Save the page's current cookies back to per-site session files. Sites
/// with no cookies in the jar keep whatever file they already had.
pub async fn persist_all(page: &Page) {
    let cookies = match page.get_cookies().await {
        Ok(cookies) => cookies,
        Err(e) => {
            warn!("could not read cookies for session persistence: {}", e);
            return;
        }
    };
    let raw: Vec<serde_json::Value> = cookies
        .iter()
        .filter_map(|c| serde_json::to_value(c).ok())
        .collect();

    let Some(dir) = sessions_dir() else { return };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("cannot create sessions dir {}: {}", dir.display(), e);
        return;
    }

    for platform in [Platform::Linkedin, Platform::Indeed, Platform::Upwork] {
        let site_cookies = cookies_for_site(&raw, platform.domain());
        if site_cookies.is_empty() {
            continue;
        }
        let path = dir.join(format!("{}.json", platform.as_str()));
        match serde_json::to_string_pretty(&site_cookies) {
            Ok(json) => match std::fs::write(&path, json) {
                Ok(()) => info!(
                    "saved {} {} session cookies to {}",
                    site_cookies.len(),
                    platform,
                    path.display()
                ),
                Err(e) => warn!("cannot write session file {}: {}", path.display(), e),
            },
            Err(e) => warn!("cannot serialize {} session cookies: {}", platform, e),
        }
    }
}
