//! Selector self-healing.
//!
//! When a site changes its markup and a selector group stops matching, the
//! healer gives extraction two fallbacks before the caller resorts to the
//! largest-text-block heuristic:
//!
//! 1. a persisted repair cache of replacements that worked before, and
//! 2. a one-shot inference call ("what selector finds the job title on this
//!    page now?") — at most once per selector group per process lifetime,
//!    tracked by an in-memory attempted set whose only job is to bound API
//!    usage.
//!
//! The healer never validates candidates itself: callers prove them by
//! extracting with them, then report back via `record_success` /
//! `record_failure`.

pub mod cache;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::inference::{compact_html, InferenceClient};
use cache::RepairCache;

/// HTML excerpt budget for the repair prompt.
const REPAIR_HTML_CHARS: usize = 12_000;

pub struct SelectorHealer {
    cache: Mutex<RepairCache>,
    /// Selector groups already escalated to inference this process lifetime.
    attempted: Mutex<HashSet<String>>,
    inference: Option<Arc<InferenceClient>>,
}

impl SelectorHealer {
    pub fn new(cache: RepairCache, inference: Option<Arc<InferenceClient>>) -> Self {
        Self {
            cache: Mutex::new(cache),
            attempted: Mutex::new(HashSet::new()),
            inference,
        }
    }

    /// Stable key for a selector group, independent of caller ordering.
    fn group_key(site: &str, selectors: &[String]) -> String {
        let mut sorted: Vec<&str> = selectors.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        format!("{}::{}", site, sorted.join("|"))
    }

    /// Previously-validated replacement selectors for this group, if any.
    pub fn cached_repair(&self, site: &str, selectors: &[String]) -> Option<Vec<String>> {
        let key = Self::group_key(site, selectors);
        let cache = self.cache.lock().expect("repair cache lock poisoned");
        cache.get(&key).map(|e| e.selectors.clone())
    }

    /// The caller validated `replacements` by extracting with them.
    pub fn record_success(&self, site: &str, selectors: &[String], replacements: Vec<String>) {
        let key = Self::group_key(site, selectors);
        info!("Selector repair validated for {}: {:?}", site, replacements);
        self.cache
            .lock()
            .expect("repair cache lock poisoned")
            .record_success(&key, replacements);
    }

    /// A cached repair stopped working.
    pub fn record_failure(&self, site: &str, selectors: &[String]) {
        let key = Self::group_key(site, selectors);
        self.cache
            .lock()
            .expect("repair cache lock poisoned")
            .record_failure(&key);
    }

    /// Ask inference for candidate replacement selectors — once per group
    /// per process. Returns `Ok(None)` when already attempted, when no
    /// inference client is configured, or when the model refuses.
    /// Candidates are unvalidated and syntax-checked only.
    pub async fn repair(
        &self,
        site: &str,
        page_html: &str,
        selectors: &[String],
        purpose: &str,
    ) -> Result<Option<Vec<String>>> {
        let Some(inference) = &self.inference else {
            return Ok(None);
        };

        let key = Self::group_key(site, selectors);
        {
            let mut attempted = self.attempted.lock().expect("attempted set lock poisoned");
            if !attempted.insert(key.clone()) {
                debug!("Selector repair already attempted this session: {}", key);
                return Ok(None);
            }
        }

        info!("Escalating selector repair to inference: {} / {}", site, purpose);
        let excerpt = compact_html(page_html, REPAIR_HTML_CHARS);
        let candidates = match inference.suggest_selectors(&excerpt, purpose, selectors).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Selector repair inference failed for {}: {}", purpose, e);
                return Ok(None);
            }
        };

        let valid: Vec<String> = candidates
            .into_iter()
            .filter(|s| scraper::Selector::parse(s).is_ok())
            .collect();

        if valid.is_empty() {
            return Ok(None);
        }
        Ok(Some(valid))
    }

    /// Whether this group was already escalated during this process.
    pub fn attempted_this_session(&self, site: &str, selectors: &[String]) -> bool {
        let key = Self::group_key(site, selectors);
        self.attempted
            .lock()
            .expect("attempted set lock poisoned")
            .contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healer() -> SelectorHealer {
        SelectorHealer::new(RepairCache::ephemeral(), None)
    }

    #[test]
    fn group_key_is_order_independent() {
        let a = SelectorHealer::group_key("indeed", &[".x".into(), ".y".into()]);
        let b = SelectorHealer::group_key("indeed", &[".y".into(), ".x".into()]);
        assert_eq!(a, b);
        let c = SelectorHealer::group_key("linkedin", &[".x".into(), ".y".into()]);
        assert_ne!(a, c);
    }

    #[test]
    fn success_roundtrips_through_cache() {
        let h = healer();
        let group = vec![".title".to_string()];
        assert!(h.cached_repair("indeed", &group).is_none());

        h.record_success("indeed", &group, vec!["h1.job-title".into()]);
        assert_eq!(
            h.cached_repair("indeed", &group),
            Some(vec!["h1.job-title".to_string()])
        );
    }

    #[tokio::test]
    async fn repair_without_inference_is_none_and_not_marked_attempted() {
        let h = healer();
        let group = vec![".title".to_string()];
        let out = h.repair("indeed", "<html></html>", &group, "job title").await;
        assert!(out.unwrap().is_none());
        // No client configured: the budget was not spent.
        assert!(!h.attempted_this_session("indeed", &group));
    }
}
