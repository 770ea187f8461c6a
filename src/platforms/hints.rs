//! Per-site selector knowledge.
//!
//! Each site carries a set of selector groups keyed by action name
//! ("listing_card", "detail_description", ...). Groups start from the
//! compiled-in defaults and can be overlaid by a JSON hint file, which the
//! healer updates as selectors rot and repairs are validated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorGroup {
    pub selectors: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub failures: u32,
}

fn default_confidence() -> f64 {
    0.5
}

impl SelectorGroup {
    fn new(selectors: &[&str]) -> Self {
        Self {
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            confidence: default_confidence(),
            failures: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteHints {
    pub site: String,
    pub groups: HashMap<String, SelectorGroup>,
}

impl SiteHints {
    pub fn defaults_for(platform: Platform) -> Self {
        let groups = match platform {
            Platform::Linkedin => linkedin_defaults(),
            Platform::Indeed => indeed_defaults(),
            Platform::Upwork => upwork_defaults(),
        };
        Self {
            site: platform.as_str().to_string(),
            groups,
        }
    }

    /// Compiled defaults overlaid with `<dir>/<site>.json` when present.
    pub fn load(platform: Platform, dir: Option<&Path>) -> Self {
        let mut hints = Self::defaults_for(platform);
        let Some(dir) = dir else { return hints };
        let path = hint_path(dir, platform);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SiteHints>(&raw) {
                Ok(stored) => {
                    debug!("loaded {} selector hints from {}", stored.groups.len(), path.display());
                    hints.groups.extend(stored.groups);
                }
                Err(e) => warn!("ignoring malformed hint file {}: {}", path.display(), e),
            },
            Err(_) => debug!("no hint file at {}, using defaults", path.display()),
        }
        hints
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating hint dir {}", dir.display()))?;
        let path = dir.join(format!("{}.json", self.site));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Selectors for an action, highest-confidence group first. Unknown
    /// actions yield an empty list rather than panicking.
    pub fn selectors(&self, action: &str) -> Vec<String> {
        self.groups
            .get(action)
            .map(|g| g.selectors.clone())
            .unwrap_or_default()
    }

    /// Install validated replacement selectors in front of the old ones.
    pub fn promote(&mut self, action: &str, replacements: Vec<String>) {
        let group = self
            .groups
            .entry(action.to_string())
            .or_insert_with(|| SelectorGroup::new(&[]));
        let mut merged = replacements;
        for old in group.selectors.drain(..) {
            if !merged.contains(&old) {
                merged.push(old);
            }
        }
        group.selectors = merged;
        group.confidence = (group.confidence + 0.2).min(1.0);
        group.failures = 0;
    }

    pub fn mark_failure(&mut self, action: &str) {
        if let Some(group) = self.groups.get_mut(action) {
            group.failures += 1;
            group.confidence = (group.confidence / 2.0).max(0.05);
        }
    }
}

fn hint_path(dir: &Path, platform: Platform) -> PathBuf {
    dir.join(format!("{}.json", platform.as_str()))
}

fn group_map(entries: &[(&str, &[&str])]) -> HashMap<String, SelectorGroup> {
    entries
        .iter()
        .map(|(action, sels)| (action.to_string(), SelectorGroup::new(sels)))
        .collect()
}

fn linkedin_defaults() -> HashMap<String, SelectorGroup> {
    group_map(&[
        (
            "listing_card",
            &[
                "div.job-card-container",
                "li.jobs-search-results__list-item",
                "div[data-job-id]",
            ],
        ),
        (
            "card_title",
            &[
                "a.job-card-list__title",
                "a.job-card-container__link span strong",
                "a[class*='job-card'] span[aria-hidden='true']",
            ],
        ),
        (
            "card_company",
            &[
                "span.job-card-container__primary-description",
                "div.artdeco-entity-lockup__subtitle",
            ],
        ),
        (
            "card_location",
            &[
                "li.job-card-container__metadata-item",
                "div.artdeco-entity-lockup__caption",
            ],
        ),
        (
            "detail_title",
            &[
                "h1.job-details-jobs-unified-top-card__job-title",
                "h1.top-card-layout__title",
                "h1",
            ],
        ),
        (
            "detail_description",
            &[
                "div.jobs-description__content",
                "div.jobs-box__html-content",
                "section.show-more-less-html",
            ],
        ),
        (
            "detail_salary",
            &[
                "div.jobs-details__salary-main-rail-card",
                "span.job-details-jobs-unified-top-card__job-insight-view-model-secondary",
            ],
        ),
        (
            "easy_apply_button",
            &["button.jobs-apply-button", "button[data-live-test-job-apply-button]"],
        ),
        (
            "auth_marker",
            &["img.global-nav__me-photo", "div.feed-identity-module"],
        ),
        (
            "apply_modal",
            &["div.jobs-easy-apply-modal", "div[data-test-modal]"],
        ),
        (
            "apply_next",
            &[
                "button[aria-label='Continue to next step']",
                "button[aria-label='Review your application']",
                "button[aria-label='Submit application']",
            ],
        ),
        (
            "apply_done",
            &["div.jobs-post-apply", "h2#post-apply-modal"],
        ),
    ])
}

fn indeed_defaults() -> HashMap<String, SelectorGroup> {
    group_map(&[
        (
            "listing_card",
            &[
                "div.job_seen_beacon",
                "td.resultContent",
                "div.cardOutline",
            ],
        ),
        (
            "card_title",
            &["h2.jobTitle a span", "h2.jobTitle span[title]", "h2.jobTitle"],
        ),
        (
            "card_company",
            &["span[data-testid='company-name']", "span.companyName"],
        ),
        (
            "card_location",
            &["div[data-testid='text-location']", "div.companyLocation"],
        ),
        (
            "detail_title",
            &[
                "h1.jobsearch-JobInfoHeader-title",
                "h1[data-testid='jobsearch-JobInfoHeader-title']",
                "h1",
            ],
        ),
        (
            "detail_description",
            &["div#jobDescriptionText", "div.jobsearch-JobComponent-description"],
        ),
        (
            "detail_salary",
            &[
                "div#salaryInfoAndJobType span",
                "span[data-testid='attribute_snippet_testid']",
            ],
        ),
        (
            "easy_apply_button",
            &[
                "button#indeedApplyButton",
                "div#applyButtonLinkContainer button",
                "span[data-indeed-apply-joburl]",
            ],
        ),
        (
            "auth_marker",
            &["div[data-gnav-element-name='AccountMenu']", "a[href*='myaccount.indeed.com']"],
        ),
        (
            "apply_continue",
            &["button[data-testid='continue-button']", "main button[type='submit']"],
        ),
        (
            "apply_done",
            &["div[data-testid='ia-SuccessPage']", "h1[data-testid='ia-SuccessPage-heading']"],
        ),
    ])
}

fn upwork_defaults() -> HashMap<String, SelectorGroup> {
    group_map(&[
        (
            "listing_card",
            &[
                "article[data-test='JobTile']",
                "section[data-test='JobTile']",
                "div.job-tile",
            ],
        ),
        (
            "card_title",
            &["h2.job-tile-title a", "a[data-test='job-tile-title-link']", "h2 a"],
        ),
        (
            "card_company",
            &["span[data-test='client-name']", "small[data-test='client-name']"],
        ),
        (
            "card_location",
            &["span[data-test='client-country']", "small[data-test='location']"],
        ),
        (
            "detail_title",
            &["h4[data-test='job-title']", "header h1", "h1"],
        ),
        (
            "detail_description",
            &[
                "section[data-test='Description']",
                "div[data-test='Description']",
                "div.job-description",
            ],
        ),
        (
            "detail_salary",
            &["ul[data-test='JobFeatures'] strong", "div[data-test='BudgetAmount']"],
        ),
        (
            "auth_marker",
            &["button[data-test='user-dropdown']", "img.nav-avatar"],
        ),
    ])
}
