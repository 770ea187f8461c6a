//! Upwork adapter. Extraction only: proposals cost Connects and a wrong
//! submission costs money, so `apply_to_job` always defers to a human.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::PageDriver;
use crate::core::types::{
    ApplicationResult, JobDetails, JobListing, ListingCard, Platform, SearchProfile,
};
use crate::healing::SelectorHealer;

use super::{
    extract_with_healing, hints::SiteHints, select, ApplyRequest, ApplySession, PlatformAdapter,
};

const BASE: &str = "https://www.upwork.com";

pub struct UpworkAdapter {
    driver: Arc<dyn PageDriver>,
    healer: Arc<SelectorHealer>,
    hints: Mutex<SiteHints>,
    hints_dir: Option<PathBuf>,
}

impl UpworkAdapter {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        healer: Arc<SelectorHealer>,
        hints: SiteHints,
        hints_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            driver,
            healer,
            hints: Mutex::new(hints),
            hints_dir,
        }
    }

    fn selectors(&self, action: &str) -> Vec<String> {
        self.hints.lock().expect("hints lock poisoned").selectors(action)
    }

    fn site(&self) -> &'static str {
        Platform::Upwork.as_str()
    }
}

static CIPHER_ID_RE: OnceLock<Regex> = OnceLock::new();

fn cipher_id_re() -> &'static Regex {
    CIPHER_ID_RE.get_or_init(|| Regex::new(r"~([0-9a-f]+)").expect("valid ciphertext pattern"))
}

/// Job tiles link to `/jobs/<slug>_~<ciphertext>/`; the ciphertext is the
/// stable external id.
fn external_id_from_card(fragment: &str) -> Option<String> {
    let href = select::first_attr(fragment, &["a[href*='/jobs/']".into()], "href")?;
    cipher_id_re().captures(&href).map(|c| format!("~{}", &c[1]))
}

fn card_url(fragment: &str) -> Option<String> {
    let href = select::first_attr(fragment, &["a[href*='/jobs/']".into()], "href")?;
    Some(if href.starts_with("http") {
        href
    } else {
        format!("{BASE}{href}")
    })
}

fn parse_card(fragment: &str, hints: &SiteHints) -> ListingCard {
    ListingCard {
        external_id: external_id_from_card(fragment),
        url: card_url(fragment),
        title: select::first_text(fragment, &hints.selectors("card_title")).unwrap_or_default(),
        company: select::first_text(fragment, &hints.selectors("card_company"))
            .unwrap_or_default(),
        location: select::first_text(fragment, &hints.selectors("card_location"))
            .unwrap_or_default(),
        easy_apply: false,
    }
}

#[async_trait]
impl PlatformAdapter for UpworkAdapter {
    fn platform(&self) -> Platform {
        Platform::Upwork
    }

    async fn is_authenticated(&self) -> Result<bool> {
        let url = self.driver.current_url().await.unwrap_or_default();
        if !url.contains("upwork.com") {
            self.driver.goto(&format!("{BASE}/nx/find-work/")).await?;
        }
        let url = self.driver.current_url().await?;
        if url.contains("/ab/account-security/login") {
            return Ok(false);
        }
        let html = self.driver.content().await?;
        Ok(select::exists_any(&html, &self.selectors("auth_marker")))
    }

    async fn navigate_to_login(&self) -> Result<()> {
        self.driver
            .goto(&format!("{BASE}/ab/account-security/login"))
            .await
    }

    fn build_search_url(&self, profile: &SearchProfile, page: u32) -> Result<String> {
        let mut url = Url::parse(&format!("{BASE}/nx/search/jobs/"))
            .context("upwork search base url")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &profile.keywords.join(" "));
            query.append_pair("sort", "recency");
            // Upwork pages are one-based.
            if page > 0 {
                query.append_pair("page", &(page + 1).to_string());
            }
        }
        Ok(url.to_string())
    }

    async fn extract_listings(&self) -> Result<Vec<ListingCard>> {
        let html = self.driver.content().await?;
        let card_selectors = self.selectors("listing_card");

        let fragments = extract_with_healing(
            &self.healer,
            self.site(),
            &html,
            &card_selectors,
            "job tile container on a job search results page",
            |sels| {
                let found = select::fragments(&html, sels);
                (!found.is_empty()).then_some(found)
            },
        )
        .await;

        let Some(fragments) = fragments else {
            debug!("no job tiles matched on upwork results page");
            return Ok(Vec::new());
        };

        let hints = self.hints.lock().expect("hints lock poisoned").clone();
        let cards: Vec<ListingCard> = fragments
            .iter()
            .map(|f| parse_card(f, &hints))
            .filter(|c| !c.title.is_empty() || c.external_id.is_some())
            .collect();
        info!("upwork: {} job tiles extracted", cards.len());
        Ok(cards)
    }

    async fn extract_job_details(&self, url: &str) -> Result<JobDetails> {
        self.driver.goto(url).await?;
        let html = self.driver.content().await?;
        let site = self.site();

        let title_selectors = self.selectors("detail_title");
        let title = extract_with_healing(
            &self.healer,
            site,
            &html,
            &title_selectors,
            "project title heading on a job detail page",
            |sels| select::first_text(&html, sels),
        )
        .await;

        let desc_selectors = self.selectors("detail_description");
        let description = extract_with_healing(
            &self.healer,
            site,
            &html,
            &desc_selectors,
            "full project description on a job detail page",
            |sels| select::first_text(&html, sels),
        )
        .await
        .or_else(|| select::largest_text_block(&html))
        .unwrap_or_default();

        let salary = select::first_text(&html, &self.selectors("detail_salary"));

        Ok(JobDetails {
            title,
            description,
            salary,
            easy_apply: Some(false),
        })
    }

    async fn apply_to_job(
        &self,
        job: &JobListing,
        _request: &ApplyRequest,
        _session: &ApplySession,
    ) -> Result<ApplicationResult> {
        info!(
            "upwork: {} requires a hand-written proposal, deferring to manual review",
            job.external_id
        );
        Ok(ApplicationResult::manual(
            "proposals cost Connects and need tailored text; submit by hand",
        ))
    }

    fn hints(&self) -> SiteHints {
        self.hints.lock().expect("hints lock poisoned").clone()
    }

    fn update_hints(&self, hints: SiteHints) {
        let mut guard = self.hints.lock().expect("hints lock poisoned");
        *guard = hints;
        if let Some(dir) = &self.hints_dir {
            if let Err(e) = guard.save(dir) {
                warn!("failed to persist upwork hints: {}", e);
            }
        }
    }
}
