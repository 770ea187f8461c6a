//! Indeed adapter. Native "Indeed Apply" flows are driven; listings that
//! redirect to an employer site are flagged for manual handling instead of
//! click-through guessing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::PageDriver;
use crate::core::types::{
    ApplicationResult, JobDetails, JobListing, ListingCard, Platform, SearchProfile,
};
use crate::healing::SelectorHealer;

use super::linkedin::first_present;
use super::{
    extract_with_healing, hints::SiteHints, resolve_answer, select, ApplyRequest, ApplySession,
    PlatformAdapter,
};

const BASE: &str = "https://www.indeed.com";
const RESULTS_PER_PAGE: u32 = 10;
const MAX_APPLY_STEPS: usize = 8;

pub struct IndeedAdapter {
    driver: Arc<dyn PageDriver>,
    healer: Arc<SelectorHealer>,
    hints: Mutex<SiteHints>,
    hints_dir: Option<PathBuf>,
}

impl IndeedAdapter {
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
        Platform::Indeed.as_str()
    }
}

fn job_type_param(job_type: &str) -> Option<&'static str> {
    match job_type.to_lowercase().replace([' ', '_', '-'], "").as_str() {
        "fulltime" => Some("fulltime"),
        "parttime" => Some("parttime"),
        "contract" => Some("contract"),
        "temporary" => Some("temporary"),
        "internship" => Some("internship"),
        _ => None,
    }
}

fn external_id_from_card(fragment: &str) -> Option<String> {
    if let Some(jk) = select::first_attr(fragment, &["[data-jk]".into()], "data-jk") {
        return Some(jk);
    }
    let href = select::first_attr(fragment, &["a[href*='jk=']".into(), "h2.jobTitle a".into()], "href")?;
    let absolute = if href.starts_with("http") {
        href
    } else {
        format!("{BASE}{href}")
    };
    let parsed = Url::parse(&absolute).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "jk")
        .map(|(_, v)| v.to_string())
}

fn parse_card(fragment: &str, hints: &SiteHints) -> ListingCard {
    let external_id = external_id_from_card(fragment);
    let url = external_id
        .as_ref()
        .map(|jk| format!("{BASE}/viewjob?jk={jk}"));
    ListingCard {
        external_id,
        url,
        title: select::first_text(fragment, &hints.selectors("card_title")).unwrap_or_default(),
        company: select::first_text(fragment, &hints.selectors("card_company"))
            .unwrap_or_default(),
        location: select::first_text(fragment, &hints.selectors("card_location"))
            .unwrap_or_default(),
        easy_apply: fragment.contains("Easily apply") || fragment.contains("indeedApply"),
    }
}

/// Question inputs in the Indeed Apply flow, paired label-to-input like the
/// LinkedIn modal but with Indeed's id conventions.
fn parse_apply_fields(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let Ok(label_sel) = Selector::parse("label[for]") else {
        return Vec::new();
    };
    let mut fields = Vec::new();
    for label in doc.select(&label_sel) {
        let Some(target) = label.value().attr("for") else { continue };
        let question = select::element_text(label);
        if question.is_empty() {
            continue;
        }
        let escaped = target.replace('\\', "\\\\").replace('"', "\\\"");
        let selector = format!(
            "input[id=\"{escaped}\"]:not([type=hidden]), textarea[id=\"{escaped}\"]"
        );
        let Ok(sel) = Selector::parse(&selector) else { continue };
        if doc.select(&sel).next().is_some() {
            fields.push((question, selector));
        }
    }
    fields
}

#[async_trait]
impl PlatformAdapter for IndeedAdapter {
    fn platform(&self) -> Platform {
        Platform::Indeed
    }

    async fn is_authenticated(&self) -> Result<bool> {
        let url = self.driver.current_url().await.unwrap_or_default();
        if !url.contains("indeed.com") {
            self.driver.goto(BASE).await?;
        }
        let html = self.driver.content().await?;
        Ok(select::exists_any(&html, &self.selectors("auth_marker")))
    }

    async fn navigate_to_login(&self) -> Result<()> {
        self.driver
            .goto("https://secure.indeed.com/account/login")
            .await
    }

    fn build_search_url(&self, profile: &SearchProfile, page: u32) -> Result<String> {
        let mut url = Url::parse(&format!("{BASE}/jobs")).context("indeed search base url")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &profile.keywords.join(" "));
            if let Some(location) = profile.locations.first() {
                query.append_pair("l", location);
            }
            if let Some(days) = profile.date_posted_days {
                query.append_pair("fromage", &days.to_string());
            }
            if let Some(jt) = profile.job_types.iter().find_map(|t| job_type_param(t)) {
                query.append_pair("jt", jt);
            }
            if page > 0 {
                query.append_pair("start", &(page * RESULTS_PER_PAGE).to_string());
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
            "job result card container on a search results page",
            |sels| {
                let found = select::fragments(&html, sels);
                (!found.is_empty()).then_some(found)
            },
        )
        .await;

        let Some(fragments) = fragments else {
            debug!("no listing cards matched on indeed results page");
            return Ok(Vec::new());
        };

        let hints = self.hints.lock().expect("hints lock poisoned").clone();
        let cards: Vec<ListingCard> = fragments
            .iter()
            .map(|f| parse_card(f, &hints))
            .filter(|c| !c.title.is_empty() || c.external_id.is_some())
            .collect();
        info!("indeed: {} listing cards extracted", cards.len());
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
            "job title heading on a job detail page",
            |sels| select::first_text(&html, sels),
        )
        .await;

        let desc_selectors = self.selectors("detail_description");
        let description = extract_with_healing(
            &self.healer,
            site,
            &html,
            &desc_selectors,
            "full job description body on a job detail page",
            |sels| select::first_text(&html, sels),
        )
        .await
        .or_else(|| select::largest_text_block(&html))
        .unwrap_or_default();

        let salary = select::first_text(&html, &self.selectors("detail_salary"));
        let easy_apply = select::exists_any(&html, &self.selectors("easy_apply_button"));

        Ok(JobDetails {
            title,
            description,
            salary,
            easy_apply: Some(easy_apply),
        })
    }

    async fn apply_to_job(
        &self,
        job: &JobListing,
        request: &ApplyRequest,
        session: &ApplySession,
    ) -> Result<ApplicationResult> {
        if !job.easy_apply {
            return Ok(ApplicationResult::manual(
                "application redirects to an external employer site",
            ));
        }

        session.report("opening job page");
        self.driver.goto(&job.url).await?;

        let apply_selectors = self.selectors("easy_apply_button");
        let Some(apply_button) = first_present(&*self.driver, &apply_selectors).await? else {
            return Ok(ApplicationResult::manual(
                "Indeed Apply button not found on the job page",
            ));
        };
        self.driver.click(&apply_button).await?;

        // The native flow navigates to smartapply.indeed.com.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let flow_url = self.driver.current_url().await?;
        if !flow_url.contains("indeed.com") {
            return Ok(ApplicationResult::manual(
                "apply button left indeed.com; external application",
            ));
        }

        let mut answers_used: HashMap<String, String> = HashMap::new();
        let done_selectors = self.selectors("apply_done");
        let continue_selectors = self.selectors("apply_continue");

        for step in 0..MAX_APPLY_STEPS {
            session.report(format!("application step {}", step + 1));
            let html = self.driver.content().await?;

            if select::exists_any(&html, &done_selectors) {
                info!("indeed: application submitted for {}", job.external_id);
                return Ok(ApplicationResult {
                    success: true,
                    answers_used,
                    cover_letter: None,
                    needs_manual_intervention: false,
                    reason: None,
                });
            }

            for (question, input_selector) in parse_apply_fields(&html) {
                if answers_used.contains_key(&question) {
                    continue;
                }
                match resolve_answer(&question, request, session).await {
                    Some(answer) => {
                        self.driver.type_text(&input_selector, &answer).await?;
                        answers_used.insert(question, answer);
                    }
                    None => warn!("indeed: no answer for '{}', leaving blank", question),
                }
            }

            let Some(next) = first_present(&*self.driver, &continue_selectors).await? else {
                return Ok(ApplicationResult {
                    success: false,
                    answers_used,
                    cover_letter: None,
                    needs_manual_intervention: true,
                    reason: Some("no way to advance the apply flow".to_string()),
                });
            };
            self.driver.click(&next).await?;
            tokio::time::sleep(Duration::from_millis(800)).await;
        }

        Ok(ApplicationResult {
            success: false,
            answers_used,
            cover_letter: None,
            needs_manual_intervention: true,
            reason: Some(format!(
                "application did not complete within {MAX_APPLY_STEPS} steps"
            )),
        })
    }

    fn hints(&self) -> SiteHints {
        self.hints.lock().expect("hints lock poisoned").clone()
    }

    fn update_hints(&self, hints: SiteHints) {
        let mut guard = self.hints.lock().expect("hints lock poisoned");
        *guard = hints;
        if let Some(dir) = &self.hints_dir {
            if let Err(e) = guard.save(dir) {
                warn!("failed to persist indeed hints: {}", e);
            }
        }
    }
}
