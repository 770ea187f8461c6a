//! LinkedIn adapter: search extraction plus the Easy Apply flow.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::PageDriver;
use crate::core::types::{
    ApplicationResult, JobDetails, JobListing, ListingCard, Platform, SearchProfile,
};
use crate::healing::SelectorHealer;

use super::{
    extract_with_healing, hints::SiteHints, resolve_answer, select, ApplyRequest, ApplySession,
    PlatformAdapter,
};

const BASE: &str = "https://www.linkedin.com";
const RESULTS_PER_PAGE: u32 = 25;
const MAX_APPLY_STEPS: usize = 10;

pub struct LinkedinAdapter {
    driver: Arc<dyn PageDriver>,
    healer: Arc<SelectorHealer>,
    hints: Mutex<SiteHints>,
    hints_dir: Option<PathBuf>,
}

impl LinkedinAdapter {
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
        Platform::Linkedin.as_str()
    }
}

/// Map a profile job-type string to LinkedIn's `f_JT` code.
fn job_type_code(job_type: &str) -> Option<&'static str> {
    match job_type.to_lowercase().replace([' ', '_'], "-").as_str() {
        "full-time" => Some("F"),
        "part-time" => Some("P"),
        "contract" => Some("C"),
        "temporary" => Some("T"),
        "internship" => Some("I"),
        _ => None,
    }
}

static JOB_VIEW_ID_RE: OnceLock<Regex> = OnceLock::new();

fn job_view_id_re() -> &'static Regex {
    JOB_VIEW_ID_RE.get_or_init(|| Regex::new(r"/jobs/view/(\d+)").expect("valid job id pattern"))
}

fn external_id_from_card(fragment: &str) -> Option<String> {
    for attr in ["data-job-id", "data-occludable-job-id"] {
        if let Some(id) = select::first_attr(fragment, &[format!("[{attr}]")], attr) {
            return Some(id);
        }
    }
    let href = select::first_attr(fragment, &["a[href*='/jobs/view/']".into()], "href")?;
    job_view_id_re().captures(&href).map(|c| c[1].to_string())
}

fn absolutize(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{BASE}{href}")
    }
}

fn parse_card(fragment: &str, hints: &SiteHints) -> ListingCard {
    let external_id = external_id_from_card(fragment);
    let url = external_id
        .as_ref()
        .map(|id| format!("{BASE}/jobs/view/{id}/"))
        .or_else(|| {
            select::first_attr(fragment, &["a[href*='/jobs/view/']".into()], "href")
                .map(|h| absolutize(&h))
        });
    ListingCard {
        external_id,
        url,
        title: select::first_text(fragment, &hints.selectors("card_title")).unwrap_or_default(),
        company: select::first_text(fragment, &hints.selectors("card_company"))
            .unwrap_or_default(),
        location: select::first_text(fragment, &hints.selectors("card_location"))
            .unwrap_or_default(),
        easy_apply: fragment.contains("Easy Apply"),
    }
}

/// A fillable field in the Easy Apply modal: the question label plus a
/// selector addressing its input.
#[derive(Debug, PartialEq)]
struct FormField {
    question: String,
    input_selector: String,
}

/// Labels in the modal reference their input by `for=`; anything without a
/// usable label/input pairing is skipped rather than guessed at.
fn parse_form_fields(html: &str) -> Vec<FormField> {
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
        let input_selector = format!(
            "input[id=\"{escaped}\"]:not([type=hidden]), textarea[id=\"{escaped}\"]"
        );
        let Ok(sel) = Selector::parse(&input_selector) else { continue };
        if doc.select(&sel).next().is_some() {
            fields.push(FormField {
                question,
                input_selector,
            });
        }
    }
    fields
}

#[async_trait]
impl PlatformAdapter for LinkedinAdapter {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    async fn is_authenticated(&self) -> Result<bool> {
        let url = self.driver.current_url().await.unwrap_or_default();
        if !url.contains("linkedin.com") {
            self.driver.goto(&format!("{BASE}/feed/")).await?;
        }
        let url = self.driver.current_url().await?;
        if url.contains("/login") || url.contains("/authwall") || url.contains("/checkpoint") {
            return Ok(false);
        }
        let html = self.driver.content().await?;
        Ok(select::exists_any(&html, &self.selectors("auth_marker")))
    }

    async fn navigate_to_login(&self) -> Result<()> {
        self.driver.goto(&format!("{BASE}/login")).await
    }

    fn build_search_url(&self, profile: &SearchProfile, page: u32) -> Result<String> {
        let mut url = Url::parse(&format!("{BASE}/jobs/search/"))
            .context("linkedin search base url")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("keywords", &profile.keywords.join(" "));
            if let Some(location) = profile.locations.first() {
                query.append_pair("location", location);
            }
            if let Some(days) = profile.date_posted_days {
                query.append_pair("f_TPR", &format!("r{}", u64::from(days) * 86_400));
            }
            let codes: Vec<&str> = profile
                .job_types
                .iter()
                .filter_map(|t| job_type_code(t))
                .collect();
            if !codes.is_empty() {
                query.append_pair("f_JT", &codes.join(","));
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
            "job listing card container on a search results page",
            |sels| {
                let found = select::fragments(&html, sels);
                (!found.is_empty()).then_some(found)
            },
        )
        .await;

        let Some(fragments) = fragments else {
            debug!("no listing cards matched on linkedin results page");
            return Ok(Vec::new());
        };

        let hints = self.hints.lock().expect("hints lock poisoned").clone();
        let cards: Vec<ListingCard> = fragments
            .iter()
            .map(|f| parse_card(f, &hints))
            .filter(|c| !c.title.is_empty() || c.external_id.is_some())
            .collect();
        info!("linkedin: {} listing cards extracted", cards.len());
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
                "listing has no Easy Apply flow; apply on the employer site",
            ));
        }

        session.report("opening job page");
        self.driver.goto(&job.url).await?;

        let apply_selectors = self.selectors("easy_apply_button");
        let Some(apply_button) = first_present(&*self.driver, &apply_selectors).await? else {
            return Ok(ApplicationResult::manual(
                "Easy Apply button not found; the flow may have changed",
            ));
        };
        self.driver.click(&apply_button).await?;

        let modal_selectors = self.selectors("apply_modal");
        let mut modal_open = false;
        for sel in &modal_selectors {
            if self.driver.wait_for(sel, Duration::from_secs(10)).await? {
                modal_open = true;
                break;
            }
        }
        if !modal_open {
            return Ok(ApplicationResult::manual("apply dialog never opened"));
        }

        let mut answers_used: HashMap<String, String> = HashMap::new();
        let done_selectors = self.selectors("apply_done");
        let next_selectors = self.selectors("apply_next");

        for step in 0..MAX_APPLY_STEPS {
            session.report(format!("application step {}", step + 1));
            let html = self.driver.content().await?;

            if select::exists_any(&html, &done_selectors) {
                info!("linkedin: application submitted for {}", job.external_id);
                return Ok(ApplicationResult {
                    success: true,
                    answers_used,
                    cover_letter: None,
                    needs_manual_intervention: false,
                    reason: None,
                });
            }

            for field in parse_form_fields(&html) {
                if answers_used.contains_key(&field.question) {
                    continue;
                }
                match resolve_answer(&field.question, request, session).await {
                    Some(answer) => {
                        self.driver.type_text(&field.input_selector, &answer).await?;
                        answers_used.insert(field.question, answer);
                    }
                    None => {
                        warn!("linkedin: no answer for '{}', leaving blank", field.question);
                    }
                }
            }

            let Some(next) = first_present(&*self.driver, &next_selectors).await? else {
                return Ok(ApplicationResult {
                    success: false,
                    answers_used,
                    cover_letter: None,
                    needs_manual_intervention: true,
                    reason: Some("no way to advance the apply dialog".to_string()),
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
                warn!("failed to persist linkedin hints: {}", e);
            }
        }
    }
}

/// First selector in the list that currently matches an element.
pub(crate) async fn first_present(
    driver: &dyn PageDriver,
    selectors: &[String],
) -> Result<Option<String>> {
    for sel in selectors {
        if driver.exists(sel).await? {
            return Ok(Some(sel.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn profile() -> SearchProfile {
        SearchProfile {
            id: "p1".into(),
            name: "rust remote".into(),
            enabled: true,
            platform: Platform::Linkedin,
            keywords: vec!["rust".into(), "backend".into()],
            locations: vec!["Berlin".into()],
            date_posted_days: Some(7),
            job_types: vec!["Full Time".into(), "contract".into()],
            exclude_terms: vec![],
            default_answers: Map::new(),
            resume_path: None,
        }
    }

    fn adapter() -> LinkedinAdapter {
        let driver: Arc<dyn PageDriver> = Arc::new(super::super::testutil::NoopDriver);
        LinkedinAdapter::new(
            driver,
            Arc::new(SelectorHealer::new(
                crate::healing::cache::RepairCache::ephemeral(),
                None,
            )),
            SiteHints::defaults_for(Platform::Linkedin),
            None,
        )
    }

    #[test]
    fn search_url_encodes_filters_and_pagination() {
        let url = adapter().build_search_url(&profile(), 2).unwrap();
        assert!(url.starts_with("https://www.linkedin.com/jobs/search/?"));
        assert!(url.contains("keywords=rust+backend"));
        assert!(url.contains("location=Berlin"));
        assert!(url.contains("f_TPR=r604800"));
        assert!(url.contains("f_JT=F%2CC"));
        assert!(url.contains("start=50"));
    }

    #[test]
    fn first_page_has_no_start_param() {
        let url = adapter().build_search_url(&profile(), 0).unwrap();
        assert!(!url.contains("start="));
    }

    #[test]
    fn card_parsing_reads_id_title_and_easy_apply() {
        let fragment = r#"
            <div class="job-card-container" data-job-id="3941">
              <a class="job-card-list__title" href="/jobs/view/3941/">Senior Rust Engineer</a>
              <span class="job-card-container__primary-description">Acme GmbH</span>
              <li class="job-card-container__metadata-item">Berlin, Germany</li>
              <span>Easy Apply</span>
            </div>"#;
        let card = parse_card(fragment, &SiteHints::defaults_for(Platform::Linkedin));
        assert_eq!(card.external_id.as_deref(), Some("3941"));
        assert_eq!(card.url.as_deref(), Some("https://www.linkedin.com/jobs/view/3941/"));
        assert_eq!(card.title, "Senior Rust Engineer");
        assert_eq!(card.company, "Acme GmbH");
        assert!(card.easy_apply);
    }

    #[test]
    fn external_id_falls_back_to_href() {
        let fragment = r#"<li><a href="https://www.linkedin.com/jobs/view/777/?ref=x">J</a></li>"#;
        assert_eq!(external_id_from_card(fragment).as_deref(), Some("777"));
    }

    #[test]
    fn href_id_extraction_holds_across_repeated_cards() {
        for id in ["101", "202", "303"] {
            let fragment = format!(r#"<li><a href="/jobs/view/{id}/">J</a></li>"#);
            assert_eq!(external_id_from_card(&fragment).as_deref(), Some(id));
        }
    }

    #[test]
    fn form_fields_pair_labels_with_inputs() {
        let html = r#"
            <div class="jobs-easy-apply-modal">
              <label for="q-years">Years of experience with Rust</label>
              <input id="q-years" type="text"/>
              <label for="q-hidden">tracking</label>
              <input id="q-hidden" type="hidden"/>
              <label for="q-missing">Orphaned</label>
            </div>"#;
        let fields = parse_form_fields(html);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].question, "Years of experience with Rust");
    }
}
