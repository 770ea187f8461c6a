//! Site adapters.
//!
//! One adapter per supported site, all behind `PlatformAdapter`. Adapters
//! own no browser state beyond a shared `PageDriver` handle; the runner
//! serializes every call against that page.

pub mod hints;
pub mod select;

mod indeed;
mod linkedin;
mod upwork;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::browser::PageDriver;
use crate::core::config::EngineConfig;
use crate::core::types::{
    ApplicationResult, JobDetails, JobListing, ListingCard, Platform, SearchProfile,
};
use crate::healing::SelectorHealer;

pub use hints::SiteHints;
pub use indeed::IndeedAdapter;
pub use linkedin::LinkedinAdapter;
pub use upwork::UpworkAdapter;

/// A screening question the applicator cannot answer from defaults. The
/// reply carries `None` when the question timed out unanswered.
pub struct QuestionRequest {
    pub job_id: String,
    pub prompt: String,
    pub reply: oneshot::Sender<Option<String>>,
}

/// Everything the runner supplies for one apply attempt.
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// Canned answers keyed by a lowercase question fragment.
    pub default_answers: HashMap<String, String>,
    pub resume_path: Option<String>,
}

/// Channel handshake between an applicator and the runner. Progress is
/// fire-and-forget; questions block the flow until answered or timed out.
/// The question channel has capacity one, so at most one question is
/// outstanding at a time.
pub struct ApplySession {
    job_id: String,
    progress: mpsc::UnboundedSender<String>,
    questions: mpsc::Sender<QuestionRequest>,
    question_timeout: Duration,
}

impl ApplySession {
    pub fn new(
        job_id: impl Into<String>,
        progress: mpsc::UnboundedSender<String>,
        questions: mpsc::Sender<QuestionRequest>,
        question_timeout: Duration,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            progress,
            questions,
            question_timeout,
        }
    }

    pub fn report(&self, step: impl Into<String>) {
        let _ = self.progress.send(step.into());
    }

    /// Relay a question to the runner and wait for the answer. Resolves to
    /// `None` when nobody answers within the timeout or the runner is gone,
    /// letting the flow degrade instead of hanging.
    pub async fn ask(&self, prompt: &str) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        let request = QuestionRequest {
            job_id: self.job_id.clone(),
            prompt: prompt.to_string(),
            reply: tx,
        };
        if self.questions.send(request).await.is_err() {
            return None;
        }
        match tokio::time::timeout(self.question_timeout, rx).await {
            Ok(Ok(answer)) => answer,
            _ => {
                debug!("question timed out unanswered: {}", prompt);
                None
            }
        }
    }
}

/// Capability contract every site adapter implements.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn is_authenticated(&self) -> Result<bool>;
    async fn navigate_to_login(&self) -> Result<()>;

    /// Page numbers are zero-based. Pagination is always by URL, never by
    /// clicking a next button.
    fn build_search_url(&self, profile: &SearchProfile, page: u32) -> Result<String>;

    /// Listing cards from the page the driver is currently on.
    async fn extract_listings(&self) -> Result<Vec<ListingCard>>;

    async fn extract_job_details(&self, url: &str) -> Result<JobDetails>;

    async fn apply_to_job(
        &self,
        job: &JobListing,
        request: &ApplyRequest,
        session: &ApplySession,
    ) -> Result<ApplicationResult>;

    fn hints(&self) -> SiteHints;
    fn update_hints(&self, hints: SiteHints);
}

pub fn build_adapter(
    platform: Platform,
    driver: Arc<dyn PageDriver>,
    healer: Arc<SelectorHealer>,
    config: &EngineConfig,
) -> Box<dyn PlatformAdapter> {
    let hints_dir = config.hints_dir.as_ref().map(PathBuf::from);
    let hints = SiteHints::load(platform, hints_dir.as_deref());
    match platform {
        Platform::Linkedin => Box::new(LinkedinAdapter::new(driver, healer, hints, hints_dir)),
        Platform::Indeed => Box::new(IndeedAdapter::new(driver, healer, hints, hints_dir)),
        Platform::Upwork => Box::new(UpworkAdapter::new(driver, healer, hints, hints_dir)),
    }
}

/// Layered extraction: primary selectors, then the persisted repair cache,
/// then a one-shot inference repair whose candidates are validated by
/// actually extracting with them before being recorded.
pub(crate) async fn extract_with_healing<T, F>(
    healer: &SelectorHealer,
    site: &str,
    html: &str,
    selectors: &[String],
    purpose: &str,
    attempt: F,
) -> Option<T>
where
    F: Fn(&[String]) -> Option<T>,
{
    if let Some(found) = attempt(selectors) {
        return Some(found);
    }
    if let Some(cached) = healer.cached_repair(site, selectors) {
        if let Some(found) = attempt(&cached) {
            return Some(found);
        }
        healer.record_failure(site, selectors);
    }
    match healer.repair(site, html, selectors, purpose).await {
        Ok(Some(candidates)) => {
            if let Some(found) = attempt(&candidates) {
                healer.record_success(site, selectors, candidates);
                return Some(found);
            }
            None
        }
        Ok(None) => None,
        Err(e) => {
            debug!("selector repair errored for {}: {}", purpose, e);
            None
        }
    }
}

/// Answer resolution order: profile defaults by fragment match, then the
/// runner via the question channel.
pub(crate) async fn resolve_answer(
    question: &str,
    request: &ApplyRequest,
    session: &ApplySession,
) -> Option<String> {
    let lowered = question.to_lowercase();
    for (fragment, answer) in &request.default_answers {
        if lowered.contains(&fragment.to_lowercase()) {
            return Some(answer.clone());
        }
    }
    session.report(format!("waiting for answer: {question}"));
    session.ask(question).await
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Driver for tests that never touch a browser. Every method errors so
    /// a test exercising only URL building or HTML parsing fails loudly if
    /// it accidentally reaches the page.
    pub struct NoopDriver;

    #[async_trait]
    impl PageDriver for NoopDriver {
        async fn goto(&self, _url: &str) -> Result<()> {
            anyhow::bail!("noop driver")
        }
        async fn current_url(&self) -> Result<String> {
            anyhow::bail!("noop driver")
        }
        async fn content(&self) -> Result<String> {
            anyhow::bail!("noop driver")
        }
        async fn exists(&self, _selector: &str) -> Result<bool> {
            anyhow::bail!("noop driver")
        }
        async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
            anyhow::bail!("noop driver")
        }
        async fn click(&self, _selector: &str) -> Result<()> {
            anyhow::bail!("noop driver")
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
            anyhow::bail!("noop driver")
        }
        async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value> {
            anyhow::bail!("noop driver")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_pair(
        timeout: Duration,
    ) -> (
        ApplySession,
        mpsc::UnboundedReceiver<String>,
        mpsc::Receiver<QuestionRequest>,
    ) {
        let (ptx, prx) = mpsc::unbounded_channel();
        let (qtx, qrx) = mpsc::channel(1);
        (ApplySession::new("job-1", ptx, qtx, timeout), prx, qrx)
    }

    #[tokio::test]
    async fn default_answer_resolves_without_asking() {
        let (session, _prx, mut qrx) = session_pair(Duration::from_secs(1));
        let mut defaults = HashMap::new();
        defaults.insert("years of experience".to_string(), "6".to_string());
        let request = ApplyRequest {
            default_answers: defaults,
            resume_path: None,
        };

        let answer =
            resolve_answer("How many YEARS OF EXPERIENCE do you have?", &request, &session).await;
        assert_eq!(answer.as_deref(), Some("6"));
        assert!(qrx.try_recv().is_err(), "no question should be relayed");
    }

    #[tokio::test]
    async fn unanswered_question_times_out_to_none() {
        let (session, _prx, mut qrx) = session_pair(Duration::from_millis(50));
        let ask = tokio::spawn(async move { session.ask("Visa status?").await });
        let question = qrx.recv().await.expect("question relayed");
        assert_eq!(question.prompt, "Visa status?");
        // Never reply; the ask must resolve to None on its own.
        assert_eq!(ask.await.unwrap(), None);
    }

    #[tokio::test]
    async fn answered_question_round_trips() {
        let (session, _prx, mut qrx) = session_pair(Duration::from_secs(5));
        let ask = tokio::spawn(async move { session.ask("Notice period?").await });
        let question = qrx.recv().await.unwrap();
        question.reply.send(Some("2 weeks".to_string())).unwrap();
        assert_eq!(ask.await.unwrap().as_deref(), Some("2 weeks"));
    }
}
