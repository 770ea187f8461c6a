//! End-to-end runner scenarios against scripted adapters and an in-memory
//! store. Paused-clock tests: every delay and poll auto-advances.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use applywright::browser::PageDriver;
use applywright::core::types::{
    ApplicationResult, AutomationEvent, GeneratedAnswer, JobAnalysis, JobDetails, JobListing,
    JobStatus, ListingCard, RunState, SearchProfile,
};
use applywright::healing::{cache::RepairCache, SelectorHealer};
use applywright::platforms::{
    ApplyRequest, ApplySession, PlatformAdapter, SiteHints,
};
use applywright::runner::{AutomationRunner, RunnerDeps};
use applywright::services::{
    AnalysisService, AnswerService, EventSink, JobStore, LogNotifier, MemoryJobStore,
    SettingsStore,
};
use applywright::{EngineConfig, Platform};

struct StubDriver;

#[async_trait]
impl PageDriver for StubDriver {
    async fn goto(&self, _url: &str) -> Result<()> {
        Ok(())
    }
    async fn current_url(&self) -> Result<String> {
        Ok("https://example.test/".to_string())
    }
    async fn content(&self) -> Result<String> {
        Ok("<html></html>".to_string())
    }
    async fn exists(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }
    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(false)
    }
    async fn click(&self, _selector: &str) -> Result<()> {
        Ok(())
    }
    async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!(0))
    }
}

#[derive(Clone)]
struct ScriptedAdapter {
    platform: Platform,
    pages: Arc<Mutex<VecDeque<Vec<ListingCard>>>>,
    detail_calls: Arc<AtomicUsize>,
    apply_calls: Arc<AtomicUsize>,
    fail_applies: bool,
    ask_question: bool,
    authenticated: bool,
}

impl ScriptedAdapter {
    fn new(platform: Platform, pages: Vec<Vec<ListingCard>>) -> Self {
        Self {
            platform,
            pages: Arc::new(Mutex::new(pages.into_iter().collect())),
            detail_calls: Arc::new(AtomicUsize::new(0)),
            apply_calls: Arc::new(AtomicUsize::new(0)),
            fail_applies: false,
            ask_question: false,
            authenticated: true,
        }
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }
    async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.authenticated)
    }
    async fn navigate_to_login(&self) -> Result<()> {
        Ok(())
    }
    fn build_search_url(&self, _profile: &SearchProfile, page: u32) -> Result<String> {
        Ok(format!("https://example.test/search?page={page}"))
    }
    async fn extract_listings(&self) -> Result<Vec<ListingCard>> {
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
    async fn extract_job_details(&self, url: &str) -> Result<JobDetails> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(JobDetails {
            title: None,
            description: format!("description for {url}"),
            salary: None,
            easy_apply: Some(true),
        })
    }
    async fn apply_to_job(
        &self,
        _job: &JobListing,
        request: &ApplyRequest,
        session: &ApplySession,
    ) -> Result<ApplicationResult> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_applies {
            anyhow::bail!("submit button missing");
        }
        let mut answers = request.default_answers.clone();
        if self.ask_question {
            if let Some(answer) = session.ask("Years of Rust experience?").await {
                answers.insert("Years of Rust experience?".to_string(), answer);
            }
        }
        Ok(ApplicationResult {
            success: true,
            answers_used: answers,
            cover_letter: None,
            needs_manual_intervention: false,
            reason: None,
        })
    }
    fn hints(&self) -> SiteHints {
        SiteHints::defaults_for(self.platform)
    }
    fn update_hints(&self, _hints: SiteHints) {}
}

struct FlagSettings(bool);

#[async_trait]
impl SettingsStore for FlagSettings {
    async fn applications_disabled(&self) -> bool {
        self.0
    }
}

struct FixedAnalysis(f64);

#[async_trait]
impl AnalysisService for FixedAnalysis {
    async fn analyze(&self, _job: &JobListing, _profile: &SearchProfile) -> Result<JobAnalysis> {
        Ok(JobAnalysis {
            match_score: self.0,
            reasoning: "fits the stack".to_string(),
            summary: "backend role".to_string(),
            highlights: vec!["rust".to_string()],
            red_flags: vec![],
        })
    }
}

struct CannedAnswers;

#[async_trait]
impl AnswerService for CannedAnswers {
    async fn draft_answer(&self, _question: &str, _job: &JobListing) -> Result<GeneratedAnswer> {
        Ok(GeneratedAnswer {
            answer: "5".to_string(),
            confidence: 0.9,
            needs_review: false,
        })
    }
}

fn card(id: &str, title: &str) -> ListingCard {
    ListingCard {
        external_id: Some(id.to_string()),
        url: Some(format!("https://example.test/jobs/{id}")),
        title: title.to_string(),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        easy_apply: true,
    }
}

fn profile(platform: Platform) -> SearchProfile {
    SearchProfile {
        id: "p1".to_string(),
        name: "rust backend".to_string(),
        enabled: true,
        platform,
        keywords: vec!["rust".to_string()],
        locations: vec!["Remote".to_string()],
        date_posted_days: None,
        job_types: vec![],
        exclude_terms: vec![],
        default_answers: HashMap::new(),
        resume_path: Some("/resumes/dev.pdf".to_string()),
    }
}

fn approved_job(n: usize, platform: Platform) -> JobListing {
    JobListing {
        id: format!("job-{n}"),
        external_id: format!("ext-{n}"),
        platform,
        profile_id: "p1".to_string(),
        url: format!("https://example.test/jobs/ext-{n}"),
        title: format!("Engineer {n}"),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        description: "desc".to_string(),
        salary: None,
        easy_apply: true,
        status: JobStatus::Approved,
        analysis: None,
        submitted_answers: None,
        resume_used: None,
        error_reason: None,
        created_at: Utc::now(),
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        listing_delay_ms: (0, 0),
        application_delay_ms: (0, 0),
        ..EngineConfig::default()
    }
}

struct RunnerSetup {
    store: Arc<MemoryJobStore>,
    analysis: Option<Arc<dyn AnalysisService>>,
    answers: Option<Arc<dyn AnswerService>>,
    applications_disabled: bool,
    events: EventSink,
    config: EngineConfig,
}

impl RunnerSetup {
    fn defaults(store: Arc<MemoryJobStore>) -> Self {
        Self {
            store,
            analysis: None,
            answers: None,
            applications_disabled: false,
            events: EventSink::null(),
            config: fast_config(),
        }
    }

    fn build(self, adapter: ScriptedAdapter) -> AutomationRunner {
        AutomationRunner::new(RunnerDeps {
            driver: Arc::new(StubDriver),
            store: self.store,
            healer: Arc::new(SelectorHealer::new(RepairCache::ephemeral(), None)),
            analysis: self.analysis,
            answers: self.answers,
            notifier: Arc::new(LogNotifier),
            settings: Arc::new(FlagSettings(self.applications_disabled)),
            events: self.events,
            config: self.config,
        })
        .with_adapter_factory(Box::new(move |_| Box::new(adapter.clone())))
    }
}

#[tokio::test(start_paused = true)]
async fn two_pages_with_cross_page_duplicate_yield_seven_jobs() {
    let pages = vec![
        vec![
            card("1", "Engineer One"),
            card("2", "Engineer Two"),
            card("3", "Engineer Three"),
            card("4", "Engineer Four"),
            card("5", "Engineer Five"),
        ],
        vec![
            // Same posting surfaces again at the top of page two.
            card("5", "Engineer Five"),
            card("6", "Engineer Six"),
            card("7", "Engineer Seven"),
        ],
    ];
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    let adapter = ScriptedAdapter::new(Platform::Linkedin, pages);
    let (events, mut event_rx) = EventSink::channel();

    let mut setup = RunnerSetup::defaults(store.clone());
    setup.events = events;
    let runner = setup.build(adapter.clone());

    runner.run_profile("p1").await.unwrap();

    let status = runner.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.jobs_extracted, 7);
    assert_eq!(store.job_count(), 7);
    assert_eq!(adapter.detail_calls.load(Ordering::SeqCst), 7);
    assert!(status.errors.is_empty(), "errors: {:?}", status.errors);

    let mut new_job_events = 0;
    while let Ok(event) = event_rx.try_recv() {
        if matches!(event, AutomationEvent::NewJob { .. }) {
            new_job_events += 1;
        }
    }
    assert_eq!(new_job_events, 7);
}

#[tokio::test(start_paused = true)]
async fn analysis_moves_jobs_to_reviewed() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Indeed)]));
    let adapter = ScriptedAdapter::new(
        Platform::Indeed,
        vec![vec![card("a", "Engineer A"), card("b", "Engineer B")]],
    );
    let mut setup = RunnerSetup::defaults(store.clone());
    setup.analysis = Some(Arc::new(FixedAnalysis(0.9)));
    let runner = setup.build(adapter);

    runner.run_profile("p1").await.unwrap();

    let status = runner.status();
    assert_eq!(status.jobs_analyzed, 2);
    let reviewed = store
        .list_jobs_for_profile("p1", JobStatus::Reviewed)
        .await
        .unwrap();
    assert_eq!(reviewed.len(), 2);
    assert!(reviewed.iter().all(|j| j.analysis.is_some()));
}

#[tokio::test(start_paused = true)]
async fn missing_profile_ends_in_error_state() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    let adapter = ScriptedAdapter::new(Platform::Linkedin, vec![vec![card("1", "Engineer One")]]);
    let runner = RunnerSetup::defaults(store).build(adapter);

    let err = runner.run_profile("nope").await.unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert_eq!(runner.status().state, RunState::Error);

    // Error is not sticky: the next run on the same runner proceeds.
    runner.run_profile("p1").await.unwrap();
    assert_eq!(runner.status().state, RunState::Idle);
    assert_eq!(runner.status().jobs_extracted, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_applicator_trips_breaker_and_aborts_batch() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    for n in 0..5 {
        store.insert_job(approved_job(n, Platform::Linkedin)).await.unwrap();
    }
    let mut adapter = ScriptedAdapter::new(Platform::Linkedin, vec![]);
    adapter.fail_applies = true;
    let runner = RunnerSetup::defaults(store.clone()).build(adapter.clone());

    runner.apply_to_approved(None).await.unwrap();

    // Three failures open the circuit; the fourth attempt is refused and
    // the batch is abandoned with a single summary error.
    assert_eq!(adapter.apply_calls.load(Ordering::SeqCst), 3);
    let status = runner.status();
    assert_eq!(status.state, RunState::Idle);
    assert_eq!(status.jobs_applied, 0);
    let summary_errors: Vec<_> = status
        .errors
        .iter()
        .filter(|e| e.contains("halted"))
        .collect();
    assert_eq!(summary_errors.len(), 1, "errors: {:?}", status.errors);

    // Jobs never attempted stay approved.
    let still_approved = store.list_jobs(JobStatus::Approved, None).await.unwrap();
    assert_eq!(still_approved.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn successful_apply_records_answers_and_resume() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    store.insert_job(approved_job(1, Platform::Linkedin)).await.unwrap();

    let mut adapter = ScriptedAdapter::new(Platform::Linkedin, vec![]);
    adapter.ask_question = true;
    let mut setup = RunnerSetup::defaults(store.clone());
    setup.answers = Some(Arc::new(CannedAnswers));
    let runner = setup.build(adapter.clone());

    runner.apply_to_approved(Some(Platform::Linkedin)).await.unwrap();

    assert_eq!(runner.status().jobs_applied, 1);
    let applied = store.list_jobs(JobStatus::Applied, None).await.unwrap();
    assert_eq!(applied.len(), 1);
    let answers = applied[0].submitted_answers.as_ref().unwrap();
    assert_eq!(
        answers.get("Years of Rust experience?").map(String::as_str),
        Some("5")
    );
    assert_eq!(applied[0].resume_used.as_deref(), Some("/resumes/dev.pdf"));
}

#[tokio::test(start_paused = true)]
async fn user_answer_resolves_a_parked_question() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    store.insert_job(approved_job(1, Platform::Linkedin)).await.unwrap();

    let mut adapter = ScriptedAdapter::new(Platform::Linkedin, vec![]);
    adapter.ask_question = true;
    let (events, mut event_rx) = EventSink::channel();
    let mut setup = RunnerSetup::defaults(store.clone());
    setup.events = events;
    // No answer service: the question must wait for the user.
    let runner = Arc::new(setup.build(adapter));

    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.apply_to_approved(None).await })
    };

    let mut asked_job = None;
    let mut spins = 0;
    while asked_job.is_none() {
        while let Ok(event) = event_rx.try_recv() {
            if let AutomationEvent::PauseQuestion { job_id, prompt } = event {
                assert_eq!(prompt, "Years of Rust experience?");
                asked_job = Some(job_id);
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        spins += 1;
        assert!(spins < 10_000, "question never surfaced");
    }
    let job_id = asked_job.unwrap();
    assert!(runner.answer_question(&job_id, Some("7".to_string())));
    // Each question is delivered once.
    assert!(!runner.answer_question(&job_id, Some("8".to_string())));

    handle.await.unwrap().unwrap();
    let applied = store.list_jobs(JobStatus::Applied, None).await.unwrap();
    assert_eq!(applied.len(), 1);
    let answers = applied[0].submitted_answers.as_ref().unwrap();
    assert_eq!(
        answers.get("Years of Rust experience?").map(String::as_str),
        Some("7")
    );
}

#[tokio::test(start_paused = true)]
async fn unanswered_question_times_out_to_a_null_answer() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    store.insert_job(approved_job(1, Platform::Linkedin)).await.unwrap();

    let mut adapter = ScriptedAdapter::new(Platform::Linkedin, vec![]);
    adapter.ask_question = true;
    let runner = RunnerSetup::defaults(store.clone()).build(adapter);

    let started = tokio::time::Instant::now();
    runner.apply_to_approved(None).await.unwrap();
    assert!(
        started.elapsed() >= EngineConfig::default().question_timeout,
        "question resolved before its timeout"
    );

    // The flow degraded instead of hanging: the application went through
    // with no answer recorded for the question.
    let applied = store.list_jobs(JobStatus::Applied, None).await.unwrap();
    assert_eq!(applied.len(), 1);
    let no_answer = applied[0]
        .submitted_answers
        .as_ref()
        .is_none_or(|a| !a.contains_key("Years of Rust experience?"));
    assert!(no_answer);
}

#[tokio::test(start_paused = true)]
async fn login_never_completing_ends_the_run_in_error() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    let mut adapter =
        ScriptedAdapter::new(Platform::Linkedin, vec![vec![card("1", "Engineer One")]]);
    adapter.authenticated = false;
    let runner = RunnerSetup::defaults(store.clone()).build(adapter);

    let started = tokio::time::Instant::now();
    let err = runner.run_profile("p1").await.unwrap_err();
    assert!(
        started.elapsed() >= EngineConfig::default().login_timeout,
        "gave up before the login deadline"
    );
    assert!(err.to_string().contains("login not completed"), "err: {err}");

    let status = runner.status();
    assert_eq!(status.state, RunState::Error);
    assert!(status.errors.iter().any(|e| e.contains("login not completed")));
    assert_eq!(store.job_count(), 0, "nothing extracted without a session");
}

#[tokio::test(start_paused = true)]
async fn disabled_applications_are_a_noop() {
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    store.insert_job(approved_job(1, Platform::Linkedin)).await.unwrap();

    let adapter = ScriptedAdapter::new(Platform::Linkedin, vec![]);
    let mut setup = RunnerSetup::defaults(store.clone());
    setup.applications_disabled = true;
    let runner = setup.build(adapter.clone());

    runner.apply_to_approved(None).await.unwrap();

    assert_eq!(adapter.apply_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.list_jobs(JobStatus::Approved, None).await.unwrap().len(), 1);
    assert_eq!(runner.status().state, RunState::Idle);
}

#[tokio::test(start_paused = true)]
async fn pause_halts_within_one_iteration_and_stop_returns_to_idle() {
    let many: Vec<ListingCard> = (0..40)
        .map(|n| card(&format!("id-{n}"), &format!("Engineer Number {n}")))
        .collect();
    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Linkedin)]));
    let adapter = ScriptedAdapter::new(Platform::Linkedin, vec![many]);
    // A fixed one-second gap between listings so the paused clock leaves
    // room to interleave control calls with the extraction loop.
    let mut setup = RunnerSetup::defaults(store.clone());
    setup.config.listing_delay_ms = (1_000, 1_000);
    let runner = Arc::new(setup.build(adapter));

    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_profile("p1").await })
    };

    // Let a couple of listings land, then pause.
    let mut spins = 0;
    while runner.status().jobs_extracted < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        spins += 1;
        assert!(spins < 10_000, "extraction never started");
    }
    runner.pause();

    let mut spins = 0;
    while runner.status().state != RunState::Paused {
        tokio::time::sleep(Duration::from_millis(10)).await;
        spins += 1;
        assert!(spins < 10_000, "runner never reached paused");
    }
    let frozen = runner.status().jobs_extracted;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runner.status().state, RunState::Paused);
    assert_eq!(
        runner.status().jobs_extracted,
        frozen,
        "no progress while paused"
    );

    runner.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(runner.status().state, RunState::Idle);
    // Work done before the pause survives.
    assert_eq!(store.job_count(), frozen);
}

#[tokio::test(start_paused = true)]
async fn card_level_fallback_persists_partial_record() {
    #[derive(Clone)]
    struct FlakyDetails {
        inner: ScriptedAdapter,
        fail_ids: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PlatformAdapter for FlakyDetails {
        fn platform(&self) -> Platform {
            self.inner.platform()
        }
        async fn is_authenticated(&self) -> Result<bool> {
            Ok(true)
        }
        async fn navigate_to_login(&self) -> Result<()> {
            Ok(())
        }
        fn build_search_url(&self, profile: &SearchProfile, page: u32) -> Result<String> {
            self.inner.build_search_url(profile, page)
        }
        async fn extract_listings(&self) -> Result<Vec<ListingCard>> {
            self.inner.extract_listings().await
        }
        async fn extract_job_details(&self, url: &str) -> Result<JobDetails> {
            let failing = self.fail_ids.lock().unwrap().iter().any(|id| url.contains(id.as_str()));
            if failing {
                anyhow::bail!("detail page never loaded");
            }
            self.inner.extract_job_details(url).await
        }
        async fn apply_to_job(
            &self,
            job: &JobListing,
            request: &ApplyRequest,
            session: &ApplySession,
        ) -> Result<ApplicationResult> {
            self.inner.apply_to_job(job, request, session).await
        }
        fn hints(&self) -> SiteHints {
            self.inner.hints()
        }
        fn update_hints(&self, hints: SiteHints) {
            self.inner.update_hints(hints)
        }
    }

    let store = Arc::new(MemoryJobStore::with_profiles(vec![profile(Platform::Indeed)]));
    let inner = ScriptedAdapter::new(
        Platform::Indeed,
        vec![vec![card("ok1", "Engineer Fine"), card("bad", "Engineer Flaky")]],
    );
    let adapter = FlakyDetails {
        inner,
        fail_ids: Arc::new(Mutex::new(vec!["bad".to_string()])),
    };

    let runner = AutomationRunner::new(RunnerDeps {
        driver: Arc::new(StubDriver),
        store: store.clone(),
        healer: Arc::new(SelectorHealer::new(RepairCache::ephemeral(), None)),
        analysis: None,
        answers: None,
        notifier: Arc::new(LogNotifier),
        settings: Arc::new(FlagSettings(false)),
        events: EventSink::null(),
        config: fast_config(),
    })
    .with_adapter_factory(Box::new(move |_| Box::new(adapter.clone())));

    runner.run_profile("p1").await.unwrap();

    // Both listings persisted: one full, one card-only.
    assert_eq!(store.job_count(), 2);
    let partial = store.find_job(Platform::Indeed, "bad").await.unwrap().unwrap();
    assert!(partial.description.is_empty());
    assert!(partial.error_reason.is_some());
    assert_eq!(partial.title, "Engineer Flaky");
    assert_eq!(runner.status().errors.len(), 1);
}
