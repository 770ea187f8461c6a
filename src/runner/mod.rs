//! Automation runner.
//!
//! Owns the engine's state machine and drives everything else: profile
//! iteration, adapter calls (always through the rate limiter and circuit
//! breaker), persistence, post-extraction analysis, and the apply pipeline.
//! One runner drives one browser page; every adapter call it makes is
//! serialized against that page.

pub mod dedup;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::PageDriver;
use crate::core::config::EngineConfig;
use crate::core::errors::AutomationError;
use crate::core::types::{
    AutomationEvent, AutomationStatus, JobDetails, JobListing, JobStatus, ListingCard, Platform,
    RunState, SearchProfile,
};
use crate::healing::SelectorHealer;
use crate::platforms::{build_adapter, ApplyRequest, ApplySession, PlatformAdapter, QuestionRequest};
use crate::resilience::{CircuitBreaker, HumanPacing, RateLimiter};
use crate::services::{AnalysisService, AnswerService, EventSink, JobStore, Notifier, SettingsStore};

use dedup::dedup_title;

type AdapterFactory = Box<dyn Fn(Platform) -> Box<dyn PlatformAdapter> + Send + Sync>;

/// Everything a runner needs, bundled so construction sites stay readable.
pub struct RunnerDeps {
    pub driver: Arc<dyn PageDriver>,
    pub store: Arc<dyn JobStore>,
    pub healer: Arc<SelectorHealer>,
    pub analysis: Option<Arc<dyn AnalysisService>>,
    pub answers: Option<Arc<dyn AnswerService>>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<dyn SettingsStore>,
    pub events: EventSink,
    pub config: EngineConfig,
}

pub struct AutomationRunner {
    driver: Arc<dyn PageDriver>,
    store: Arc<dyn JobStore>,
    analysis: Option<Arc<dyn AnalysisService>>,
    answers: Option<Arc<dyn AnswerService>>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsStore>,
    events: EventSink,
    config: EngineConfig,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    pacing: HumanPacing,
    adapters: AdapterFactory,
    status: Mutex<AutomationStatus>,
    // Questions waiting on a user answer, keyed by job id. At most one per
    // job: the question channel has capacity one.
    pending_questions: Arc<Mutex<HashMap<String, oneshot::Sender<Option<String>>>>>,
    paused: AtomicBool,
    stopping: AtomicBool,
}

impl AutomationRunner {
    pub fn new(deps: RunnerDeps) -> Self {
        let RunnerDeps {
            driver,
            store,
            healer,
            analysis,
            answers,
            notifier,
            settings,
            events,
            config,
        } = deps;

        let factory: AdapterFactory = {
            let driver = driver.clone();
            let config = config.clone();
            Box::new(move |platform| build_adapter(platform, driver.clone(), healer.clone(), &config))
        };

        Self {
            driver,
            store,
            analysis,
            answers,
            notifier,
            settings,
            events,
            limiter: RateLimiter::new(config.actions_per_minute),
            breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown),
            pacing: HumanPacing::new(config.listing_delay_ms, config.application_delay_ms),
            config,
            adapters: factory,
            status: Mutex::new(AutomationStatus::default()),
            pending_questions: Arc::new(Mutex::new(HashMap::new())),
            paused: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Swap the adapter factory. Tests use this to run the full state
    /// machine against scripted adapters.
    pub fn with_adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.adapters = factory;
        self
    }

    // ── state machine ───────────────────────────────────────────────────

    pub fn status(&self) -> AutomationStatus {
        self.status.lock().expect("status lock poisoned").clone()
    }

    pub fn pause(&self) {
        info!("pause requested");
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        info!("resume requested");
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        info!("stop requested");
        self.stopping.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Deliver a user answer to the question currently holding up `job_id`'s
    /// application. Returns `false` when no question is pending for that job
    /// or the applicator already timed out waiting.
    pub fn answer_question(&self, job_id: &str, answer: Option<String>) -> bool {
        let reply = self
            .pending_questions
            .lock()
            .expect("pending questions lock poisoned")
            .remove(job_id);
        match reply {
            Some(tx) => tx.send(answer).is_ok(),
            None => false,
        }
    }

    fn emit_status(&self) {
        let snapshot = self.status();
        self.events.emit(AutomationEvent::Status { status: snapshot });
    }

    fn set_action(&self, action: impl Into<String>) {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            status.current_action = action.into();
        }
        self.emit_status();
    }

    fn push_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            status.errors.push(message);
        }
        self.emit_status();
    }

    /// Enter `running`, resetting per-run counters. Fails when a run is
    /// already in flight; a previous `error` state is not sticky.
    fn begin_run(&self, action: &str) -> Result<(), AutomationError> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            if matches!(status.state, RunState::Running | RunState::Paused) {
                return Err(anyhow!("a run is already in progress").into());
            }
            status.state = RunState::Running;
            status.current_action = action.to_string();
            status.jobs_extracted = 0;
            status.jobs_analyzed = 0;
            status.jobs_applied = 0;
            status.errors.clear();
        }
        self.stopping.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.emit_status();
        Ok(())
    }

    fn finish_run(&self) {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            if status.state != RunState::Error {
                status.state = RunState::Idle;
            }
            status.current_action = "idle".to_string();
        }
        self.emit_status();
    }

    /// Close out a run: normal completion goes back to `idle`, an escaped
    /// error lands in `error` state, is surfaced, and is returned.
    async fn conclude(&self, result: Result<(), AutomationError>) -> Result<(), AutomationError> {
        match result {
            Ok(()) => {
                self.finish_run();
                Ok(())
            }
            Err(e) => {
                error!("run failed: {}", e);
                {
                    let mut status = self.status.lock().expect("status lock poisoned");
                    status.state = RunState::Error;
                    status.current_action = "error".to_string();
                    status.errors.push(e.to_string());
                }
                self.emit_status();
                self.notifier.notify("Automation error", &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Loop-boundary control check. Blocks while paused; returns `false`
    /// once a stop has been requested so callers bail within one iteration.
    async fn checkpoint(&self) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        if self.paused.load(Ordering::SeqCst) {
            {
                let mut status = self.status.lock().expect("status lock poisoned");
                status.state = RunState::Paused;
            }
            self.emit_status();
            while self.paused.load(Ordering::SeqCst) && !self.stopping.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if self.stopping.load(Ordering::SeqCst) {
                return false;
            }
            {
                let mut status = self.status.lock().expect("status lock poisoned");
                status.state = RunState::Running;
            }
            self.emit_status();
        }
        true
    }

    // ── public operations ───────────────────────────────────────────────

    pub async fn run_profile(&self, profile_id: &str) -> Result<(), AutomationError> {
        self.begin_run(&format!("running profile {profile_id}"))?;
        let result = self.run_profile_inner(profile_id).await;
        self.conclude(result).await
    }

    pub async fn run_all_enabled(&self) -> Result<(), AutomationError> {
        self.begin_run("running all enabled profiles")?;
        let result = self.run_all_inner().await;
        self.conclude(result).await
    }

    pub async fn apply_to_approved(
        &self,
        platform: Option<Platform>,
    ) -> Result<(), AutomationError> {
        self.begin_run("applying to approved jobs")?;
        let result = self.apply_inner(platform).await;
        self.conclude(result).await
    }

    pub async fn refetch_descriptions(&self) -> Result<(), AutomationError> {
        self.begin_run("refetching missing descriptions")?;
        let result = self.refetch_inner().await;
        self.conclude(result).await
    }

    // ── extraction ──────────────────────────────────────────────────────

    async fn run_profile_inner(&self, profile_id: &str) -> Result<(), AutomationError> {
        let profile = self
            .store
            .get_profile(profile_id)
            .await?
            .ok_or_else(|| AutomationError::ProfileNotFound(profile_id.to_string()))?;
        self.run_for_profile(&profile).await
    }

    async fn run_all_inner(&self) -> Result<(), AutomationError> {
        let profiles = self.store.list_enabled_profiles().await?;
        info!("running {} enabled profiles", profiles.len());
        for profile in profiles {
            if !self.checkpoint().await {
                break;
            }
            if self.breaker.is_open() {
                info!("circuit open, skipping remaining profiles this run");
                break;
            }
            if let Err(e) = self.run_for_profile(&profile).await {
                // One profile failing must not take the others down.
                self.push_error(format!("profile '{}': {}", profile.name, e));
            }
        }
        Ok(())
    }

    async fn run_for_profile(&self, profile: &SearchProfile) -> Result<(), AutomationError> {
        info!("running profile '{}' on {}", profile.name, profile.platform);
        let adapter = (self.adapters)(profile.platform);

        self.set_action(format!("checking {} login", profile.platform));
        self.ensure_authenticated(adapter.as_ref()).await?;
        if !self.checkpoint().await {
            return Ok(());
        }

        match self.extract_for_profile(adapter.as_ref(), profile).await {
            Ok(()) => {}
            // Already recorded as the run's summary error; whatever was
            // extracted before the trip still gets analyzed.
            Err(e) if e.is_circuit_open() => {}
            Err(e) => return Err(e),
        }

        if !self.checkpoint().await {
            return Ok(());
        }
        self.analyze_new_jobs(profile).await
    }

    /// Poll until the adapter reports an authenticated session. Navigates
    /// to the login page and waits for the user; gives up after the
    /// configured deadline instead of hanging.
    async fn ensure_authenticated(
        &self,
        adapter: &dyn PlatformAdapter,
    ) -> Result<(), AutomationError> {
        if adapter.is_authenticated().await? {
            return Ok(());
        }

        let platform = adapter.platform();
        info!("{} session missing, waiting for manual login", platform);
        adapter.navigate_to_login().await?;
        self.set_action(format!("waiting for {} login", platform));
        self.notifier
            .notify("Login required", &format!("Please log in to {platform} in the automation browser"))
            .await;

        let deadline = tokio::time::Instant::now() + self.config.login_timeout;
        loop {
            tokio::time::sleep(self.config.login_poll_interval).await;
            if !self.checkpoint().await {
                return Ok(());
            }
            if adapter.is_authenticated().await.unwrap_or(false) {
                info!("{} login detected", platform);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::Authentication {
                    platform,
                    reason: format!(
                        "login not completed within {}s",
                        self.config.login_timeout.as_secs()
                    ),
                });
            }
        }
    }

    async fn extract_for_profile(
        &self,
        adapter: &dyn PlatformAdapter,
        profile: &SearchProfile,
    ) -> Result<(), AutomationError> {
        let platform = profile.platform;
        let mut seen: HashSet<String> = HashSet::new();

        'pages: for page in 0..self.config.max_pages_per_profile {
            if !self.checkpoint().await {
                break;
            }

            // Next page by URL, never by clicking a pagination control.
            let url = adapter.build_search_url(profile, page)?;
            self.set_action(format!("loading {} results page {}", platform, page + 1));
            self.limiter.acquire().await;
            self.driver.goto(&url).await?;
            if let Err(e) = self.pacing.simulate_reading(&*self.driver).await {
                debug!("reading simulation skipped: {}", e);
            }

            let cards = match adapter.extract_listings().await {
                Ok(cards) => cards,
                Err(e) => {
                    self.push_error(format!("{platform} page {}: {}", page + 1, e));
                    break;
                }
            };
            if cards.is_empty() {
                info!("{} page {} returned no listings, stopping", platform, page + 1);
                break;
            }

            for card in cards {
                if !self.checkpoint().await {
                    break 'pages;
                }
                let Some(external_id) = card.external_id.clone() else {
                    continue;
                };
                let title = dedup_title(&card.title);
                if is_excluded(&title, &profile.exclude_terms) {
                    debug!("'{}' dropped by exclusion term", title);
                    continue;
                }
                if !seen.insert(external_id.clone()) {
                    continue;
                }
                if self.store.find_job(platform, &external_id).await?.is_some() {
                    continue;
                }
                let Some(url) = card.url.clone() else {
                    continue;
                };

                self.set_action(format!("extracting '{title}'"));
                self.limiter.acquire().await;
                let details = self
                    .breaker
                    .execute(|| adapter.extract_job_details(&url))
                    .await;

                let job = match details {
                    Ok(details) => {
                        self.build_listing(profile, &card, &external_id, &url, Some(details))
                    }
                    Err(e) if e.is_circuit_open() => {
                        self.push_error(format!("{platform} extraction halted: {e}"));
                        self.notifier
                            .notify("Extraction halted", &e.to_string())
                            .await;
                        return Err(e);
                    }
                    Err(e) => {
                        // A partial record beats a dropped listing.
                        self.push_error(format!("{platform} {external_id}: {e}"));
                        self.build_listing(profile, &card, &external_id, &url, None)
                    }
                };

                if self.store.insert_job(job.clone()).await? {
                    let extracted = {
                        let mut status = self.status.lock().expect("status lock poisoned");
                        status.jobs_extracted += 1;
                        status.jobs_extracted
                    };
                    self.events.emit(AutomationEvent::NewJob { job });
                    if extracted >= self.config.max_jobs_per_session {
                        info!("session extraction cap reached ({})", extracted);
                        return Ok(());
                    }
                }

                self.pacing.between_listings().await;
            }
        }
        Ok(())
    }

    fn build_listing(
        &self,
        profile: &SearchProfile,
        card: &ListingCard,
        external_id: &str,
        url: &str,
        details: Option<JobDetails>,
    ) -> JobListing {
        let fallback = details.is_none();
        let details = details.unwrap_or_default();
        let title = dedup_title(details.title.as_deref().unwrap_or(&card.title));
        JobListing {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            platform: profile.platform,
            profile_id: profile.id.clone(),
            url: url.to_string(),
            title,
            company: card.company.clone(),
            location: card.location.clone(),
            description: details.description,
            salary: details.salary,
            easy_apply: details.easy_apply.unwrap_or(card.easy_apply),
            status: JobStatus::New,
            analysis: None,
            submitted_answers: None,
            resume_used: None,
            error_reason: fallback
                .then(|| "detail extraction failed; card-level data only".to_string()),
            created_at: Utc::now(),
        }
    }

    // ── analysis ────────────────────────────────────────────────────────

    /// Score every job still in `new` for this profile. Analysis failures
    /// are logged and skipped; they never end the run.
    async fn analyze_new_jobs(&self, profile: &SearchProfile) -> Result<(), AutomationError> {
        let Some(analysis) = &self.analysis else {
            debug!("no analysis service configured, leaving jobs in 'new'");
            return Ok(());
        };
        let jobs = self
            .store
            .list_jobs_for_profile(&profile.id, JobStatus::New)
            .await?;
        info!("analyzing {} new jobs for '{}'", jobs.len(), profile.name);

        for job in jobs {
            if !self.checkpoint().await {
                return Ok(());
            }
            self.set_action(format!("analyzing '{}'", job.title));
            match analysis.analyze(&job, profile).await {
                Ok(result) => {
                    let score = result.match_score;
                    self.store.update_analysis(&job.id, result).await?;
                    {
                        let mut status = self.status.lock().expect("status lock poisoned");
                        status.jobs_analyzed += 1;
                    }
                    if score >= self.config.high_match_threshold {
                        self.notifier
                            .notify(
                                "High match",
                                &format!(
                                    "{} at {} scored {:.0}%",
                                    job.title,
                                    job.company,
                                    score * 100.0
                                ),
                            )
                            .await;
                    }
                }
                Err(e) => {
                    self.push_error(format!("analysis of '{}' failed: {}", job.title, e));
                }
            }
        }
        Ok(())
    }

    // ── apply pipeline ──────────────────────────────────────────────────

    async fn apply_inner(&self, platform: Option<Platform>) -> Result<(), AutomationError> {
        if self.settings.applications_disabled().await {
            info!("applications are globally disabled, nothing to do");
            self.set_action("applications disabled");
            return Ok(());
        }

        let jobs = self.store.list_jobs(JobStatus::Approved, platform).await?;
        info!("{} approved jobs queued for application", jobs.len());

        let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
        let mut authenticated: HashSet<Platform> = HashSet::new();
        let mut attempts = 0usize;

        for job in jobs {
            if !self.checkpoint().await {
                return Ok(());
            }
            if attempts >= self.config.max_applications_per_session {
                info!("session application cap reached ({})", attempts);
                break;
            }
            if job.platform.requires_easy_apply() && !job.easy_apply {
                debug!("'{}' has no automatable apply flow, skipping", job.title);
                continue;
            }

            let adapter = adapters
                .entry(job.platform)
                .or_insert_with(|| (self.adapters)(job.platform));
            if !authenticated.contains(&job.platform) {
                self.ensure_authenticated(adapter.as_ref()).await?;
                if !self.checkpoint().await {
                    return Ok(());
                }
                authenticated.insert(job.platform);
            }

            let profile = self.store.get_profile(&job.profile_id).await?;
            let request = ApplyRequest {
                default_answers: profile
                    .as_ref()
                    .map(|p| p.default_answers.clone())
                    .unwrap_or_default(),
                resume_path: profile.and_then(|p| p.resume_path),
            };

            let (progress_tx, progress_rx) = mpsc::unbounded_channel();
            let (question_tx, question_rx) = mpsc::channel(1);
            let relay = self.spawn_session_relay(job.clone(), progress_rx, question_rx);
            let session = ApplySession::new(
                job.id.clone(),
                progress_tx,
                question_tx,
                self.config.question_timeout,
            );

            self.set_action(format!("applying to '{}' at {}", job.title, job.company));
            self.limiter.acquire().await;
            attempts += 1;
            let outcome = self
                .breaker
                .execute(|| adapter.apply_to_job(&job, &request, &session))
                .await;
            drop(session);
            let _ = relay.await;

            match outcome {
                Ok(result) if result.success => {
                    self.store
                        .update_application(&job.id, result.answers_used, request.resume_path)
                        .await?;
                    {
                        let mut status = self.status.lock().expect("status lock poisoned");
                        status.jobs_applied += 1;
                    }
                    self.events.emit(AutomationEvent::ApplicationComplete {
                        job_id: job.id.clone(),
                        success: true,
                        reason: None,
                    });
                    self.notifier
                        .notify(
                            "Application submitted",
                            &format!("{} at {}", job.title, job.company),
                        )
                        .await;
                }
                Ok(result) => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| "application could not be completed".to_string());
                    self.store
                        .update_status(&job.id, JobStatus::Error, Some(reason.clone()))
                        .await?;
                    self.events.emit(AutomationEvent::ApplicationComplete {
                        job_id: job.id.clone(),
                        success: false,
                        reason: Some(reason.clone()),
                    });
                    if result.needs_manual_intervention {
                        self.notifier
                            .notify(
                                "Manual application needed",
                                &format!("{}: {}", job.title, reason),
                            )
                            .await;
                    }
                    self.push_error(format!("'{}': {}", job.title, reason));
                }
                Err(e) if e.is_circuit_open() => {
                    // One summary error for the whole remaining batch.
                    self.push_error(format!("apply batch halted: {e}"));
                    self.notifier.notify("Applications halted", &e.to_string()).await;
                    break;
                }
                Err(e) => {
                    self.store
                        .update_status(&job.id, JobStatus::Error, Some(e.to_string()))
                        .await?;
                    self.events.emit(AutomationEvent::ApplicationComplete {
                        job_id: job.id.clone(),
                        success: false,
                        reason: Some(e.to_string()),
                    });
                    self.push_error(format!("'{}': {}", job.title, e));
                }
            }

            self.pacing.between_applications().await;
        }
        Ok(())
    }

    /// Forward progress and questions from an in-flight application to the
    /// event bus. A question is answered by the answer service when one is
    /// configured and confident; otherwise it is parked for
    /// [`answer_question`](Self::answer_question) and resolves through the
    /// applicator's timeout if nobody responds. Ends when both session
    /// channels close.
    fn spawn_session_relay(
        &self,
        job: JobListing,
        mut progress: mpsc::UnboundedReceiver<String>,
        mut questions: mpsc::Receiver<QuestionRequest>,
    ) -> JoinHandle<()> {
        let events = self.events.clone();
        let answers = self.answers.clone();
        let pending = self.pending_questions.clone();
        tokio::spawn(async move {
            let mut step = 0usize;
            let mut progress_open = true;
            let mut questions_open = true;
            while progress_open || questions_open {
                tokio::select! {
                    msg = progress.recv(), if progress_open => match msg {
                        Some(message) => {
                            step += 1;
                            events.emit(AutomationEvent::ApplicationProgress {
                                job_id: job.id.clone(),
                                step: step.to_string(),
                                message,
                            });
                        }
                        None => progress_open = false,
                    },
                    request = questions.recv(), if questions_open => match request {
                        Some(request) => {
                            // Park the reply before announcing the question
                            // so a listener reacting to the event always
                            // finds it pending.
                            pending
                                .lock()
                                .expect("pending questions lock poisoned")
                                .insert(request.job_id.clone(), request.reply);
                            events.emit(AutomationEvent::PauseQuestion {
                                job_id: request.job_id.clone(),
                                prompt: request.prompt.clone(),
                            });
                            let generated = match &answers {
                                Some(service) => service
                                    .draft_answer(&request.prompt, &job)
                                    .await
                                    .ok()
                                    .filter(|a| !a.needs_review)
                                    .map(|a| a.answer),
                                None => None,
                            };
                            // A user answer delivered meanwhile wins; only
                            // resolve with the generated one if the question
                            // is still open. Without either, the applicator's
                            // timeout turns it into a null answer.
                            if let Some(answer) = generated {
                                let reply = pending
                                    .lock()
                                    .expect("pending questions lock poisoned")
                                    .remove(&request.job_id);
                                if let Some(tx) = reply {
                                    let _ = tx.send(Some(answer));
                                }
                            }
                        }
                        None => {
                            questions_open = false;
                            pending
                                .lock()
                                .expect("pending questions lock poisoned")
                                .remove(&job.id);
                        }
                    },
                }
            }
        })
    }

    // ── maintenance ─────────────────────────────────────────────────────

    /// Re-visit jobs stored without a description and fill them in. One
    /// adapter per platform is reused across the batch so the healer's
    /// session-level bookkeeping is shared.
    async fn refetch_inner(&self) -> Result<(), AutomationError> {
        let jobs = self.store.list_jobs_missing_description().await?;
        info!("{} jobs missing a description", jobs.len());

        let mut adapters: HashMap<Platform, Box<dyn PlatformAdapter>> = HashMap::new();
        let mut authenticated: HashSet<Platform> = HashSet::new();

        for job in jobs {
            if !self.checkpoint().await {
                return Ok(());
            }
            let adapter = adapters
                .entry(job.platform)
                .or_insert_with(|| (self.adapters)(job.platform));
            if !authenticated.contains(&job.platform) {
                self.ensure_authenticated(adapter.as_ref()).await?;
                if !self.checkpoint().await {
                    return Ok(());
                }
                authenticated.insert(job.platform);
            }

            self.set_action(format!("refetching '{}'", job.title));
            self.limiter.acquire().await;
            match self
                .breaker
                .execute(|| adapter.extract_job_details(&job.url))
                .await
            {
                Ok(details) if !details.description.is_empty() => {
                    let title = dedup_title(details.title.as_deref().unwrap_or(&job.title));
                    self.store
                        .update_content(&job.id, title, details.description)
                        .await?;
                }
                Ok(_) => debug!("'{}' still has no extractable description", job.title),
                Err(e) if e.is_circuit_open() => {
                    self.push_error(format!("refetch halted: {e}"));
                    break;
                }
                Err(e) => self.push_error(format!("refetch of '{}' failed: {}", job.title, e)),
            }

            self.pacing.between_listings().await;
        }
        Ok(())
    }
}

fn is_excluded(title: &str, exclude_terms: &[String]) -> bool {
    let lowered = title.to_lowercase();
    exclude_terms
        .iter()
        .any(|term| !term.is_empty() && lowered.contains(&term.to_lowercase()))
}
