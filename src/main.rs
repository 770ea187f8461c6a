use std::fs;
use std::sync::Arc;

use tracing::{info, warn};

use applywright::browser::{launch_page, session, CdpDriver, PageDriver};
use applywright::healing::{cache::RepairCache, SelectorHealer};
use applywright::inference::InferenceClient;
use applywright::runner::{AutomationRunner, RunnerDeps};
use applywright::services::{
    AnalysisService, AnswerService, EnvSettings, EventSink, LlmAnalysisService, LlmAnswerService,
    LogNotifier, MemoryJobStore,
};
use applywright::{load_config, AutomationEvent, Platform, SearchProfile};

struct CliArgs {
    profiles_path: String,
    profile_id: Option<String>,
    apply: bool,
    apply_platform: Option<Platform>,
    refetch: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs {
        profiles_path: "profiles.json".to_string(),
        profile_id: None,
        apply: false,
        apply_platform: None,
        refetch: false,
    };
    let mut args = std::env::args().skip(1).peekable();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--profiles" => {
                if let Some(v) = args.next() {
                    parsed.profiles_path = v;
                }
            }
            "--profile" => parsed.profile_id = args.next(),
            "--apply" => parsed.apply = true,
            "--platform" => {
                if let Some(v) = args.next() {
                    parsed.apply_platform = Some(Platform::parse_str(&v)?);
                }
            }
            "--refetch" => parsed.refetch = true,
            other => {
                if let Some(rest) = other.strip_prefix("--profiles=") {
                    parsed.profiles_path = rest.to_string();
                } else if let Some(rest) = other.strip_prefix("--profile=") {
                    parsed.profile_id = Some(rest.to_string());
                } else {
                    anyhow::bail!("unknown argument: {other}");
                }
            }
        }
    }
    Ok(parsed)
}

fn load_profiles(path: &str) -> anyhow::Result<Vec<SearchProfile>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read profiles file {path}: {e}"))?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("applywright=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = parse_args()?;
    let config = load_config();
    let engine = config.engine.resolve();

    let profiles = load_profiles(&args.profiles_path)?;
    info!("loaded {} search profiles from {}", profiles.len(), args.profiles_path);
    let store = Arc::new(MemoryJobStore::with_profiles(profiles));

    info!("launching automation browser");
    let (_browser, page) = launch_page().await?;
    // Stored logins ride along on the first request of each site.
    session::restore_all(&page).await;
    let driver: Arc<dyn PageDriver> = Arc::new(CdpDriver::new(page.clone()).await?);

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;
    let inference = InferenceClient::from_config(http, &config.llm).map(Arc::new);
    if inference.is_none() {
        warn!("no inference configured: analysis, answers and selector repair are off");
    }

    let healer = Arc::new(SelectorHealer::new(
        RepairCache::load_default(),
        inference.clone(),
    ));
    let analysis: Option<Arc<dyn AnalysisService>> = inference
        .clone()
        .map(|c| Arc::new(LlmAnalysisService::new(c)) as Arc<dyn AnalysisService>);
    let answers: Option<Arc<dyn AnswerService>> = inference
        .map(|c| Arc::new(LlmAnswerService::new(c)) as Arc<dyn AnswerService>);

    let (events, mut event_rx) = EventSink::channel();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                AutomationEvent::NewJob { job } => {
                    info!("new job: {} at {} [{}]", job.title, job.company, job.platform)
                }
                AutomationEvent::PauseQuestion { prompt, .. } => {
                    info!("application paused on question: {prompt}")
                }
                _ => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        info!("event: {json}");
                    }
                }
            }
        }
    });
    let runner = AutomationRunner::new(RunnerDeps {
        driver,
        store: store.clone(),
        healer,
        analysis,
        answers,
        notifier: Arc::new(LogNotifier),
        settings: Arc::new(EnvSettings),
        events,
        config: engine,
    });

    if args.refetch {
        runner.refetch_descriptions().await?;
    } else if args.apply {
        runner.apply_to_approved(args.apply_platform).await?;
    } else if let Some(profile_id) = &args.profile_id {
        runner.run_profile(profile_id).await?;
    } else {
        runner.run_all_enabled().await?;
    }

    // Keep whatever logins were completed during the run.
    session::persist_all(&page).await;

    let status = runner.status();
    info!(
        "done: {} extracted, {} analyzed, {} applied, {} errors",
        status.jobs_extracted,
        status.jobs_analyzed,
        status.jobs_applied,
        status.errors.len()
    );
    for e in &status.errors {
        warn!("run error: {e}");
    }
    Ok(())
}
