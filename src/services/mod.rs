//! Collaborator contracts.
//!
//! The engine works against these traits; their production internals
//! (SQL schema, notification transport, RPC) live outside this crate.
//! `MemoryJobStore` is the reference store used by the standalone binary
//! and the test suite.

pub mod llm;
pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::core::types::{
    AutomationEvent, GeneratedAnswer, JobAnalysis, JobListing, JobStatus, Platform, SearchProfile,
};

/// Persistence contract. Implementations must guarantee uniqueness on
/// `(external_id, platform)` and atomic status transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Option<SearchProfile>>;
    async fn list_enabled_profiles(&self) -> Result<Vec<SearchProfile>>;

    async fn find_job(&self, platform: Platform, external_id: &str)
        -> Result<Option<JobListing>>;

    /// Insert a listing. Returns `false` when a row with the same
    /// `(external_id, platform)` already exists — never a duplicate row.
    async fn insert_job(&self, job: JobListing) -> Result<bool>;

    async fn list_jobs(
        &self,
        status: JobStatus,
        platform: Option<Platform>,
    ) -> Result<Vec<JobListing>>;

    async fn list_jobs_for_profile(
        &self,
        profile_id: &str,
        status: JobStatus,
    ) -> Result<Vec<JobListing>>;

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_reason: Option<String>,
    ) -> Result<()>;

    async fn update_analysis(&self, job_id: &str, analysis: JobAnalysis) -> Result<()>;

    async fn update_application(
        &self,
        job_id: &str,
        answers: HashMap<String, String>,
        resume_used: Option<String>,
    ) -> Result<()>;

    /// Used by description refetch: replace title/description in place.
    async fn update_content(&self, job_id: &str, title: String, description: String)
        -> Result<()>;

    async fn list_jobs_missing_description(&self) -> Result<Vec<JobListing>>;
}

/// Job-analysis collaborator. The runner makes a single attempt per job per
/// run; retries are the caller's policy, never the service's.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, job: &JobListing, profile: &SearchProfile) -> Result<JobAnalysis>;
}

/// Answer-generation collaborator for screening questions.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn draft_answer(&self, question: &str, job: &JobListing) -> Result<GeneratedAnswer>;
}

/// Best-effort notification. Must never fail a run — hence no `Result`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str);
}

/// Global settings the engine consults.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// When set, `apply_to_approved` is a no-op.
    async fn applications_disabled(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Event sink
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound fire-and-forget event channel. Unbounded by design: emission
/// must never block the automation loop, and a consumer that went away just
/// means events are dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AutomationEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AutomationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink with no consumer; every emission is dropped.
    pub fn null() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn emit(&self, event: AutomationEvent) {
        // At-most-once, no acknowledgement: a closed receiver is not an error.
        let _ = self.tx.send(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trivial implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Notifier that writes to the log. The desktop/remote transport lives in
/// the shell application.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) {
        info!("notify: {} — {}", title, body);
    }
}

/// Settings backed by the `APPLYWRIGHT_APPLICATIONS_DISABLED` env var.
pub struct EnvSettings;

#[async_trait]
impl SettingsStore for EnvSettings {
    async fn applications_disabled(&self) -> bool {
        std::env::var(crate::core::config::ENV_APPLICATIONS_DISABLED)
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            })
            .unwrap_or(false)
    }
}

pub use llm::{LlmAnalysisService, LlmAnswerService};
pub use memory::MemoryJobStore;
