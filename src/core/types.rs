use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::AutomationError;

/// Job boards the engine knows how to drive. The set is closed on purpose:
/// adapters are selected by enum match, never by open-ended registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    Indeed,
    Upwork,
}

impl Platform {
    pub fn parse_str(s: &str) -> Result<Self, AutomationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Self::Linkedin),
            "indeed" => Ok(Self::Indeed),
            "upwork" => Ok(Self::Upwork),
            other => Err(AutomationError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin",
            Self::Indeed => "indeed",
            Self::Upwork => "upwork",
        }
    }

    /// Registrable domain the site's cookies are scoped to.
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Linkedin => "linkedin.com",
            Self::Indeed => "indeed.com",
            Self::Upwork => "upwork.com",
        }
    }

    /// Whether apply automation is gated on the site's native quick-apply
    /// affordance. Listings without it redirect to external employer sites
    /// and are skipped by the apply pipeline.
    pub fn requires_easy_apply(&self) -> bool {
        matches!(self, Self::Linkedin | Self::Indeed)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-owned search configuration. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProfile {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub platform: Platform,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    /// Only match postings newer than this many days, when the site supports it.
    #[serde(default)]
    pub date_posted_days: Option<u32>,
    #[serde(default)]
    pub job_types: Vec<String>,
    /// Listings whose title contains any of these terms are dropped at card level.
    #[serde(default)]
    pub exclude_terms: Vec<String>,
    /// Canned answers for screening questions, keyed by a lowercase question fragment.
    #[serde(default)]
    pub default_answers: HashMap<String, String>,
    #[serde(default)]
    pub resume_path: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Lifecycle of an extracted posting. The engine creates jobs as `New`,
/// analysis moves them to `Reviewed`, the user approves/rejects, and the
/// apply pipeline finishes them as `Applied` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    New,
    Reviewed,
    Approved,
    Rejected,
    Applied,
    Error,
}

/// One extracted posting. `(external_id, platform)` is the natural key and
/// must stay unique in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListing {
    pub id: String,
    pub external_id: String,
    pub platform: Platform,
    pub profile_id: String,
    pub url: String,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub easy_apply: bool,
    pub status: JobStatus,
    #[serde(default)]
    pub analysis: Option<JobAnalysis>,
    /// Answers actually submitted, recorded when the apply flow succeeds.
    #[serde(default)]
    pub submitted_answers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub resume_used: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Output of the job-analysis collaborator, stored on the listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAnalysis {
    /// 0.0–1.0 fit against the user's profile.
    pub match_score: f64,
    pub reasoning: String,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

/// Outcome of one apply attempt. Ephemeral: folded into the `JobListing`
/// and emitted as an event, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub success: bool,
    #[serde(default)]
    pub answers_used: HashMap<String, String>,
    #[serde(default)]
    pub cover_letter: Option<String>,
    #[serde(default)]
    pub needs_manual_intervention: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ApplicationResult {
    pub fn manual(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            answers_used: HashMap::new(),
            cover_letter: None,
            needs_manual_intervention: true,
            reason: Some(reason.into()),
        }
    }
}

/// Screening-question answer from the answer-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    /// 0.0–1.0 confidence; low-confidence answers are flagged for review.
    pub confidence: f64,
    #[serde(default)]
    pub needs_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
}

/// Externally visible runner snapshot. Handed out by value so observers can
/// never mutate the runner's internal counters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutomationStatus {
    pub state: RunState,
    /// Human-readable description of what the runner is doing right now.
    pub current_action: String,
    pub jobs_extracted: usize,
    pub jobs_analyzed: usize,
    pub jobs_applied: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Fire-and-forget event emitted to the outbound bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum AutomationEvent {
    #[serde(rename = "automation:status")]
    Status { status: AutomationStatus },
    #[serde(rename = "jobs:new")]
    NewJob { job: JobListing },
    #[serde(rename = "application:progress")]
    ApplicationProgress {
        job_id: String,
        step: String,
        message: String,
    },
    #[serde(rename = "application:pause-question")]
    PauseQuestion { job_id: String, prompt: String },
    #[serde(rename = "application:complete")]
    ApplicationComplete {
        job_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// What a search-result card yields before the detail page is visited.
/// Cards with no external id cannot be deduplicated and are skipped.
#[derive(Debug, Clone, Default)]
pub struct ListingCard {
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    pub location: String,
    pub easy_apply: bool,
}

/// Detail-page extraction result. Fields that fail to extract stay `None`
/// so the caller can keep whatever card-level data it already has.
#[derive(Debug, Clone, Default)]
pub struct JobDetails {
    pub title: Option<String>,
    pub description: String,
    pub salary: Option<String>,
    pub easy_apply: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parse_roundtrip() {
        for p in [Platform::Linkedin, Platform::Indeed, Platform::Upwork] {
            assert_eq!(Platform::parse_str(p.as_str()).unwrap(), p);
        }
        assert_eq!(
            Platform::parse_str("LinkedIn ").unwrap(),
            Platform::Linkedin
        );
        assert!(Platform::parse_str("monster").is_err());
    }

    #[test]
    fn event_serializes_with_wire_names() {
        let ev = AutomationEvent::PauseQuestion {
            job_id: "j1".into(),
            prompt: "Years of experience?".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "application:pause-question");
        assert_eq!(v["prompt"], "Years of experience?");
    }

    #[test]
    fn profile_defaults_apply() {
        let p: SearchProfile = serde_json::from_str(
            r#"{"id":"p1","name":"rust","platform":"indeed","keywords":["rust"]}"#,
        )
        .unwrap();
        assert!(p.enabled);
        assert!(p.locations.is_empty());
        assert!(p.default_answers.is_empty());
    }
}
