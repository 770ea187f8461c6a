//! In-memory `JobStore`.
//!
//! Reference implementation backing the standalone binary and the test
//! suite. Enforces the same `(external_id, platform)` uniqueness the SQL
//! store guarantees in the full application.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::core::types::{JobAnalysis, JobListing, JobStatus, Platform, SearchProfile};
use crate::services::JobStore;

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, SearchProfile>,
    /// Keyed by internal job id.
    jobs: HashMap<String, JobListing>,
    /// `(platform, external_id)` → internal job id.
    natural_keys: HashMap<(Platform, String), String>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: Vec<SearchProfile>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().expect("store lock poisoned");
            for p in profiles {
                inner.profiles.insert(p.id.clone(), p);
            }
        }
        store
    }

    pub fn add_profile(&self, profile: SearchProfile) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.profiles.insert(profile.id.clone(), profile);
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").jobs.len()
    }

    /// Direct snapshot of a job by internal id — test convenience.
    pub fn get_job(&self, job_id: &str) -> Option<JobListing> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .jobs
            .get(job_id)
            .cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_profile(&self, id: &str) -> Result<Option<SearchProfile>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.profiles.get(id).cloned())
    }

    async fn list_enabled_profiles(&self) -> Result<Vec<SearchProfile>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut profiles: Vec<SearchProfile> =
            inner.profiles.values().filter(|p| p.enabled).cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(profiles)
    }

    async fn find_job(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<JobListing>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner
            .natural_keys
            .get(&(platform, external_id.to_string()))
            .and_then(|id| inner.jobs.get(id))
            .cloned())
    }

    async fn insert_job(&self, job: JobListing) -> Result<bool> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let key = (job.platform, job.external_id.clone());
        if inner.natural_keys.contains_key(&key) {
            return Ok(false);
        }
        inner.natural_keys.insert(key, job.id.clone());
        inner.jobs.insert(job.id.clone(), job);
        Ok(true)
    }

    async fn list_jobs(
        &self,
        status: JobStatus,
        platform: Option<Platform>,
    ) -> Result<Vec<JobListing>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut jobs: Vec<JobListing> = inner
            .jobs
            .values()
            .filter(|j| j.status == status)
            .filter(|j| platform.map(|p| j.platform == p).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn list_jobs_for_profile(
        &self,
        profile_id: &str,
        status: JobStatus,
    ) -> Result<Vec<JobListing>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut jobs: Vec<JobListing> = inner
            .jobs
            .values()
            .filter(|j| j.profile_id == profile_id && j.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_reason: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow!("no job with id {}", job_id))?;
        job.status = status;
        job.error_reason = error_reason;
        Ok(())
    }

    async fn update_analysis(&self, job_id: &str, analysis: JobAnalysis) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow!("no job with id {}", job_id))?;
        job.analysis = Some(analysis);
        job.status = JobStatus::Reviewed;
        Ok(())
    }

    async fn update_application(
        &self,
        job_id: &str,
        answers: HashMap<String, String>,
        resume_used: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow!("no job with id {}", job_id))?;
        job.submitted_answers = Some(answers);
        job.resume_used = resume_used;
        job.status = JobStatus::Applied;
        Ok(())
    }

    async fn update_content(
        &self,
        job_id: &str,
        title: String,
        description: String,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow!("no job with id {}", job_id))?;
        job.title = title;
        job.description = description;
        Ok(())
    }

    async fn list_jobs_missing_description(&self) -> Result<Vec<JobListing>> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let mut jobs: Vec<JobListing> = inner
            .jobs
            .values()
            .filter(|j| j.description.trim().is_empty())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn listing(external_id: &str, platform: Platform) -> JobListing {
        JobListing {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            platform,
            profile_id: "p1".into(),
            url: format!("https://example.com/{external_id}"),
            title: "Engineer".into(),
            company: "Acme".into(),
            location: "Remote".into(),
            description: "desc".into(),
            salary: None,
            easy_apply: true,
            status: JobStatus::New,
            analysis: None,
            submitted_answers: None,
            resume_used: None,
            error_reason: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_natural_key_is_rejected() {
        let store = MemoryJobStore::new();
        assert!(store.insert_job(listing("42", Platform::Indeed)).await.unwrap());
        assert!(!store.insert_job(listing("42", Platform::Indeed)).await.unwrap());
        // Same external id on another platform is a different job.
        assert!(store.insert_job(listing("42", Platform::Linkedin)).await.unwrap());
        assert_eq!(store.job_count(), 2);
    }

    #[tokio::test]
    async fn status_and_analysis_updates_apply() {
        let store = MemoryJobStore::new();
        let job = listing("7", Platform::Linkedin);
        let id = job.id.clone();
        store.insert_job(job).await.unwrap();

        store
            .update_analysis(
                &id,
                JobAnalysis {
                    match_score: 0.9,
                    reasoning: "r".into(),
                    summary: "s".into(),
                    highlights: vec![],
                    red_flags: vec![],
                },
            )
            .await
            .unwrap();

        let stored = store.get_job(&id).unwrap();
        assert_eq!(stored.status, JobStatus::Reviewed);
        assert!(stored.analysis.is_some());

        store
            .update_status(&id, JobStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(store.get_job(&id).unwrap().status, JobStatus::Approved);
    }

    #[tokio::test]
    async fn missing_description_listing() {
        let store = MemoryJobStore::new();
        let mut bare = listing("1", Platform::Indeed);
        bare.description = String::new();
        store.insert_job(bare).await.unwrap();
        store.insert_job(listing("2", Platform::Indeed)).await.unwrap();

        let missing = store.list_jobs_missing_description().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].external_id, "1");
    }
}
