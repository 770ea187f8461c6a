//! Inference-backed implementations of the analysis and answer contracts.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::types::{GeneratedAnswer, JobAnalysis, JobListing, SearchProfile};
use crate::inference::InferenceClient;
use crate::services::{AnalysisService, AnswerService};

pub struct LlmAnalysisService {
    client: Arc<InferenceClient>,
}

impl LlmAnalysisService {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnalysisService for LlmAnalysisService {
    async fn analyze(&self, job: &JobListing, profile: &SearchProfile) -> Result<JobAnalysis> {
        self.client.analyze_job(job, profile).await
    }
}

pub struct LlmAnswerService {
    client: Arc<InferenceClient>,
}

impl LlmAnswerService {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AnswerService for LlmAnswerService {
    async fn draft_answer(&self, question: &str, job: &JobListing) -> Result<GeneratedAnswer> {
        self.client.draft_answer(question, job).await
    }
}
