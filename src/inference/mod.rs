//! OpenAI-compatible inference client.
//!
//! One client serves the three text-generation collaborator contracts:
//! selector-repair suggestions, job analysis, and screening-answer drafting.
//! Endpoint, key, and model come from `applywright.json` with env fallbacks;
//! an explicit empty key means a key-less local endpoint (Ollama, LM Studio).

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::config::LlmSection;
use crate::core::types::{GeneratedAnswer, JobAnalysis, JobListing, SearchProfile};

pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl InferenceClient {
    /// Build a client from config. Returns `None` when no API key is
    /// configured anywhere — inference-backed features degrade gracefully.
    pub fn from_config(http: reqwest::Client, llm: &LlmSection) -> Option<Self> {
        let api_key = llm.resolve_api_key()?;
        Some(Self {
            http,
            base_url: llm.resolve_base_url(),
            api_key,
            model: llm.resolve_model(),
        })
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ]
        });

        let builder = self.http.post(url).json(&body);
        // Key-less local endpoints work without the Authorization header.
        let builder = if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(self.api_key.trim())
        };

        let response = builder
            .send()
            .await
            .context("chat.completions request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "chat.completions failed: status={} body={}",
                status,
                text
            ));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("chat.completions response json parse failed")?;

        value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("chat.completions returned no content"))
    }

    /// Ask for replacement CSS selectors given the page's current structure
    /// and the field's semantic purpose. Candidates are NOT validated here —
    /// the caller must prove them by attempting extraction.
    pub async fn suggest_selectors(
        &self,
        html_excerpt: &str,
        purpose: &str,
        failed: &[String],
    ) -> Result<Vec<String>> {
        let system_prompt = "You repair CSS selectors for a web automation tool. \
            Given an HTML excerpt and the semantic purpose of a field, respond with a JSON \
            array of up to 5 candidate CSS selectors, most likely first. Respond with the \
            JSON array only, no prose, no markdown fences.";
        let user_prompt = format!(
            "Purpose of the field: {}\nSelectors that stopped matching: {:?}\n\nCurrent page HTML (trimmed):\n{}",
            purpose, failed, html_excerpt
        );

        let raw = self.chat(system_prompt, user_prompt.as_str()).await?;
        let candidates: Vec<String> =
            serde_json::from_str(strip_fences(&raw)).context("selector suggestions not a JSON array")?;

        let candidates: Vec<String> = candidates
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        debug!(
            "Inference suggested {} selector candidates for '{}'",
            candidates.len(),
            purpose
        );
        Ok(candidates)
    }

    /// Score a job against the user's search profile.
    pub async fn analyze_job(
        &self,
        job: &JobListing,
        profile: &SearchProfile,
    ) -> Result<JobAnalysis> {
        #[derive(Deserialize)]
        struct RawAnalysis {
            match_score: f64,
            reasoning: String,
            summary: String,
            #[serde(default)]
            highlights: Vec<String>,
            #[serde(default)]
            red_flags: Vec<String>,
        }

        let system_prompt = "You evaluate job postings for fit against a candidate's search \
            profile. Respond with a single JSON object: {\"match_score\": 0.0-1.0, \
            \"reasoning\": str, \"summary\": str, \"highlights\": [str], \"red_flags\": [str]}. \
            JSON only, no prose.";
        let description: String = job.description.chars().take(6_000).collect();
        let user_prompt = format!(
            "Search profile: keywords {:?}, locations {:?}, job types {:?}, excluded terms {:?}.\n\n\
             Job: {} at {} ({})\n\n{}",
            profile.keywords,
            profile.locations,
            profile.job_types,
            profile.exclude_terms,
            job.title,
            job.company,
            job.location,
            description
        );

        let raw = self.chat(system_prompt, user_prompt.as_str()).await?;
        let parsed: RawAnalysis =
            serde_json::from_str(strip_fences(&raw)).context("job analysis not valid JSON")?;

        Ok(JobAnalysis {
            match_score: parsed.match_score.clamp(0.0, 1.0),
            reasoning: parsed.reasoning,
            summary: parsed.summary,
            highlights: parsed.highlights,
            red_flags: parsed.red_flags,
        })
    }

    /// Draft a best-effort answer to a screening question.
    pub async fn draft_answer(&self, question: &str, job: &JobListing) -> Result<GeneratedAnswer> {
        #[derive(Deserialize)]
        struct RawAnswer {
            answer: String,
            confidence: f64,
            #[serde(default)]
            needs_review: bool,
        }

        let system_prompt = "You draft short, truthful answers to job application screening \
            questions on behalf of a candidate. Respond with a single JSON object: \
            {\"answer\": str, \"confidence\": 0.0-1.0, \"needs_review\": bool}. Set \
            needs_review=true whenever the question needs facts you do not have. JSON only.";
        let user_prompt = format!(
            "Job: {} at {}\nQuestion: {}",
            job.title, job.company, question
        );

        let raw = self.chat(system_prompt, user_prompt.as_str()).await?;
        let parsed: RawAnswer =
            serde_json::from_str(strip_fences(&raw)).context("drafted answer not valid JSON")?;

        if parsed.answer.trim().is_empty() {
            warn!("Inference produced an empty answer for: {}", question);
            return Err(anyhow!("empty generated answer"));
        }

        Ok(GeneratedAnswer {
            answer: parsed.answer,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            needs_review: parsed.needs_review,
        })
    }
}

/// Models wrap JSON in markdown fences despite instructions; strip them.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Case-insensitive tag-name check against the head of `tail`. Byte-wise so
/// no allocation happens per `<`; tag names are ASCII.
fn opens_with(tail: &str, tag: &str) -> bool {
    tail.len() >= tag.len() && tail.as_bytes()[..tag.len()].eq_ignore_ascii_case(tag.as_bytes())
}

/// Reduce a page to the excerpt the repair prompt can afford: drop script,
/// style, and svg subtrees, collapse whitespace, and cap the length.
/// Single scan over the input; this runs on full live-page HTML so it must
/// stay linear.
pub fn compact_html(html: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(html.len().min(max_chars));
    let mut skip_until: Option<&str> = None;
    let mut rest = html;

    while let Some(idx) = rest.find('<') {
        let (text, tail) = rest.split_at(idx);
        if skip_until.is_none() {
            out.push_str(text);
        }
        if let Some(end_tag) = skip_until {
            if opens_with(tail, end_tag) {
                skip_until = None;
                if let Some(close) = tail.find('>') {
                    rest = &tail[close + 1..];
                    continue;
                }
            }
            rest = &tail[1..];
            continue;
        }
        for (open, close) in [
            ("<script", "</script"),
            ("<style", "</style"),
            ("<svg", "</svg"),
            ("<noscript", "</noscript"),
        ] {
            if opens_with(tail, open) {
                skip_until = Some(close);
                break;
            }
        }
        if skip_until.is_none() {
            if let Some(close) = tail.find('>') {
                out.push_str(&tail[..=close]);
                rest = &tail[close + 1..];
                continue;
            }
        }
        rest = &tail[1..];
    }
    if skip_until.is_none() {
        out.push_str(rest);
    }

    let collapsed: String = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_handles_plain_and_fenced() {
        assert_eq!(strip_fences("[\"a\"]"), "[\"a\"]");
        assert_eq!(strip_fences("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(strip_fences("```\n{\"x\":1}\n```"), "{\"x\":1}");
    }

    #[test]
    fn compact_html_drops_scripts_and_caps() {
        let html = r#"<div class="job"><script>var x = "noise";</script>Title</div><style>.a{}</style><p>Body</p>"#;
        let compact = compact_html(html, 1_000);
        assert!(compact.contains("Title"));
        assert!(compact.contains("Body"));
        assert!(!compact.contains("noise"));
        assert!(!compact.contains(".a{}"));

        let long = "<p>word</p>".repeat(10_000);
        assert!(compact_html(&long, 500).chars().count() <= 500);
    }

    #[test]
    fn compact_html_skips_mixed_case_subtrees() {
        let html = "<div>Keep</div><SCRIPT>var hidden = 1;</SCRIPT><Style>.b{}</Style>more";
        let compact = compact_html(html, 1_000);
        assert!(compact.contains("Keep"));
        assert!(compact.contains("more"));
        assert!(!compact.contains("hidden"));
        assert!(!compact.contains(".b{}"));
    }

    #[test]
    fn compact_html_stays_fast_on_multi_megabyte_pages() {
        let page =
            r#"<div class="posting">Senior Rust Engineer</div><script>track("x");</script>"#
                .repeat(30_000);
        let started = std::time::Instant::now();
        let compact = compact_html(&page, 8_000);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(5),
            "compact_html took {:?} on a {} byte page",
            started.elapsed(),
            page.len()
        );
        assert!(compact.contains("Senior Rust Engineer"));
        assert!(!compact.contains("track"));
    }
}
