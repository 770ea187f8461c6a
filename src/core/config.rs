use std::time::Duration;

// ---------------------------------------------------------------------------
// AppConfig — file-based config loader (applywright.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Inference sub-config (mirrors the `llm` key in applywright.json).
/// Used for job analysis, screening-answer drafting, and selector repair.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct LlmSection {
    /// Endpoint — e.g. `https://api.openai.com/v1` or `http://localhost:11434/v1` (Ollama).
    pub base_url: Option<String>,
    /// API key. Never logged. Leave blank for key-less local endpoints.
    pub api_key: Option<String>,
    /// Model name — e.g. `gpt-4o-mini`, `llama3`.
    pub model: Option<String>,
}

impl LlmSection {
    /// API key: JSON field → `OPENAI_API_KEY` env var → `None`.
    ///
    /// An explicit empty string in the config file means "no key required"
    /// (Ollama / LM Studio); `None` means no key is configured anywhere,
    /// which disables inference-backed features entirely.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.trim().to_string());
        }
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Base URL: JSON field → `OPENAI_BASE_URL` env var → OpenAI default.
    pub fn resolve_base_url(&self) -> String {
        if let Some(u) = &self.base_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    /// Model: JSON field → `APPLYWRIGHT_LLM_MODEL` env var → `gpt-4o-mini`.
    pub fn resolve_model(&self) -> String {
        if let Some(m) = &self.model {
            if !m.trim().is_empty() {
                return m.clone();
            }
        }
        std::env::var("APPLYWRIGHT_LLM_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }
}

/// Engine tunables as they appear in applywright.json (all optional).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct EngineSection {
    pub actions_per_minute: Option<u32>,
    pub breaker_threshold: Option<u32>,
    pub breaker_cooldown_secs: Option<u64>,
    pub max_pages_per_profile: Option<u32>,
    pub max_jobs_per_session: Option<usize>,
    pub max_applications_per_session: Option<usize>,
    pub login_timeout_secs: Option<u64>,
    pub login_poll_secs: Option<u64>,
    pub question_timeout_secs: Option<u64>,
    pub listing_delay_ms: Option<(u64, u64)>,
    pub application_delay_ms: Option<(u64, u64)>,
    pub high_match_threshold: Option<f64>,
    /// Directory containing per-site selector hint files.
    pub hints_dir: Option<String>,
}

/// Resolved engine tunables consumed by the runner and adapters.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub actions_per_minute: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    pub max_pages_per_profile: u32,
    pub max_jobs_per_session: usize,
    pub max_applications_per_session: usize,
    pub login_timeout: Duration,
    pub login_poll_interval: Duration,
    pub question_timeout: Duration,
    pub listing_delay_ms: (u64, u64),
    pub application_delay_ms: (u64, u64),
    pub high_match_threshold: f64,
    pub hints_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actions_per_minute: 20,
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(60),
            max_pages_per_profile: 5,
            max_jobs_per_session: 50,
            max_applications_per_session: 10,
            login_timeout: Duration::from_secs(300),
            login_poll_interval: Duration::from_secs(5),
            question_timeout: Duration::from_secs(300),
            listing_delay_ms: (1_500, 4_500),
            application_delay_ms: (5_000, 15_000),
            high_match_threshold: 0.8,
            hints_dir: None,
        }
    }
}

impl EngineSection {
    /// Fill in defaults for every field the file left out. Env vars override
    /// rate and cap fields so a deployment can be tuned without editing JSON.
    pub fn resolve(&self) -> EngineConfig {
        let d = EngineConfig::default();
        EngineConfig {
            actions_per_minute: env_u32("APPLYWRIGHT_ACTIONS_PER_MINUTE")
                .or(self.actions_per_minute)
                .unwrap_or(d.actions_per_minute),
            breaker_threshold: self.breaker_threshold.unwrap_or(d.breaker_threshold),
            breaker_cooldown: self
                .breaker_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(d.breaker_cooldown),
            max_pages_per_profile: self
                .max_pages_per_profile
                .unwrap_or(d.max_pages_per_profile),
            max_jobs_per_session: env_usize("APPLYWRIGHT_MAX_JOBS_PER_SESSION")
                .or(self.max_jobs_per_session)
                .unwrap_or(d.max_jobs_per_session),
            max_applications_per_session: env_usize("APPLYWRIGHT_MAX_APPLICATIONS")
                .or(self.max_applications_per_session)
                .unwrap_or(d.max_applications_per_session),
            login_timeout: self
                .login_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.login_timeout),
            login_poll_interval: self
                .login_poll_secs
                .map(Duration::from_secs)
                .unwrap_or(d.login_poll_interval),
            question_timeout: self
                .question_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(d.question_timeout),
            listing_delay_ms: self.listing_delay_ms.unwrap_or(d.listing_delay_ms),
            application_delay_ms: self.application_delay_ms.unwrap_or(d.application_delay_ms),
            high_match_threshold: self.high_match_threshold.unwrap_or(d.high_match_threshold),
            hints_dir: self.hints_dir.clone(),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Top-level config loaded from `applywright.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub engine: EngineSection,
}

/// Load `applywright.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `APPLYWRIGHT_CONFIG` env var path
/// 2. `./applywright.json`  (process cwd)
/// 3. `../applywright.json` (repo root when running from a subdirectory)
///
/// Missing file → `AppConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `AppConfig::default()`.
pub fn load_config() -> AppConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("applywright.json"),
            std::path::PathBuf::from("../applywright.json"),
        ];
        if let Ok(env_path) = std::env::var("APPLYWRIGHT_CONFIG") {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("applywright.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "applywright.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return AppConfig::default();
                }
            },
            Err(_) => continue, // not found at this path — try next
        }
    }

    AppConfig::default()
}

// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_APPLICATIONS_DISABLED: &str = "APPLYWRIGHT_APPLICATIONS_DISABLED";

/// Root directory for on-disk engine state (selector repair cache, session
/// cookies, hint files written back by the healer).
pub fn state_dir() -> Option<std::path::PathBuf> {
    if let Ok(v) = std::env::var("APPLYWRIGHT_STATE_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            return Some(std::path::PathBuf::from(v));
        }
    }
    dirs::home_dir().map(|h| h.join(".applywright"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_section_fills_defaults() {
        let cfg = EngineSection::default().resolve();
        assert_eq!(cfg.breaker_threshold, 3);
        assert_eq!(cfg.breaker_cooldown, Duration::from_secs(60));
        assert_eq!(cfg.login_timeout, Duration::from_secs(300));
        assert_eq!(cfg.max_pages_per_profile, 5);
    }

    #[test]
    fn engine_section_overrides_stick() {
        let section = EngineSection {
            breaker_threshold: Some(5),
            listing_delay_ms: Some((10, 20)),
            ..Default::default()
        };
        let cfg = section.resolve();
        assert_eq!(cfg.breaker_threshold, 5);
        assert_eq!(cfg.listing_delay_ms, (10, 20));
        // Untouched fields keep defaults.
        assert_eq!(cfg.high_match_threshold, 0.8);
    }

    #[test]
    fn llm_section_prefers_file_values() {
        let section = LlmSection {
            base_url: Some("http://localhost:11434/v1".into()),
            api_key: Some("".into()),
            model: Some("llama3".into()),
        };
        assert_eq!(section.resolve_base_url(), "http://localhost:11434/v1");
        // Explicit empty key means "no auth required", not "unset".
        assert_eq!(section.resolve_api_key().as_deref(), Some(""));
        assert_eq!(section.resolve_model(), "llama3");
    }
}
