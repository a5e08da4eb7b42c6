// src/config.rs
//! Engine configuration: TOML tunables with env overrides, plus
//! environment-only credential loading and startup validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::gate::GateConfig;
use crate::ratelimit::{RateLimitConfig, RetryConfig};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";
pub const ENV_SIMILARITY_THRESHOLD: &str = "ENGINE_SIMILARITY_THRESHOLD";

// Credentials never live in TOML. These are the recognized env names;
// pooled providers also scan numbered backups (`NEWS_API_KEY_2`, ...).
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";
pub const ENV_DEEPSEEK_KEY: &str = "DEEPSEEK_API_KEY";
pub const ENV_NEWS_KEY: &str = "NEWS_API_KEY";
pub const ENV_SERPAPI_KEY: &str = "SERPAPI_KEY";
pub const ENV_WORLD_NEWS_KEY: &str = "WORLD_NEWS_API_KEY";
pub const ENV_GOOGLE_KEY: &str = "GOOGLE_API_KEY";
pub const ENV_GOOGLE_CSE_ID: &str = "GOOGLE_CSE_ID";

/// Knobs for the run loop itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Ranked trends considered per cycle.
    pub max_trends: usize,
    /// Articles collected per topic across the whole cascade.
    pub max_articles: usize,
    /// Pause after each processed topic so provider quotas breathe.
    pub pacing_delay_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_trends: 20,
            max_articles: 20,
            pacing_delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Per-request timeout for all outbound calls, in seconds.
    pub timeout_secs: u64,
}

impl HttpSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl ServerSection {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// Where trend candidates come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendsSection {
    /// Google Trends geo parameter.
    pub region: String,
    /// Candidates taken from each provider per poll.
    pub per_source: usize,
    pub subreddits: Vec<String>,
    pub news_feeds: Vec<String>,
    pub tech_feeds: Vec<String>,
}

impl Default for TrendsSection {
    fn default() -> Self {
        Self {
            region: "US".to_string(),
            per_source: 10,
            subreddits: ["technology", "worldnews", "science", "business", "politics"]
                .map(str::to_string)
                .to_vec(),
            news_feeds: [
                "https://feeds.bbci.co.uk/news/rss.xml",
                "https://www.theguardian.com/world/rss",
                "https://feeds.reuters.com/reuters/topNews",
            ]
            .map(str::to_string)
            .to_vec(),
            tech_feeds: [
                "https://techcrunch.com/feed/",
                "https://www.theverge.com/rss/index.xml",
                "https://www.wired.com/feed/rss",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    pub gemini: String,
    pub deepseek: String,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            gemini: "gemini-1.5-pro-latest".to_string(),
            deepseek: "deepseek-chat".to_string(),
        }
    }
}

/// Whole-engine configuration. Every section and key is optional in the
/// TOML; missing pieces fall back to the built-in defaults, so an empty
/// file (or no file at all) yields a runnable config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PipelineSection,
    pub http: HttpSection,
    pub server: ServerSection,
    pub gate: GateConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub trends: TrendsSection,
    pub models: ModelsSection,
}

impl EngineConfig {
    /// Load from `$ENGINE_CONFIG_PATH`, falling back to
    /// `config/pipeline.toml`, falling back to built-in defaults.
    /// An explicitly set env path that does not exist is an error; the
    /// default path missing is not.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    bail!("{ENV_CONFIG_PATH} points to non-existent path");
                }
                Self::from_file(&path)?
            }
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        // optional: override similarity threshold from env
        if let Some(t) = parse_threshold_env(std::env::var(ENV_SIMILARITY_THRESHOLD).ok()) {
            cfg.gate.similarity_threshold = t;
        }

        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config at {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing engine config at {}", path.display()))
    }

    /// Load from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(toml_str)?;
        Ok(cfg)
    }
}

// parse optional integer env and clamp to <0..=100>
fn parse_threshold_env(raw: Option<String>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .map(|v| v.min(100))
}

/// API credentials, loaded from the environment only.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini_key: String,
    pub deepseek_key: String,
    pub news_keys: Vec<String>,
    pub serpapi_keys: Vec<String>,
    pub world_news_key: Option<String>,
    pub google_key: String,
    pub google_cse_id: String,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            gemini_key: env_trimmed(ENV_GEMINI_KEY).unwrap_or_default(),
            deepseek_key: env_trimmed(ENV_DEEPSEEK_KEY).unwrap_or_default(),
            news_keys: keys_from_env(ENV_NEWS_KEY),
            serpapi_keys: keys_from_env(ENV_SERPAPI_KEY),
            world_news_key: env_trimmed(ENV_WORLD_NEWS_KEY),
            google_key: env_trimmed(ENV_GOOGLE_KEY).unwrap_or_default(),
            google_cse_id: env_trimmed(ENV_GOOGLE_CSE_ID).unwrap_or_default(),
        }
    }

    /// Startup check. Missing required credentials abort the process
    /// before any cycle runs; SerpAPI is the one optional pool because
    /// the cascade can skip that tier.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.gemini_key.is_empty() {
            missing.push(ENV_GEMINI_KEY);
        }
        if self.deepseek_key.is_empty() {
            missing.push(ENV_DEEPSEEK_KEY);
        }
        if self.news_keys.is_empty() {
            missing.push(ENV_NEWS_KEY);
        }
        if self.world_news_key.is_none() {
            missing.push(ENV_WORLD_NEWS_KEY);
        }
        if self.google_key.is_empty() {
            missing.push(ENV_GOOGLE_KEY);
        }
        if self.google_cse_id.is_empty() {
            missing.push(ENV_GOOGLE_CSE_ID);
        }
        if !missing.is_empty() {
            bail!("missing required credentials: {}", missing.join(", "));
        }
        Ok(())
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads `NAME`, then `NAME_2`, `NAME_3`, ... stopping at the first
/// unset or blank slot. Deployments leave backup slots empty.
fn keys_from_env(base: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for n in 1u32.. {
        let name = if n == 1 {
            base.to_string()
        } else {
            format!("{base}_{n}")
        };
        match env_trimmed(&name) {
            Some(v) => keys.push(v),
            None => break,
        }
    }
    keys
}
