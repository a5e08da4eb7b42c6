//! Gemini backend (REST `generateContent`). Primary in production.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::providers::build_http_client;
use crate::generate::GenBackend;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1/models";
const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";

const TEMPERATURE: f32 = 0.8;
const TOP_P: f32 = 0.9;
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    /// `model_override`: pass Some("gemini-pro") to override the default.
    pub fn new(api_key: String, model_override: Option<&str>, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }
}

#[async_trait]
impl GenBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            #[serde(rename = "generationConfig")]
            generation_config: GenerationConfig,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
            #[serde(rename = "maxOutputTokens")]
            max_output_tokens: u32,
            #[serde(rename = "topP")]
            top_p: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let url = format!("{BASE_URL}/{}:generateContent", self.model);
        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                top_p: TOP_P,
            },
        };

        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .context("gemini send()")?;

        if !resp.status().is_success() {
            return Err(anyhow!("gemini returned http {}", resp.status()));
        }

        let body: Resp = resp.json().await.context("gemini body")?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(anyhow!("gemini returned no candidates"));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
