//! DeepSeek backend (chat completions). Fallback when Gemini fails.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::providers::build_http_client;
use crate::generate::GenBackend;

const ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "deepseek-chat";

pub struct DeepSeekBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl DeepSeekBackend {
    pub fn new(api_key: String, model_override: Option<&str>, timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }
}

#[async_trait]
impl GenBackend for DeepSeekBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let resp = self
            .http
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("deepseek send()")?;

        if !resp.status().is_success() {
            return Err(anyhow!("deepseek returned http {}", resp.status()));
        }

        let body: Resp = resp.json().await.context("deepseek body")?;
        let text = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(anyhow!("deepseek returned no choices"));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "deepseek"
    }
}
