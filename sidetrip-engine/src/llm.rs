//! OpenAI-compatible chat implementation of `NarrativeProvider`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::provider::{NarrativeError, NarrativeProvider};

/// Enrichment is best-effort and has a fallback, so it gets a longer
/// timeout than search/routing.
const NARRATIVE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, NarrativeError> {
        Self::with_base_url(api_key, model, "https://api.openai.com")
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, NarrativeError> {
        let http = reqwest::Client::builder()
            .timeout(NARRATIVE_TIMEOUT)
            .build()
            .map_err(|e| NarrativeError::Failed(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NarrativeProvider for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, NarrativeError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: system },
                Msg { role: "user", content: user },
            ],
            temperature: 0.4,
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| NarrativeError::Failed(format!("request: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(NarrativeError::RateLimited);
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(NarrativeError::Failed(format!("{status} {txt}")));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| NarrativeError::Failed(format!("parse response: {e}")))?;
        let content = out
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}
