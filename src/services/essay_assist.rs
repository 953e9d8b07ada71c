//! Optional AI helper for essay grading.
//!
//! Suggestions are advisory. They are stored next to the response and never
//! change its grading status; a human still has to call the manual grade
//! operation.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::config::Settings;

const ESSAY_SYSTEM_PROMPT: &str = r#"You are an experienced teacher grading a short essay answer.
Compare the student's answer with the reference answer and the rubric, then propose a score.

Respond with strict JSON:
{
  "score": <number between 0 and max_score>,
  "feedback": "two or three sentences for the student"
}
"#;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub(crate) struct EssayPrompt {
    pub(crate) question: String,
    pub(crate) reference: Option<String>,
    pub(crate) rubric: Option<String>,
    pub(crate) answer: String,
    pub(crate) max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct EssaySuggestion {
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[async_trait]
pub(crate) trait EssayAssist: Send + Sync {
    async fn suggest(&self, prompt: &EssayPrompt) -> Result<EssaySuggestion>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiEssayAssist {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiEssayAssist {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let ai = settings.ai();
        if !ai.essay_assist_enabled {
            return Ok(None);
        }
        if ai.openai_api_key.is_empty() || ai.openai_base_url.is_empty() {
            tracing::warn!("Essay assist is enabled but OPENAI_API_KEY/OPENAI_BASE_URL are unset");
            return Ok(None);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(ai.ai_request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Some(Self {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            model: ai.ai_model.clone(),
            max_tokens: ai.ai_max_tokens,
        }))
    }

    fn payload(&self, prompt: &EssayPrompt) -> Value {
        let user_prompt = format!(
            "Question:\n{}\n\nReference answer:\n{}\n\nRubric (maximum {} points):\n{}\n\nStudent answer:\n{}\n",
            prompt.question,
            prompt.reference.as_deref().unwrap_or("(none)"),
            prompt.max_score,
            prompt.rubric.as_deref().unwrap_or("(none)"),
            prompt.answer,
        );

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": ESSAY_SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        })
    }
}

#[async_trait]
impl EssayAssist for OpenAiEssayAssist {
    async fn suggest(&self, prompt: &EssayPrompt) -> Result<EssaySuggestion> {
        let timer = Instant::now();
        let payload = self.payload(prompt);
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..=MAX_RETRIES {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    body = resp.json().await.unwrap_or(Value::Null);
                    if status.is_success() {
                        last_error = None;
                        break;
                    }
                    last_error = Some(anyhow::anyhow!("Essay assist API error {status}: {body}"));
                }
                Err(err) => {
                    last_error =
                        Some(anyhow::anyhow!(err).context("Failed to call essay assist API"));
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let suggestion = parse_completion(&body)?;
        let tokens_used = body.pointer("/usage/total_tokens").and_then(Value::as_u64);

        tracing::info!(
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "Essay assist suggestion received"
        );

        Ok(suggestion)
    }
}

fn parse_completion(body: &Value) -> Result<EssaySuggestion> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .context("Missing essay assist response content")?;

    let suggestion: EssaySuggestion =
        serde_json::from_str(content).context("Failed to parse essay assist JSON")?;
    if !suggestion.score.is_finite() {
        anyhow::bail!("Essay assist returned a non-finite score");
    }
    Ok(suggestion)
}
