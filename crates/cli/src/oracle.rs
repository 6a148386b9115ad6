use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serendipity_discovery::{Oracle, OracleFailure, OracleReply};
use std::time::Duration;
use tokio::task::JoinSet;

pub const DEFAULT_ORACLE_URL: &str = "http://127.0.0.1:8000/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const API_KEY_ENV: &str = "SERENDIPITY_API_KEY";

/// Answers every prompt with "no path". Used for dry runs.
#[derive(Debug, Default)]
pub struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    async fn complete_batch(&self, prompts: Vec<String>) -> Vec<OracleReply> {
        prompts.iter().map(|_| Ok("{}".to_string())).collect()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions backend.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
        })
    }

    async fn complete(&self, prompt: &str) -> OracleReply {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(failure)?;
        let parsed: ChatResponse = response.json().await.map_err(failure)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OracleFailure::Missing)
    }
}

fn failure(err: reqwest::Error) -> OracleFailure {
    if err.is_timeout() {
        OracleFailure::Timeout
    } else {
        OracleFailure::Transport(err.to_string())
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete_batch(&self, prompts: Vec<String>) -> Vec<OracleReply> {
        let mut tasks = JoinSet::new();
        let total = prompts.len();
        for (pos, prompt) in prompts.into_iter().enumerate() {
            let oracle = self.clone();
            tasks.spawn(async move { (pos, oracle.complete(&prompt).await) });
        }

        let mut replies: Vec<OracleReply> = vec![Err(OracleFailure::Missing); total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, reply)) => replies[pos] = reply,
                Err(e) => log::warn!("Oracle request task failed: {e}"),
            }
        }
        replies
    }
}
