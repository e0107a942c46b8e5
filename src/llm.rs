//! Answer generation with a chat-completion model.
//!
//! Retrieved chunks are rendered into a numbered context block
//! (`[Source 1: <title> from <source>]`) so the model can cite them.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{openai_api_key, LlmConfig};
use crate::embedding::send_with_retry;
use crate::models::StoryChunk;

/// Returned instead of calling the model when retrieval found nothing.
pub const NO_CONTEXT_RESPONSE: &str =
    "I couldn't find any relevant stories to answer your query.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about stories.
When answering, reference the specific sources provided. Be accurate and cite which source
each piece of information comes from using [Source 1], [Source 2], etc.";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Answer `query` using `context` as the only source material.
    async fn generate_response(&self, query: &str, context: &[StoryChunk]) -> Result<String>;
}

/// Render chunks as `[Source i: title from source]` blocks separated by `---`.
pub fn build_context(chunks: &[StoryChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let title = chunk.metadata.title.as_deref().unwrap_or("Untitled");
            let source = if chunk.metadata.source.is_empty() {
                "Unknown"
            } else {
                chunk.metadata.source.as_str()
            };
            format!(
                "[Source {}: {} from {}]\n{}\n",
                i + 1,
                title,
                source,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn build_user_prompt(query: &str, chunks: &[StoryChunk]) -> String {
    format!(
        "Based on the following story excerpts, please answer this question: {}\n\n\
         Story Excerpts:\n{}\n\n\
         Please provide a comprehensive answer with citations.",
        query,
        build_context(chunks)
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat-completions client (`POST {url}/chat/completions`).
///
/// `OPENAI_API_KEY` is read at construction and only required when a prompt
/// is sent.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = openai_api_key().ok();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_response(&self, query: &str, context: &[StoryChunk]) -> Result<String> {
        if context.is_empty() {
            return Ok(NO_CONTEXT_RESPONSE.to_string());
        }

        let api_key = match &self.api_key {
            Some(key) => key,
            None => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let user_prompt = build_user_prompt(query, context);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.temperature,
        };

        let request = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(api_key)
            .json(&body);

        let json = send_with_retry(request, self.max_retries, "OpenAI").await?;
        tracing::debug!(model = %self.model, sources = context.len(), "chat completion received");
        parse_chat_response(json)
    }
}

fn parse_chat_response(json: serde_json::Value) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_value(json)
        .map_err(|e| anyhow!("Invalid chat completion response: {}", e))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("Chat completion returned no content"))
}
