//! OpenAI-compatible chat completion generator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator};
use crate::{Error, Result};

/// Groq's OpenAI-compatible endpoint
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Build the message list: system prompt, history, then the user message
fn build_messages(request: &GenerationRequest<'_>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(Message {
        role: "system",
        content: request.system_prompt.to_string(),
    });

    messages.extend(request.history.iter().map(|turn| Message {
        role: turn.role.as_str(),
        content: turn.text.clone(),
    }));

    let content = match request.context.filter(|c| !c.trim().is_empty()) {
        Some(context) => format!(
            "Relevant information: {context}\n\nUser question: {}",
            request.user_text
        ),
        None => request.user_text.to_string(),
    };
    messages.push(Message {
        role: "user",
        content,
    });

    messages
}

/// Generates replies through a chat completions API
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionGenerator {
    /// Create a generator against an OpenAI-compatible endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, base_url: impl Into<String>, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "API key required for response generation".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            max_tokens: 1024,
            temperature: 0.7,
        })
    }

    /// Create a generator against Groq
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn groq(api_key: String, model: String) -> Result<Self> {
        Self::new(api_key, GROQ_API_BASE, model)
    }

    #[must_use]
    pub const fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl Generator for ChatCompletionGenerator {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn generate_reply(&self, request: GenerationRequest<'_>) -> Result<Option<String>> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: build_messages(&request),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        };

        tracing::debug!(
            model = %self.model,
            messages = body.messages.len(),
            has_context = request.context.is_some(),
            "requesting completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "completion request failed");
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Llm(format!("completion API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("failed to parse completion response: {e}")))?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if reply.is_none() {
            tracing::warn!(model = %self.model, "completion returned no content");
        }
        Ok(reply)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "completion API health check failed");
                false
            }
        }
    }
}
