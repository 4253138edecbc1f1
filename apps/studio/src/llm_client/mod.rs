/// LLM Client: the single point of entry for all chat-completion calls.
///
/// ARCHITECTURAL RULE: No other module may call the DeepSeek API directly.
/// All LLM interactions MUST go through this module.
///
/// Models are hardcoded per use (see `ChatModel`) so the generator and
/// evaluator cannot drift onto each other's model.
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// OpenAI-compatible DeepSeek endpoint root.
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// The two model variants the studio talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatModel {
    /// Fast conversational model, used to draft posts.
    Chat,
    /// Reasoning model, used to critique posts.
    Reasoner,
}

impl ChatModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatModel::Chat => "deepseek-chat",
            ChatModel::Reasoner => "deepseek-reasoner",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    /// Final answer. The reasoner's `reasoning_content` is ignored.
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text content of the first choice, if any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// A single outbound chat-completion: one system message, one user message.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub model: ChatModel,
    pub system: &'a str,
    pub prompt: &'a str,
    pub max_tokens: Option<u32>,
}

/// The single LLM client shared by the post generator and evaluator.
/// One request per call: no retries, and the reqwest default timeout applies.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEEPSEEK_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Makes a raw call to the chat-completions endpoint, returning the full response object.
    pub async fn call(&self, completion: Completion<'_>) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: completion.model.as_str(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: completion.system,
                },
                ChatMessage {
                    role: "user",
                    content: completion.prompt,
                },
            ],
            max_tokens: completion.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let chat_response: ChatResponse = serde_json::from_slice(&body)?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                "LLM call succeeded: model={}, prompt_tokens={}, completion_tokens={}",
                completion.model.as_str(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(chat_response)
    }

    /// Calls the LLM and returns the first choice's content verbatim.
    pub async fn call_text(&self, completion: Completion<'_>) -> Result<String, LlmError> {
        let response = self.call(completion).await?;
        response
            .text()
            .map(str::to_owned)
            .ok_or(LlmError::EmptyContent)
    }
}
