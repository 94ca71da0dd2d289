//! LLM provider configuration and the completion boundary used by the assistant.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum LlmProvider {
    Azure,
    #[default]
    OpenAI,
    Ollama,
}

impl LlmProvider {
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Azure => "Azure OpenAI",
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Ollama => "Ollama",
        }
    }
}

pub trait LlmConfig {
    /// Returns true if the configuration is considered valid & complete, otherwise false.
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl LlmConfig for OpenAIConfig {
    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.base_url.trim().is_empty() && !self.model.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureOpenAiConfig {
    pub api_key: String,
    /// Deployment root, e.g. `https://<resource>.openai.azure.com/openai/deployments/<deployment>`
    pub base_url: String,
    pub api_version: String,
}

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            api_version: "2024-06-01".to_string(),
        }
    }
}

impl LlmConfig for AzureOpenAiConfig {
    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.base_url.trim().is_empty() && !self.api_version.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

impl LlmConfig for OllamaConfig {
    fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && !self.model.trim().is_empty()
    }
}

/// Provider selection plus per-provider settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `None` disables the external model entirely
    pub provider: Option<LlmProvider>,
    pub openai: OpenAIConfig,
    pub azure: AzureOpenAiConfig,
    pub ollama: OllamaConfig,
}

impl LlmSettings {
    /// Fill empty API keys from the usual environment variables
    pub fn with_env_keys(mut self) -> Self {
        if self.openai.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.openai.api_key = key;
            }
        }
        if self.azure.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("AZURE_OPENAI_API_KEY") {
                self.azure.api_key = key;
            }
        }
        self
    }

    /// The selected provider, if it is fully configured
    pub fn active_provider(&self) -> Option<LlmProvider> {
        let provider = self.provider?;
        let ready = match provider {
            LlmProvider::OpenAI => self.openai.is_configured(),
            LlmProvider::Azure => self.azure.is_configured(),
            LlmProvider::Ollama => self.ollama.is_configured(),
        };
        ready.then_some(provider)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed (HTTP {0})")]
    Auth(u16),
    #[error("quota or rate limit exceeded")]
    Quota,
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not parse response: {0}")]
    Parse(String),
    #[error("model returned an empty answer")]
    EmptyResponse,
}

impl LlmError {
    /// Map a non-success status code
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LlmError::Auth(status),
            429 => LlmError::Quota,
            _ => LlmError::Http { status, body },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// An image passed through to the model unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Base64 payload, without a `data:` prefix
    pub data: String,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One completion call: system prompt, conversation, and images for the last user turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub images: Vec<ImageAttachment>,
}

pub trait CompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}
