//! Blocking chat-completion client for OpenAI, Azure OpenAI and Ollama.

use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::llm::{
    CompletionClient, CompletionRequest, LlmConfig, LlmError, LlmProvider, LlmSettings, Role,
};

#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    provider: LlmProvider,
    settings: LlmSettings,
    timeout_secs: u64,
    http: HttpClient,
}

#[derive(Deserialize)]
struct OpenAIChatRes {
    choices: Vec<OpenAIChoice>,
}
#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}
#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}
#[derive(Deserialize)]
struct OllamaChatRes {
    message: OllamaMessage,
}
#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl HttpCompletionClient {
    pub fn new(provider: LlmProvider, settings: LlmSettings, timeout_secs: u64) -> Result<Self, LlmError> {
        let configured = match provider {
            LlmProvider::OpenAI => settings.openai.is_configured(),
            LlmProvider::Azure => settings.azure.is_configured(),
            LlmProvider::Ollama => settings.ollama.is_configured(),
        };
        if !configured {
            return Err(LlmError::NotConfigured(provider.display_name().to_string()));
        }
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { provider, settings, timeout_secs, http })
    }

    /// Client for the selected provider, if one is configured
    pub fn from_settings(settings: &LlmSettings, timeout_secs: u64) -> Option<Result<Self, LlmError>> {
        settings
            .active_provider()
            .map(|provider| Self::new(provider, settings.clone(), timeout_secs))
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Messages in the OpenAI chat layout; images ride on the last user turn
    fn openai_messages(request: &CompletionRequest) -> Vec<Value> {
        let mut out = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            out.push(json!({ "role": Role::System.to_string(), "content": system }));
        }
        let last_user = request.messages.iter().rposition(|m| m.role == Role::User);
        for (i, m) in request.messages.iter().enumerate() {
            if Some(i) == last_user && !request.images.is_empty() {
                let mut parts = vec![json!({ "type": "text", "text": m.content })];
                for image in &request.images {
                    parts.push(json!({ "type": "image_url", "image_url": { "url": image.data_url() } }));
                }
                out.push(json!({ "role": m.role.to_string(), "content": parts }));
            } else {
                out.push(json!({ "role": m.role.to_string(), "content": m.content }));
            }
        }
        out
    }

    fn ollama_messages(request: &CompletionRequest) -> Vec<Value> {
        let mut out = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            out.push(json!({ "role": Role::System.to_string(), "content": system }));
        }
        let last_user = request.messages.iter().rposition(|m| m.role == Role::User);
        for (i, m) in request.messages.iter().enumerate() {
            let mut msg = json!({ "role": m.role.to_string(), "content": m.content });
            if Some(i) == last_user && !request.images.is_empty() {
                let images: Vec<&str> = request.images.iter().map(|img| img.data.as_str()).collect();
                msg["images"] = json!(images);
            }
            out.push(msg);
        }
        out
    }

    fn send(&self, builder: reqwest::blocking::RequestBuilder, body: &Value) -> Result<reqwest::blocking::Response, LlmError> {
        let res = builder.json(body).send().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::Network(e.to_string())
            }
        })?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            warn!("{} completion failed: HTTP {}", self.provider, status);
            return Err(LlmError::from_status(status.as_u16(), body));
        }
        Ok(res)
    }

    fn complete_openai(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let cfg = &self.settings.openai;
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let body = json!({ "model": cfg.model, "messages": Self::openai_messages(request) });
        let res = self.send(self.http.post(url).bearer_auth(&cfg.api_key), &body)?;
        let parsed: OpenAIChatRes = res.json().map_err(|e| LlmError::Parse(e.to_string()))?;
        first_choice(parsed)
    }

    fn complete_azure(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let cfg = &self.settings.azure;
        // base_url points at the deployment root
        let url = format!(
            "{}/chat/completions?api-version={}",
            cfg.base_url.trim_end_matches('/'),
            cfg.api_version
        );
        let body = json!({ "messages": Self::openai_messages(request) });
        let res = self.send(self.http.post(url).header("api-key", &cfg.api_key), &body)?;
        let parsed: OpenAIChatRes = res.json().map_err(|e| LlmError::Parse(e.to_string()))?;
        first_choice(parsed)
    }

    fn complete_ollama(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let cfg = &self.settings.ollama;
        let url = format!("{}/api/chat", cfg.host.trim_end_matches('/'));
        let body = json!({ "model": cfg.model, "messages": Self::ollama_messages(request), "stream": false });
        let res = self.send(self.http.post(url), &body)?;
        let parsed: OllamaChatRes = res.json().map_err(|e| LlmError::Parse(e.to_string()))?;
        non_empty(parsed.message.content)
    }
}

fn first_choice(res: OpenAIChatRes) -> Result<String, LlmError> {
    let content = res
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    non_empty(content)
}

fn non_empty(content: String) -> Result<String, LlmError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        debug!(
            "{} completion with {} messages and {} images",
            self.provider,
            request.messages.len(),
            request.images.len()
        );
        match self.provider {
            LlmProvider::OpenAI => self.complete_openai(request),
            LlmProvider::Azure => self.complete_azure(request),
            LlmProvider::Ollama => self.complete_ollama(request),
        }
    }
}
