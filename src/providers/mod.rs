pub mod http;
pub mod llm;

pub use http::HttpCompletionClient;
pub use llm::{
    AzureOpenAiConfig, ChatMessage, CompletionClient, CompletionRequest, ImageAttachment, LlmConfig, LlmError,
    LlmProvider, LlmSettings, OllamaConfig, OpenAIConfig, Role,
};
