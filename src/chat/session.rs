use crate::chat::orchestrator::{Orchestrator, Reply};
use crate::providers::{ChatMessage, ImageAttachment, Role};

/// Conversation history for one user
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Ask a question with the earlier turns as context, and record both sides
    pub fn ask(&mut self, orchestrator: &Orchestrator<'_>, prompt: &str, images: &[ImageAttachment]) -> Reply {
        let reply = orchestrator.respond(prompt, &self.messages, images);
        self.messages.push(ChatMessage::new(Role::User, prompt));
        self.messages.push(ChatMessage::new(Role::Assistant, reply.text.clone()));
        reply
    }
}
