// LLM module
// Embedding and generation capabilities, the Ollama backend and prompt templates


pub mod ollama;
pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use ollama::OllamaClient;
pub use templates::{PromptTemplates, TemplateResolver};

/// Whether text is embedded for storage or for searching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingIntent {
    Document,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Turns text into vectors.
///
/// Backend failures are logged and reported as `None`, never raised.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider returns
    fn embedding_dimension(&self) -> usize;

    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Option<Vec<Vec<f32>>>;
}

/// Produces text from a prompt and chat history.
///
/// Backend failures are logged and reported as `None`, never raised.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Normalize text so it fits the backend's input limit
    fn process_text(&self, text: &str) -> String;

    fn construct_message(&self, text: &str, role: ChatRole) -> ChatMessage;

    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Option<String>;
}
