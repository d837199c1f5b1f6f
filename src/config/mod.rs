// Configuration management
// TOML settings for the Ollama backend, vector store, indexing and prompt templates

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, GenerationConfig, IndexingConfig, OllamaConfig,
    TemplateConfig, VectorDbConfig,
};

