use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Vector database error: {0}")]
    VectorDb(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Insert stopped after {inserted} records: {source}")]
    PartialInsert {
        inserted: usize,
        source: Box<RagError>,
    },

    #[error("Invalid project id '{0}': use letters, digits, '_', '-' or '.'")]
    InvalidProjectId(String),

    #[error("Ingestion aborted after {inserted} records: {reason}")]
    PartialIngestion { inserted: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod indexer;
pub mod llm;
pub mod rag;
