// Vector database module
// Named collections of embeddings behind a provider trait, with LanceDB and in-memory engines


pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::{RagError, Result};
use crate::config::Config;

/// A vector plus the payload it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Record identifier, equal to the owning chunk id
    pub id: i64,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// One search hit; higher scores are more relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: i64,
    /// Engine-native similarity, not normalized across engines
    pub score: f32,
    pub text: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub record_count: usize,
    pub distance: DistanceMethod,
}

/// Outcome of `create_collection`; both variants are success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionCreation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMethod {
    Cosine,
    Dot,
    L2,
}

impl DistanceMethod {
    pub const ALL: &'static [Self] = &[Self::Cosine, Self::Dot, Self::L2];
}

impl fmt::Display for DistanceMethod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
            Self::L2 => write!(f, "l2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDbBackend {
    #[serde(rename = "lancedb")]
    LanceDb,
    Memory,
}

impl VectorDbBackend {
    pub const ALL: &'static [Self] = &[Self::LanceDb, Self::Memory];
}

impl fmt::Display for VectorDbBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LanceDb => write!(f, "lancedb"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Collection that holds a project's vectors for a given embedding size.
///
/// Every component that creates, resets, inserts into or searches a
/// collection derives the name through this function.
#[inline]
pub fn collection_name(embedding_dimension: usize, project_id: &str) -> String {
    format!("collection_{}_{}", embedding_dimension, project_id.trim())
}

/// Trimmed project id, if it can be embedded in a collection name.
///
/// Collection names double as table names, so only ASCII letters, digits,
/// `_`, `-` and `.` are accepted.
#[inline]
pub fn validate_project_id(project_id: &str) -> Result<&str> {
    let trimmed = project_id.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(trimmed)
    } else {
        Err(RagError::InvalidProjectId(project_id.to_string()))
    }
}

/// Wrap a batch failure with the number of records committed before it
pub(crate) fn partial_insert(inserted: usize, error: RagError) -> RagError {
    if inserted == 0 {
        error
    } else {
        RagError::PartialInsert {
            inserted,
            source: Box::new(error),
        }
    }
}

/// Storage engine for named vector collections.
///
/// Every call other than `connect` fails with a vector database error while
/// the provider is disconnected.
#[async_trait]
pub trait VectorDbProvider: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Collection names in ascending order
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Fails with `CollectionNotFound` when the collection does not exist
    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// Returns `true` when a collection was dropped, `false` when none existed
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Create a collection bound to `dimension`.
    ///
    /// With `reset` any existing collection of that name is dropped first.
    /// Without it an existing collection is left untouched and reported as
    /// `AlreadyExists`.
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        reset: bool,
    ) -> Result<CollectionCreation>;

    async fn insert_one(&self, name: &str, record: VectorRecord) -> Result<()> {
        self.insert_many(name, &[record], 1).await.map(|_| ())
    }

    /// Insert records in sequential batches of at most `batch_size`.
    ///
    /// A record whose vector length differs from the collection dimension
    /// fails the call with `DimensionMismatch` before its batch is written.
    /// Batches are committed independently, so batches written before a
    /// failure persist; the error is then wrapped in `PartialInsert` with the
    /// number of committed records. Records with an existing id overwrite it.
    async fn insert_many(
        &self,
        name: &str,
        records: &[VectorRecord],
        batch_size: usize,
    ) -> Result<usize>;

    /// Nearest neighbours by descending score, at most `limit` of them.
    ///
    /// `None` when the collection is missing or empty, or nothing matched.
    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Option<Vec<RetrievedDocument>>>;
}

/// Build the provider selected in configuration. The provider is returned
/// disconnected.
#[inline]
pub fn create_vector_db_provider(config: &Config) -> Arc<dyn VectorDbProvider> {
    let distance = config.vector_db.distance;
    match config.vector_db.backend {
        VectorDbBackend::LanceDb => Arc::new(self::lancedb::LanceDbProvider::new(
            config.vector_database_path(),
            distance,
        )),
        VectorDbBackend::Memory => Arc::new(self::memory::MemoryProvider::new(distance)),
    }
}
