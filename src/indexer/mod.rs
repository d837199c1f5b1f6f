// Indexer module
// Pages a project's chunks from the relational store into its vector collection


use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::sqlite::models::{DataChunk, Project};
use crate::database::vectordb::{
    CollectionCreation, VectorDbProvider, VectorRecord, collection_name,
};
use crate::llm::{EmbeddingIntent, EmbeddingProvider};
use crate::{RagError, Result};

/// Paginated supplier of a project's chunks
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// One page in stable order; pages start at 1 and an empty page means no more data
    async fn get_page(&self, project_id: i64, page_no: u32, page_size: u32)
    -> Result<Vec<DataChunk>>;

    /// Advisory only; may be stale by the time pages are read
    async fn total_count(&self, project_id: i64) -> Result<u64>;
}

/// Embeds project chunks and stores them in the project's collection
pub struct Indexer {
    source: Arc<dyn ChunkSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_db: Arc<dyn VectorDbProvider>,
    page_size: u32,
    insert_batch_size: usize,
}

impl Indexer {
    #[inline]
    pub fn new(
        source: Arc<dyn ChunkSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorDbProvider>,
        page_size: u32,
        insert_batch_size: usize,
    ) -> Self {
        Self {
            source,
            embedder,
            vector_db,
            page_size: page_size.max(1),
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    #[inline]
    pub fn from_config(
        config: &Config,
        source: Arc<dyn ChunkSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorDbProvider>,
    ) -> Self {
        Self::new(
            source,
            embedder,
            vector_db,
            config.indexing.page_size,
            config.vector_db.insert_batch_size,
        )
    }

    /// Index every chunk of `project`, returning how many records were inserted.
    ///
    /// With `reset` the collection is dropped and recreated first. A failure
    /// after the collection exists is reported as `PartialIngestion` with the
    /// number of records already written, including batches committed from
    /// the failing page; re-run with `reset` to get a consistent collection.
    #[inline]
    pub async fn index_project(&self, project: &Project, reset: bool) -> Result<usize> {
        let dimension = self.embedder.embedding_dimension();
        let collection = collection_name(dimension, &project.project_id);

        match self
            .vector_db
            .create_collection(&collection, dimension, reset)
            .await?
        {
            CollectionCreation::Created => info!("Created collection {}", collection),
            CollectionCreation::AlreadyExists => {
                debug!("Collection {} already exists", collection);
            }
        }

        match self.source.total_count(project.id).await {
            Ok(total) => info!(
                "Indexing {} chunks of project {} into {}",
                total, project.project_id, collection
            ),
            Err(e) => warn!(
                "Could not count chunks for project {}: {}",
                project.project_id, e
            ),
        }

        let mut inserted = 0;
        let mut page_no = 1;

        loop {
            match self.index_page(project, &collection, page_no).await {
                Ok(0) => break,
                Ok(count) => {
                    inserted += count;
                    debug!(
                        "Indexed page {} of project {} ({} records so far)",
                        page_no, project.project_id, inserted
                    );
                    page_no += 1;
                }
                Err(e) => {
                    let (committed, cause) = match e {
                        RagError::PartialInsert {
                            inserted: committed,
                            source,
                        } => (committed, *source),
                        other => (0, other),
                    };
                    inserted += committed;
                    error!(
                        "Indexing project {} stopped at page {} after {} records: {}",
                        project.project_id, page_no, inserted, cause
                    );
                    return Err(RagError::PartialIngestion {
                        inserted,
                        reason: cause.to_string(),
                    });
                }
            }
        }

        info!(
            "Indexed {} records for project {} into {}",
            inserted, project.project_id, collection
        );
        Ok(inserted)
    }

    /// Returns the number of records inserted; zero means the page was empty
    async fn index_page(&self, project: &Project, collection: &str, page_no: u32) -> Result<usize> {
        let chunks = self
            .source
            .get_page(project.id, page_no, self.page_size)
            .await?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.chunk_text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts, EmbeddingIntent::Document)
            .await
            .ok_or_else(|| RagError::Embedding("embedding backend returned no vectors".into()))?;

        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                id: chunk.id,
                vector,
                metadata: chunk.metadata(),
                text: chunk.chunk_text,
            })
            .collect();

        self.vector_db
            .insert_many(collection, &records, self.insert_batch_size)
            .await
    }
}
