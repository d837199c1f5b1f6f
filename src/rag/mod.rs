// RAG module
// Vector search over a project's collection and grounded answer generation


use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::sqlite::models::Project;
use crate::database::vectordb::{
    CollectionInfo, RetrievedDocument, VectorDbProvider, collection_name,
};
use crate::llm::{
    ChatMessage, ChatRole, EmbeddingIntent, EmbeddingProvider, GenerationProvider,
    TemplateResolver,
};
use crate::{RagError, Result};

const TEMPLATE_NAMESPACE: &str = "rag";

/// A generated answer together with what was sent to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub full_prompt: String,
    pub chat_history: Vec<ChatMessage>,
}

pub struct RagService {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    vector_db: Arc<dyn VectorDbProvider>,
    templates: Arc<dyn TemplateResolver>,
}

impl RagService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        vector_db: Arc<dyn VectorDbProvider>,
        templates: Arc<dyn TemplateResolver>,
    ) -> Self {
        Self {
            embedder,
            generator,
            vector_db,
            templates,
        }
    }

    fn collection_for(&self, project: &Project) -> String {
        collection_name(self.embedder.embedding_dimension(), &project.project_id)
    }

    /// Documents most similar to `query`, best first; `None` when nothing matched
    #[inline]
    pub async fn search(
        &self,
        project: &Project,
        query: &str,
        limit: usize,
    ) -> Result<Option<Vec<RetrievedDocument>>> {
        let Some(vector) = self
            .embedder
            .embed(&[query.to_string()], EmbeddingIntent::Query)
            .await
            .and_then(|vectors| vectors.into_iter().next())
        else {
            debug!("No query vector for project {}", project.project_id);
            return Ok(None);
        };

        let collection = self.collection_for(project);
        let results = self
            .vector_db
            .search_by_vector(&collection, &vector, limit)
            .await?;

        match &results {
            Some(documents) => debug!("Found {} documents in {}", documents.len(), collection),
            None => debug!("No documents found in {}", collection),
        }
        Ok(results)
    }

    /// Answer `query` from the project's most relevant documents.
    ///
    /// Returns `None` without calling the generator when the search finds
    /// nothing. Documents appear in the prompt in search order.
    #[inline]
    pub async fn answer(
        &self,
        project: &Project,
        query: &str,
        limit: usize,
    ) -> Result<Option<RagAnswer>> {
        let Some(documents) = self.search(project, query, limit).await? else {
            info!(
                "No grounding documents for project {}, skipping generation",
                project.project_id
            );
            return Ok(None);
        };

        let system_prompt = self
            .templates
            .render(TEMPLATE_NAMESPACE, "system_prompt", &[])?;
        let chat_history = vec![
            self.generator
                .construct_message(&system_prompt, ChatRole::System),
        ];

        let documents_prompt = documents
            .iter()
            .enumerate()
            .map(|(idx, document)| {
                let doc_num = (idx + 1).to_string();
                let chunk_text = self.generator.process_text(&document.text);
                self.templates.render(
                    TEMPLATE_NAMESPACE,
                    "document_prompt",
                    &[("doc_num", doc_num.as_str()), ("chunk_text", chunk_text.as_str())],
                )
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .join("\n");

        let footer_prompt =
            self.templates
                .render(TEMPLATE_NAMESPACE, "footer_prompt", &[("query", query)])?;

        let full_prompt = [documents_prompt, footer_prompt].join("\n\n");

        let answer = self
            .generator
            .generate(&full_prompt, &chat_history)
            .await
            .ok_or_else(|| RagError::Generation("generation backend returned no text".into()))?;

        Ok(Some(RagAnswer {
            answer,
            full_prompt,
            chat_history,
        }))
    }

    #[inline]
    pub async fn collection_info(&self, project: &Project) -> Result<CollectionInfo> {
        self.vector_db
            .get_collection_info(&self.collection_for(project))
            .await
    }

    /// Drop the project's collection; `false` when there was none
    #[inline]
    pub async fn reset_collection(&self, project: &Project) -> Result<bool> {
        self.vector_db
            .delete_collection(&self.collection_for(project))
            .await
    }
}
