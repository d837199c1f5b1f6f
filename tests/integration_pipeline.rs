#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests over on-disk SQLite and LanceDB, with
// deterministic keyword embeddings standing in for Ollama

use async_trait::async_trait;
use rag_pipeline::RagError;
use rag_pipeline::commands::add_document;
use rag_pipeline::config::Config;
use rag_pipeline::context::AppContext;
use rag_pipeline::database::sqlite::Database;
use rag_pipeline::database::sqlite::models::NewDataChunk;
use rag_pipeline::database::vectordb::lancedb::LanceDbProvider;
use rag_pipeline::database::vectordb::{DistanceMethod, VectorDbProvider};
use rag_pipeline::indexer::{ChunkSource, Indexer};
use rag_pipeline::llm::{
    ChatMessage, ChatRole, EmbeddingIntent, EmbeddingProvider, GenerationProvider,
    PromptTemplates, TemplateResolver,
};
use rag_pipeline::rag::RagService;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const VOCABULARY: [&str; 4] = ["cat", "dog", "fish", "bird"];

/// One dimension per vocabulary word, counting occurrences
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn embedding_dimension(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, texts: &[String], _intent: EmbeddingIntent) -> Option<Vec<Vec<f32>>> {
        Some(
            texts
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    VOCABULARY
                        .iter()
                        .map(|word| text.matches(word).count() as f32 + 0.01)
                        .collect()
                })
                .collect(),
        )
    }
}

struct CannedGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for CannedGenerator {
    fn process_text(&self, text: &str) -> String {
        text.trim().to_string()
    }

    fn construct_message(&self, text: &str, role: ChatRole) -> ChatMessage {
        ChatMessage::new(role, text)
    }

    async fn generate(&self, _prompt: &str, _history: &[ChatMessage]) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some("Cats purr when content.".to_string())
    }
}

struct Pipeline {
    database: Arc<Database>,
    vector_db: Arc<LanceDbProvider>,
    generator: Arc<CannedGenerator>,
    _temp_dir: TempDir,
}

impl Pipeline {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let database = Database::initialize_from_config_dir(temp_dir.path())
            .await
            .expect("should open database");
        let vector_db =
            LanceDbProvider::new(temp_dir.path().join("vectors"), DistanceMethod::Cosine);
        vector_db.connect().await.expect("should connect");

        Self {
            database: Arc::new(database),
            vector_db: Arc::new(vector_db),
            generator: Arc::new(CannedGenerator {
                calls: AtomicUsize::new(0),
            }),
            _temp_dir: temp_dir,
        }
    }

    fn indexer(&self, page_size: u32) -> Indexer {
        Indexer::new(
            Arc::clone(&self.database) as Arc<dyn ChunkSource>,
            Arc::new(KeywordEmbedder),
            Arc::clone(&self.vector_db) as Arc<dyn VectorDbProvider>,
            page_size,
            2,
        )
    }

    fn rag_service(&self) -> RagService {
        let templates = PromptTemplates::new(&Default::default());
        RagService::new(
            Arc::new(KeywordEmbedder),
            Arc::clone(&self.generator) as Arc<dyn GenerationProvider>,
            Arc::clone(&self.vector_db) as Arc<dyn VectorDbProvider>,
            Arc::new(templates) as Arc<dyn TemplateResolver>,
        )
    }

    async fn seed(&self, project_id: &str, texts: &[&str]) -> i64 {
        let project = self
            .database
            .get_or_create_project(project_id)
            .await
            .expect("should create project");
        let chunks: Vec<NewDataChunk> = texts
            .iter()
            .enumerate()
            .map(|(order, text)| NewDataChunk {
                project_id: project.id,
                asset_id: None,
                chunk_text: (*text).to_string(),
                chunk_metadata: json!({ "source": "fixture", "chunk_order": order }),
                chunk_order: order as i64,
            })
            .collect();
        self.database
            .insert_chunks(&chunks, 10)
            .await
            .expect("should insert chunks");
        project.id
    }
}

#[tokio::test]
async fn index_search_and_answer() {
    let pipeline = Pipeline::new().await;
    pipeline
        .seed(
            "p1",
            &[
                "The cat sat on the mat. A cat purrs.",
                "A dog barks at the mail carrier.",
                "Fish swim in the bowl.",
                "The bird sings at dawn.",
                "Another dog fetches the ball.",
            ],
        )
        .await;
    let project = pipeline
        .database
        .get_project("p1")
        .await
        .expect("should load project")
        .expect("project should exist");

    let inserted = pipeline
        .indexer(2)
        .index_project(&project, false)
        .await
        .expect("should index");
    assert_eq!(inserted, 5);

    let service = pipeline.rag_service();
    let info = service
        .collection_info(&project)
        .await
        .expect("should describe collection");
    assert_eq!(info.name, "collection_4_p1");
    assert_eq!(info.dimension, 4);
    assert_eq!(info.record_count, 5);

    let hits = service
        .search(&project, "tell me about the cat", 2)
        .await
        .expect("should search")
        .expect("should find documents");
    assert_eq!(hits.len(), 2);
    assert!(hits[0].text.contains("cat"));
    assert!(hits[0].score >= hits[1].score);
    assert_eq!(hits[0].metadata["source"], "fixture");

    let answer = service
        .answer(&project, "what does the cat do?", 1)
        .await
        .expect("should answer")
        .expect("should have an answer");
    assert_eq!(answer.answer, "Cats purr when content.");
    assert!(
        answer
            .full_prompt
            .starts_with("## Document No: 1\n### Content: The cat sat on the mat.")
    );
    assert!(answer.full_prompt.contains("what does the cat do?"));
    assert_eq!(answer.chat_history.len(), 1);
    assert_eq!(answer.chat_history[0].role, ChatRole::System);
    assert_eq!(pipeline.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn projects_use_separate_collections() {
    let pipeline = Pipeline::new().await;
    pipeline.seed("cats", &["cat cat cat"]).await;
    pipeline.seed("dogs", &["dog", "dog dog"]).await;

    for project_id in ["cats", "dogs"] {
        let project = pipeline
            .database
            .get_project(project_id)
            .await
            .expect("should load project")
            .expect("project should exist");
        pipeline
            .indexer(10)
            .index_project(&project, false)
            .await
            .expect("should index");
    }

    let collections = pipeline
        .vector_db
        .list_collections()
        .await
        .expect("should list collections");
    assert_eq!(collections, vec!["collection_4_cats", "collection_4_dogs"]);

    let cats = pipeline
        .vector_db
        .get_collection_info("collection_4_cats")
        .await
        .expect("should describe collection");
    assert_eq!(cats.record_count, 1);
}

#[tokio::test]
async fn reset_reindex_matches_relational_store() {
    let pipeline = Pipeline::new().await;
    let project_row = pipeline.seed("p1", &["cat", "dog", "fish"]).await;
    let project = pipeline
        .database
        .get_project("p1")
        .await
        .expect("should load project")
        .expect("project should exist");

    pipeline
        .indexer(2)
        .index_project(&project, false)
        .await
        .expect("first index");

    // Replace the project's chunks, then rebuild the collection from scratch
    pipeline
        .database
        .delete_project_chunks(project_row)
        .await
        .expect("should delete chunks");
    pipeline.seed("p1", &["bird"]).await;

    let inserted = pipeline
        .indexer(2)
        .index_project(&project, true)
        .await
        .expect("reset index");
    assert_eq!(inserted, 1);

    let info = pipeline
        .rag_service()
        .collection_info(&project)
        .await
        .expect("should describe collection");
    assert_eq!(info.record_count, 1);
}

#[tokio::test]
async fn answer_without_collection_skips_generation() {
    let pipeline = Pipeline::new().await;
    pipeline.seed("p1", &["cat"]).await;
    let project = pipeline
        .database
        .get_project("p1")
        .await
        .expect("should load project")
        .expect("project should exist");

    let answer = pipeline
        .rag_service()
        .answer(&project, "cat?", 3)
        .await
        .expect("should not fail");

    assert!(answer.is_none());
    assert_eq!(pipeline.generator.calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        pipeline.rag_service().collection_info(&project).await,
        Err(RagError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn add_document_through_app_context() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load default config");
    let context = AppContext::initialize(config)
        .await
        .expect("should initialize");

    let document = temp_dir.path().join("cats.txt");
    std::fs::write(
        &document,
        "Cats are small carnivorous mammals.\n\nThey purr when they are content.",
    )
    .expect("should write document");

    let first = add_document(&context, "p1", &document, false)
        .await
        .expect("should add document");
    assert!(first > 0);

    // Re-adding the same file replaces its chunks instead of duplicating them
    let second = add_document(&context, "p1", &document, false)
        .await
        .expect("should add document again");
    assert_eq!(first, second);

    let project = context
        .database
        .get_project("p1")
        .await
        .expect("should load project")
        .expect("project should exist");
    let stored = context
        .database
        .count_project_chunks(project.id)
        .await
        .expect("should count chunks");
    assert_eq!(stored, first as u64);

    let assets = context
        .database
        .list_assets(project.id)
        .await
        .expect("should list assets");
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].asset_name, "cats.txt");

    let indexer = Indexer::from_config(
        &context.config,
        Arc::clone(&context.database) as Arc<dyn ChunkSource>,
        Arc::new(KeywordEmbedder),
        Arc::clone(&context.vector_db),
    );
    let inserted = indexer
        .index_project(&project, false)
        .await
        .expect("should index");
    assert_eq!(inserted, first);
    assert!(
        context
            .vector_db
            .collection_exists("collection_4_p1")
            .await
            .expect("should check collection")
    );

    context.shutdown().await.expect("should shut down");
}

#[tokio::test]
async fn add_document_rejects_unusable_project_id() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load default config");
    let context = AppContext::initialize(config)
        .await
        .expect("should initialize");

    let document = temp_dir.path().join("cats.txt");
    std::fs::write(&document, "Cats purr when they are content.")
        .expect("should write document");

    let result = add_document(&context, "my project", &document, false).await;
    assert!(
        matches!(result, Err(RagError::InvalidProjectId(ref id)) if id == "my project"),
        "unexpected result: {:?}",
        result
    );

    // Nothing was written to either store
    assert!(
        context
            .database
            .list_projects()
            .await
            .expect("should list projects")
            .is_empty()
    );
    assert!(
        context
            .vector_db
            .list_collections()
            .await
            .expect("should list collections")
            .is_empty()
    );

    context.shutdown().await.expect("should shut down");
}
