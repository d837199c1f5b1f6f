#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance with the configured models pulled
// Run with: cargo test --test integration_ollama -- --ignored

use rag_pipeline::config::{Config, OllamaConfig};
use rag_pipeline::llm::{
    ChatMessage, ChatRole, EmbeddingIntent, EmbeddingProvider, GenerationProvider, OllamaClient,
};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_config() -> Config {
    let mut config = Config {
        ollama: OllamaConfig {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_OLLAMA_PORT),
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    if let Ok(model) = env::var("OLLAMA_EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Ok(model) = env::var("OLLAMA_GENERATION_MODEL") {
        config.generation.model = model;
    }
    config.embedding.batch_size = 5;
    config
}

fn create_integration_test_client() -> OllamaClient {
    OllamaClient::new(&create_integration_test_config())
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(120))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot_product / (norm_a * norm_b)
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();

    info!("Testing health check against real Ollama instance");
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let client = create_integration_test_client();
    let models = client.list_models().expect("Model listing should succeed");

    assert!(
        !models.is_empty(),
        "Should have at least one model available"
    );
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_batch_embeddings() {
    init_test_tracing();

    let config = create_integration_test_config();
    let client = create_integration_test_client();

    // More texts than the batch size so the request is split
    let texts: Vec<String> = (0..7)
        .map(|i| {
            format!(
                "Document number {} about databases, indexing and vector search.",
                i + 1
            )
        })
        .collect();

    let embeddings = client
        .embed_blocking(&texts, EmbeddingIntent::Document)
        .expect("Batch embedding should succeed");

    assert_eq!(embeddings.len(), texts.len());
    for embedding in &embeddings {
        assert_eq!(embedding.len(), config.embedding.dimension as usize);
    }
    info!(
        "Generated {} embeddings with {} dimensions",
        embeddings.len(),
        config.embedding.dimension
    );
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_query_is_closest_to_related_document() {
    init_test_tracing();

    let client = create_integration_test_client();

    let documents = vec![
        "Cats are small domesticated carnivores that purr when content.".to_string(),
        "The stock market closed higher after the central bank announcement.".to_string(),
    ];
    let document_vectors = client
        .embed(&documents, EmbeddingIntent::Document)
        .await
        .expect("Document embedding should succeed");
    let query_vector = client
        .embed(&["Why do cats purr?".to_string()], EmbeddingIntent::Query)
        .await
        .and_then(|vectors| vectors.into_iter().next())
        .expect("Query embedding should succeed");

    let related = cosine_similarity(&query_vector, &document_vectors[0]);
    let unrelated = cosine_similarity(&query_vector, &document_vectors[1]);
    assert!(
        related > unrelated,
        "Related document should score higher ({} vs {})",
        related,
        unrelated
    );
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_chat_generation() {
    init_test_tracing();

    let client = create_integration_test_client();
    let history = vec![client.construct_message(
        "You answer with a single word.",
        ChatRole::System,
    )];

    let answer = client
        .generate("What color is the sky on a clear day?", &history)
        .await
        .expect("Generation should succeed");

    assert!(!answer.trim().is_empty());
    info!("Generated answer: {}", answer);
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_missing_model_fails() {
    init_test_tracing();

    let mut config = create_integration_test_config();
    config.generation.model = "non-existent-model-12345".to_string();

    let client = OllamaClient::new(&config)
        .expect("Client creation should succeed")
        .with_retry_attempts(1);

    assert!(client.health_check().is_err());
    assert!(
        client
            .chat_blocking("hello", &[ChatMessage::new(ChatRole::System, "hi")])
            .is_err()
    );
}
