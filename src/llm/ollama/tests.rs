use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: u32) -> Config {
    let address = server.address();
    let mut config = Config::default();
    config.ollama.host = address.ip().to_string();
    config.ollama.port = address.port();
    config.embedding.dimension = dimension;
    config
}

fn client_for(server: &MockServer, dimension: u32) -> OllamaClient {
    OllamaClient::new(&config_for(server, dimension))
        .expect("Failed to create client")
        .with_retry_attempts(1)
}

#[test]
fn client_configuration() {
    let mut config = Config::default();
    config.ollama.host = "test-host".to_string();
    config.ollama.port = 1234;
    config.embedding.batch_size = 128;

    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "nomic-embed-text:latest");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(client.embedding_dimension(), 768);
}

#[test]
fn missing_models_are_config_errors() {
    let mut config = Config::default();
    config.embedding.model = String::new();
    assert!(matches!(
        OllamaClient::new(&config),
        Err(ConfigError::MissingEmbeddingModel)
    ));

    let mut config = Config::default();
    config.generation.model = "  ".to_string();
    assert!(matches!(
        OllamaClient::new(&config),
        Err(ConfigError::MissingGenerationModel)
    ));
}

#[test]
fn process_text_truncates_and_trims() {
    let mut config = Config::default();
    config.generation.input_max_characters = 100;
    let client = OllamaClient::new(&config).expect("Failed to create client");

    let long = format!("  {}", "é".repeat(150));
    let processed = client.process_text(&long);
    assert_eq!(processed.chars().count(), 98);

    assert_eq!(client.process_text("  short  "), "short");
}

#[test]
fn construct_message_keeps_text() {
    let client = OllamaClient::new(&Config::default()).expect("Failed to create client");
    let message = client.construct_message("You answer questions.", ChatRole::System);

    assert_eq!(message.role, ChatRole::System);
    assert_eq!(message.content, "You answer questions.");
}

#[tokio::test]
async fn embed_sends_prefixed_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "nomic-embed-text:latest",
            "input": ["search_document: cats", "search_document: dogs"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let texts = vec!["cats".to_string(), "dogs".to_string()];
    let embeddings = client
        .embed(&texts, EmbeddingIntent::Document)
        .await
        .expect("should embed");

    assert_eq!(embeddings, vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);
}

#[tokio::test]
async fn query_intent_uses_query_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["search_query: pets"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let embeddings = client
        .embed(&["pets".to_string()], EmbeddingIntent::Query)
        .await
        .expect("should embed");
    assert_eq!(embeddings.len(), 1);
}

#[tokio::test]
async fn wrong_dimension_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 768);
    let embeddings = client
        .embed(&["pets".to_string()], EmbeddingIntent::Query)
        .await;
    assert!(embeddings.is_none());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server, 2)).expect("Failed to create client");
    let embeddings = client
        .embed(&["pets".to_string()], EmbeddingIntent::Query)
        .await;
    assert!(embeddings.is_none());
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 2).with_retry_attempts(2);
    let embeddings = client
        .embed(&["pets".to_string()], EmbeddingIntent::Query)
        .await;
    assert_eq!(embeddings, Some(vec![vec![1.0, 0.0]]));
}

#[tokio::test]
async fn generate_sends_history_then_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.2:latest",
            "stream": false,
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "What are cats?" }
            ],
            "options": { "num_predict": 1000 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2:latest",
            "message": { "role": "assistant", "content": "Small mammals." },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let history = vec![client.construct_message("Be brief.", ChatRole::System)];
    let answer = client.generate("What are cats?", &history).await;

    assert_eq!(answer.as_deref(), Some("Small mammals."));
}

#[tokio::test]
async fn generation_failure_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    assert!(client.generate("What are cats?", &[]).await.is_none());
}

#[tokio::test]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "nomic-embed-text:latest", "size": 1 }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let models = tokio::task::spawn_blocking(move || {
        let listed = client.list_models().map(|m| m.len());
        (listed.ok(), client.health_check().is_err())
    })
    .await
    .expect("task should finish");

    assert_eq!(models, (Some(1), true));
}
