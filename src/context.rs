// Application context
// Owns the long-lived handles shared by the CLI commands


use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::vectordb::{VectorDbProvider, create_vector_db_provider};
use crate::indexer::{ChunkSource, Indexer};
use crate::llm::{
    EmbeddingProvider, GenerationProvider, OllamaClient, PromptTemplates, TemplateResolver,
};
use crate::rag::RagService;

pub struct AppContext {
    pub config: Config,
    pub database: Arc<Database>,
    pub vector_db: Arc<dyn VectorDbProvider>,
    pub ollama: Arc<OllamaClient>,
    pub templates: Arc<PromptTemplates>,
}

impl AppContext {
    /// Connect the vector store, then open metadata storage and load templates.
    ///
    /// If anything after the vector store connection fails, the vector store
    /// is disconnected before the error is returned.
    #[inline]
    pub async fn initialize(config: Config) -> Result<Self> {
        let vector_db = create_vector_db_provider(&config);
        vector_db.connect().await?;
        info!("Connected {} vector store", config.vector_db.backend);

        match Self::open_services(&config).await {
            Ok((database, ollama, templates)) => Ok(Self {
                config,
                database: Arc::new(database),
                vector_db,
                ollama: Arc::new(ollama),
                templates: Arc::new(templates),
            }),
            Err(e) => {
                warn!("Initialization failed, disconnecting vector store: {}", e);
                if let Err(disconnect_err) = vector_db.disconnect().await {
                    warn!("Failed to disconnect vector store: {}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    async fn open_services(config: &Config) -> Result<(Database, OllamaClient, PromptTemplates)> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .context("Failed to initialize SQLite database")?;

        let services = PromptTemplates::load(&config.templates, &config.templates_dir_path())
            .and_then(|templates| Ok((OllamaClient::new(config)?, templates)));

        match services {
            Ok((ollama, templates)) => Ok((database, ollama, templates)),
            Err(e) => {
                database.close().await;
                Err(e)
            }
        }
    }

    #[inline]
    pub fn indexer(&self) -> Indexer {
        Indexer::from_config(
            &self.config,
            Arc::clone(&self.database) as Arc<dyn ChunkSource>,
            Arc::clone(&self.ollama) as Arc<dyn EmbeddingProvider>,
            Arc::clone(&self.vector_db),
        )
    }

    #[inline]
    pub fn rag_service(&self) -> RagService {
        RagService::new(
            Arc::clone(&self.ollama) as Arc<dyn EmbeddingProvider>,
            Arc::clone(&self.ollama) as Arc<dyn GenerationProvider>,
            Arc::clone(&self.vector_db),
            Arc::clone(&self.templates) as Arc<dyn TemplateResolver>,
        )
    }

    /// Release the metadata pool and the vector store connection
    #[inline]
    pub async fn shutdown(self) -> Result<()> {
        debug!("Shutting down application context");
        self.database.close().await;
        self.vector_db.disconnect().await
    }
}
