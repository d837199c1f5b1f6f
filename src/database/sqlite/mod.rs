use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::RagError;
use crate::database::sqlite::models::{Asset, DataChunk, NewAsset, NewDataChunk, Project};
use crate::database::sqlite::queries::{AssetQueries, ChunkQueries, ProjectQueries};
use crate::database::vectordb::validate_project_id;
use crate::indexer::ChunkSource;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(&db_path).await
    }

    #[inline]
    pub async fn close(&self) {
        debug!("Closing database connection pool");
        self.pool.close().await;
    }

    // Project operations

    /// Fails with [`RagError::InvalidProjectId`] before touching the database
    /// when the id cannot name a vector collection.
    #[inline]
    pub async fn get_or_create_project(&self, project_id: &str) -> Result<Project> {
        let project_id = validate_project_id(project_id)?;
        ProjectQueries::get_or_create(&self.pool, project_id).await
    }

    #[inline]
    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let project_id = validate_project_id(project_id)?;
        ProjectQueries::get_by_project_id(&self.pool, project_id).await
    }

    #[inline]
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        ProjectQueries::list_all(&self.pool).await
    }

    // Asset operations
    #[inline]
    pub async fn create_asset(&self, asset: NewAsset) -> Result<Asset> {
        let project_id = asset.project_id;
        let asset = AssetQueries::create(&self.pool, asset).await?;
        ProjectQueries::touch(&self.pool, project_id).await?;
        Ok(asset)
    }

    #[inline]
    pub async fn list_assets(&self, project_id: i64) -> Result<Vec<Asset>> {
        AssetQueries::list_by_project(&self.pool, project_id).await
    }

    // Chunk operations
    #[inline]
    pub async fn insert_chunks(&self, chunks: &[NewDataChunk], batch_size: usize) -> Result<usize> {
        ChunkQueries::insert_many(&self.pool, chunks, batch_size).await
    }

    #[inline]
    pub async fn get_project_chunks(
        &self,
        project_id: i64,
        page_no: u32,
        page_size: u32,
    ) -> Result<Vec<DataChunk>> {
        ChunkQueries::get_project_chunks(&self.pool, project_id, page_no, page_size).await
    }

    #[inline]
    pub async fn count_project_chunks(&self, project_id: i64) -> Result<u64> {
        let count = ChunkQueries::count_by_project(&self.pool, project_id).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[inline]
    pub async fn delete_project_chunks(&self, project_id: i64) -> Result<u64> {
        ChunkQueries::delete_by_project(&self.pool, project_id).await
    }
}

#[async_trait]
impl ChunkSource for Database {
    async fn get_page(
        &self,
        project_id: i64,
        page_no: u32,
        page_size: u32,
    ) -> crate::Result<Vec<DataChunk>> {
        self.get_project_chunks(project_id, page_no, page_size)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))
    }

    async fn total_count(&self, project_id: i64) -> crate::Result<u64> {
        self.count_project_chunks(project_id)
            .await
            .map_err(|e| RagError::Database(format!("{:#}", e)))
    }
}
