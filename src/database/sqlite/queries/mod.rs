
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

const CHUNK_COLUMNS: &str =
    "id, project_id, asset_id, chunk_text, chunk_metadata, chunk_order, created_at";

pub struct ProjectQueries;

impl ProjectQueries {
    /// Fetch the project with this external id, creating it on first reference
    #[inline]
    pub async fn get_or_create(pool: &SqlitePool, project_id: &str) -> Result<Project> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO projects (project_id, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(project_id) DO NOTHING",
        )
        .bind(project_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create project")?;

        Self::get_by_project_id(pool, project_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve project {}", project_id))
    }

    #[inline]
    pub async fn get_by_project_id(pool: &SqlitePool, project_id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, project_id, created_at, updated_at FROM projects WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get project by external id")?;

        Ok(project)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT id, project_id, created_at, updated_at FROM projects ORDER BY project_id ASC",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list projects")?;

        Ok(projects)
    }

    #[inline]
    pub async fn touch(pool: &SqlitePool, id: i64) -> Result<()> {
        sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update project timestamp")?;

        Ok(())
    }
}

pub struct AssetQueries;

impl AssetQueries {
    /// Insert an asset, replacing any earlier asset with the same name in the project
    #[inline]
    pub async fn create(pool: &SqlitePool, new_asset: NewAsset) -> Result<Asset> {
        let now = Utc::now().naive_utc();
        let asset_uuid = Uuid::new_v4().to_string();

        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM assets WHERE project_id = ? AND asset_name = ?")
            .bind(new_asset.project_id)
            .bind(&new_asset.asset_name)
            .execute(&mut *tx)
            .await
            .context("Failed to remove previous asset")?;

        let id = sqlx::query(
            "INSERT INTO assets (asset_uuid, project_id, asset_type, asset_name, asset_size, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&asset_uuid)
        .bind(new_asset.project_id)
        .bind(&new_asset.asset_type)
        .bind(&new_asset.asset_name)
        .bind(new_asset.asset_size)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create asset")?
        .last_insert_rowid();

        tx.commit().await.context("Failed to commit asset")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created asset"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>(
            "SELECT id, asset_uuid, project_id, asset_type, asset_name, asset_size, created_at
             FROM assets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get asset by id")?;

        Ok(asset)
    }

    #[inline]
    pub async fn list_by_project(pool: &SqlitePool, project_id: i64) -> Result<Vec<Asset>> {
        let assets = sqlx::query_as::<_, Asset>(
            "SELECT id, asset_uuid, project_id, asset_type, asset_name, asset_size, created_at
             FROM assets WHERE project_id = ? ORDER BY id ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
        .context("Failed to list assets for project")?;

        Ok(assets)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_chunk: NewDataChunk) -> Result<DataChunk> {
        let id = Self::insert_one(pool, &new_chunk).await?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created chunk"))
    }

    async fn insert_one<'e, E>(executor: E, chunk: &NewDataChunk) -> Result<i64>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let id = sqlx::query(
            "INSERT INTO chunks (project_id, asset_id, chunk_text, chunk_metadata, chunk_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(chunk.project_id)
        .bind(chunk.asset_id)
        .bind(&chunk.chunk_text)
        .bind(chunk.chunk_metadata.to_string())
        .bind(chunk.chunk_order)
        .bind(Utc::now().naive_utc())
        .execute(executor)
        .await
        .context("Failed to insert chunk")?
        .last_insert_rowid();

        Ok(id)
    }

    /// Insert chunks in transactional batches, returning how many were written
    #[inline]
    pub async fn insert_many(
        pool: &SqlitePool,
        chunks: &[NewDataChunk],
        batch_size: usize,
    ) -> Result<usize> {
        let mut inserted = 0;

        for batch in chunks.chunks(batch_size.max(1)) {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            for chunk in batch {
                Self::insert_one(&mut *tx, chunk).await?;
            }
            tx.commit().await.context("Failed to commit chunk batch")?;
            inserted += batch.len();
        }

        debug!("Inserted {} chunks", inserted);
        Ok(inserted)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<DataChunk>> {
        let chunk = sqlx::query_as::<_, DataChunk>(&format!(
            "SELECT {} FROM chunks WHERE id = ?",
            CHUNK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get chunk by id")?;

        Ok(chunk)
    }

    /// One page of a project's chunks in id order; pages start at 1
    #[inline]
    pub async fn get_project_chunks(
        pool: &SqlitePool,
        project_id: i64,
        page_no: u32,
        page_size: u32,
    ) -> Result<Vec<DataChunk>> {
        let offset = i64::from(page_no.max(1) - 1) * i64::from(page_size);

        let chunks = sqlx::query_as::<_, DataChunk>(&format!(
            "SELECT {} FROM chunks WHERE project_id = ? ORDER BY id ASC LIMIT ? OFFSET ?",
            CHUNK_COLUMNS
        ))
        .bind(project_id)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to get project chunks page")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn count_by_project(pool: &SqlitePool, project_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(pool)
            .await
            .context("Failed to count project chunks")?;

        Ok(count)
    }

    #[inline]
    pub async fn delete_by_project(pool: &SqlitePool, project_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .execute(pool)
            .await
            .context("Failed to delete project chunks")?;

        Ok(result.rows_affected())
    }
}
