
use super::{
    CollectionCreation, CollectionInfo, DistanceMethod, RetrievedDocument, VectorDbProvider,
    VectorRecord, partial_insert,
};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Vector database provider storing one LanceDB table per collection
pub struct LanceDbProvider {
    path: PathBuf,
    distance: DistanceMethod,
    connection: RwLock<Option<Connection>>,
}

impl LanceDbProvider {
    #[inline]
    pub fn new(path: PathBuf, distance: DistanceMethod) -> Self {
        Self {
            path,
            distance,
            connection: RwLock::new(None),
        }
    }

    async fn connection(&self) -> Result<Connection> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| RagError::VectorDb("LanceDB provider is not connected".to_string()))
    }

    async fn open_table(&self, name: &str) -> Result<Option<Table>> {
        let connection = self.connection().await?;
        if !Self::table_exists(&connection, name).await? {
            return Ok(None);
        }

        let table = connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to open table {}: {}", name, e)))?;
        Ok(Some(table))
    }

    async fn table_exists(connection: &Connection, name: &str) -> Result<bool> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.iter().any(|table| table == name))
    }

    /// Detect vector dimension from the table schema
    async fn table_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size)
                        .map_err(|_| RagError::VectorDb(format!("Invalid vector size {}", size)));
                }
            }
        }

        Err(RagError::VectorDb(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn list_size(vector_dim: usize) -> Result<i32> {
        i32::try_from(vector_dim)
            .map_err(|_| RagError::VectorDb(format!("Vector dimension {} too large", vector_dim)))
    }

    fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
        let size = Self::list_size(vector_dim)?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    size,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ])))
    }

    fn create_record_batch(records: &[VectorRecord], vector_dim: usize) -> Result<RecordBatch> {
        let schema = Self::create_schema(vector_dim)?;

        let mut ids = Vec::with_capacity(records.len());
        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        let mut texts = Vec::with_capacity(records.len());
        let mut metadata = Vec::with_capacity(records.len());

        for record in records {
            ids.push(record.id);
            flat_values.extend_from_slice(&record.vector);
            texts.push(record.text.as_str());
            metadata.push(record.metadata.to_string());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            Self::list_size(vector_dim)?,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::VectorDb(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(metadata)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::VectorDb(format!("Failed to create record batch: {}", e)))
    }

    async fn upsert_batch(
        table: &Table,
        name: &str,
        batch: &[VectorRecord],
        dimension: usize,
    ) -> Result<()> {
        if let Some(record) = batch.iter().find(|r| r.vector.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: record.vector.len(),
            });
        }

        let record_batch = Self::create_record_batch(batch, dimension)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge.execute(Box::new(reader)).await.map_err(|e| {
            RagError::VectorDb(format!("Failed to insert records into {}: {}", name, e))
        })?;

        Ok(())
    }

    fn distance_type(&self) -> DistanceType {
        match self.distance {
            DistanceMethod::Cosine => DistanceType::Cosine,
            DistanceMethod::Dot => DistanceType::Dot,
            DistanceMethod::L2 => DistanceType::L2,
        }
    }

    /// Convert a LanceDB distance into a score where higher is better
    fn score_from_distance(&self, distance: f32) -> f32 {
        match self.distance {
            DistanceMethod::Cosine | DistanceMethod::Dot => 1.0 - distance,
            DistanceMethod::L2 => -distance,
        }
    }

    fn parse_search_batch(&self, batch: &RecordBatch) -> Result<Vec<RetrievedDocument>> {
        let ids = batch
            .column_by_name("id")
            .ok_or_else(|| RagError::VectorDb("Missing id column".to_string()))?
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| RagError::VectorDb("Invalid id column type".to_string()))?;

        let texts = batch
            .column_by_name("text")
            .ok_or_else(|| RagError::VectorDb("Missing text column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::VectorDb("Invalid text column type".to_string()))?;

        let metadata = batch
            .column_by_name("metadata")
            .ok_or_else(|| RagError::VectorDb("Missing metadata column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::VectorDb("Invalid metadata column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| RagError::VectorDb("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RagError::VectorDb("Invalid _distance column type".to_string()))?;

        let mut documents = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            // unscored rows must not outrank real matches
            if distances.is_null(row) || distances.value(row).is_nan() {
                warn!("Skipping row {} without a distance", ids.value(row));
                continue;
            }
            let distance = distances.value(row);

            documents.push(RetrievedDocument {
                id: ids.value(row),
                score: self.score_from_distance(distance),
                text: texts.value(row).to_string(),
                metadata: serde_json::from_str(metadata.value(row))
                    .unwrap_or(serde_json::Value::Null),
            });
        }

        Ok(documents)
    }
}

#[async_trait]
impl VectorDbProvider for LanceDbProvider {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.connection.write().await;
        if guard.is_some() {
            return Ok(());
        }

        debug!("Initializing LanceDB at path: {:?}", self.path);
        std::fs::create_dir_all(&self.path).map_err(|e| {
            RagError::VectorDb(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", self.path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to connect to LanceDB: {}", e)))?;

        *guard = Some(connection);
        info!("Connected to LanceDB at {:?}", self.path);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connection.write().await.take().is_some() {
            debug!("Disconnected from LanceDB");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let connection = self.connection().await?;
        Self::table_exists(&connection, name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let connection = self.connection().await?;
        let mut names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to list tables: {}", e)))?;
        names.sort();
        Ok(names)
    }

    async fn get_collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let table = self
            .open_table(name)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        let dimension = Self::table_dimension(&table).await?;
        let record_count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to count rows: {}", e)))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimension,
            record_count,
            distance: self.distance,
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let connection = self.connection().await?;
        if !Self::table_exists(&connection, name).await? {
            debug!("Collection {} does not exist, nothing to drop", name);
            return Ok(false);
        }

        connection
            .drop_table(name)
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to drop table {}: {}", name, e)))?;

        info!("Dropped collection {}", name);
        Ok(true)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        reset: bool,
    ) -> Result<CollectionCreation> {
        if reset {
            self.delete_collection(name).await?;
        }

        let connection = self.connection().await?;
        if let Some(table) = self.open_table(name).await? {
            let existing = Self::table_dimension(&table).await?;
            if existing != dimension {
                warn!(
                    "Collection {} exists with dimension {}, requested {}",
                    name, existing, dimension
                );
            }
            debug!("Collection {} already exists", name);
            return Ok(CollectionCreation::AlreadyExists);
        }

        let schema = Self::create_schema(dimension)?;
        connection
            .create_empty_table(name, schema)
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to create table {}: {}", name, e)))?;

        info!("Created collection {} with {} dimensions", name, dimension);
        Ok(CollectionCreation::Created)
    }

    async fn insert_many(
        &self,
        name: &str,
        records: &[VectorRecord],
        batch_size: usize,
    ) -> Result<usize> {
        let table = self
            .open_table(name)
            .await?
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;
        let dimension = Self::table_dimension(&table).await?;

        let mut inserted = 0;
        for batch in records.chunks(batch_size.max(1)) {
            Self::upsert_batch(&table, name, batch, dimension)
                .await
                .map_err(|e| partial_insert(inserted, e))?;

            inserted += batch.len();
            debug!("Inserted batch of {} records into {}", batch.len(), name);
        }

        Ok(inserted)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Option<Vec<RetrievedDocument>>> {
        let Some(table) = self.open_table(name).await? else {
            debug!("Collection {} does not exist", name);
            return Ok(None);
        };

        let dimension = Self::table_dimension(&table).await?;
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to count rows: {}", e)))?;
        if count == 0 || limit == 0 {
            debug!("Collection {} is empty", name);
            return Ok(None);
        }

        let mut results = table
            .vector_search(vector)
            .map_err(|e| RagError::VectorDb(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(self.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to execute search: {}", e)))?;

        let mut documents = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::VectorDb(format!("Failed to read result stream: {}", e)))?
        {
            documents.extend(self.parse_search_batch(&batch)?);
        }

        if documents.is_empty() {
            return Ok(None);
        }

        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        documents.truncate(limit);
        debug!("Found {} documents in {}", documents.len(), name);
        Ok(Some(documents))
    }
}
