#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A project groups the documents and chunks indexed into one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Project {
    /// Internal row identity used by chunk and asset foreign keys
    pub id: i64,
    /// External identifier chosen by the caller
    pub project_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A source document that chunks were extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: i64,
    pub asset_uuid: String,
    pub project_id: i64,
    pub asset_type: String,
    pub asset_name: String,
    pub asset_size: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAsset {
    pub project_id: i64,
    pub asset_type: String,
    pub asset_name: String,
    pub asset_size: i64,
}

/// A fragment of document text, the unit of indexing and retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DataChunk {
    /// Chunk identifier, reused as the vector record id
    pub id: i64,
    pub project_id: i64,
    pub asset_id: Option<i64>,
    pub chunk_text: String,
    /// JSON object with free-form metadata
    pub chunk_metadata: String,
    pub chunk_order: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataChunk {
    pub project_id: i64,
    pub asset_id: Option<i64>,
    pub chunk_text: String,
    pub chunk_metadata: serde_json::Value,
    pub chunk_order: i64,
}

impl DataChunk {
    /// Parsed metadata payload; malformed JSON yields `Null`
    #[inline]
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::from_str(&self.chunk_metadata).unwrap_or(serde_json::Value::Null)
    }
}
