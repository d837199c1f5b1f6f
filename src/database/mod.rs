// Database module
// SQLite holds projects, assets and chunks; the vector database holds embeddings

pub mod sqlite;
pub mod vectordb;

pub use sqlite::*;
