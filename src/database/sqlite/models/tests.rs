use super::*;
use chrono::Utc;
use serde_json::json;

fn chunk_with_metadata(metadata: &str) -> DataChunk {
    DataChunk {
        id: 7,
        project_id: 1,
        asset_id: None,
        chunk_text: "cats".to_string(),
        chunk_metadata: metadata.to_string(),
        chunk_order: 0,
        created_at: Utc::now().naive_utc(),
    }
}

#[test]
fn metadata_parses_json_object() {
    let chunk = chunk_with_metadata(r#"{"source":"pets.txt","page":3}"#);
    assert_eq!(chunk.metadata(), json!({"source": "pets.txt", "page": 3}));
}

#[test]
fn malformed_metadata_is_null() {
    let chunk = chunk_with_metadata("{not json");
    assert_eq!(chunk.metadata(), serde_json::Value::Null);
}

#[test]
fn project_serialization() {
    let now = Utc::now().naive_utc();
    let project = Project {
        id: 1,
        project_id: "p1".to_string(),
        created_at: now,
        updated_at: now,
    };

    let json = serde_json::to_string(&project).expect("should serialize project");
    let parsed: Project = serde_json::from_str(&json).expect("should deserialize project");
    assert_eq!(parsed, project);
}
