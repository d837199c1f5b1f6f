use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::Result;
use crate::chunking::chunk_text;
use crate::context::AppContext;
use crate::database::sqlite::models::{NewAsset, NewDataChunk, Project};
use crate::database::vectordb::validate_project_id;

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn find_project(context: &AppContext, project_id: &str) -> Result<Project> {
    let project_id = validate_project_id(project_id)?;
    context
        .database
        .get_project(project_id)
        .await?
        .ok_or_else(|| anyhow!("Project not found: {}", project_id).into())
}

/// Chunk a text file and store its chunks under `project_id`
#[inline]
pub async fn add_document(
    context: &AppContext,
    project_id: &str,
    path: &Path,
    reset: bool,
) -> Result<usize> {
    let project_id = validate_project_id(project_id)?;
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read document: {}", path.display()))?;

    let project = context.database.get_or_create_project(project_id).await?;

    if reset {
        let deleted = context.database.delete_project_chunks(project.id).await?;
        info!(
            "Deleted {} existing chunks of project {}",
            deleted, project.project_id
        );
        println!("Removed {} existing chunks", deleted);
    }

    let asset_name = path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    );

    let asset = context
        .database
        .create_asset(NewAsset {
            project_id: project.id,
            asset_type: "file".to_string(),
            asset_name: asset_name.clone(),
            asset_size: i64::try_from(content.len()).unwrap_or(i64::MAX),
        })
        .await?;

    let chunks: Vec<NewDataChunk> = chunk_text(&content, &context.config.chunking)
        .into_iter()
        .map(|chunk| {
            let chunk_order = i64::try_from(chunk.chunk_index).unwrap_or(i64::MAX);
            NewDataChunk {
                project_id: project.id,
                asset_id: Some(asset.id),
                chunk_metadata: json!({
                    "asset_name": asset_name,
                    "chunk_order": chunk_order,
                    "token_count": chunk.token_count,
                }),
                chunk_text: chunk.content,
                chunk_order,
            }
        })
        .collect();

    let inserted = context
        .database
        .insert_chunks(&chunks, context.config.vector_db.insert_batch_size)
        .await?;

    println!(
        "Added {} ({} chunks) to project {}",
        asset_name, inserted, project.project_id
    );
    println!(
        "Run 'rag-pipeline index {}' to embed the new chunks",
        project.project_id
    );

    Ok(inserted)
}

/// Embed every chunk of a project into its vector collection
#[inline]
pub async fn index_project(context: &AppContext, project_id: &str, reset: bool) -> Result<usize> {
    let project = find_project(context, project_id).await?;

    let bar = spinner(&format!("Indexing project {}", project.project_id));
    let result = context.indexer().index_project(&project, reset).await;
    bar.finish_and_clear();

    match result {
        Ok(inserted) => {
            println!(
                "Indexed {} chunks of project {}",
                inserted, project.project_id
            );
            Ok(inserted)
        }
        Err(e) => {
            error!("Indexing project {} failed: {}", project.project_id, e);
            println!("Indexing failed: {}", e);
            println!("Re-run with --reset once the problem is fixed");
            Err(e)
        }
    }
}

/// Print the documents most similar to `query`
#[inline]
pub async fn search(
    context: &AppContext,
    project_id: &str,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let project = find_project(context, project_id).await?;
    let limit = limit.unwrap_or(context.config.indexing.search_limit);

    let Some(documents) = context
        .rag_service()
        .search(&project, query, limit)
        .await?
    else {
        println!("No matching documents found.");
        return Ok(());
    };

    println!("Top {} results:", documents.len());
    println!();
    for (rank, document) in documents.iter().enumerate() {
        println!(
            "{}. [chunk {}] score {:.4}",
            rank + 1,
            document.id,
            document.score
        );
        println!("   {}", document.text.replace('\n', "\n   "));
        println!();
    }

    Ok(())
}

/// Answer `query` from the project's indexed documents
#[inline]
pub async fn answer(
    context: &AppContext,
    project_id: &str,
    query: &str,
    limit: Option<usize>,
    show_prompt: bool,
) -> Result<()> {
    let project = find_project(context, project_id).await?;
    let limit = limit.unwrap_or(context.config.indexing.search_limit);

    let bar = spinner("Generating answer");
    let result = context.rag_service().answer(&project, query, limit).await;
    bar.finish_and_clear();

    match result? {
        Some(rag_answer) => {
            if show_prompt {
                for message in &rag_answer.chat_history {
                    println!("--- {} ---", message.role);
                    println!("{}", message.content);
                }
                println!("--- prompt ---");
                println!("{}", rag_answer.full_prompt);
                println!("--- answer ---");
            }
            println!("{}", rag_answer.answer);
        }
        None => println!("No documents found to answer from. Has the project been indexed?"),
    }

    Ok(())
}

/// Print the vector collection details of a project
#[inline]
pub async fn collection_info(context: &AppContext, project_id: &str) -> Result<()> {
    let project = find_project(context, project_id).await?;
    let info = context.rag_service().collection_info(&project).await?;
    let chunk_count = context.database.count_project_chunks(project.id).await?;

    println!("Collection: {}", info.name);
    println!("  Dimension: {}", info.dimension);
    println!("  Distance: {}", info.distance);
    println!("  Records: {}", info.record_count);
    println!("  Stored chunks: {}", chunk_count);
    if info.record_count as u64 != chunk_count {
        println!(
            "  Collection is out of date, run 'rag-pipeline index --reset {}'",
            project.project_id
        );
    }

    Ok(())
}

/// Drop a project's vector collection
#[inline]
pub async fn reset_collection(context: &AppContext, project_id: &str) -> Result<()> {
    let project = find_project(context, project_id).await?;

    if context.rag_service().reset_collection(&project).await? {
        println!("Deleted vector collection of project {}", project.project_id);
    } else {
        println!("Project {} has no vector collection", project.project_id);
    }

    Ok(())
}

/// List known projects with their chunk and document counts
#[inline]
pub async fn list_projects(context: &AppContext) -> Result<()> {
    let projects = context.database.list_projects().await?;

    if projects.is_empty() {
        println!("No projects have been created yet.");
        println!("Use 'rag-pipeline add <project> <file>' to add a document.");
        return Ok(());
    }

    println!("Projects ({} total):", projects.len());
    println!();

    for project in &projects {
        let assets = context.database.list_assets(project.id).await?;
        let chunks = context.database.count_project_chunks(project.id).await?;

        println!("{} (ID: {})", project.project_id, project.id);
        println!("   Documents: {}", assets.len());
        println!("   Chunks: {}", chunks);
        println!(
            "   Updated: {}",
            project.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Check that Ollama is reachable and both configured models are installed
#[inline]
pub async fn show_status(context: &AppContext) -> Result<()> {
    println!("Status Report");
    println!("{}", "=".repeat(40));

    let ollama = Arc::clone(&context.ollama);
    let health = tokio::task::spawn_blocking(move || ollama.health_check())
        .await
        .context("Health check task failed")?;

    match health {
        Ok(()) => println!("Ollama: reachable at {}", context.ollama.base_url()),
        Err(e) => println!("Ollama: unavailable ({:#})", e),
    }
    println!("  Embedding model: {}", context.config.embedding.model);
    println!("  Generation model: {}", context.config.generation.model);

    println!(
        "Vector store: {} ({})",
        context.config.vector_db.backend, context.config.vector_db.distance
    );
    let collections = context.vector_db.list_collections().await?;
    println!("  Collections: {}", collections.len());

    println!("Prompt language: {}", context.templates.primary_language());

    let projects = context.database.list_projects().await?;
    println!("Projects: {}", projects.len());

    Ok(())
}
