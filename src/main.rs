use clap::{Parser, Subcommand};
use rag_pipeline::Result;
use rag_pipeline::commands::{
    add_document, answer, collection_info, index_project, list_projects, reset_collection,
    search, show_status,
};
use rag_pipeline::config::{Config, run_interactive_config, show_config};
use rag_pipeline::context::AppContext;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-pipeline")]
#[command(about = "Index documents into a vector store and answer questions grounded in them")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the local databases
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk a text document and store it under a project
    Add {
        /// Project identifier
        project: String,
        /// Path of the document to add
        file: PathBuf,
        /// Delete the project's existing chunks first
        #[arg(long)]
        reset: bool,
    },
    /// Embed a project's chunks into its vector collection
    Index {
        /// Project identifier
        project: String,
        /// Drop and recreate the collection before indexing
        #[arg(long)]
        reset: bool,
    },
    /// Show the chunks most similar to a query
    Search {
        /// Project identifier
        project: String,
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Answer a question from a project's documents
    Answer {
        /// Project identifier
        project: String,
        /// Question text
        query: String,
        /// Maximum number of documents to ground the answer on
        #[arg(long)]
        limit: Option<usize>,
        /// Also print the system prompt and the full prompt sent to the model
        #[arg(long)]
        show_prompt: bool,
    },
    /// Show a project's vector collection details
    Info {
        /// Project identifier
        project: String,
    },
    /// Delete a project's vector collection
    Reset {
        /// Project identifier
        project: String,
    },
    /// List all projects
    List,
    /// Check Ollama and storage status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&config_dir)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let context = AppContext::initialize(Config::load(&config_dir)?).await?;
    let result = run(&context, cli.command).await;
    let shutdown = context.shutdown().await;

    result.and(shutdown)
}

async fn run(context: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Config { .. } => {}
        Commands::Add {
            project,
            file,
            reset,
        } => {
            add_document(context, &project, &file, reset).await?;
        }
        Commands::Index { project, reset } => {
            index_project(context, &project, reset).await?;
        }
        Commands::Search {
            project,
            query,
            limit,
        } => {
            search(context, &project, &query, limit).await?;
        }
        Commands::Answer {
            project,
            query,
            limit,
            show_prompt,
        } => {
            answer(context, &project, &query, limit, show_prompt).await?;
        }
        Commands::Info { project } => {
            collection_info(context, &project).await?;
        }
        Commands::Reset { project } => {
            reset_collection(context, &project).await?;
        }
        Commands::List => {
            list_projects(context).await?;
        }
        Commands::Status => {
            show_status(context).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["rag-pipeline", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
            assert!(parsed.config_dir.is_none());
        }
    }

    #[test]
    fn add_command_with_reset() {
        let cli = Cli::try_parse_from(["rag-pipeline", "add", "p1", "notes.txt", "--reset"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Add {
                project,
                file,
                reset,
            } = parsed.command
            {
                assert_eq!(project, "p1");
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert!(reset);
            } else {
                panic!("expected add command");
            }
        }
    }

    #[test]
    fn index_command_defaults_to_no_reset() {
        let cli = Cli::try_parse_from(["rag-pipeline", "index", "p1"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(
                parsed.command,
                Commands::Index { ref project, reset: false } if project == "p1"
            ));
        }
    }

    #[test]
    fn answer_command_with_limit() {
        let cli = Cli::try_parse_from([
            "rag-pipeline",
            "answer",
            "p1",
            "what purrs?",
            "--limit",
            "3",
            "--show-prompt",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Answer {
                query,
                limit,
                show_prompt,
                ..
            } = parsed.command
            {
                assert_eq!(query, "what purrs?");
                assert_eq!(limit, Some(3));
                assert!(show_prompt);
            } else {
                panic!("expected answer command");
            }
        }
    }

    #[test]
    fn global_config_dir_flag() {
        let cli = Cli::try_parse_from(["rag-pipeline", "info", "p1", "--config-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/rag")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rag-pipeline", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn search_requires_query() {
        let cli = Cli::try_parse_from(["rag-pipeline", "search", "p1"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rag-pipeline", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["rag-pipeline", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
