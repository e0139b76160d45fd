use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_rag::{Config, RagClient, SearchRequest, json_schemas};
use std::path::PathBuf;

/// Index a git repository into a vector store and search it semantically
#[derive(Parser)]
#[command(
    name = "repo-rag",
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_COMMIT_HASH"),
        ", built ",
        env!("BUILD_TIMESTAMP"),
        ")"
    )
)]
struct Cli {
    /// Configuration file (TOML); defaults to the platform config directory
    #[arg(long, global = true, env = "REPO_RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index file contents, commits and diffs, then print the final status
    Index {
        /// Repository root
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Search the index, refining the query while relevance is low
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        /// Restrict results to these repository-relative paths
        #[arg(long = "scope")]
        scope_files: Vec<String>,

        #[arg(long)]
        max_refinements: Option<usize>,

        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Show the chunks around one chunk of a file
    Adjacent { filepath: String, chunk_index: usize },

    /// Diff between the two most recent commits
    Diff {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Point counts in the index
    Stats,

    /// Remove all indexed points
    Clear,

    /// Print the JSON Schemas of stored payloads, requests and responses
    Schema,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            config.apply_env_overrides();
            config.validate()?;
            config
        }
        None => Config::new()?,
    };
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Commands::Schema = cli.command {
        return print_json(&json_schemas()?);
    }

    let config = load_config(cli.config)?;
    let client = RagClient::with_config(config).await?;

    match cli.command {
        Commands::Index { path } => print_json(&client.run_indexing(path).await)?,
        Commands::Search {
            query,
            limit,
            scope_files,
            max_refinements,
            threshold,
        } => {
            let request = SearchRequest {
                query,
                scope_files,
                limit,
                max_refinements,
                relevance_threshold: threshold,
            };
            print_json(&client.search(request).await?)?
        }
        Commands::Adjacent {
            filepath,
            chunk_index,
        } => print_json(&client.fetch_adjacent_chunks(&filepath, chunk_index).await?)?,
        Commands::Diff { path } => println!("{}", client.diff_summary(path).await),
        Commands::Stats => print_json(&client.get_statistics().await?)?,
        Commands::Clear => {
            client.clear_index().await?;
            println!("Index cleared");
        }
        Commands::Schema => {}
    }

    Ok(())
}
