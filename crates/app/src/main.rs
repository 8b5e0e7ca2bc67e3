mod rpc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use programme_rag_core::{
    index_records, load_corpus, CharacterNgramEmbedder, ChromaBackend, HttpCrossEncoder,
    MemoryBackend, PairScorer, ProgrammeResolver, Reranker, RetrievalConfig,
    RetrievalOrchestrator, VectorBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::rpc::ToolServer;

type DynBackend = Box<dyn VectorBackend>;

#[derive(Parser)]
#[command(name = "programme-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Folder holding programme records (*.json).
    #[arg(long, env = "RAG_DATA_DIR", default_value = "data/json", global = true)]
    data_dir: PathBuf,

    /// Vector store used for retrieval.
    #[arg(long, env = "RAG_BACKEND", value_enum, default_value_t = BackendKind::Memory, global = true)]
    backend: BackendKind,

    /// Chroma base URL
    #[arg(long, env = "CHROMA_URL", default_value = "http://localhost:8000", global = true)]
    chroma_url: String,

    /// Chroma collection
    #[arg(long, env = "RAG_COLLECTION", default_value = "sunway_programmes", global = true)]
    collection: String,

    /// Cross-encoder endpoint exposing POST /rerank. Reranking is skipped when unset.
    #[arg(long, env = "RERANK_URL", global = true)]
    rerank_url: Option<String>,

    /// Embedding dimensions
    #[arg(long, env = "RAG_EMBEDDING_DIMENSIONS", default_value = "384", global = true)]
    embedding_dimensions: usize,

    /// Default number of results when a request does not set one.
    #[arg(long, env = "RAG_TOP_K", default_value = "5", global = true)]
    top_k: usize,

    /// Emit JSON logs to stderr.
    #[arg(long, default_value_t = false, global = true)]
    log_json: bool,

    /// Log level, overridden by RUST_LOG.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Memory,
    Chroma,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Serve rag.search and rag.get over line-delimited JSON-RPC on stdio.
    Serve,
    /// Build chunks from the record folder and upsert them into the store.
    Index {
        /// Only index the programme whose id ends with this selector's last segment.
        #[arg(long)]
        only: Option<String>,
    },
    /// Run one search and print the ranked chunks.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print a stored chunk by id.
    Get {
        #[arg(long)]
        id: String,
    },
    /// Run the canned smoke queries and print the top section and programme.
    Smoke,
}

const SMOKE_QUERIES: [&str; 3] = [
    "How much is BSc Computer Science per year?",
    "What are the Year 2 modules for Information Systems?",
    "Give me the overview of Business Management.",
];

fn init_logging(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// The memory backend lives and dies with the process, so an `index` run
/// against it would report chunks that nobody can read back.
fn ensure_persistent(command: &Command, backend: BackendKind) -> anyhow::Result<()> {
    if matches!(command, Command::Index { .. }) && backend == BackendKind::Memory {
        anyhow::bail!(
            "index needs a persistent store; pass --backend chroma (the memory backend is rebuilt from --data-dir on every start)"
        );
    }
    Ok(())
}

async fn open_backend(cli: &Cli, embedder: &Arc<CharacterNgramEmbedder>) -> anyhow::Result<DynBackend> {
    match cli.backend {
        BackendKind::Memory => {
            let backend = MemoryBackend::new(Arc::clone(embedder));
            let corpus = load_corpus(&cli.data_dir);
            index_records(&backend, &corpus.records, None).await?;
            Ok(Box::new(backend))
        }
        BackendKind::Chroma => {
            let backend = ChromaBackend::new(&cli.chroma_url, cli.collection.clone(), Arc::clone(embedder))?;
            backend.ensure_collection().await?;
            Ok(Box::new(backend))
        }
    }
}

fn open_reranker(cli: &Cli) -> anyhow::Result<Reranker> {
    let scorer = match &cli.rerank_url {
        Some(url) => {
            info!(url = %url, "reranker enabled");
            Some(Box::new(HttpCrossEncoder::new(url)?) as Box<dyn PairScorer>)
        }
        None => {
            info!("no reranker configured, results keep retrieval order");
            None
        }
    };
    Ok(Reranker::from_scorer(scorer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_json);

    if cli.top_k == 0 {
        anyhow::bail!("--top-k must be at least 1");
    }
    ensure_persistent(&cli.command, cli.backend)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir.display(),
        "programme-rag boot"
    );

    let embedder = Arc::new(CharacterNgramEmbedder {
        dimensions: cli.embedding_dimensions,
    });
    let backend = open_backend(&cli, &embedder).await?;

    if let Command::Index { only } = &cli.command {
        let corpus = load_corpus(&cli.data_dir);
        if !corpus.skipped_files.is_empty() {
            warn!(
                "skipped_files={} for folder={}",
                corpus.skipped_files.len(),
                cli.data_dir.display()
            );
        }
        let report = index_records(&backend, &corpus.records, only.as_deref()).await?;
        println!(
            "Upserted {} chunks from {} programmes at {}",
            report.chunks,
            report.programmes,
            Utc::now().to_rfc3339()
        );
        return Ok(());
    }

    let data_dir = cli.data_dir.clone();
    let config = RetrievalConfig {
        default_top_k: cli.top_k,
        ..RetrievalConfig::default()
    };
    let resolver = ProgrammeResolver::new(Arc::clone(&embedder), config.resolver_threshold, move || {
        load_corpus(&data_dir).programme_names()
    });
    let orchestrator =
        RetrievalOrchestrator::with_config(backend, resolver, open_reranker(&cli)?, config);

    match cli.command {
        Command::Serve => ToolServer::new(orchestrator).serve_stdio().await?,
        Command::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(orchestrator.config().default_top_k);
            let response = orchestrator.search(&query, top_k).await?;

            println!("query: {query}");
            for candidate in response.results {
                let year = candidate
                    .metadata
                    .year
                    .map(|year| format!(" year={year}"))
                    .unwrap_or_default();
                let rerank = candidate
                    .rerank_score
                    .map(|score| format!(" rerank={score:.4}"))
                    .unwrap_or_default();
                println!(
                    "[{}] score={:.4}{} id={} programme={}{}",
                    candidate.metadata.section,
                    candidate.score,
                    rerank,
                    candidate.id,
                    candidate.metadata.programme_name,
                    year
                );
                println!("  {}", candidate.text);
            }
        }
        Command::Get { id } => match orchestrator.get_by_id(&id).await {
            Ok(chunk) => println!("{}", serde_json::to_string_pretty(&chunk)?),
            Err(error) if error.is_not_found() => {
                warn!(id = %id, "no chunk stored under this id");
                std::process::exit(2);
            }
            Err(error) => return Err(error.into()),
        },
        Command::Smoke => {
            for query in SMOKE_QUERIES {
                let response = orchestrator.search(query, 5).await?;
                match response.results.first() {
                    Some(top) => println!(
                        "{query} → {} {}",
                        top.metadata.section, top.metadata.programme_name
                    ),
                    None => println!("{query} → no results"),
                }
            }
        }
        Command::Index { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_refused_for_the_memory_backend() {
        let index = Command::Index { only: None };
        assert!(ensure_persistent(&index, BackendKind::Memory).is_err());
        assert!(ensure_persistent(&index, BackendKind::Chroma).is_ok());
        assert!(ensure_persistent(&Command::Serve, BackendKind::Memory).is_ok());
    }

    #[test]
    fn cli_reads_backend_and_index_selector() {
        let cli = Cli::try_parse_from([
            "programme-rag",
            "--backend",
            "chroma",
            "index",
            "--only",
            "sunway:soe:bsc-computer-science",
        ])
        .expect("valid arguments");

        assert!(cli.backend == BackendKind::Chroma);
        assert!(matches!(
            cli.command,
            Command::Index { only: Some(ref only) } if only == "sunway:soe:bsc-computer-science"
        ));
    }
}
