use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodeflow_core::config::AppConfig;
use nodeflow_core::event::EventBus;
use nodeflow_core::traits::TextGenerator;
use nodeflow_memory::embeddings::EmbeddingProvider;
use nodeflow_memory::store::VectorStore;
use nodeflow_rag::RagPipeline;

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Graph-driven retrieval and question answering")]
struct Cli {
    /// Path to config file (defaults to ~/.nodeflow/config.toml)
    #[arg(short, long, env = "NODEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Override gateway.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Chunk, embed and store a text file
    Ingest {
        file: PathBuf,
        /// Source name (defaults to the file name)
        #[arg(long)]
        source: Option<String>,
    },
    /// Ask a question against the stored documents
    Ask {
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored sources
    Sources,
    /// Remove a source and its chunks
    Forget { source: String },
    /// Print the pipeline wiring
    Graph,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "nodeflow", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    info!(config = %config_path.display(), "Configuration loaded");

    let event_bus = Arc::new(EventBus::default());
    let pipeline = build_pipeline(&config)?.with_event_bus(event_bus.clone());

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            let server = nodeflow_gateway::GatewayServer::new(
                config.gateway.clone(),
                Arc::new(pipeline),
                event_bus,
            );

            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        Commands::Ingest { file, source } => {
            let text = std::fs::read_to_string(&file)?;
            let source = source.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string())
            });
            let chunks = pipeline.ingest(&source, &text).await?;
            println!("Stored {} chunks from {}", chunks, source);
        }
        Commands::Ask { question, json } => {
            let question = question.join(" ");
            let answer = pipeline.ask(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                if let Some(text) = &answer.answer {
                    println!("{}", text);
                }
                if !answer.documents.is_empty() {
                    println!();
                    for doc in &answer.documents {
                        println!("  [{:.3}] {} #{}", doc.score, doc.source, doc.chunk_index);
                    }
                }
            }

            if let Some(error) = answer.error {
                anyhow::bail!("run failed: {}", error);
            }
        }
        Commands::Sources => {
            let store = pipeline.store();
            let sources = store.sources()?;
            if sources.is_empty() {
                println!("No sources stored.");
            }
            for (source, chunks) in sources {
                println!("{:>6}  {}", chunks, source);
            }
        }
        Commands::Forget { source } => {
            let removed = pipeline.store().delete_source(&source)?;
            println!("Removed {} chunks from {}", removed, source);
        }
        Commands::Graph => {
            let graph = pipeline.graph()?;
            println!("graph: {}", graph.name());
            if let Some(start) = graph.current_node() {
                println!("start: {}", start);
            }
            for edge in graph.table().to_edges() {
                println!("  {} -> {}", edge.from, edge.to);
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<RagPipeline> {
    let store = Arc::new(VectorStore::open(&config.store.resolved_path())?);
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::from(nodeflow_memory::create_provider(&config.embedding));
    let generator: Arc<dyn TextGenerator> = Arc::from(nodeflow_llm::create_generator(&config.model));

    Ok(RagPipeline::new(config, store, embedder, generator)?)
}
