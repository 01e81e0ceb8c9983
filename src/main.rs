//! guichet CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use guichet::{
    chat::{ChatOrchestrator, ChatRequest, StreamEvent},
    config::Config,
    embed::create_embedder,
    error::Result,
    extract::{DocumentAnalyzer, HttpAnalyzer},
    ingest::IngestionPipeline,
    meta::MetaDb,
    model::OpenAiChatModel,
    retrieval::RetrievalEngine,
    session::SessionManager,
    tools::ToolDispatcher,
    vector::{QdrantIndex, VectorIndex},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "guichet")]
#[command(version, about = "Conversational RAG assistant core for banking documents", long_about = None)]
struct Cli {
    /// Base directory for config and data (defaults to ~/.guichet)
    #[arg(short, long, global = true)]
    base_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration, database schema, and the vector collection
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Ingest a PDF or Markdown document
    Ingest {
        /// Path to the document
        path: PathBuf,

        /// Document category
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,

        /// Re-ingest even if already processed
        #[arg(long)]
        force: bool,
    },

    /// Ingest every PDF/Markdown file under a directory
    IngestDir {
        /// Directory to walk
        path: PathBuf,

        /// Category applied to every document
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Re-ingest documents that are already processed
        #[arg(long)]
        force: bool,
    },

    /// List ingested documents
    Documents {
        /// Only documents in this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Delete a document, its chunks, and its index entries
    Delete {
        /// Document ID
        document_id: String,
    },

    /// Remove index points that no chunk row references
    Prune,

    /// Ask the assistant a question
    Ask {
        /// The question
        question: String,

        /// Session ID to continue a conversation
        #[arg(short, long)]
        session: Option<String>,

        /// User identifier
        #[arg(short, long)]
        user: Option<String>,

        /// Image URL to attach to the question
        #[arg(long)]
        image: Option<String>,

        /// Stream the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Show the full history of a session
    History {
        /// Session ID
        session_id: String,
    },

    /// Clear a session (history is retained for audit)
    Clear {
        /// Session ID
        session_id: String,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "guichet", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load_from(cli.base_dir.clone())?;

    if let Commands::Init { force } = cli.command {
        return handle_init(&config, force).await;
    }

    let db = MetaDb::new(&config.paths.db_file).await?;
    db.init_schema().await?;
    let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(&config)?);

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            path,
            category,
            description,
            force,
        } => {
            let pipeline = build_pipeline(&config, db, index.clone())?;

            let spinner = spinner(format!("Ingesting {}", path.display()));
            let result = pipeline.ingest(&path, &category, description, force).await;
            spinner.finish_and_clear();

            let document_id = result?;
            println!("✓ Document ingested: {}", document_id);
        }

        Commands::IngestDir { path, category, force } => {
            let pipeline = build_pipeline(&config, db, index.clone())?;

            let spinner = spinner(format!("Ingesting directory {}", path.display()));
            let stats = pipeline.ingest_directory(&path, &category, force).await?;
            spinner.finish_and_clear();

            println!(
                "✓ {} ingested, {} skipped, {} errors",
                stats.ingested.len(),
                stats.skipped,
                stats.errors.len()
            );
            for error in &stats.errors {
                println!("  ✗ {}", error);
            }
        }

        Commands::Documents { category } => {
            let pipeline = build_pipeline(&config, db, index.clone())?;
            let documents = match category {
                Some(ref c) => pipeline.list_documents_by_category(c).await?,
                None => pipeline.list_documents().await?,
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else if documents.is_empty() {
                println!("No documents ingested yet.");
            } else {
                for doc in &documents {
                    println!(
                        "{}  [{}] {} — {} chunks, status {}",
                        doc.id, doc.category, doc.filename, doc.chunk_count, doc.status
                    );
                }
            }
        }

        Commands::Delete { document_id } => {
            let pipeline = build_pipeline(&config, db, index.clone())?;
            pipeline.delete(&document_id).await?;
            println!("✓ Document {} deleted", document_id);
        }

        Commands::Prune => {
            let pipeline = build_pipeline(&config, db, index.clone())?;
            let pruned = pipeline.prune_orphans().await?;
            println!("✓ {} orphaned points removed", pruned);
        }

        Commands::Ask {
            question,
            session,
            user,
            image,
            stream,
        } => {
            let orchestrator = build_orchestrator(&config, db, index.clone())?;
            let request = ChatRequest {
                message: question,
                session_id: session,
                user_id: user,
                image_url: image,
            };

            if stream {
                ask_streaming(&orchestrator, request).await;
            } else {
                let response = orchestrator.process(request).await;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                } else {
                    println!("{}", response.message);
                    if let Some(error) = response.error {
                        eprintln!("error: {}", error);
                    }
                    eprintln!("(session {})", response.session_id);
                }
            }
        }

        Commands::History { session_id } => {
            let sessions = SessionManager::new(db, &config.chat);
            let history = sessions.history(&session_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else if history.is_empty() {
                println!("No messages for session {}", session_id);
            } else {
                for message in &history {
                    println!("[{}] {}: {}", message.created_at, message.role, message.content);
                }
            }
        }

        Commands::Clear { session_id } => {
            let sessions = SessionManager::new(db, &config.chat);
            if sessions.clear(&session_id).await? {
                println!("✓ Session {} cleared", session_id);
            } else {
                println!("No active session {}", session_id);
            }
        }

        Commands::Status => {
            let (documents, chunks) = db.stats().await?;
            let points = index.count().await.unwrap_or(0);

            println!("guichet status:");
            println!("  Documents: {}", documents);
            println!("  Chunks: {}", chunks);
            println!("  Index points: {} (collection {})", points, config.collection_name);
            println!("  Embedding model: {}", config.embedding.model);
            println!("  Chat model: {}", config.chat.model);
        }
    }

    Ok(())
}

async fn handle_init(config: &Config, force: bool) -> Result<()> {
    if config.paths.config_file.exists() && !force {
        println!(
            "Already initialized at {} (use --force to overwrite)",
            config.paths.config_file.display()
        );
        return Ok(());
    }

    config.save()?;
    std::fs::create_dir_all(&config.paths.documents_dir)?;

    let db = MetaDb::new(&config.paths.db_file).await?;
    db.init_schema().await?;

    let index = QdrantIndex::connect(config)?;
    match index.ensure_ready().await {
        Ok(()) => println!("✓ Vector collection ready"),
        Err(e) => println!("⚠ Vector collection not reachable yet: {}", e),
    }

    println!("✓ Initialized at {}", config.paths.base_dir.display());
    Ok(())
}

fn build_pipeline(
    config: &Config,
    db: MetaDb,
    index: Arc<dyn VectorIndex>,
) -> Result<IngestionPipeline> {
    let embedder = Arc::from(create_embedder(&config.embedding)?);
    let analyzer: Option<Arc<dyn DocumentAnalyzer>> = if config.analysis.enabled {
        Some(Arc::new(HttpAnalyzer::new(
            &config.analysis,
            config.analysis_api_key(),
        )?))
    } else {
        None
    };

    Ok(IngestionPipeline::new(
        db,
        index,
        embedder,
        analyzer,
        config.clone(),
    ))
}

fn build_orchestrator(
    config: &Config,
    db: MetaDb,
    index: Arc<dyn VectorIndex>,
) -> Result<ChatOrchestrator> {
    let embedder = Arc::from(create_embedder(&config.embedding)?);
    let sessions = Arc::new(SessionManager::new(db.clone(), &config.chat));
    let retrieval = Arc::new(RetrievalEngine::new(
        db,
        index,
        embedder,
        config.retrieval.clone(),
    ));
    let tools = Arc::new(ToolDispatcher::new(&config.services)?);
    let model = Arc::new(OpenAiChatModel::new(&config.chat, config.chat_api_key())?);

    Ok(ChatOrchestrator::new(
        sessions,
        retrieval,
        tools,
        model,
        config.chat.clone(),
    ))
}

async fn ask_streaming(orchestrator: &ChatOrchestrator, request: ChatRequest) {
    let (tx, mut rx) = mpsc::channel(32);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Fragment(fragment) => {
                    print!("{}", fragment);
                    let _ = std::io::stdout().flush();
                }
                StreamEvent::Done { session_id } => {
                    println!();
                    eprintln!("(session {})", session_id);
                }
                StreamEvent::Error { session_id, error } => {
                    println!("{}", guichet::chat::GENERIC_APOLOGY);
                    eprintln!("error: {} (session {})", error, session_id);
                }
            }
        }
    });

    orchestrator.process_streaming(request, tx).await;
    let _ = printer.await;
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
