//! tablex CLI
//!
//! Extract structured tables from parsed document layout. The raw
//! document is parsed elsewhere; this tool consumes the parser's
//! layout JSON (`Document`: pages of positioned text blocks), runs the
//! extraction pipeline, and writes the per-document result JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use tablex_core::{Document, Engine, ExtractionConfig, HeuristicClassifier, PatternStore};
use tablex_remote::RemoteClassifier;

/// Available classifier backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Deterministic local heuristic (no network).
    Heuristic,
    /// Remote LLM via an OpenAI-compatible endpoint.
    Remote,
}

#[derive(Parser)]
#[command(name = "tablex")]
#[command(about = "Structured table extraction from parsed document layout")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract tables from one layout file
    Extract {
        /// Path to the parsed-layout JSON file
        #[arg(short, long)]
        layout: PathBuf,

        /// Output path for the result JSON (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pattern store file for priors and learning
        #[arg(long)]
        store: Option<PathBuf>,

        /// Record learned patterns (extract-and-learn mode)
        #[arg(long)]
        learn: bool,

        /// Classifier backend
        #[arg(long, value_enum, default_value = "heuristic")]
        backend: Backend,

        /// Minimum confidence for a table to be emitted
        #[arg(long)]
        threshold: Option<f64>,

        /// Classifier concurrency bound
        #[arg(long)]
        parallel: Option<usize>,

        /// Disable title/notes/relationship capture
        #[arg(long)]
        no_context: bool,

        /// Keep running headers/footers as candidates
        #[arg(long)]
        keep_page_furniture: bool,
    },

    /// Extract tables from every layout file in a directory
    ExtractAll {
        /// Directory containing parsed-layout JSON files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for result JSON files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Pattern store file for priors and learning
        #[arg(long)]
        store: Option<PathBuf>,

        /// Record learned patterns (extract-and-learn mode)
        #[arg(long)]
        learn: bool,

        /// Classifier backend
        #[arg(long, value_enum, default_value = "heuristic")]
        backend: Backend,
    },

    /// Show pattern store contents
    Stats {
        /// Pattern store file
        #[arg(long)]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tablex=info".parse().expect("directive is compile-time constant"))
                .add_directive(
                    "tablex_core=info"
                        .parse()
                        .expect("directive is compile-time constant"),
                ),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Extract {
            layout,
            output,
            store,
            learn,
            backend,
            threshold,
            parallel,
            no_context,
            keep_page_furniture,
        } => {
            let mut config = ExtractionConfig::default();
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            if let Some(parallel) = parallel {
                config.parallel_agents = parallel;
            }
            config.capture_context = !no_context;
            config.exclude_headers = !keep_page_furniture;

            let engine = build_engine(config, backend, store.as_deref())?;
            run_one(&engine, &layout, output.as_deref(), learn).await?;
            persist_store(&engine);
            Ok(())
        }

        Command::ExtractAll {
            input_dir,
            output_dir,
            store,
            learn,
            backend,
        } => {
            let engine = build_engine(ExtractionConfig::default(), backend, store.as_deref())?;
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("creating {}", output_dir.display()))?;

            let mut entries: Vec<PathBuf> = std::fs::read_dir(&input_dir)
                .with_context(|| format!("reading {}", input_dir.display()))?
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();

            let mut failures = 0usize;
            for path in &entries {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "document".to_string());
                let output = output_dir.join(format!("{stem}.tables.json"));
                if let Err(err) = run_one(&engine, path, Some(&output), learn).await {
                    warn!(layout = %path.display(), %err, "document failed");
                    failures += 1;
                }
            }
            persist_store(&engine);

            let stats = engine.stats();
            info!(
                documents = stats.documents_processed,
                tables = stats.tables_extracted,
                rejected = stats.candidates_rejected,
                novel = stats.patterns_learned,
                failures,
                "batch complete"
            );
            Ok(())
        }

        Command::Stats { store } => {
            let store = PatternStore::open(&store, ExtractionConfig::default().max_patterns)
                .context("opening pattern store")?;
            let stats = store.stats();
            println!(
                "{} patterns, {} total occurrences",
                stats.patterns, stats.total_occurrences
            );
            for pattern in store.patterns() {
                println!(
                    "  {}  seen {}x  prior {:+.1}  first {}",
                    pattern.key,
                    pattern.occurrence_count,
                    pattern.confidence_prior,
                    pattern.first_seen_at.format("%Y-%m-%d"),
                );
            }
            Ok(())
        }
    }
}

/// Wire up an engine with the chosen backend and optional store.
///
/// An unreadable store degrades to no-learning, no-prior mode instead
/// of failing the run.
fn build_engine(
    config: ExtractionConfig,
    backend: Backend,
    store_path: Option<&Path>,
) -> Result<Engine> {
    let engine = match backend {
        Backend::Heuristic => Engine::new(config, Arc::new(HeuristicClassifier))?,
        Backend::Remote => {
            let base_url = std::env::var("TABLEX_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            let api_key = std::env::var("TABLEX_API_KEY")
                .context("TABLEX_API_KEY must be set for the remote backend")?;
            let model =
                std::env::var("TABLEX_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
            Engine::new(config, Arc::new(RemoteClassifier::new(base_url, api_key, model)))?
        }
    };

    let engine = match store_path {
        Some(path) => {
            match PatternStore::open(path, engine.config().max_patterns) {
                Ok(store) => engine.with_store(Arc::new(store)),
                Err(err) => {
                    warn!(%err, "pattern store unavailable, continuing without priors");
                    engine
                }
            }
        }
        None => engine,
    };
    Ok(engine)
}

async fn run_one(
    engine: &Engine,
    layout: &Path,
    output: Option<&Path>,
    learn: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(layout)
        .with_context(|| format!("reading {}", layout.display()))?;
    let document: Document = serde_json::from_str(&raw)
        .with_context(|| format!("parsing layout {}", layout.display()))?;

    let result = if learn {
        engine.extract_and_learn(&document).await?
    } else {
        engine.extract(&document).await?
    };

    info!(
        document = %result.document,
        tables = result.tables_found,
        completeness = result.quality_metrics.completeness,
        "extraction finished"
    );

    let rendered = serde_json::to_string_pretty(&result).context("serializing result")?;
    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

/// The store lives in memory during the run; write it back once.
fn persist_store(engine: &Engine) {
    if let Err(err) = engine.persist_store() {
        warn!(%err, "could not persist pattern store");
    }
}
