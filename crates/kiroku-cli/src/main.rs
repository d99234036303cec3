//! kiroku command-line tool.
//!
//! Inspects and edits document histories kept in a SQLite record store.
//!
//! ```bash
//! kiroku --db doc.db append "first paragraph"
//! kiroku --db doc.db tree
//! kiroku --db doc.db graph | dot -Tsvg > history.svg
//! kiroku --db doc.db replay --before <change-id>
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=kiroku_history=debug` for build detail.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use kiroku_history::{BuiltTree, DagBuilder, PostcardCodec, RecordStore, Tree};
use kiroku_kernel::{ChangeWriter, HistoryDocument, KernelConfig, PushOptions, SqliteRecordStore, StateReplayer};
use kiroku_state::{ApplyMode, DocumentState};
use kiroku_types::{Block, ChangeContent, ChangeId, Position};

#[derive(Parser, Debug)]
#[command(name = "kiroku")]
#[command(about = "Inspect and edit kiroku document histories")]
struct Args {
    /// SQLite record store (default: $XDG_DATA_HOME/kiroku/kiroku.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/kiroku/kiroku.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root block id of the document
    #[arg(long, global = true, default_value = "doc")]
    root: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List device logs and their heads
    Logs,
    /// Build the tree and print its heads and build diagnostics
    Heads,
    /// Print the replayed block tree
    Tree {
        /// Only history up to this change
        #[arg(long)]
        before: Option<String>,
        /// Include the `--before` change itself
        #[arg(long, requires = "before")]
        inclusive: bool,
    },
    /// Print the hash of the canonical change order
    Hash,
    /// Print the change DAG in Graphviz format
    Graph,
    /// Replay the document and print its details
    Replay {
        #[arg(long)]
        before: Option<String>,
        #[arg(long, requires = "before")]
        inclusive: bool,
        /// Replay only the changes that touch details
        #[arg(long, conflicts_with = "before")]
        details_only: bool,
    },
    /// Print the replayed document as a JSON snapshot
    Export,
    /// Append a text block to the document root
    Append {
        text: String,
        #[arg(long, default_value = "kiroku")]
        author: String,
        /// Device log to write to
        #[arg(long, default_value = "local")]
        log: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    let _otel_guard = if kiroku_telemetry::otel_enabled() {
        match kiroku_telemetry::otel_layer("kiroku") {
            Ok((otel_layer, guard)) => {
                registry.with(otel_layer).init();
                Some(guard)
            }
            Err(e) => {
                registry.init();
                tracing::warn!(error = %e, "OTel exporter unavailable, tracing locally only");
                None
            }
        }
    } else {
        registry.init();
        None
    };
    #[cfg(not(feature = "telemetry"))]
    registry.init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kiroku: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store = Arc::new(open_store(args.db)?);
    let root = args.root.as_str();

    match args.command {
        Command::Logs => {
            for log in store.get_logs().await? {
                println!("{}\t{}", log.id, log.head);
            }
        }
        Command::Heads => {
            let built = build(&store, &config, None, false).await?;
            for head in built.tree.heads() {
                println!("{head}");
            }
            if let Some(breakpoint) = built.breakpoint() {
                eprintln!("breakpoint: {breakpoint}");
            }
            for head in &built.report.subsumed_heads {
                eprintln!("subsumed: {head}");
            }
            for warning in &built.report.warnings {
                eprintln!("warning: {warning:?}");
            }
        }
        Command::Tree { before, inclusive } => {
            let built = build(&store, &config, before.as_deref(), inclusive).await?;
            let (state, _) = StateReplayer::new(config.normalize.clone()).replay(root, &built.tree)?;
            print!("{}", state.to_tree_string());
        }
        Command::Hash => {
            let built = build(&store, &config, None, false).await?;
            println!("{}", built.tree.hash());
        }
        Command::Graph => {
            let built = build(&store, &config, None, false).await?;
            print!("{}", built.tree.to_dot());
        }
        Command::Replay {
            before,
            inclusive,
            details_only,
        } => {
            let built = if details_only {
                DagBuilder::new(&*store, &PostcardCodec)
                    .with_config(config.history.clone())
                    .build_details_tree()
                    .await?
            } else {
                build(&store, &config, before.as_deref(), inclusive).await?
            };
            let (state, applied) = StateReplayer::new(config.normalize.clone()).replay(root, &built.tree)?;
            eprintln!("replayed {applied} changes onto {}", built.tree.root_id().map(ChangeId::as_str).unwrap_or("-"));
            for (key, value) in state.details() {
                println!("{key}\t{value:?}");
            }
        }
        Command::Export => {
            let dyn_store: Arc<dyn RecordStore> = store.clone();
            let doc = HistoryDocument::open(dyn_store, root, config).await?;
            let json = serde_json::to_string_pretty(&doc.state().to_snapshot())?;
            println!("{json}");
        }
        Command::Append { text, author, log } => {
            let id = append(store, root, config, text, author, log).await?;
            println!("{id}");
        }
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<KernelConfig> {
    match path {
        Some(path) => KernelConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => match KernelConfig::default_path() {
            Some(path) => Ok(KernelConfig::load_or_default(path)?),
            None => Ok(KernelConfig::default()),
        },
    }
}

fn open_store(path: Option<PathBuf>) -> Result<SqliteRecordStore> {
    let path = match path {
        Some(path) => path,
        None => {
            let dir = dirs::data_dir()
                .context("no data directory on this platform, pass --db")?
                .join("kiroku");
            std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
            dir.join("kiroku.db")
        }
    };
    tracing::debug!(path = %path.display(), "opening record store");
    SqliteRecordStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

async fn build(store: &SqliteRecordStore, config: &KernelConfig, before: Option<&str>, inclusive: bool) -> Result<BuiltTree> {
    let builder = DagBuilder::new(store, &PostcardCodec).with_config(config.history.clone());
    let built = match before {
        Some(id) => builder.build_tree_before(&ChangeId::from(id), inclusive).await?,
        None => builder.build_tree().await?,
    };
    Ok(built)
}

/// Appends a text block under the root, creating the document first when
/// the store is empty.
async fn append(
    store: Arc<SqliteRecordStore>,
    root: &str,
    config: KernelConfig,
    text: String,
    author: String,
    log: String,
) -> Result<ChangeId> {
    let writer = ChangeWriter::new(&*store, log).with_config(config.snapshot.clone());
    let dyn_store: Arc<dyn RecordStore> = store.clone();

    let doc = match HistoryDocument::open(dyn_store.clone(), root, config.clone()).await {
        Ok(doc) => doc,
        Err(e) if e.is_empty_history() => {
            let seed = writer
                .push_change(
                    &Tree::new(),
                    &DocumentState::new(root),
                    &[],
                    PushOptions {
                        author: author.clone(),
                        force_snapshot: true,
                        ..Default::default()
                    },
                )
                .await?;
            tracing::info!(change = %seed, root, "created document");
            HistoryDocument::open(dyn_store, root, config.clone()).await?
        }
        Err(e) => return Err(e.into()),
    };

    let ops = vec![ChangeContent::BlockCreate {
        target_id: root.into(),
        position: Position::Inner,
        blocks: vec![Block::text(Uuid::now_v7().to_string(), text)],
    }];
    let mut next = DocumentState::from_snapshot(root, &doc.state().to_snapshot()).new_state();
    let skipped = next.apply_changes(&ops);
    anyhow::ensure!(skipped == 0, "root block {root} cannot take children");
    let (edited, _) = next.apply(ApplyMode::Full {
        with_layouts: config.normalize.with_layouts,
    })?;

    let id = writer
        .push_change(
            doc.tree(),
            &edited,
            &ops,
            PushOptions {
                author,
                ..Default::default()
            },
        )
        .await?;
    Ok(id)
}
