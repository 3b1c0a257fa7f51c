//! Chimera CLI
//!
//! Command-line interface for conversation memories.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chimera::error::Result;
use chimera::types::*;
use chimera::{ChatTurn, MemoryEngine, SqliteStore};

#[derive(Parser)]
#[command(name = "chimera-cli")]
#[command(about = "Conversation memory engine CLI")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(
        long,
        env = "CHIMERA_DB_PATH",
        default_value = "~/.local/share/chimera/memories.db"
    )]
    db_path: String,

    /// Vocabulary bound for the similarity index
    #[arg(long, env = "CHIMERA_MAX_FEATURES", default_value = "1000")]
    max_features: usize,

    /// Upper clamp on search hits
    #[arg(long, env = "CHIMERA_MAX_TOP_K", default_value = "50")]
    max_top_k: usize,

    /// Use DELETE journal mode (safe for network-synced folders)
    #[arg(long)]
    cloud_safe: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remember a memory
    Remember {
        /// Memory text
        text: String,
        /// Conversation id
        #[arg(short, long)]
        conversation: String,
        /// Scope: conversation or team-global
        #[arg(short, long)]
        scope: Option<String>,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Metadata as a JSON object of primitive values
        #[arg(short, long)]
        metadata: Option<String>,
    },
    /// Similarity search
    Search {
        /// Search query
        query: String,
        /// Conversation id (team-global only when omitted)
        #[arg(short, long)]
        conversation: Option<String>,
        /// Maximum hits
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Render the context block for a conversation
    Inject {
        /// Conversation id
        conversation: String,
        /// Maximum memories
        #[arg(short, long)]
        max: Option<usize>,
    },
    /// Extract facts from a chat turn
    Extract {
        /// Conversation id
        #[arg(short, long)]
        conversation: String,
        /// User message
        #[arg(short, long)]
        user: String,
        /// Assistant reply
        #[arg(short, long, default_value = "")]
        assistant: String,
        /// Model label
        #[arg(short, long, default_value = "unknown")]
        model: String,
    },
    /// Record a full chat turn and extract facts from it
    Turn {
        /// Conversation id
        #[arg(short, long)]
        conversation: String,
        /// User message
        #[arg(short, long)]
        user: String,
        /// Assistant reply
        #[arg(short, long)]
        assistant: String,
        /// Model label
        #[arg(short, long, default_value = "unknown")]
        model: String,
    },
    /// Delete a memory
    Delete {
        /// Memory ID
        id: i64,
    },
    /// Delete every memory of a conversation
    Clear {
        /// Conversation id
        conversation: String,
    },
    /// List a conversation's memories
    List {
        /// Conversation id
        conversation: String,
        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,
        /// Page offset
        #[arg(short, long)]
        offset: Option<usize>,
    },
    /// Rebuild the similarity index
    Rebuild,
    /// Show index status
    Status,
    /// Show memory counts for a conversation
    Stats {
        /// Conversation id
        conversation: String,
    },
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chimera=info"));

    if json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn split_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    // Expand ~ in path
    let db_path = shellexpand::tilde(&cli.db_path).to_string();

    let store_config = StoreConfig {
        db_path,
        storage_mode: if cli.cloud_safe {
            StorageMode::CloudSafe
        } else {
            StorageMode::Local
        },
    };
    let engine_config = EngineConfig {
        max_features: cli.max_features,
        max_top_k: cli.max_top_k,
        // The rebuild command fits explicitly and reports the summary
        rebuild_on_open: !matches!(cli.command, Commands::Rebuild),
        ..Default::default()
    };

    let store = SqliteStore::open(store_config)?;
    let store_info = serde_json::json!({
        "db_path": store.db_path(),
        "storage_mode": store.storage_mode(),
    });
    let engine = MemoryEngine::new(Arc::new(store), engine_config)?;

    match cli.command {
        Commands::Remember {
            text,
            conversation,
            scope,
            tags,
            metadata,
        } => {
            let metadata = match metadata {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            let input = RememberInput {
                text,
                conversation_id: conversation,
                scope,
                tags: split_tags(tags),
                metadata,
            };
            print_json(&engine.remember(input)?)?;
        }
        Commands::Search {
            query,
            conversation,
            top_k,
        } => {
            print_json(&engine.search(&query, top_k, conversation.as_deref()))?;
        }
        Commands::Inject { conversation, max } => {
            print_json(&engine.inject_context(&conversation, max)?)?;
        }
        Commands::Extract {
            conversation,
            user,
            assistant,
            model,
        } => {
            print_json(&engine.extract_facts(&user, &assistant, &conversation, &model)?)?;
        }
        Commands::Turn {
            conversation,
            user,
            assistant,
            model,
        } => {
            let turn = ChatTurn {
                conversation_id: conversation,
                user_message: user,
                assistant_reply: assistant,
                model_used: model,
            };
            print_json(&engine.record_chat_turn(turn)?)?;
        }
        Commands::Delete { id } => {
            engine.delete_memory(id)?;
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        Commands::Clear { conversation } => {
            let deleted = engine.clear_conversation(&conversation)?;
            print_json(&serde_json::json!({
                "conversation_id": conversation,
                "deleted": deleted,
            }))?;
        }
        Commands::List {
            conversation,
            limit,
            offset,
        } => {
            print_json(&engine.list_memories(&conversation, limit, offset)?)?;
        }
        Commands::Rebuild => {
            print_json(&engine.rebuild_index()?)?;
        }
        Commands::Status => {
            let status = engine.index_status()?;
            print_json(&serde_json::json!({
                "status": status,
                "vectorizer": engine.vectorizer_config(),
                "store": store_info,
            }))?;
        }
        Commands::Stats { conversation } => {
            print_json(&engine.conversation_stats(&conversation)?)?;
        }
    }

    Ok(())
}
