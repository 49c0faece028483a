//! # Usage Learn CLI (`ulearn`)
//!
//! Front-end for the on-device learning engine: initialize the database,
//! feed usage events through the learning pipeline, retrieve learned
//! patterns, and manage classification-model descriptors.
//!
//! ## Usage
//!
//! ```bash
//! ulearn --config ./config/ulearn.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ulearn init` | Create the SQLite database and schema |
//! | `ulearn classify "<text>"` | Classify a text with the rule table |
//! | `ulearn parse <file>` | Print the structural chunks of a source file |
//! | `ulearn learn generation` | Learn from a completed generation |
//! | `ulearn learn replacement` | Learn from a reasoned code replacement |
//! | `ulearn learn observe` | Learn from an object/property observation |
//! | `ulearn search "<prompt>"` | Ranked learned patterns for a prompt |
//! | `ulearn get <id>` | Retrieve one learned record |
//! | `ulearn stats` | Record counts and model status |
//! | `ulearn models <action>` | List, add, remove, select, and verify models |
//!
//! ## Examples
//!
//! ```bash
//! ulearn init
//! ulearn learn generation --prompt "create a login screen" --code-file Login.kt
//! ulearn search "login screen" --limit 3
//! ulearn models select bpe-code
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use usage_learn::{
    classify_cmd, config, get, learn_cmd, migrate, models_cmd, search, stats,
};

/// Usage Learn CLI: learn reusable code patterns from generation history.
///
/// Commands that touch the database read `--config`. `classify` and
/// `parse` work without a config file.
#[derive(Parser)]
#[command(
    name = "ulearn",
    about = "Usage Learn: an on-device engine that learns code patterns from usage",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ulearn.toml`. See `config/ulearn.example.toml`.
    #[arg(long, global = true, default_value = "./config/ulearn.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Classify a text and print category, confidence, and features.
    Classify {
        /// Text to classify.
        text: String,

        /// Surrounding context (for example the prompt).
        #[arg(long)]
        context: Option<String>,

        /// Print JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Parse a source file into structural chunks (JSON output).
    Parse {
        /// Source file to parse.
        file: PathBuf,

        /// Language name or extension; defaults to the file extension.
        #[arg(long)]
        language: Option<String>,
    },

    /// Feed a usage event through the learning pipeline.
    Learn {
        /// Name of the model that produced the event.
        ///
        /// Events attributed to the offline engine (`offline-rules`) are
        /// not learned from.
        #[arg(long, global = true, default_value = "external")]
        model: String,

        #[command(subcommand)]
        action: LearnAction,
    },

    /// Search learned records by prompt-token overlap.
    Search {
        /// Prompt to match against stored prompt patterns.
        query: String,

        /// Maximum number of results (defaults to `retrieval.default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Retrieve one learned record by ID.
    Get {
        /// Record UUID.
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Show record counts per kind and model status.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Manage classification-model descriptors.
    Models {
        #[command(subcommand)]
        action: ModelsCommand,
    },
}

#[derive(Subcommand)]
enum LearnAction {
    /// Learn from a completed generation.
    Generation {
        #[arg(long)]
        prompt: String,

        /// File holding the generated code.
        #[arg(long)]
        code_file: PathBuf,

        /// Caller metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,

        /// Record source: normal, debug, or background.
        #[arg(long, default_value = "normal")]
        source: String,

        /// Language name or extension; defaults to the file extension.
        #[arg(long)]
        language: Option<String>,
    },

    /// Learn from code that replaced an earlier version.
    Replacement {
        #[arg(long)]
        prompt: String,

        /// File holding the previous code, if any.
        #[arg(long)]
        old_file: Option<PathBuf>,

        /// File holding the replacement code.
        #[arg(long)]
        new_file: PathBuf,

        /// Why the code was replaced.
        #[arg(long)]
        reason: String,

        #[arg(long)]
        metadata: Option<String>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Learn from an object and its properties.
    Observe {
        /// Object name.
        #[arg(long)]
        object: String,

        /// Object type.
        #[arg(long)]
        object_type: String,

        /// Property as `key=value`; repeatable.
        #[arg(long = "prop", value_parser = parse_key_val)]
        props: Vec<(String, String)>,

        #[arg(long)]
        prompt: String,

        #[arg(long)]
        context: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List built-in and custom models. `*` marks the selection.
    List,

    /// Register a custom model descriptor.
    Add {
        id: String,

        /// Display name.
        #[arg(long)]
        name: String,

        /// Backend type: wordpiece, bpe, or generic.
        #[arg(long)]
        backend: String,

        /// Model file location, if not under the models directory.
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Remove a custom model descriptor.
    Remove { id: String },

    /// Select a model; omit the ID to clear the selection.
    Select { id: Option<String> },

    /// Check that a model's file is present.
    Verify { id: String },

    /// Clear a model's ready flag. The flag is set only by a successful load.
    Unready { id: String },

    /// Show the active model and its readiness.
    Status,
}

/// Parse a `key=value` pair for `--prop` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "usage_learn={0},usage_learn_core={0},ulearn={0},sqlx=warn",
            level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Classify {
            text,
            context,
            json,
        } => {
            let cfg =
                config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            init_logging(&cfg.logging.level);
            classify_cmd::run_classify(text, context.as_deref(), *json)?;
            return Ok(());
        }
        Commands::Parse { file, language } => {
            let cfg =
                config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            init_logging(&cfg.logging.level);
            classify_cmd::run_parse(file, language.as_deref())?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Learn { model, action } => {
            let event = match action {
                LearnAction::Generation {
                    prompt,
                    code_file,
                    metadata,
                    source,
                    language,
                } => learn_cmd::generation_event(
                    &prompt,
                    &code_file,
                    metadata.as_deref(),
                    &source,
                    language.as_deref(),
                )?,
                LearnAction::Replacement {
                    prompt,
                    old_file,
                    new_file,
                    reason,
                    metadata,
                    language,
                } => learn_cmd::replacement_event(
                    &prompt,
                    old_file.as_deref(),
                    &new_file,
                    &reason,
                    metadata.as_deref(),
                    language.as_deref(),
                )?,
                LearnAction::Observe {
                    object,
                    object_type,
                    props,
                    prompt,
                    context,
                } => learn_cmd::observation_event(
                    &object,
                    &object_type,
                    props,
                    &prompt,
                    context.as_deref(),
                ),
            };
            learn_cmd::run_learn(&cfg, &model, event).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Models { action } => {
            let action = match action {
                ModelsCommand::List => models_cmd::ModelsAction::List,
                ModelsCommand::Add {
                    id,
                    name,
                    backend,
                    file,
                    url,
                } => models_cmd::ModelsAction::Add {
                    id,
                    name,
                    backend,
                    file,
                    url,
                },
                ModelsCommand::Remove { id } => models_cmd::ModelsAction::Remove { id },
                ModelsCommand::Select { id } => models_cmd::ModelsAction::Select { id },
                ModelsCommand::Verify { id } => models_cmd::ModelsAction::Verify { id },
                ModelsCommand::Unready { id } => models_cmd::ModelsAction::ClearReady { id },
                ModelsCommand::Status => models_cmd::ModelsAction::Status,
            };
            models_cmd::run_models(&cfg, action).await?;
        }
        Commands::Classify { .. } | Commands::Parse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
