//! # tidesync CLI (`tide`)
//!
//! ## Usage
//!
//! ```bash
//! tide --config ./config/tide.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tide init` | Create the SQLite database, run migrations, seed settings |
//! | `tide todo add <title>` | Create a todo |
//! | `tide todo done <id>` | Mark a todo completed |
//! | `tide note add <title>` | Create a knowledge item |
//! | `tide list <collection>` | List records, newest first |
//! | `tide rm <collection> <id>` | Delete a record |
//! | `tide attach <todo-id> <file>` | Store a file as an attachment |
//! | `tide attachments <todo-id>` | List a todo's attachments |
//! | `tide sync <push\|pull\|full> [collection]` | Sync now |
//! | `tide status` | Per-collection sync ledger |
//! | `tide settings show\|set` | Auto-sync settings |
//! | `tide run` | Interactive session with auto-sync |
//!
//! Results go to stdout; logs go to stderr (`RUST_LOG`, default `info`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tidesync::app::App;
use tidesync::orchestrator::SyncOp;
use tidesync::records_cmd::{self, NewTodo};
use tidesync::sync_cmd::{self, SettingsUpdate};
use tidesync::{config, session};
use tidesync_core::models::{Collection, Priority};

/// tidesync CLI: local-first TODOs and notes with optional cloud sync.
#[derive(Parser)]
#[command(
    name = "tide",
    about = "tidesync: local-first TODOs and knowledge base with optional cloud sync",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tide.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed settings. Idempotent.
    Init,

    /// Manage todos.
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },

    /// Manage knowledge items.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// List records in a collection (todos, knowledge).
    List { collection: Collection },

    /// Delete a record. Removing a todo also removes its attachments.
    Rm { collection: Collection, id: String },

    /// Attach a file to a todo.
    Attach {
        todo_id: String,
        file: PathBuf,

        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },

    /// List a todo's attachments.
    Attachments { todo_id: String },

    /// Sync with the remote backend now.
    Sync {
        #[arg(value_enum)]
        op: OpArg,

        /// Collection to sync; every collection when omitted.
        collection: Option<Collection>,
    },

    /// Show the per-collection sync ledger.
    Status,

    /// Show or change auto-sync settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Run an interactive session with auto-sync enabled.
    ///
    /// Reads commands from stdin (`todo`, `note`, `done`, `rm`, `ls`,
    /// `sync`, `online`, `offline`, `status`, `auto`, `quit`).
    Run,
}

#[derive(Subcommand)]
enum TodoAction {
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// low, medium, or high.
        #[arg(long, default_value = "medium")]
        priority: Priority,

        /// YYYY-MM-DD or RFC 3339.
        #[arg(long)]
        due: Option<String>,

        /// Repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Done {
        id: String,
    },
}

#[derive(Subcommand)]
enum NoteAction {
    Add {
        title: String,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        content: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        interval_minutes: Option<u32>,

        #[arg(long)]
        debounce_seconds: Option<u32>,

        #[arg(long)]
        network_restore: Option<bool>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    Push,
    Pull,
    Full,
}

impl From<OpArg> for SyncOp {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Push => SyncOp::Push,
            OpArg::Pull => SyncOp::Pull,
            OpArg::Full => SyncOp::Full,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        let app = App::open(cfg).await?;
        app.settings().await?;
        app.close().await;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let app = App::open(cfg).await?;
    let result = dispatch(&app, cli.command).await;
    app.close().await;
    result
}

async fn dispatch(app: &App, command: Commands) -> anyhow::Result<()> {
    let records = app.store.as_ref();
    let clock = app.clock.as_ref();

    match command {
        Commands::Init => {}
        Commands::Todo { action } => match action {
            TodoAction::Add {
                title,
                description,
                priority,
                due,
                tags,
            } => {
                let due_date = due.as_deref().map(records_cmd::parse_due).transpose()?;
                let todo = records_cmd::add_todo(
                    records,
                    clock,
                    &app.owner(),
                    NewTodo {
                        title,
                        description,
                        priority,
                        due_date,
                        tags,
                    },
                )
                .await?;
                app.note_write(Collection::Todos).await;
                println!("{}", todo.id);
            }
            TodoAction::Done { id } => {
                records_cmd::complete_todo(records, clock, &id).await?;
                app.note_write(Collection::Todos).await;
                println!("ok");
            }
        },
        Commands::Note { action } => match action {
            NoteAction::Add {
                title,
                url,
                content,
            } => {
                let item =
                    records_cmd::add_note(records, clock, &app.owner(), &title, url, content)
                        .await?;
                app.note_write(Collection::Knowledge).await;
                println!("{}", item.id);
            }
        },
        Commands::List { collection } => {
            records_cmd::print_records(records, collection).await?;
        }
        Commands::Rm { collection, id } => {
            let removed = records_cmd::remove_record(records, records, collection, &id).await?;
            app.note_write(collection).await;
            println!("removed ({} attachment(s))", removed);
        }
        Commands::Attach {
            todo_id,
            file,
            mime,
        } => {
            let attachment =
                records_cmd::attach_file(records, records, clock, &todo_id, &file, mime).await?;
            println!("{}", attachment.id);
        }
        Commands::Attachments { todo_id } => {
            records_cmd::print_attachments(records, &todo_id).await?;
        }
        Commands::Sync { op, collection } => {
            sync_cmd::run_sync(app, op.into(), collection).await?;
        }
        Commands::Status => {
            sync_cmd::run_status(app).await?;
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => sync_cmd::run_settings_show(app).await?,
            SettingsAction::Set {
                enabled,
                interval_minutes,
                debounce_seconds,
                network_restore,
            } => {
                sync_cmd::run_settings_set(
                    app,
                    SettingsUpdate {
                        enabled,
                        interval_minutes,
                        debounce_seconds,
                        network_restore,
                    },
                )
                .await?
            }
        },
        Commands::Run => {
            session::run_session(app).await?;
        }
    }

    Ok(())
}
