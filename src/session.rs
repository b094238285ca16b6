//! `tide run`: a long-lived session with auto-sync.
//!
//! Starts the scheduler and, when a remote is configured, the network
//! probe, then reads line commands from stdin. Writes go through an
//! [`ObservedStore`] so each one re-arms the debounce timer for its
//! collection. Persisted settings are re-read periodically, so
//! `tide settings set` from another shell reaches the running scheduler.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `todo <title>` | Create a todo |
//! | `note <title>` | Create a knowledge item |
//! | `done <id>` | Mark a todo completed |
//! | `rm <collection> <id>` | Delete a record (todos take their attachments along) |
//! | `ls <collection>` | List records |
//! | `sync` | Full sync of every collection now |
//! | `online` / `offline` | Override the connectivity signal |
//! | `status` | Ledger and orchestrator state |
//! | `auto [on\|off\|interval <min>\|debounce <sec>\|restore on\|off]` | Show or change auto-sync settings |
//! | `quit` | Stop the session |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use tidesync_core::models::{AutoSyncConfig, Collection};
use tidesync_core::store::{RecordStore, SettingsStore};

use crate::app::App;
use crate::netprobe::spawn_probe;
use crate::observed::ObservedStore;
use crate::orchestrator::SyncOp;
use crate::records_cmd::{self, NewTodo};
use crate::scheduler::{spawn_scheduler, SchedulerHandle, SyncRunner};
use crate::sync_cmd::{self, SettingsUpdate};

const SETTINGS_RELOAD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Todo(String),
    Note(String),
    Done(String),
    Remove(Collection, String),
    List(Collection),
    Sync,
    Online,
    Offline,
    Status,
    AutoSync(SettingsUpdate),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<SessionCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb {
        "todo" | "note" | "done" if rest.is_empty() => bail!("usage: {} <{}>", verb, arg_name(verb)),
        "todo" => SessionCommand::Todo(rest.to_string()),
        "note" => SessionCommand::Note(rest.to_string()),
        "done" => SessionCommand::Done(rest.to_string()),
        "rm" => {
            let Some((collection, id)) = rest.split_once(char::is_whitespace) else {
                bail!("usage: rm <collection> <id>");
            };
            SessionCommand::Remove(collection.parse()?, id.trim().to_string())
        }
        "ls" => SessionCommand::List(if rest.is_empty() {
            Collection::Todos
        } else {
            rest.parse()?
        }),
        "sync" => SessionCommand::Sync,
        "online" => SessionCommand::Online,
        "offline" => SessionCommand::Offline,
        "status" => SessionCommand::Status,
        "auto" => SessionCommand::AutoSync(parse_auto(rest)?),
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(Some(command))
}

fn parse_auto(args: &str) -> Result<SettingsUpdate> {
    let mut update = SettingsUpdate::default();
    let mut words = args.split_whitespace();
    match (words.next(), words.next()) {
        (None, _) => {}
        (Some("on"), None) => update.enabled = Some(true),
        (Some("off"), None) => update.enabled = Some(false),
        (Some("interval"), Some(n)) => update.interval_minutes = Some(n.parse()?),
        (Some("debounce"), Some(n)) => update.debounce_seconds = Some(n.parse()?),
        (Some("restore"), Some("on")) => update.network_restore = Some(true),
        (Some("restore"), Some("off")) => update.network_restore = Some(false),
        _ => bail!("usage: auto [on|off|interval <minutes>|debounce <seconds>|restore on|off]"),
    }
    if words.next().is_some() {
        bail!("usage: auto [on|off|interval <minutes>|debounce <seconds>|restore on|off]");
    }
    Ok(update)
}

fn arg_name(verb: &str) -> &'static str {
    if verb == "done" {
        "id"
    } else {
        "title"
    }
}

pub async fn run_session(app: &App) -> Result<()> {
    let settings = app.settings().await?;
    let observed = ObservedStore::new(app.store.clone());

    let runner: Arc<dyn SyncRunner> = app.orchestrator.clone();
    let (scheduler, task) = spawn_scheduler(runner, settings.auto_sync);
    let forward = scheduler.forward_changes(observed.subscribe());
    let watch = spawn_settings_watch(
        app.store.clone(),
        scheduler.clone(),
        SETTINGS_RELOAD,
        settings.auto_sync,
    );
    let probe = app.config.remote.as_ref().map(|remote| {
        spawn_probe(
            remote.url.clone(),
            Duration::from_secs(app.config.network.probe_interval_secs),
            scheduler.clone(),
        )
    });
    info!(owner = %app.owner(), "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(SessionCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(err) = execute(app, &observed, &scheduler, command).await {
                    eprintln!("error: {:#}", err);
                }
            }
            Err(err) => eprintln!("{}", err),
        }
    }

    if let Some(probe) = probe {
        probe.abort();
    }
    forward.abort();
    watch.abort();
    scheduler.shutdown();
    task.await?;
    Ok(())
}

/// Poll the persisted settings every `every` and forward changes to the
/// scheduler.
pub fn spawn_settings_watch(
    store: Arc<dyn SettingsStore>,
    scheduler: SchedulerHandle,
    every: Duration,
    mut current: AutoSyncConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.load_settings().await {
                Ok(Some(settings)) if settings.auto_sync != current => {
                    current = settings.auto_sync;
                    scheduler.set_config(current);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %format!("{:#}", err), "could not reload settings"),
            }
        }
    })
}

async fn execute(
    app: &App,
    records: &ObservedStore,
    scheduler: &SchedulerHandle,
    command: SessionCommand,
) -> Result<()> {
    let clock = app.clock.as_ref();
    match command {
        SessionCommand::Todo(title) => {
            let todo =
                records_cmd::add_todo(records, clock, &app.owner(), NewTodo::titled(&title)).await?;
            app.note_write(Collection::Todos).await;
            println!("{}", todo.id);
        }
        SessionCommand::Note(title) => {
            let item = records_cmd::add_note(records, clock, &app.owner(), &title, None, None).await?;
            app.note_write(Collection::Knowledge).await;
            println!("{}", item.id);
        }
        SessionCommand::Done(id) => {
            records_cmd::complete_todo(records, clock, &id).await?;
            app.note_write(Collection::Todos).await;
            println!("ok");
        }
        SessionCommand::Remove(collection, id) => {
            let removed =
                records_cmd::remove_record(records, app.store.as_ref(), collection, &id).await?;
            app.note_write(collection).await;
            println!("removed ({} attachment(s))", removed);
        }
        SessionCommand::List(collection) => {
            records_cmd::print_records(records as &dyn RecordStore, collection).await?;
        }
        SessionCommand::Sync => {
            for (collection, result) in app.orchestrator.full_sync_all().await {
                sync_cmd::print_outcome(collection, SyncOp::Full, &result);
            }
        }
        SessionCommand::AutoSync(update) => {
            let settings = app.update_auto_sync(|c| update.apply(c)).await?;
            scheduler.set_config(settings.auto_sync);
            sync_cmd::print_auto_sync(&settings.auto_sync);
        }
        SessionCommand::Online => scheduler.set_online(true),
        SessionCommand::Offline => scheduler.set_online(false),
        SessionCommand::Status => {
            sync_cmd::run_status(app).await?;
            for collection in Collection::ALL {
                let snapshot = app.orchestrator.snapshot(collection);
                let error = snapshot
                    .last_error
                    .map(|e| format!("  last error: {}", e))
                    .unwrap_or_default();
                println!("{:<10} phase: {:?}{}", collection, snapshot.phase, error);
            }
        }
        SessionCommand::Help => {
            println!("todo <title> | note <title> | done <id> | rm <collection> <id> | ls [collection]");
            println!("sync | online | offline | status | auto [on|off|interval <min>|debounce <sec>] | quit");
        }
        SessionCommand::Quit => {}
    }
    Ok(())
}
