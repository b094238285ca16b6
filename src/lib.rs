//! # tidesync
//!
//! A local-first sync engine for TODOs and a personal knowledge base.
//!
//! Every read and write hits the local SQLite database first; the remote
//! backend (a Supabase project) is an optional backup and cross-device
//! channel that is reconciled in the background with last-write-wins
//! semantics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  RecordChanged  ┌───────────┐  SyncTrigger  ┌──────────────┐
//! │ ObservedStore│────────────────▶│ Scheduler │──────────────▶│ Orchestrator │
//! └──────┬───────┘                 └───────────┘               └──┬────────┬──┘
//!        │                                                        │        │
//!        ▼                                                        ▼        ▼
//! ┌──────────────┐◀──────────── merge write-backs ────────── ┌────────┐ ┌────────┐
//! │ SQLite store │                                            │ Merge  │ │ Remote │
//! └──────────────┘                                            └────────┘ └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tide init                         # create database, seed settings
//! tide todo add "renew passport" --due 2026-11-01 --priority high
//! tide note add "Rust async book" --url https://rust-lang.github.io/async-book/
//! tide sync full                    # push then pull every collection
//! tide run                          # interactive session with auto-sync
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the storage traits |
//! | [`thumbnail`] | Image thumbnails for attachments |
//! | [`remote`] | Supabase adapter and auth wiring |
//! | [`observed`] | Change feed over the record store |
//! | [`orchestrator`] | Push/pull cycles, serialization, timeouts |
//! | [`scheduler`] | Runtime driver for auto-sync triggers |
//! | [`netprobe`] | Connectivity signal |
//! | [`app`] | Component wiring |
//! | [`records_cmd`] | Record and attachment commands |
//! | [`sync_cmd`] | Sync, status, and settings commands |
//! | [`session`] | `tide run` |
//!
//! Models, the merge engine, and the pure scheduler live in
//! [`tidesync_core`].

pub mod app;
pub mod config;
pub mod db;
pub mod migrate;
pub mod netprobe;
pub mod observed;
pub mod orchestrator;
pub mod records_cmd;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod sqlite_store;
pub mod sync_cmd;
pub mod thumbnail;
