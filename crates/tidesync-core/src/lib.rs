//! # tidesync core
//!
//! Shared, WASM-safe logic for tidesync: record models, the last-write-wins
//! merge engine, storage and remote-adapter traits with in-memory
//! implementations, and the deterministic trigger scheduler.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! Time enters only as explicit arguments or through [`clock::Clock`].

pub mod attachments;
pub mod clock;
pub mod error;
pub mod merge;
pub mod models;
pub mod remote;
pub mod schedule;
pub mod store;

pub use error::{SyncError, SyncResult};
pub use models::{Collection, Record};
