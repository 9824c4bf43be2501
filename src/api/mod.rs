//! The embedding-facing surface, spec §6.1: `Database` (the shared catalog
//! handle), `Connection` (one SQL session, implementing `vdbe::Host`), and
//! `Statement` (prepare/bind/step/column/reset/finalize).
//!
//! `backup.rs`/`blob.rs`/`config.rs`/`session.rs` are the teacher's
//! SQLite-C-ABI-shaped online-backup/incremental-blob-I/O/db-config/session-
//! extension surfaces; spec §1 treats "public database handle, statement
//! preparation wrappers" as an external collaborator and names none of
//! those features, so they are left unwired here pending the final trim.

mod connection;
mod database;
mod params;
mod stmt;

pub use connection::Connection;
pub use database::{connect, Database};
pub use stmt::{StepResult, Statement};
