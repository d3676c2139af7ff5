//! cmdhist - augmented shell history.
//!
//! Shell hooks drop JSON records for session starts, commands, and
//! session exits; a daemon (or one-shot `index`) folds them into a
//! SQLite store; `search` compiles a rich filter vocabulary into one
//! SQL statement over that store.
//!
//! # Architecture
//!
//! - [`cli`] - command-line surface using clap
//! - [`model`] - record and row types
//! - [`sql`] - composable SELECT builder
//! - [`storage`] - SQLite store (schema, UDFs, ingest, search)
//! - [`query`] - search options and the query pre-processor
//! - [`indexer`] - per-file record ingest
//! - [`daemon`] - PID file, signals, directory watch loop
//! - [`config`] - base-directory layout and config.toml
//! - [`error`] - error types and exit codes

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod indexer;
pub mod model;
pub mod query;
pub mod sql;
pub mod storage;
pub mod util;

pub use error::{Error, Result};
