//! SQLite persistence layer.
//!
//! - [`schema`] - embedded schema and version constants
//! - [`functions`] - SQL scalar functions (REGEXP, PROGRAM_NAME, PATHDIST)
//! - [`store`] - the `Store` type: ingest, search assembly, retrieval

pub mod functions;
pub mod schema;
pub mod store;

pub use store::Store;
