//! Version command implementation.

use crate::error::Result;
use crate::storage::schema::SCHEMA_VERSION;

pub fn execute() -> Result<()> {
    println!(
        "cmdhist version {} (schema {})",
        env!("CARGO_PKG_VERSION"),
        SCHEMA_VERSION
    );
    Ok(())
}
