//! SQL scalar functions registered on every connection.
//!
//! - `REGEXP(pattern, text)` backs the `x REGEXP ?` operator.
//! - `PROGRAM_NAME(cmd)` extracts the program from a command line,
//!   skipping leading `VAR=val` assignments.
//! - `PATHDIST(a, b)` counts differing path components.

use crate::util::path;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Result};

/// Register all UDFs. Called once per connection at open time.
pub fn register(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("regexp", 2, flags, |ctx| {
        let pattern = ctx.get::<String>(0)?;
        let text = match ctx.get_raw(1).as_str_or_null() {
            Ok(Some(s)) => s.to_string(),
            _ => return Ok(false),
        };
        let re = regex_lite::Regex::new(&pattern)
            .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
        Ok(re.is_match(&text))
    })?;

    conn.create_scalar_function("program_name", 1, flags, |ctx| {
        match ctx.get_raw(0).as_str_or_null() {
            Ok(Some(cmd)) => Ok(program_name(cmd)),
            _ => Ok(None),
        }
    })?;

    conn.create_scalar_function("pathdist", 2, flags, |ctx| {
        let a = ctx.get_raw(0).as_str_or_null();
        let b = ctx.get_raw(1).as_str_or_null();
        match (a, b) {
            (Ok(Some(a)), Ok(Some(b))) => Ok(Some(path::distance(a, b))),
            _ => Ok(None),
        }
    })?;

    Ok(())
}

/// First whitespace-separated token that contains no `=`.
#[must_use]
pub fn program_name(command: &str) -> Option<String> {
    command
        .split_whitespace()
        .find(|token| !token.contains('='))
        .map(ToString::to_string)
}
