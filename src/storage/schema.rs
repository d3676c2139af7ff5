//! Database schema and version tracking.

use rusqlite::{Connection, Result};

/// Current schema version, recorded in `cmdhist_info`.
pub const SCHEMA_VERSION: &str = "0.1";

/// The complete SQLite schema.
///
/// Repeating strings (command text, directories, terminals, environment
/// pairs) live in side tables keyed by integer ids; `command_history`
/// and `session_history` reference them. Timestamps are UTC
/// `YYYY-MM-DD HH:MM:SS` strings so `DATETIME()` and `julianday()`
/// operate on them directly.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS cmdhist_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_version TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS command_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command TEXT NOT NULL UNIQUE
);

-- directory is stored in trailing-separator form; lookups normalize
-- their input the same way before touching this table.
CREATE TABLE IF NOT EXISTS directory_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    directory TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS terminal_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    terminal TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS session_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_long_id TEXT NOT NULL UNIQUE,
    start_time TIMESTAMP,
    stop_time TIMESTAMP
);

CREATE TABLE IF NOT EXISTS command_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command_id INTEGER REFERENCES command_list(id),
    session_id INTEGER REFERENCES session_history(id),
    dir_id INTEGER REFERENCES directory_list(id),
    terminal_id INTEGER REFERENCES terminal_list(id),
    start_time TIMESTAMP,
    stop_time TIMESTAMP,
    exit_code INTEGER
);

CREATE INDEX IF NOT EXISTS idx_command_history_command
    ON command_history(command_id);
CREATE INDEX IF NOT EXISTS idx_command_history_session
    ON command_history(session_id);
CREATE INDEX IF NOT EXISTS idx_command_history_start
    ON command_history(start_time);

CREATE TABLE IF NOT EXISTS environment_variable (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    variable_name TEXT NOT NULL,
    variable_value TEXT NOT NULL,
    UNIQUE(variable_name, variable_value)
);

CREATE TABLE IF NOT EXISTS command_environment_map (
    ch_id INTEGER NOT NULL REFERENCES command_history(id),
    ev_id INTEGER NOT NULL REFERENCES environment_variable(id)
);

CREATE INDEX IF NOT EXISTS idx_command_environment_ch
    ON command_environment_map(ch_id);

CREATE TABLE IF NOT EXISTS session_environment_map (
    sh_id INTEGER NOT NULL REFERENCES session_history(id),
    ev_id INTEGER NOT NULL REFERENCES environment_variable(id)
);

CREATE INDEX IF NOT EXISTS idx_session_environment_sh
    ON session_environment_map(sh_id);

CREATE TABLE IF NOT EXISTS pipe_status_map (
    ch_id INTEGER NOT NULL REFERENCES command_history(id),
    program_position INTEGER NOT NULL,
    exit_code INTEGER,
    UNIQUE(ch_id, program_position)
);
";

/// Apply the schema (idempotent).
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
