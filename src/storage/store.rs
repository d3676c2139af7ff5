//! The store: all database reads and writes.
//!
//! One `Store` owns one `Connection`. Ingest methods are transactional;
//! the search method compiles a single parameterized SELECT through
//! [`SqlBuilder`] and streams rows, applying the context window and the
//! final limit lazily so the cursor never outlives the connection scope.

use crate::error::{Error, Result};
use crate::model::{CommandRecord, CommandRow, ExitRecord, FullCommandRecord, InitRecord, SessionRow};
use crate::query::{ContextType, SearchOptions, SortKey};
use crate::sql::{pair_groups, render_matcher, scalar_groups, SortOrder, SqlBuilder, SqlParam};
use crate::storage::functions;
use crate::storage::schema::{apply_schema, SCHEMA_VERSION};
use crate::util::path::{normalize_directory, under_glob};
use crate::util::time::posix_to_sql_timestamp;
use crate::util::window::ContextWindow;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const BASE_SOURCE: &str = "command_history \
     LEFT JOIN command_list CL ON command_history.command_id = CL.id \
     LEFT JOIN directory_list DL ON command_history.dir_id = DL.id \
     LEFT JOIN terminal_list TL ON command_history.terminal_id = TL.id \
     LEFT JOIN session_history SH ON command_history.session_id = SH.id";

// Every column carries an output alias equal to its key so ORDER BY can
// name the post-aggregate value and key-based row extraction stays
// aligned with the SELECT list.
const BASE_COLUMNS: [(&str, &str); 9] = [
    ("command_history.id AS command_history_id", "command_history_id"),
    ("CL.command AS command", "command"),
    ("command_history.start_time AS start_time", "start_time"),
    ("command_history.stop_time AS stop_time", "stop_time"),
    ("command_history.exit_code AS exit_code", "exit_code"),
    ("DL.directory AS directory", "directory"),
    ("TL.terminal AS terminal", "terminal"),
    ("command_history.session_id AS session_history_id", "session_history_id"),
    ("SH.session_long_id AS session_long_id", "session_long_id"),
];

/// SQLite-backed store for command and session history.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (tests).
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        functions::register(&conn)?;
        apply_schema(&conn)?;
        let store = Self { conn };
        store.ensure_version_row()?;
        Ok(store)
    }

    /// Append a version row if none matches the running binary.
    /// The table is append-only; rows are never updated.
    fn ensure_version_row(&self) -> Result<()> {
        let app_version = env!("CARGO_PKG_VERSION");
        let present: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM cmdhist_info
                 WHERE app_version = ?1 AND schema_version = ?2 LIMIT 1",
                [app_version, SCHEMA_VERSION],
                |r| r.get(0),
            )
            .optional()?;
        if present.is_none() {
            self.conn.execute(
                "INSERT INTO cmdhist_info (app_version, schema_version) VALUES (?1, ?2)",
                [app_version, SCHEMA_VERSION],
            )?;
        }
        Ok(())
    }

    /// Latest recorded `(app_version, schema_version)`.
    pub fn version_info(&self) -> Result<(String, String)> {
        Ok(self.conn.query_row(
            "SELECT app_version, schema_version FROM cmdhist_info
             ORDER BY id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?)
    }

    // ==================
    // Ingest
    // ==================

    /// Insert one command record.
    ///
    /// With `check_duplicate`, a record matching on the six-field tuple
    /// (command, normalized cwd, terminal, start, stop, exit code) with
    /// NULLs treated as equal is skipped and `None` returned.
    pub fn import_command(
        &mut self,
        rec: &CommandRecord,
        check_duplicate: bool,
    ) -> Result<Option<i64>> {
        if check_duplicate {
            if let Some(existing) = self.find_duplicate(rec)? {
                debug!(ch_id = existing, "skipping duplicate command record");
                return Ok(None);
            }
        }

        let tx = self.conn.transaction()?;
        let ch_id = {
            let command_id = rec
                .command
                .as_deref()
                .map(|c| get_maybe_new_id(&tx, "command_list", "command", c))
                .transpose()?;
            let dir_id = rec
                .cwd
                .as_deref()
                .map(|d| {
                    get_maybe_new_id(&tx, "directory_list", "directory", &normalize_directory(d))
                })
                .transpose()?;
            let terminal_id = rec
                .terminal
                .as_deref()
                .map(|t| get_maybe_new_id(&tx, "terminal_list", "terminal", t))
                .transpose()?;
            let session_id = rec
                .session_id
                .as_deref()
                .map(|s| get_maybe_new_session(&tx, s))
                .transpose()?;

            tx.execute(
                "INSERT INTO command_history
                     (command_id, session_id, dir_id, terminal_id,
                      start_time, stop_time, exit_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    command_id,
                    session_id,
                    dir_id,
                    terminal_id,
                    rec.start.and_then(posix_to_sql_timestamp),
                    rec.stop.and_then(posix_to_sql_timestamp),
                    rec.exit_code,
                ],
            )?;
            let ch_id = tx.last_insert_rowid();

            for (name, value) in &rec.environ {
                let ev_id = get_maybe_new_environ(&tx, name, value)?;
                tx.execute(
                    "INSERT INTO command_environment_map (ch_id, ev_id) VALUES (?1, ?2)",
                    [ch_id, ev_id],
                )?;
            }
            for (position, code) in rec.pipestatus.iter().enumerate() {
                tx.execute(
                    "INSERT INTO pipe_status_map (ch_id, program_position, exit_code)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![ch_id, position as i64, code],
                )?;
            }
            ch_id
        };
        tx.commit()?;
        Ok(Some(ch_id))
    }

    fn find_duplicate(&self, rec: &CommandRecord) -> Result<Option<i64>> {
        let cwd = rec.cwd.as_deref().map(normalize_directory);
        Ok(self
            .conn
            .query_row(
                "SELECT command_history.id FROM command_history
                 LEFT JOIN command_list CL ON command_history.command_id = CL.id
                 LEFT JOIN directory_list DL ON command_history.dir_id = DL.id
                 LEFT JOIN terminal_list TL ON command_history.terminal_id = TL.id
                 WHERE (CL.command = ?1 OR (CL.command IS NULL AND ?1 IS NULL))
                   AND (DL.directory = ?2 OR (DL.directory IS NULL AND ?2 IS NULL))
                   AND (TL.terminal = ?3 OR (TL.terminal IS NULL AND ?3 IS NULL))
                   AND (command_history.start_time = ?4
                        OR (command_history.start_time IS NULL AND ?4 IS NULL))
                   AND (command_history.stop_time = ?5
                        OR (command_history.stop_time IS NULL AND ?5 IS NULL))
                   AND (command_history.exit_code = ?6
                        OR (command_history.exit_code IS NULL AND ?6 IS NULL))
                 LIMIT 1",
                rusqlite::params![
                    rec.command,
                    cwd,
                    rec.terminal,
                    rec.start.and_then(posix_to_sql_timestamp),
                    rec.stop.and_then(posix_to_sql_timestamp),
                    rec.exit_code,
                ],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Ingest a session-start record.
    ///
    /// Finds or creates the session row by `session_long_id`. An
    /// existing start time is replaced only when null or `overwrite`;
    /// the session environment is replaced when `overwrite` or when the
    /// session has none yet.
    pub fn import_init(&mut self, rec: &InitRecord, overwrite: bool) -> Result<i64> {
        let start = rec.start.and_then(posix_to_sql_timestamp);
        let tx = self.conn.transaction()?;
        let sh_id = {
            let existing: Option<(i64, Option<String>)> = tx
                .query_row(
                    "SELECT id, start_time FROM session_history WHERE session_long_id = ?1",
                    [&rec.session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            match existing {
                Some((sh_id, old_start)) => {
                    if start.is_some() && (old_start.is_none() || overwrite) {
                        tx.execute(
                            "UPDATE session_history SET start_time = ?1 WHERE id = ?2",
                            rusqlite::params![start, sh_id],
                        )?;
                    }
                    let has_environ: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM session_environment_map WHERE sh_id = ?1",
                        [sh_id],
                        |r| r.get(0),
                    )?;
                    if overwrite || has_environ == 0 {
                        tx.execute(
                            "DELETE FROM session_environment_map WHERE sh_id = ?1",
                            [sh_id],
                        )?;
                        insert_session_environ(&tx, sh_id, &rec.environ)?;
                    }
                    sh_id
                }
                None => {
                    tx.execute(
                        "INSERT INTO session_history (session_long_id, start_time)
                         VALUES (?1, ?2)",
                        rusqlite::params![rec.session_id, start],
                    )?;
                    let sh_id = tx.last_insert_rowid();
                    insert_session_environ(&tx, sh_id, &rec.environ)?;
                    sh_id
                }
            }
        };
        tx.commit()?;
        Ok(sh_id)
    }

    /// Ingest a session-end record. Symmetric to [`Self::import_init`]
    /// for `stop_time`; never touches the environment.
    pub fn import_exit(&mut self, rec: &ExitRecord, overwrite: bool) -> Result<i64> {
        let stop = rec.stop.and_then(posix_to_sql_timestamp);
        let tx = self.conn.transaction()?;
        let sh_id = {
            let existing: Option<(i64, Option<String>)> = tx
                .query_row(
                    "SELECT id, stop_time FROM session_history WHERE session_long_id = ?1",
                    [&rec.session_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            match existing {
                Some((sh_id, old_stop)) => {
                    if stop.is_some() && (old_stop.is_none() || overwrite) {
                        tx.execute(
                            "UPDATE session_history SET stop_time = ?1 WHERE id = ?2",
                            rusqlite::params![stop, sh_id],
                        )?;
                    }
                    sh_id
                }
                None => {
                    tx.execute(
                        "INSERT INTO session_history (session_long_id, stop_time)
                         VALUES (?1, ?2)",
                        rusqlite::params![rec.session_id, stop],
                    )?;
                    tx.last_insert_rowid()
                }
            }
        };
        tx.commit()?;
        Ok(sh_id)
    }

    // ==================
    // Query
    // ==================

    /// Compile and run a search over command history.
    ///
    /// Context windows disable uniqueness, run an unlimited inner
    /// SELECT ordered by time (or session then time), and filter the
    /// streamed rows through the window predicate before the limit.
    pub fn search_command_record(&self, opts: &SearchOptions) -> Result<Vec<CommandRow>> {
        let context = opts.before_context > 0 || opts.after_context > 0;
        let unique = opts.unique && !context;

        let columns: Vec<&str> = BASE_COLUMNS.iter().map(|(c, _)| *c).collect();
        let keys: Vec<&str> = BASE_COLUMNS.iter().map(|(_, k)| *k).collect();
        let mut sc = SqlBuilder::new(BASE_SOURCE, &columns).with_keys(&keys);

        apply_command_filters(&mut sc, opts);
        apply_environ_filters(&mut sc, opts);

        let mut enriched = EnrichmentState::default();
        let order = if opts.reverse { SortOrder::Asc } else { SortOrder::Desc };

        if unique {
            sc.uniquify_by("CL.command", Some("command_history.start_time"), "MAX");
        }
        for key in &opts.additional_columns {
            enriched.ensure(&mut sc, *key);
        }

        if context {
            sc.set_limit(None);
            if opts.context_type == ContextType::Session {
                sc.order_by("SH.start_time", order);
            }
            sc.order_by("command_history.start_time", order);
            sc.move_where_clause_to_column("condition");
        } else {
            if let Some(dir) = &opts.sort_by_cwd_distance {
                let expr = if unique {
                    "MIN(PATHDIST(DL.directory, ?))"
                } else {
                    "PATHDIST(DL.directory, ?)"
                };
                sc.add_column(
                    &format!("{expr} AS cwd_distance"),
                    Some("cwd_distance"),
                    &[SqlParam::Text(dir.clone())],
                );
                sc.order_by("cwd_distance", order.flipped());
            }
            for key in &opts.sort_by {
                if *key == SortKey::CommandCount && !unique {
                    continue;
                }
                enriched.ensure(&mut sc, *key);
                sc.order_by(key.column(), order);
            }
            sc.set_limit(Some(opts.limit));
        }

        let compiled = sc.compile();
        debug!(sql = %compiled.sql, "search compiled");
        let index = key_index(&compiled.keys);

        let mut stmt = self.conn.prepare(&compiled.sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(compiled.params), |row| {
            row_to_command(row, &index)
        })?;

        let mut out = Vec::new();
        if context {
            // Display order puts the newest row first unless reversed, so
            // the temporal before/after roles swap in stream order.
            let (before, after) = if opts.reverse {
                (opts.before_context, opts.after_context)
            } else {
                (opts.after_context, opts.before_context)
            };
            let windowed = ContextWindow::new(rows, before, after, |item| {
                item.as_ref().map_or(true, |r| r.condition.unwrap_or(true))
            });
            for item in windowed {
                out.push(item?);
                if opts.limit >= 0 && out.len() as i64 >= opts.limit {
                    break;
                }
            }
        } else {
            for item in rows {
                out.push(item?);
            }
        }
        Ok(out)
    }
}

fn apply_command_filters(sc: &mut SqlBuilder, opts: &SearchOptions) {
    let glob = glob_matcher(opts.ignore_case);
    let regexp = "{0} REGEXP {1}";

    sc.add_matches(
        glob,
        "CL.command",
        &scalar_groups(&opts.match_pattern),
        &scalar_groups(&opts.include_pattern),
        &scalar_groups(&opts.exclude_pattern),
    );
    sc.add_matches(
        regexp,
        "CL.command",
        &regexp_groups(&opts.match_regexp, opts.ignore_case),
        &regexp_groups(&opts.include_regexp, opts.ignore_case),
        &regexp_groups(&opts.exclude_regexp, opts.ignore_case),
    );

    let cwds: Vec<String> = opts.cwd.iter().map(|d| normalize_directory(d)).collect();
    sc.add_or_matches("{0} = {1}", "DL.directory", &scalar_groups(&cwds));
    let mut cwd_globs = opts.cwd_glob.clone();
    cwd_globs.extend(opts.cwd_under.iter().map(|d| under_glob(d)));
    sc.add_or_matches(glob, "DL.directory", &scalar_groups(&cwd_globs));

    if let Some(after) = &opts.time_after {
        sc.add_and_matches(
            "DATETIME({0}) >= DATETIME({1})",
            "command_history.start_time",
            &scalar_groups(&[after.as_str()]),
        );
    }
    if let Some(before) = &opts.time_before {
        sc.add_and_matches(
            "DATETIME({0}) <= DATETIME({1})",
            "command_history.start_time",
            &scalar_groups(&[before.as_str()]),
        );
    }

    let duration =
        "(julianday(command_history.stop_time) - julianday(command_history.start_time)) \
         * 60 * 60 * 24";
    if let Some(longer) = &opts.duration_longer_than {
        sc.add_and_matches("{0} >= {1}", duration, &[vec![duration_param(longer)]]);
    }
    if let Some(less) = &opts.duration_less_than {
        sc.add_and_matches("{0} <= {1}", duration, &[vec![duration_param(less)]]);
    }

    sc.add_matches(
        "{0} = {1}",
        "command_history.exit_code",
        &[],
        &scalar_groups(&opts.include_exit_code),
        &scalar_groups(&opts.exclude_exit_code),
    );
    sc.add_matches(
        "{0} = {1}",
        "command_history.session_id",
        &[],
        &scalar_groups(&opts.include_session_history_id),
        &scalar_groups(&opts.exclude_session_history_id),
    );
}

impl Store {
    // ==================
    // Retrieval
    // ==================

    /// Fetch everything known about one command.
    ///
    /// With `merge_session_environ`, the session environment merges
    /// under the command environment; command keys win on conflict.
    pub fn get_full_command_record(
        &self,
        id: i64,
        merge_session_environ: bool,
    ) -> Result<FullCommandRecord> {
        let head = self
            .conn
            .query_row(
                "SELECT CL.command, DL.directory, TL.terminal,
                        command_history.start_time, command_history.stop_time,
                        command_history.exit_code, command_history.session_id,
                        SH.session_long_id, SH.start_time, SH.stop_time
                 FROM command_history
                 LEFT JOIN command_list CL ON command_history.command_id = CL.id
                 LEFT JOIN directory_list DL ON command_history.dir_id = DL.id
                 LEFT JOIN terminal_list TL ON command_history.terminal_id = TL.id
                 LEFT JOIN session_history SH ON command_history.session_id = SH.id
                 WHERE command_history.id = ?1",
                [id],
                |r| {
                    Ok((
                        r.get::<_, Option<String>>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<String>>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, Option<i64>>(5)?,
                        r.get::<_, Option<i64>>(6)?,
                        r.get::<_, Option<String>>(7)?,
                        r.get::<_, Option<String>>(8)?,
                        r.get::<_, Option<String>>(9)?,
                    ))
                },
            )
            .optional()?
            .ok_or(Error::RecordNotFound { id })?;

        let (command, cwd, terminal, start_time, stop_time, exit_code, session_id,
            session_long_id, session_start_time, session_stop_time) = head;

        let mut stmt = self.conn.prepare(
            "SELECT exit_code FROM pipe_status_map
             WHERE ch_id = ?1 ORDER BY program_position",
        )?;
        let pipestatus = stmt
            .query_map([id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        let mut environ = BTreeMap::new();
        if merge_session_environ {
            if let Some(sh_id) = session_id {
                let mut stmt = self.conn.prepare(
                    "SELECT EV.variable_name, EV.variable_value
                     FROM session_environment_map SEM
                     JOIN environment_variable EV ON SEM.ev_id = EV.id
                     WHERE SEM.sh_id = ?1",
                )?;
                for pair in stmt.query_map([sh_id], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                })? {
                    let (name, value) = pair?;
                    environ.insert(name, value);
                }
            }
        }
        let mut stmt = self.conn.prepare(
            "SELECT EV.variable_name, EV.variable_value
             FROM command_environment_map CEM
             JOIN environment_variable EV ON CEM.ev_id = EV.id
             WHERE CEM.ch_id = ?1",
        )?;
        for pair in stmt.query_map([id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })? {
            let (name, value) = pair?;
            environ.insert(name, value);
        }

        Ok(FullCommandRecord {
            command_history_id: id,
            command,
            cwd,
            terminal,
            start_time,
            stop_time,
            exit_code,
            pipestatus,
            session_long_id,
            session_start_time,
            session_stop_time,
            environ,
        })
    }

    /// Look up one session by its long id.
    pub fn get_session(&self, session_long_id: &str) -> Result<Option<SessionRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, session_long_id, start_time, stop_time
                 FROM session_history WHERE session_long_id = ?1",
                [session_long_id],
                |r| {
                    Ok(SessionRow {
                        session_history_id: r.get(0)?,
                        session_long_id: r.get(1)?,
                        start_time: r.get(2)?,
                        stop_time: r.get(3)?,
                    })
                },
            )
            .optional()?)
    }
}

// ==================
// Helpers
// ==================

fn get_maybe_new_id(tx: &Transaction, table: &str, column: &str, value: &str) -> Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            &format!("SELECT id FROM {table} WHERE {column} = ?1"),
            [value],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        &format!("INSERT INTO {table} ({column}) VALUES (?1)"),
        [value],
    )?;
    Ok(tx.last_insert_rowid())
}

fn get_maybe_new_environ(tx: &Transaction, name: &str, value: &str) -> Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM environment_variable
             WHERE variable_name = ?1 AND variable_value = ?2",
            [name, value],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO environment_variable (variable_name, variable_value) VALUES (?1, ?2)",
        [name, value],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Sessions may be created by a command record before their init record
/// arrives; either order converges on one row.
fn get_maybe_new_session(tx: &Transaction, session_long_id: &str) -> Result<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM session_history WHERE session_long_id = ?1",
            [session_long_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    tx.execute(
        "INSERT INTO session_history (session_long_id) VALUES (?1)",
        [session_long_id],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_session_environ(
    tx: &Transaction,
    sh_id: i64,
    environ: &BTreeMap<String, String>,
) -> Result<()> {
    for (name, value) in environ {
        let ev_id = get_maybe_new_environ(tx, name, value)?;
        tx.execute(
            "INSERT INTO session_environment_map (sh_id, ev_id) VALUES (?1, ?2)",
            [sh_id, ev_id],
        )?;
    }
    Ok(())
}

const fn glob_matcher(ignore_case: bool) -> &'static str {
    if ignore_case {
        "LOWER({0}) GLOB LOWER({1})"
    } else {
        "{0} GLOB {1}"
    }
}

fn regexp_groups(patterns: &[String], ignore_case: bool) -> Vec<Vec<SqlParam>> {
    patterns
        .iter()
        .map(|p| {
            let p = if ignore_case { format!("(?i){p}") } else { p.clone() };
            vec![SqlParam::Text(p)]
        })
        .collect()
}

fn duration_param(raw: &str) -> SqlParam {
    raw.parse::<i64>().map_or_else(
        |_| SqlParam::Text(raw.to_string()),
        SqlParam::Int,
    )
}

/// Join the environment maps needed by the environ filter families and
/// register the GROUP BY / HAVING clauses implementing match (all k
/// patterns hit distinct variables), include (at least one hit), and
/// exclude (no hit).
fn apply_environ_filters(sc: &mut SqlBuilder, opts: &SearchOptions) {
    let match_total = opts.match_environ_pattern.len() + opts.match_environ_regexp.len();
    let include_total = opts.include_environ_pattern.len() + opts.include_environ_regexp.len();
    let exclude_total = opts.exclude_environ_pattern.len() + opts.exclude_environ_regexp.len();
    if match_total + include_total + exclude_total == 0 {
        return;
    }

    sc.add_group_by("command_history.id");

    if match_total > 0 {
        join_environ_pair(
            sc,
            "CEM",
            "SEM",
            &opts.match_environ_pattern,
            &opts.match_environ_regexp,
            opts.ignore_case,
        );
        sc.add_having(&format!(
            "COUNT(DISTINCT CEM.ev_id) + COUNT(DISTINCT SEM.ev_id) = {match_total}"
        ));
    }
    if include_total > 0 {
        join_environ_pair(
            sc,
            "CEI",
            "SEI",
            &opts.include_environ_pattern,
            &opts.include_environ_regexp,
            opts.ignore_case,
        );
        sc.add_having("COUNT(CEI.ev_id) + COUNT(SEI.ev_id) > 0");
    }
    if exclude_total > 0 {
        join_environ_pair(
            sc,
            "CEX",
            "SEX",
            &opts.exclude_environ_pattern,
            &opts.exclude_environ_regexp,
            opts.ignore_case,
        );
        sc.add_having("COUNT(CEX.ev_id) + COUNT(SEX.ev_id) = 0");
    }
}

fn join_environ_pair(
    sc: &mut SqlBuilder,
    command_alias: &str,
    session_alias: &str,
    glob_pairs: &[(String, String)],
    regexp_pairs: &[(String, String)],
    ignore_case: bool,
) {
    let command_sub = environ_subselect(
        "command_environment_map",
        "ch_id",
        command_alias,
        glob_pairs,
        regexp_pairs,
        ignore_case,
    );
    sc.join_builder(&command_sub, "LEFT JOIN", "{r}.ch_id = command_history.id");
    let session_sub = environ_subselect(
        "session_environment_map",
        "sh_id",
        session_alias,
        glob_pairs,
        regexp_pairs,
        ignore_case,
    );
    sc.join_builder(
        &session_sub,
        "LEFT JOIN",
        "{r}.sh_id = command_history.session_id",
    );
}

fn environ_subselect(
    map_table: &str,
    id_column: &str,
    alias: &str,
    glob_pairs: &[(String, String)],
    regexp_pairs: &[(String, String)],
    ignore_case: bool,
) -> SqlBuilder {
    let id_expr = format!("EM.{id_column} AS {id_column}");
    let mut sub = SqlBuilder::new(
        format!("{map_table} EM JOIN environment_variable EV ON EM.ev_id = EV.id"),
        &[id_expr.as_str(), "EV.id AS ev_id"],
    )
    .with_keys(&[id_column, "ev_id"])
    .with_table_alias(alias);

    let glob = if ignore_case {
        "(LOWER({0}variable_name) GLOB LOWER({1}) AND LOWER({0}variable_value) GLOB LOWER({2}))"
    } else {
        "({0}variable_name GLOB {1} AND {0}variable_value GLOB {2})"
    };
    let regexp = "({0}variable_name REGEXP {1} AND {0}variable_value REGEXP {2})";

    let mut exprs = Vec::new();
    let mut params = Vec::new();
    for group in pair_groups(glob_pairs) {
        exprs.push(render_matcher(glob, "EV.", group.len()));
        params.extend(group);
    }
    for (name, value) in regexp_pairs {
        exprs.push(render_matcher(regexp, "EV.", 2));
        let (name, value) = if ignore_case {
            (format!("(?i){name}"), format!("(?i){value}"))
        } else {
            (name.clone(), value.clone())
        };
        params.push(SqlParam::Text(name));
        params.push(SqlParam::Text(value));
    }
    sub.add_or_exprs(&exprs, params);
    sub
}

/// Tracks which enrichment sub-selects are already joined.
#[derive(Default)]
struct EnrichmentState {
    command_count: bool,
    success_count: bool,
    success_ratio: bool,
    program_count: bool,
}

impl EnrichmentState {
    fn ensure(&mut self, sc: &mut SqlBuilder, key: SortKey) {
        match key {
            SortKey::CommandCount => self.ensure_command_count(sc),
            SortKey::SuccessCount => self.ensure_success_count(sc),
            SortKey::SuccessRatio => {
                self.ensure_command_count(sc);
                self.ensure_success_count(sc);
                if !self.success_ratio {
                    self.success_ratio = true;
                    sc.add_column(
                        "CAST(COALESCE(SUCC.success_count, 0) AS REAL) / CNT.command_count \
                         AS success_ratio",
                        Some("success_ratio"),
                        &[],
                    );
                }
            }
            SortKey::ProgramCount => {
                if !self.program_count {
                    self.program_count = true;
                    let mut sub = SqlBuilder::new(
                        "command_history \
                         JOIN command_list ON command_history.command_id = command_list.id",
                        &[
                            "PROGRAM_NAME(command_list.command) AS program",
                            "COUNT(*) AS program_count",
                        ],
                    )
                    .with_keys(&["program", "program_count"])
                    .with_table_alias("PROG");
                    sub.add_group_by("program");
                    sc.join_builder(
                        &sub,
                        "LEFT JOIN",
                        "PROGRAM_NAME(CL.command) = {r}.program",
                    );
                    sc.add_column(
                        "PROG.program_count AS program_count",
                        Some("program_count"),
                        &[],
                    );
                }
            }
            _ => {}
        }
    }

    fn ensure_command_count(&mut self, sc: &mut SqlBuilder) {
        if !self.command_count {
            self.command_count = true;
            let mut sub = SqlBuilder::new(
                "command_history",
                &["command_id", "COUNT(*) AS command_count"],
            )
            .with_keys(&["command_id", "command_count"])
            .with_table_alias("CNT");
            sub.add_group_by("command_id");
            sc.join_builder(
                &sub,
                "LEFT JOIN",
                "command_history.command_id = {r}.command_id",
            );
            sc.add_column(
                "CNT.command_count AS command_count",
                Some("command_count"),
                &[],
            );
        }
    }

    fn ensure_success_count(&mut self, sc: &mut SqlBuilder) {
        if !self.success_count {
            self.success_count = true;
            let mut sub = SqlBuilder::new(
                "command_history",
                &["command_id", "COUNT(*) AS success_count"],
            )
            .with_keys(&["command_id", "success_count"])
            .with_table_alias("SUCC");
            sub.add_and_matches("{0} = {1}", "exit_code", &scalar_groups(&[0i64]));
            sub.add_group_by("command_id");
            sc.join_builder(
                &sub,
                "LEFT JOIN",
                "command_history.command_id = {r}.command_id",
            );
            sc.add_column(
                "COALESCE(SUCC.success_count, 0) AS success_count",
                Some("success_count"),
                &[],
            );
        }
    }
}

fn key_index(keys: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        index.entry(key.clone()).or_insert(i);
    }
    index
}

fn row_to_command(row: &Row, index: &HashMap<String, usize>) -> rusqlite::Result<CommandRow> {
    fn col<T: rusqlite::types::FromSql>(
        row: &Row,
        index: &HashMap<String, usize>,
        key: &str,
    ) -> rusqlite::Result<Option<T>> {
        match index.get(key) {
            Some(&i) => row.get::<usize, Option<T>>(i),
            None => Ok(None),
        }
    }

    Ok(CommandRow {
        command_history_id: col::<i64>(row, index, "command_history_id")?.unwrap_or_default(),
        command: col(row, index, "command")?,
        start_time: col(row, index, "start_time")?,
        stop_time: col(row, index, "stop_time")?,
        exit_code: col(row, index, "exit_code")?,
        directory: col(row, index, "directory")?,
        terminal: col(row, index, "terminal")?,
        session_history_id: col(row, index, "session_history_id")?,
        session_long_id: col(row, index, "session_long_id")?,
        command_count: col(row, index, "command_count")?,
        success_count: col(row, index, "success_count")?,
        success_ratio: col(row, index, "success_ratio")?,
        program_count: col(row, index, "program_count")?,
        cwd_distance: col(row, index, "cwd_distance")?,
        condition: col::<i64>(row, index, "condition")?.map(|v| v != 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> Store {
        Store::open_memory().unwrap()
    }

    fn record(command: &str, start: i64) -> CommandRecord {
        CommandRecord {
            command: Some(command.to_string()),
            start: Some(start),
            ..CommandRecord::default()
        }
    }

    fn full_record(command: &str) -> CommandRecord {
        CommandRecord {
            command: Some(command.to_string()),
            cwd: Some("/home/dev/proj".to_string()),
            exit_code: Some(0),
            pipestatus: vec![0],
            start: Some(100),
            stop: Some(105),
            terminal: Some("tmux".to_string()),
            session_id: None,
            environ: BTreeMap::new(),
        }
    }

    fn search(store: &Store, opts: &SearchOptions) -> Vec<CommandRow> {
        store.search_command_record(opts).unwrap()
    }

    fn no_unique() -> SearchOptions {
        SearchOptions {
            unique: false,
            sort_by: vec![SortKey::StartTime],
            ..SearchOptions::default()
        }
    }

    #[test]
    fn import_then_search_returns_equal_fields() {
        let mut st = store();
        st.import_command(&full_record("ls -la"), true).unwrap();

        let rows = search(&st, &SearchOptions::default());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.command.as_deref(), Some("ls -la"));
        assert_eq!(row.directory.as_deref(), Some("/home/dev/proj/"));
        assert_eq!(row.terminal.as_deref(), Some("tmux"));
        assert_eq!(row.exit_code, Some(0));
        assert_eq!(row.start_time.as_deref(), Some("1970-01-01 00:01:40"));
        assert_eq!(row.stop_time.as_deref(), Some("1970-01-01 00:01:45"));
    }

    #[test]
    fn duplicate_check_is_idempotent() {
        let mut st = store();
        assert!(st.import_command(&full_record("ls"), true).unwrap().is_some());
        assert!(st.import_command(&full_record("ls"), true).unwrap().is_none());
        assert_eq!(search(&st, &no_unique()).len(), 1);
    }

    #[test]
    fn without_duplicate_check_rows_accumulate() {
        let mut st = store();
        st.import_command(&full_record("ls"), false).unwrap();
        st.import_command(&full_record("ls"), false).unwrap();
        assert_eq!(search(&st, &no_unique()).len(), 2);
    }

    #[test]
    fn three_identical_imports_collapse_to_one() {
        let mut st = store();
        for _ in 0..3 {
            st.import_command(&full_record("ls"), true).unwrap();
        }
        let rows = search(&st, &SearchOptions::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("ls"));
    }

    #[test]
    fn directory_normalization_is_idempotent() {
        let mut st = store();
        let mut a = record("x", 1);
        a.cwd = Some("/a/b".to_string());
        let mut b = record("y", 2);
        b.cwd = Some("/a/b/".to_string());
        st.import_command(&a, false).unwrap();
        st.import_command(&b, false).unwrap();

        let count: i64 = st
            .conn
            .query_row("SELECT COUNT(*) FROM directory_list", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn session_merge_is_order_independent() {
        let init = InitRecord {
            session_id: "host:tty:1:100".to_string(),
            start: Some(100),
            environ: BTreeMap::new(),
        };
        let exit = ExitRecord {
            session_id: "host:tty:1:100".to_string(),
            stop: Some(200),
        };

        let mut forward = store();
        forward.import_init(&init, true).unwrap();
        forward.import_exit(&exit, true).unwrap();

        let mut backward = store();
        backward.import_exit(&exit, true).unwrap();
        backward.import_init(&init, true).unwrap();

        let f = forward.get_session("host:tty:1:100").unwrap().unwrap();
        let b = backward.get_session("host:tty:1:100").unwrap().unwrap();
        assert_eq!(f.start_time.as_deref(), Some("1970-01-01 00:01:40"));
        assert_eq!(f.stop_time.as_deref(), Some("1970-01-01 00:03:20"));
        assert_eq!(f.start_time, b.start_time);
        assert_eq!(f.stop_time, b.stop_time);
    }

    #[test]
    fn session_environment_merges_under_command() {
        let mut st = store();
        st.import_init(
            &InitRecord {
                session_id: "s1".to_string(),
                start: Some(100),
                environ: BTreeMap::from([
                    ("SHELL".to_string(), "zsh".to_string()),
                    ("PATH".to_string(), "from-session".to_string()),
                ]),
            },
            true,
        )
        .unwrap();
        let mut rec = record("true", 150);
        rec.session_id = Some("s1".to_string());
        rec.environ = BTreeMap::from([("PATH".to_string(), "from-command".to_string())]);
        let ch_id = st.import_command(&rec, false).unwrap().unwrap();

        let merged = st.get_full_command_record(ch_id, true).unwrap();
        assert_eq!(merged.environ.get("SHELL").map(String::as_str), Some("zsh"));
        assert_eq!(
            merged.environ.get("PATH").map(String::as_str),
            Some("from-command")
        );

        let bare = st.get_full_command_record(ch_id, false).unwrap();
        assert_eq!(bare.environ.get("SHELL"), None);
        assert_eq!(
            bare.environ.get("PATH").map(String::as_str),
            Some("from-command")
        );
    }

    #[test]
    fn include_and_exclude_compose() {
        let mut st = store();
        for (name, start) in [("alpha", 1), ("beta", 2), ("gamma", 3)] {
            st.import_command(&record(name, start), false).unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                include_pattern: vec!["alpha*".to_string(), "beta*".to_string()],
                exclude_pattern: vec!["beta*".to_string()],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("alpha"));
    }

    fn import_with_environ(st: &mut Store, command: &str, start: i64, env: &[(&str, &str)]) -> i64 {
        let mut rec = record(command, start);
        rec.environ = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        st.import_command(&rec, false).unwrap().unwrap()
    }

    #[test]
    fn environ_match_requires_all_patterns() {
        let mut st = store();
        import_with_environ(&mut st, "wanted", 1, &[("E1", "abc"), ("E2", "bcd")]);
        import_with_environ(&mut st, "other", 2, &[("E1", "abc"), ("E2", "xxx")]);

        let rows = search(
            &st,
            &SearchOptions {
                match_environ_pattern: vec![
                    ("E1".to_string(), "*b*".to_string()),
                    ("E2".to_string(), "*c*".to_string()),
                ],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("wanted"));
    }

    #[test]
    fn environ_include_keeps_any_hit() {
        let mut st = store();
        import_with_environ(&mut st, "one", 1, &[("E1", "abc")]);
        import_with_environ(&mut st, "two", 2, &[("E2", "xyz")]);
        import_with_environ(&mut st, "none", 3, &[("E3", "qqq")]);

        let rows = search(
            &st,
            &SearchOptions {
                include_environ_pattern: vec![
                    ("E1".to_string(), "*".to_string()),
                    ("E2".to_string(), "*".to_string()),
                ],
                ..no_unique()
            },
        );
        let names: Vec<_> = rows.iter().filter_map(|r| r.command.clone()).collect();
        assert!(names.contains(&"one".to_string()));
        assert!(names.contains(&"two".to_string()));
        assert!(!names.contains(&"none".to_string()));
    }

    #[test]
    fn environ_match_equals_include_for_single_pattern() {
        let mut st = store();
        import_with_environ(&mut st, "one", 1, &[("E1", "abc")]);
        import_with_environ(&mut st, "two", 2, &[("E2", "xyz")]);

        let pattern = vec![("E1".to_string(), "*".to_string())];
        let matched = search(
            &st,
            &SearchOptions {
                match_environ_pattern: pattern.clone(),
                ..no_unique()
            },
        );
        let included = search(
            &st,
            &SearchOptions {
                include_environ_pattern: pattern,
                ..no_unique()
            },
        );
        let names = |rows: &[CommandRow]| {
            rows.iter().filter_map(|r| r.command.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&matched), vec!["one".to_string()]);
        assert_eq!(names(&matched), names(&included));
    }

    #[test]
    fn environ_exclude_drops_hits() {
        let mut st = store();
        import_with_environ(&mut st, "keep", 1, &[("E1", "abc")]);
        import_with_environ(&mut st, "drop", 2, &[("VIRTUAL_ENV", "/venv")]);

        let rows = search(
            &st,
            &SearchOptions {
                exclude_environ_pattern: vec![("VIRTUAL_ENV".to_string(), "*".to_string())],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("keep"));
    }

    #[test]
    fn session_environ_is_searchable_through_command() {
        let mut st = store();
        st.import_init(
            &InitRecord {
                session_id: "s1".to_string(),
                start: Some(1),
                environ: BTreeMap::from([("SHELL".to_string(), "zsh".to_string())]),
            },
            true,
        )
        .unwrap();
        let mut rec = record("in-session", 5);
        rec.session_id = Some("s1".to_string());
        st.import_command(&rec, false).unwrap();
        st.import_command(&record("no-session", 6), false).unwrap();

        let rows = search(
            &st,
            &SearchOptions {
                match_environ_pattern: vec![("SHELL".to_string(), "zsh".to_string())],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("in-session"));
    }

    #[test]
    fn context_by_time_keeps_neighbours() {
        let mut st = store();
        let names = ["c0", "c1-match", "c2", "c3", "c4", "c5-match", "c6"];
        for (i, name) in names.iter().enumerate() {
            st.import_command(&record(name, i as i64), false).unwrap();
        }

        let rows = search(
            &st,
            &SearchOptions {
                include_pattern: vec!["*match".to_string()],
                before_context: 1,
                after_context: 1,
                ..SearchOptions::default()
            },
        );
        let got: Vec<_> = rows.iter().filter_map(|r| r.command.clone()).collect();
        assert_eq!(got, vec!["c6", "c5-match", "c4", "c2", "c1-match", "c0"]);

        for row in &rows {
            let is_match = row.command.as_deref().unwrap().ends_with("match");
            assert_eq!(row.condition, Some(is_match));
        }
    }

    #[test]
    fn context_respects_limit_after_windowing() {
        let mut st = store();
        let names = ["c0", "c1-match", "c2", "c3", "c4", "c5-match", "c6"];
        for (i, name) in names.iter().enumerate() {
            st.import_command(&record(name, i as i64), false).unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                include_pattern: vec!["*match".to_string()],
                before_context: 1,
                after_context: 1,
                limit: 3,
                ..SearchOptions::default()
            },
        );
        let got: Vec<_> = rows.iter().filter_map(|r| r.command.clone()).collect();
        assert_eq!(got, vec!["c6", "c5-match", "c4"]);
    }

    #[test]
    fn unique_picks_newest_representative() {
        let mut st = store();
        st.import_command(&record("ls", 1), false).unwrap();
        st.import_command(&record("ls", 5), false).unwrap();
        st.import_command(&record("pwd", 3), false).unwrap();

        let rows = search(
            &st,
            &SearchOptions {
                sort_by: vec![SortKey::StartTime],
                ..SearchOptions::default()
            },
        );
        assert_eq!(rows.len(), 2);
        let ls = rows
            .iter()
            .find(|r| r.command.as_deref() == Some("ls"))
            .unwrap();
        assert_eq!(ls.start_time.as_deref(), Some("1970-01-01 00:00:05"));
    }

    #[test]
    fn cwd_distance_orders_by_proximity() {
        let mut st = store();
        for (i, cwd) in ["/A/B/C", "/A/B", "/A/B/C/D", "/A/B/X", "/A"]
            .iter()
            .enumerate()
        {
            let mut rec = record(&format!("cmd{i}"), 50);
            rec.cwd = Some((*cwd).to_string());
            st.import_command(&rec, false).unwrap();
        }

        let rows = search(
            &st,
            &SearchOptions {
                sort_by_cwd_distance: Some("/A/B/C/".to_string()),
                sort_by: vec![SortKey::StartTime],
                ..SearchOptions::default()
            },
        );
        let distances: Vec<_> = rows.iter().filter_map(|r| r.cwd_distance).collect();
        assert_eq!(distances, vec![0, 1, 1, 1, 2]);
        assert_eq!(rows[0].directory.as_deref(), Some("/A/B/C/"));
        assert_eq!(rows[4].directory.as_deref(), Some("/A/"));
    }

    #[test]
    fn full_session_round_trip() {
        let mut st = store();
        st.import_init(
            &InitRecord {
                session_id: "S1".to_string(),
                start: Some(100),
                environ: BTreeMap::from([("SHELL".to_string(), "zsh".to_string())]),
            },
            true,
        )
        .unwrap();
        let mut rec = record("make", 150);
        rec.session_id = Some("S1".to_string());
        rec.environ = BTreeMap::from([("PATH".to_string(), "p".to_string())]);
        let ch_id = st.import_command(&rec, false).unwrap().unwrap();
        st.import_exit(
            &ExitRecord {
                session_id: "S1".to_string(),
                stop: Some(200),
            },
            true,
        )
        .unwrap();

        let full = st.get_full_command_record(ch_id, true).unwrap();
        assert_eq!(
            full.environ,
            BTreeMap::from([
                ("SHELL".to_string(), "zsh".to_string()),
                ("PATH".to_string(), "p".to_string()),
            ])
        );
        let session = st.get_session("S1").unwrap().unwrap();
        assert!(session.start_time.is_some());
        assert!(session.stop_time.is_some());
    }

    #[test]
    fn reinit_without_overwrite_keeps_environment() {
        let mut st = store();
        let first = InitRecord {
            session_id: "S1".to_string(),
            start: Some(100),
            environ: BTreeMap::from([("A".to_string(), "1".to_string())]),
        };
        let second = InitRecord {
            session_id: "S1".to_string(),
            start: Some(300),
            environ: BTreeMap::from([("B".to_string(), "2".to_string())]),
        };
        st.import_init(&first, true).unwrap();
        st.import_init(&second, false).unwrap();

        let mut rec = record("x", 150);
        rec.session_id = Some("S1".to_string());
        let ch_id = st.import_command(&rec, false).unwrap().unwrap();
        let full = st.get_full_command_record(ch_id, true).unwrap();
        assert_eq!(full.environ.get("A").map(String::as_str), Some("1"));
        assert_eq!(full.environ.get("B"), None);
        // start_time kept from the first init.
        let session = st.get_session("S1").unwrap().unwrap();
        assert_eq!(session.start_time.as_deref(), Some("1970-01-01 00:01:40"));
    }

    #[test]
    fn time_bounds_filter_rows() {
        let mut st = store();
        for (name, start) in [("old", 0), ("mid", 100), ("new", 200)] {
            st.import_command(&record(name, start), false).unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                time_after: Some("1970-01-01 00:01:40".to_string()),
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
        let rows = search(
            &st,
            &SearchOptions {
                time_before: Some("1970-01-01 00:01:40".to_string()),
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn unparseable_time_yields_empty_not_error() {
        let mut st = store();
        st.import_command(&record("ls", 1), false).unwrap();
        let rows = search(
            &st,
            &SearchOptions {
                time_after: Some("three hours after lunch".to_string()),
                ..no_unique()
            },
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn duration_bounds_filter_rows() {
        let mut st = store();
        let mut slow = record("slow", 0);
        slow.stop = Some(100);
        let mut fast = record("fast", 0);
        fast.stop = Some(5);
        st.import_command(&slow, false).unwrap();
        st.import_command(&fast, false).unwrap();

        let rows = search(
            &st,
            &SearchOptions {
                duration_longer_than: Some("50".to_string()),
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("slow"));

        let rows = search(
            &st,
            &SearchOptions {
                duration_less_than: Some("50".to_string()),
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("fast"));
    }

    #[test]
    fn exit_code_include_and_exclude() {
        let mut st = store();
        for (name, code) in [("ok", 0), ("warn", 1), ("fail", 2)] {
            let mut rec = record(name, 1);
            rec.exit_code = Some(code);
            st.import_command(&rec, false).unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                include_exit_code: vec![1, 2],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
        let rows = search(
            &st,
            &SearchOptions {
                exclude_exit_code: vec![0],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn session_history_id_filter() {
        let mut st = store();
        let mut a = record("in-s1", 1);
        a.session_id = Some("s1".to_string());
        let mut b = record("in-s2", 2);
        b.session_id = Some("s2".to_string());
        st.import_command(&a, false).unwrap();
        st.import_command(&b, false).unwrap();
        let s1 = st.get_session("s1").unwrap().unwrap().session_history_id;

        let rows = search(
            &st,
            &SearchOptions {
                include_session_history_id: vec![s1],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("in-s1"));
    }

    #[test]
    fn ignore_case_glob() {
        let mut st = store();
        st.import_command(&record("Make Build", 1), false).unwrap();
        let rows = search(
            &st,
            &SearchOptions {
                match_pattern: vec!["make*".to_string()],
                ignore_case: true,
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn regexp_filter() {
        let mut st = store();
        st.import_command(&record("git commit -m x", 1), false).unwrap();
        st.import_command(&record("git push", 2), false).unwrap();
        let rows = search(
            &st,
            &SearchOptions {
                match_regexp: vec!["^git c".to_string()],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command.as_deref(), Some("git commit -m x"));
    }

    #[test]
    fn cwd_filters() {
        let mut st = store();
        for (i, cwd) in ["/a/b", "/a/b/c", "/x"].iter().enumerate() {
            let mut rec = record(&format!("c{i}"), 1);
            rec.cwd = Some((*cwd).to_string());
            st.import_command(&rec, false).unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                cwd: vec!["/a/b".to_string()],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 1);

        let rows = search(
            &st,
            &SearchOptions {
                cwd_under: vec!["/a".to_string()],
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn sort_by_count_puts_frequent_first() {
        let mut st = store();
        for start in [1, 2, 3] {
            st.import_command(&record("ls", start), false).unwrap();
        }
        st.import_command(&record("pwd", 4), false).unwrap();

        let rows = search(
            &st,
            &SearchOptions {
                sort_by: vec![SortKey::CommandCount],
                additional_columns: vec![SortKey::CommandCount],
                ..SearchOptions::default()
            },
        );
        assert_eq!(rows[0].command.as_deref(), Some("ls"));
        assert_eq!(rows[0].command_count, Some(3));
        assert_eq!(rows[1].command_count, Some(1));
    }

    #[test]
    fn enrichment_columns_compute_success_metrics() {
        let mut st = store();
        let mut ok = record("git status", 1);
        ok.exit_code = Some(0);
        let mut bad = record("git push", 2);
        bad.exit_code = Some(1);
        st.import_command(&ok, false).unwrap();
        st.import_command(&bad, false).unwrap();

        let rows = search(
            &st,
            &SearchOptions {
                additional_columns: vec![
                    SortKey::SuccessCount,
                    SortKey::SuccessRatio,
                    SortKey::ProgramCount,
                ],
                ..no_unique()
            },
        );
        let status = rows
            .iter()
            .find(|r| r.command.as_deref() == Some("git status"))
            .unwrap();
        assert_eq!(status.success_count, Some(1));
        assert_eq!(status.success_ratio, Some(1.0));
        assert_eq!(status.program_count, Some(2));
        let push = rows
            .iter()
            .find(|r| r.command.as_deref() == Some("git push"))
            .unwrap();
        assert_eq!(push.success_count, Some(0));
        assert_eq!(push.success_ratio, Some(0.0));
    }

    #[test]
    fn limit_caps_plain_search() {
        let mut st = store();
        for start in 0..5 {
            st.import_command(&record(&format!("c{start}"), start), false)
                .unwrap();
        }
        let rows = search(
            &st,
            &SearchOptions {
                limit: 2,
                ..no_unique()
            },
        );
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn pipestatus_round_trip() {
        let mut st = store();
        let mut rec = record("a | b", 1);
        rec.pipestatus = vec![0, 1];
        let ch_id = st.import_command(&rec, false).unwrap().unwrap();
        let full = st.get_full_command_record(ch_id, true).unwrap();
        assert_eq!(full.pipestatus, vec![0, 1]);
    }

    #[test]
    fn missing_record_is_distinct_error() {
        let st = store();
        match st.get_full_command_record(999, true) {
            Err(Error::RecordNotFound { id }) => assert_eq!(id, 999),
            other => panic!("expected RecordNotFound, got {other:?}"),
        }
    }

    #[test]
    fn version_row_is_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        {
            let st = Store::open(&path).unwrap();
            let (app, schema) = st.version_info().unwrap();
            assert_eq!(app, env!("CARGO_PKG_VERSION"));
            assert_eq!(schema, SCHEMA_VERSION);
        }
        {
            let st = Store::open(&path).unwrap();
            let count: i64 = st
                .conn
                .query_row("SELECT COUNT(*) FROM cmdhist_info", [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn context_by_session_orders_by_session_then_time() {
        let mut st = store();
        st.import_init(
            &InitRecord {
                session_id: "s1".to_string(),
                start: Some(100),
                environ: BTreeMap::new(),
            },
            true,
        )
        .unwrap();
        st.import_init(
            &InitRecord {
                session_id: "s2".to_string(),
                start: Some(200),
                environ: BTreeMap::new(),
            },
            true,
        )
        .unwrap();
        // Interleaved in time, grouped by session in the output.
        for (name, start, session) in
            [("a1", 1, "s1"), ("b1", 2, "s2"), ("a2-match", 3, "s1"), ("b2", 4, "s2")]
        {
            let mut rec = record(name, start);
            rec.session_id = Some(session.to_string());
            st.import_command(&rec, false).unwrap();
        }

        let rows = search(
            &st,
            &SearchOptions {
                include_pattern: vec!["*match".to_string()],
                before_context: 1,
                after_context: 1,
                context_type: ContextType::Session,
                reverse: true,
                ..SearchOptions::default()
            },
        );
        let got: Vec<_> = rows.iter().filter_map(|r| r.command.clone()).collect();
        // Ascending session order puts s1 rows first: a1, a2-match, then b1.
        assert_eq!(got, vec!["a1", "a2-match", "b1"]);
    }
}
