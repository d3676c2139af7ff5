//! The `search` sub-command: alias expansion, option preprocessing,
//! query execution, and row formatting.

use crate::cli::SearchArgs;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::model::CommandRow;
use crate::query::{self, SortKey};
use crate::storage::Store;
use colored::Colorize;
use std::io::{IsTerminal, Write};

/// Preset templates selected with `-f` (repeated for more detail).
const FORMAT_LEVELS: [&str; 4] = [
    "{command}",
    "{start_time}  {command}",
    "{start_time}  [{exit_code}]  {command}  ({directory})",
    "{start_time} .. {stop_time}  [{exit_code}]  {command}  ({directory})  \
     {terminal}  {session_long_id}",
];

/// Row fields a template may reference.
const TEMPLATE_KEYS: [&str; 14] = [
    "command_history_id",
    "command",
    "start_time",
    "stop_time",
    "exit_code",
    "directory",
    "terminal",
    "session_history_id",
    "session_long_id",
    "command_count",
    "success_count",
    "success_ratio",
    "program_count",
    "cwd_distance",
];

pub fn execute(conf: &ConfigStore, args: &SearchArgs) -> Result<()> {
    execute_with_adapter(conf, args, &query::NoAdapter)
}

/// Run a search with a caller-supplied [`QueryAdapter`] rewriting the
/// compiled options. The CLI uses the identity adapter; embedders hook
/// in here.
pub fn execute_with_adapter(
    conf: &ConfigStore,
    args: &SearchArgs,
    adapter: &dyn query::QueryAdapter,
) -> Result<()> {
    let config = conf.load_config()?;
    let mut args = args.clone();
    query::expand_aliases(&mut args, &config.search.alias)?;
    let mut opts = adapter.adapt(query::build_options(&args, config.search.default_limit)?);

    let template = resolve_template(&args);
    opts.additional_columns = needed_columns(&template, &opts.sort_by);

    let store = Store::open(&conf.db_path())?;
    let rows = store.search_command_record(&opts)?;

    match &args.output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            write_rows(&mut file, &rows, &args, &template, false)?;
        }
        None => {
            let stdout = std::io::stdout();
            let color = stdout.is_terminal();
            let mut out = stdout.lock();
            write_rows(&mut out, &rows, &args, &template, color)?;
        }
    }
    Ok(())
}

fn resolve_template(args: &SearchArgs) -> String {
    let base = args.format.clone().unwrap_or_else(|| {
        let level = usize::from(args.format_level).min(FORMAT_LEVELS.len() - 1);
        FORMAT_LEVELS[level].to_string()
    });
    let mut prefix = String::new();
    if args.with_command_id {
        prefix.push_str("{command_history_id}\t");
    }
    if args.with_session_id {
        prefix.push_str("{session_history_id}\t");
    }
    format!("{prefix}{base}")
}

/// Enrichment columns the query must join: whatever the template prints
/// plus whatever the sort keys need.
fn needed_columns(template: &str, sort_by: &[SortKey]) -> Vec<SortKey> {
    let mut needed = Vec::new();
    let mut push = |key: SortKey| {
        if !needed.contains(&key) {
            needed.push(key);
        }
    };
    for key in [
        SortKey::CommandCount,
        SortKey::SuccessCount,
        SortKey::SuccessRatio,
        SortKey::ProgramCount,
    ] {
        if template.contains(&format!("{{{}}}", key.column())) {
            push(key);
        }
    }
    for key in sort_by {
        if key.is_enrichment() && !needed.contains(key) {
            needed.push(*key);
        }
    }
    needed
}

fn write_rows<W: Write>(
    out: &mut W,
    rows: &[CommandRow],
    args: &SearchArgs,
    template: &str,
    color: bool,
) -> Result<()> {
    for row in rows {
        let line = format_row(template, row);
        let failed = row.exit_code.is_some_and(|code| code != 0);
        if color && failed {
            writeln!(out, "{}", line.red())?;
        } else {
            writeln!(out, "{line}")?;
        }
    }
    if rows.is_empty() && args.output.is_none() {
        tracing::info!("no matching records");
    }
    Ok(())
}

fn format_row(template: &str, row: &CommandRow) -> String {
    let mut line = template.to_string();
    for key in TEMPLATE_KEYS {
        let hole = format!("{{{key}}}");
        if line.contains(&hole) {
            line = line.replace(&hole, &field_value(row, key));
        }
    }
    line
}

fn field_value(row: &CommandRow, key: &str) -> String {
    fn opt<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(ToString::to_string).unwrap_or_default()
    }
    match key {
        "command_history_id" => row.command_history_id.to_string(),
        "command" => opt(&row.command),
        "start_time" => opt(&row.start_time),
        "stop_time" => opt(&row.stop_time),
        "exit_code" => opt(&row.exit_code),
        "directory" => opt(&row.directory),
        "terminal" => opt(&row.terminal),
        "session_history_id" => opt(&row.session_history_id),
        "session_long_id" => opt(&row.session_long_id),
        "command_count" => opt(&row.command_count),
        "success_count" => opt(&row.success_count),
        "success_ratio" => opt(&row.success_ratio),
        "program_count" => opt(&row.program_count),
        "cwd_distance" => opt(&row.cwd_distance),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CommandRow {
        CommandRow {
            command_history_id: 7,
            command: Some("make test".to_string()),
            start_time: Some("2026-01-01 10:00:00".to_string()),
            exit_code: Some(2),
            directory: Some("/src/".to_string()),
            command_count: Some(3),
            ..CommandRow::default()
        }
    }

    #[test]
    fn level_zero_is_command_only() {
        assert_eq!(format_row(FORMAT_LEVELS[0], &row()), "make test");
    }

    #[test]
    fn custom_template_substitutes_fields() {
        assert_eq!(
            format_row("{command}|{exit_code}|{command_count}", &row()),
            "make test|2|3"
        );
    }

    #[test]
    fn missing_fields_render_empty() {
        assert_eq!(format_row("{terminal}x", &row()), "x");
    }

    #[test]
    fn id_prefixes_apply() {
        let args = SearchArgs {
            with_command_id: true,
            ..SearchArgs::default()
        };
        let template = resolve_template(&args);
        assert_eq!(format_row(&template, &row()), "7\tmake test");
    }

    #[test]
    fn format_level_saturates() {
        let args = SearchArgs {
            format_level: 9,
            ..SearchArgs::default()
        };
        assert_eq!(resolve_template(&args), FORMAT_LEVELS[3]);
    }

    #[test]
    fn template_columns_drive_enrichment() {
        let needed = needed_columns("{command} {success_ratio}", &[SortKey::StartTime]);
        assert_eq!(needed, vec![SortKey::SuccessRatio]);
        let needed = needed_columns("{command}", &[SortKey::CommandCount]);
        assert_eq!(needed, vec![SortKey::CommandCount]);
    }
}
