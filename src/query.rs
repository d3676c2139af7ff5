//! Search option types and the query pre-processor.
//!
//! The CLI produces a raw [`crate::cli::SearchArgs`]; this module expands
//! user aliases, resolves sort-key synonyms, parses the human time and
//! duration vocabulary, and produces the [`SearchOptions`] struct the
//! store compiles into SQL. Unparseable time or duration values are kept
//! raw so a bad filter yields an empty result rather than an error.

use crate::cli::SearchArgs;
use crate::error::{Error, Result};
use crate::util::time::{parse_datetime, parse_duration, to_sql_timestamp};
use std::collections::HashMap;

/// Sort keys accepted by `--sort-by`, after synonym resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CommandCount,
    StartTime,
    StopTime,
    ExitCode,
    SuccessCount,
    SuccessRatio,
    ProgramCount,
}

impl SortKey {
    /// Resolve a user-supplied key, accepting the short synonyms.
    pub fn parse(input: &str) -> Result<Self> {
        Ok(match input {
            "count" | "command_count" => Self::CommandCount,
            "time" | "start" | "start_time" => Self::StartTime,
            "stop" | "stop_time" => Self::StopTime,
            "code" | "exit_code" => Self::ExitCode,
            "success_count" => Self::SuccessCount,
            "success_ratio" => Self::SuccessRatio,
            "program_count" => Self::ProgramCount,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown sort key '{other}'"
                )));
            }
        })
    }

    /// Column key this sort key orders on.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::CommandCount => "command_count",
            Self::StartTime => "start_time",
            Self::StopTime => "stop_time",
            Self::ExitCode => "exit_code",
            Self::SuccessCount => "success_count",
            Self::SuccessRatio => "success_ratio",
            Self::ProgramCount => "program_count",
        }
    }

    /// Whether this key needs a joined enrichment column.
    #[must_use]
    pub const fn is_enrichment(self) -> bool {
        matches!(
            self,
            Self::CommandCount | Self::SuccessCount | Self::SuccessRatio | Self::ProgramCount
        )
    }
}

/// How context neighbours are selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ContextType {
    /// Neighbours by start time across all sessions.
    #[default]
    Time,
    /// Neighbours within the same session, sessions ordered by start.
    Session,
}

/// Store-facing search options (spec'd filter families, ordering,
/// uniqueness, and context windows).
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub match_pattern: Vec<String>,
    pub include_pattern: Vec<String>,
    pub exclude_pattern: Vec<String>,
    pub match_regexp: Vec<String>,
    pub include_regexp: Vec<String>,
    pub exclude_regexp: Vec<String>,
    pub cwd: Vec<String>,
    pub cwd_glob: Vec<String>,
    pub cwd_under: Vec<String>,
    /// SQL timestamp if parseable, otherwise the raw user string.
    pub time_after: Option<String>,
    pub time_before: Option<String>,
    /// Seconds if parseable, otherwise the raw user string.
    pub duration_longer_than: Option<String>,
    pub duration_less_than: Option<String>,
    pub include_exit_code: Vec<i64>,
    pub exclude_exit_code: Vec<i64>,
    pub include_session_history_id: Vec<i64>,
    pub exclude_session_history_id: Vec<i64>,
    pub match_environ_pattern: Vec<(String, String)>,
    pub include_environ_pattern: Vec<(String, String)>,
    pub exclude_environ_pattern: Vec<(String, String)>,
    pub match_environ_regexp: Vec<(String, String)>,
    pub include_environ_regexp: Vec<(String, String)>,
    pub exclude_environ_regexp: Vec<(String, String)>,
    pub ignore_case: bool,
    pub unique: bool,
    pub reverse: bool,
    pub sort_by: Vec<SortKey>,
    /// Normalized directory to order by path distance from.
    pub sort_by_cwd_distance: Option<String>,
    /// Negative means unlimited.
    pub limit: i64,
    pub before_context: usize,
    pub after_context: usize,
    pub context_type: ContextType,
    /// Enrichment columns the output formatter needs.
    pub additional_columns: Vec<SortKey>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            match_pattern: Vec::new(),
            include_pattern: Vec::new(),
            exclude_pattern: Vec::new(),
            match_regexp: Vec::new(),
            include_regexp: Vec::new(),
            exclude_regexp: Vec::new(),
            cwd: Vec::new(),
            cwd_glob: Vec::new(),
            cwd_under: Vec::new(),
            time_after: None,
            time_before: None,
            duration_longer_than: None,
            duration_less_than: None,
            include_exit_code: Vec::new(),
            exclude_exit_code: Vec::new(),
            include_session_history_id: Vec::new(),
            exclude_session_history_id: Vec::new(),
            match_environ_pattern: Vec::new(),
            include_environ_pattern: Vec::new(),
            exclude_environ_pattern: Vec::new(),
            match_environ_regexp: Vec::new(),
            include_environ_regexp: Vec::new(),
            exclude_environ_regexp: Vec::new(),
            ignore_case: false,
            unique: true,
            reverse: false,
            sort_by: Vec::new(),
            sort_by_cwd_distance: None,
            limit: -1,
            before_context: 0,
            after_context: 0,
            context_type: ContextType::Time,
            additional_columns: Vec::new(),
        }
    }
}

/// Hook point for callers that rewrite options before compilation.
///
/// Replaces ad-hoc user callbacks with one declarative seam; the default
/// adapter is the identity.
pub trait QueryAdapter {
    fn adapt(&self, options: SearchOptions) -> SearchOptions;
}

/// The identity adapter.
pub struct NoAdapter;

impl QueryAdapter for NoAdapter {
    fn adapt(&self, options: SearchOptions) -> SearchOptions {
        options
    }
}

/// Expand alias words in the positional patterns.
///
/// A pattern word with an alias entry is removed from the pattern list
/// and its flag-token expansion is re-parsed through the search argument
/// parser; list-valued options extend the originals, scalar options
/// overwrite them.
pub fn expand_aliases(
    args: &mut SearchArgs,
    aliases: &HashMap<String, Vec<String>>,
) -> Result<()> {
    if aliases.is_empty() {
        return Ok(());
    }
    let mut plain = Vec::new();
    for word in std::mem::take(&mut args.pattern) {
        if let Some(expansion) = aliases.get(&word) {
            let expanded = SearchArgs::parse_tokens(expansion).map_err(|e| {
                Error::Config(format!("alias '{word}' does not parse: {e}"))
            })?;
            args.merge_from(expanded);
        } else {
            plain.push(word);
        }
    }
    // Pattern words contributed by expansions stay; plain words return.
    args.pattern.extend(plain);
    Ok(())
}

/// Turn parsed CLI arguments into store-facing options.
pub fn build_options(args: &SearchArgs, default_limit: i64) -> Result<SearchOptions> {
    let mut opts = SearchOptions {
        match_pattern: args.match_pattern.clone(),
        include_pattern: args.include_pattern.clone(),
        exclude_pattern: args.exclude_pattern.clone(),
        match_regexp: args.match_regexp.clone(),
        include_regexp: args.include_regexp.clone(),
        exclude_regexp: args.exclude_regexp.clone(),
        cwd: args.cwd.clone(),
        cwd_glob: args.cwd_glob.clone(),
        cwd_under: args.cwd_under.clone(),
        time_after: args.time_after.clone().map(|s| resolve_time(&s)),
        time_before: args.time_before.clone().map(|s| resolve_time(&s)),
        duration_longer_than: args.duration_longer_than.clone().map(|s| resolve_duration(&s)),
        duration_less_than: args.duration_less_than.clone().map(|s| resolve_duration(&s)),
        include_exit_code: args.include_exit_code.clone(),
        exclude_exit_code: args.exclude_exit_code.clone(),
        include_session_history_id: args.include_session_history_id.clone(),
        exclude_session_history_id: args.exclude_session_history_id.clone(),
        match_environ_pattern: pair_up(&args.match_environ_pattern)?,
        include_environ_pattern: pair_up(&args.include_environ_pattern)?,
        exclude_environ_pattern: pair_up(&args.exclude_environ_pattern)?,
        match_environ_regexp: pair_up(&args.match_environ_regexp)?,
        include_environ_regexp: pair_up(&args.include_environ_regexp)?,
        exclude_environ_regexp: pair_up(&args.exclude_environ_regexp)?,
        ignore_case: args.ignore_case,
        unique: !args.no_unique,
        reverse: args.reverse,
        sort_by: Vec::new(),
        sort_by_cwd_distance: args
            .sort_by_cwd_distance
            .clone()
            .map(|d| crate::util::path::normalize_directory(&d)),
        limit: args.limit.unwrap_or(default_limit),
        before_context: args.context.unwrap_or(args.before_context.unwrap_or(0)),
        after_context: args.context.unwrap_or(args.after_context.unwrap_or(0)),
        context_type: args.context_type,
        additional_columns: Vec::new(),
    };

    // Bare pattern words loosen to substring matches.
    opts.match_pattern
        .extend(args.pattern.iter().map(|p| format!("*{p}*")));

    let keys = if args.sort_by.is_empty() {
        vec!["count".to_string()]
    } else {
        args.sort_by.clone()
    };
    opts.sort_by = keys
        .iter()
        .map(|k| SortKey::parse(k))
        .collect::<Result<Vec<_>>>()?;

    Ok(opts)
}

fn resolve_time(raw: &str) -> String {
    parse_datetime(raw).map_or_else(|| raw.to_string(), |t| to_sql_timestamp(&t))
}

fn resolve_duration(raw: &str) -> String {
    parse_duration(raw).map_or_else(|| raw.to_string(), |secs| secs.to_string())
}

fn pair_up(flat: &[String]) -> Result<Vec<(String, String)>> {
    if flat.len() % 2 != 0 {
        return Err(Error::InvalidArgument(
            "environment filters take NAME PATTERN pairs".to_string(),
        ));
    }
    Ok(flat
        .chunks_exact(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect())
}
