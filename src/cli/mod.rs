//! CLI definitions using clap.

use crate::config::{LocateTarget, LogLevel};
use crate::query::ContextType;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// cmdhist - augmented shell history
#[derive(Parser, Debug)]
#[command(name = "cmdhist", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base directory (default: platform user-config dir)
    #[arg(long, global = true, env = "CMDHIST_HOME")]
    pub base_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print shell hook source and start the daemon
    Init(InitArgs),

    /// Write one record file (called from shell hooks)
    Record(RecordArgs),

    /// Watch the record directory and index new records
    Daemon(DaemonArgs),

    /// One-shot sweep of the record directory
    Index(IndexArgs),

    /// Search command history
    Search(SearchArgs),

    /// Print full command records
    Show(ShowArgs),

    /// Interactive search through an external filter program
    Isearch(IsearchArgs),

    /// Print the path of a well-known file
    Locate {
        #[arg(value_enum)]
        target: LocateTarget,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Shell to emit hooks for; a path is reduced to its file name.
    /// Defaults to $SHELL.
    #[arg(long)]
    pub shell: Option<String>,

    /// Do not start the daemon
    #[arg(long)]
    pub no_daemon: bool,

    /// Extra option passed to the daemon command (repeatable)
    #[arg(long = "daemon-opt", action = clap::ArgAction::Append)]
    pub daemon_options: Vec<String>,

    /// Redirect daemon stdout/stderr here instead of the null device
    #[arg(long)]
    pub daemon_outfile: Option<PathBuf>,
}

/// Record types, matching the three record subtrees.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordType {
    Command,
    Init,
    Exit,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Which kind of record to write
    #[arg(long, value_enum)]
    pub record_type: RecordType,

    /// Command line that was run
    #[arg(long)]
    pub command: Option<String>,

    /// Exit code ($?) of the command
    #[arg(long)]
    pub exit_code: Option<i64>,

    /// $pipestatus (zsh) / $PIPESTATUS (bash)
    #[arg(long, num_args = 1..)]
    pub pipestatus: Vec<i64>,

    /// Working directory (default: current directory)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Start time (POSIX seconds)
    #[arg(long)]
    pub start: Option<i64>,

    /// Stop time (POSIX seconds)
    #[arg(long)]
    pub stop: Option<i64>,

    /// Terminal name; auto-detected when omitted
    #[arg(long)]
    pub terminal: Option<String>,

    /// Session long id from the init hook
    #[arg(long)]
    pub session_id: Option<String>,

    /// Print the generated session id (init records)
    #[arg(long)]
    pub print_session_id: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Do nothing if a daemon is already running
    #[arg(long)]
    pub no_error: bool,

    /// Terminate a running daemon and take over
    #[arg(long)]
    pub restart: bool,

    /// Directory that has the JSON records
    #[arg(long)]
    pub record_path: Option<PathBuf>,

    /// Do not remove imported JSON files (implies --check-duplicate)
    #[arg(long)]
    pub keep_json: bool,

    /// Skip records already present in the store
    #[arg(long)]
    pub check_duplicate: bool,

    /// Poll the record directory instead of native file events
    #[arg(long)]
    pub use_polling: bool,

    /// Log level for the daemon log
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory that has the JSON records
    pub record_path: Option<PathBuf>,

    /// Do not remove imported JSON files (implies --check-duplicate)
    #[arg(long)]
    pub keep_json: bool,

    /// Skip records already present in the store
    #[arg(long)]
    pub check_duplicate: bool,
}

#[derive(Args, Debug, Default, Clone)]
pub struct SearchArgs {
    /// Glob patterns matched anywhere in the command
    pub pattern: Vec<String>,

    /// Glob patterns the command must match (ANDed)
    #[arg(long, action = clap::ArgAction::Append)]
    pub match_pattern: Vec<String>,

    /// Glob patterns of which one must match (ORed)
    #[arg(long, action = clap::ArgAction::Append)]
    pub include_pattern: Vec<String>,

    /// Glob patterns that must not match
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude_pattern: Vec<String>,

    /// Regular expressions the command must match (ANDed)
    #[arg(long, action = clap::ArgAction::Append)]
    pub match_regexp: Vec<String>,

    /// Regular expressions of which one must match (ORed)
    #[arg(long, action = clap::ArgAction::Append)]
    pub include_regexp: Vec<String>,

    /// Regular expressions that must not match
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude_regexp: Vec<String>,

    /// Working directory at run time (exact, normalized)
    #[arg(long, action = clap::ArgAction::Append)]
    pub cwd: Vec<String>,

    /// Working directory as a glob
    #[arg(long, action = clap::ArgAction::Append)]
    pub cwd_glob: Vec<String>,

    /// Working directory under this tree
    #[arg(long, action = clap::ArgAction::Append)]
    pub cwd_under: Vec<String>,

    /// Commands run after this time ("1 hour ago", "2026-01-31", ...)
    #[arg(long)]
    pub time_after: Option<String>,

    /// Commands run before this time
    #[arg(long)]
    pub time_before: Option<String>,

    /// Commands that took longer than this ("30s", "5 minutes", ...)
    #[arg(long)]
    pub duration_longer_than: Option<String>,

    /// Commands that took less than this
    #[arg(long)]
    pub duration_less_than: Option<String>,

    /// Keep commands with one of these exit codes
    #[arg(long, action = clap::ArgAction::Append)]
    pub include_exit_code: Vec<i64>,

    /// Drop commands with any of these exit codes
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude_exit_code: Vec<i64>,

    /// Keep commands from one of these session history ids
    #[arg(long, action = clap::ArgAction::Append)]
    pub include_session_history_id: Vec<i64>,

    /// Drop commands from any of these session history ids
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude_session_history_id: Vec<i64>,

    /// Environment NAME PATTERN globs that must all match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub match_environ_pattern: Vec<String>,

    /// Environment NAME PATTERN globs of which one must match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub include_environ_pattern: Vec<String>,

    /// Environment NAME PATTERN globs that must not match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub exclude_environ_pattern: Vec<String>,

    /// Environment NAME PATTERN regexps that must all match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub match_environ_regexp: Vec<String>,

    /// Environment NAME PATTERN regexps of which one must match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub include_environ_regexp: Vec<String>,

    /// Environment NAME PATTERN regexps that must not match
    #[arg(long, num_args = 2, value_names = ["NAME", "PATTERN"],
          action = clap::ArgAction::Append)]
    pub exclude_environ_regexp: Vec<String>,

    /// Maximum rows to print (negative = unlimited)
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Print every matching row, not one per command
    #[arg(long)]
    pub no_unique: bool,

    /// Case-insensitive pattern matching
    #[arg(short, long)]
    pub ignore_case: bool,

    /// Reverse the sort order
    #[arg(short, long)]
    pub reverse: bool,

    /// Sort key: count, time, start, stop, code, success_count,
    /// success_ratio, program_count (repeatable)
    #[arg(long, action = clap::ArgAction::Append)]
    pub sort_by: Vec<String>,

    /// Order by path distance from this directory
    #[arg(long, value_name = "DIR")]
    pub sort_by_cwd_distance: Option<String>,

    /// Show N rows around each match
    #[arg(short = 'C', long, value_name = "N")]
    pub context: Option<usize>,

    /// Show N rows before each match
    #[arg(short = 'B', long, value_name = "N")]
    pub before_context: Option<usize>,

    /// Show N rows after each match
    #[arg(short = 'A', long, value_name = "N")]
    pub after_context: Option<usize>,

    /// How context neighbours are chosen
    #[arg(long, value_enum, default_value_t)]
    pub context_type: ContextType,

    /// Output template with {field} holes (e.g. "{command}\t{exit_code}")
    #[arg(long)]
    pub format: Option<String>,

    /// Raise the output detail level (repeatable)
    #[arg(short = 'f', action = clap::ArgAction::Count)]
    pub format_level: u8,

    /// Prefix each row with the command history id
    #[arg(long)]
    pub with_command_id: bool,

    /// Prefix each row with the session history id
    #[arg(long)]
    pub with_session_id: bool,

    /// Write results here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Standalone parser wrapper so alias expansions re-use the search
/// argument grammar.
#[derive(Parser, Debug)]
#[command(name = "search", no_binary_name = true)]
struct AliasExpansion {
    #[command(flatten)]
    args: SearchArgs,
}

impl SearchArgs {
    /// Parse bare search tokens (no binary name), as stored in the
    /// alias table.
    pub fn parse_tokens(tokens: &[String]) -> Result<Self, clap::Error> {
        AliasExpansion::try_parse_from(tokens).map(|w| w.args)
    }

    /// Fold an alias expansion into these arguments: list options
    /// extend, scalar options overwrite when the expansion sets them.
    pub fn merge_from(&mut self, other: Self) {
        self.pattern.extend(other.pattern);
        self.match_pattern.extend(other.match_pattern);
        self.include_pattern.extend(other.include_pattern);
        self.exclude_pattern.extend(other.exclude_pattern);
        self.match_regexp.extend(other.match_regexp);
        self.include_regexp.extend(other.include_regexp);
        self.exclude_regexp.extend(other.exclude_regexp);
        self.cwd.extend(other.cwd);
        self.cwd_glob.extend(other.cwd_glob);
        self.cwd_under.extend(other.cwd_under);
        self.include_exit_code.extend(other.include_exit_code);
        self.exclude_exit_code.extend(other.exclude_exit_code);
        self.include_session_history_id
            .extend(other.include_session_history_id);
        self.exclude_session_history_id
            .extend(other.exclude_session_history_id);
        self.match_environ_pattern.extend(other.match_environ_pattern);
        self.include_environ_pattern
            .extend(other.include_environ_pattern);
        self.exclude_environ_pattern
            .extend(other.exclude_environ_pattern);
        self.match_environ_regexp.extend(other.match_environ_regexp);
        self.include_environ_regexp
            .extend(other.include_environ_regexp);
        self.exclude_environ_regexp
            .extend(other.exclude_environ_regexp);
        self.sort_by.extend(other.sort_by);

        self.time_after = other.time_after.or(self.time_after.take());
        self.time_before = other.time_before.or(self.time_before.take());
        self.duration_longer_than = other
            .duration_longer_than
            .or(self.duration_longer_than.take());
        self.duration_less_than = other
            .duration_less_than
            .or(self.duration_less_than.take());
        self.limit = other.limit.or(self.limit.take());
        self.sort_by_cwd_distance = other
            .sort_by_cwd_distance
            .or(self.sort_by_cwd_distance.take());
        self.context = other.context.or(self.context.take());
        self.before_context = other.before_context.or(self.before_context.take());
        self.after_context = other.after_context.or(self.after_context.take());
        self.format = other.format.or(self.format.take());
        self.output = other.output.or(self.output.take());

        self.no_unique |= other.no_unique;
        self.ignore_case |= other.ignore_case;
        self.reverse |= other.reverse;
        self.with_command_id |= other.with_command_id;
        self.with_session_id |= other.with_session_id;
        self.format_level = self.format_level.max(other.format_level);
    }
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Command history ids to print
    #[arg(required = true)]
    pub ids: Vec<i64>,

    /// Do not merge the session environment into the output
    #[arg(long)]
    pub no_session_environ: bool,
}

#[derive(Args, Debug)]
pub struct IsearchArgs {
    /// Initial query passed to the filter program
    pub query: Vec<String>,
}
