//! Interactive search: adapter around an external filter program.
//!
//! Candidate commands are piped to the configured filter (percol, fzf,
//! ...); whatever it prints is echoed back so the shell widget can put
//! it on the command line. The keystroke loop itself lives entirely in
//! the external program.

use crate::cli::{IsearchArgs, SearchArgs};
use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::query;
use crate::storage::Store;
use std::io::Write;
use std::process::{Command, Stdio};

pub fn execute(conf: &ConfigStore, args: &IsearchArgs) -> Result<()> {
    let config = conf.load_config()?;

    let mut tokens = config.isearch.base_query.clone();
    tokens.extend(args.query.iter().cloned());
    let mut search_args = SearchArgs::parse_tokens(&tokens)
        .map_err(|e| Error::Config(format!("isearch base_query does not parse: {e}")))?;
    query::expand_aliases(&mut search_args, &config.search.alias)?;
    // Feed the filter plenty of candidates; it does its own narrowing.
    let mut opts = query::build_options(&search_args, 1000)?;
    opts.sort_by = vec![query::SortKey::CommandCount];

    let store = Store::open(&conf.db_path())?;
    let rows = store.search_command_record(&opts)?;
    let candidates: Vec<String> = rows
        .into_iter()
        .filter_map(|row| row.command)
        .collect();

    let mut child = Command::new(&config.isearch.program)
        .args(&config.isearch.program_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| {
            Error::Config(format!(
                "could not run isearch program '{}': {e}",
                config.isearch.program
            ))
        })?;

    if let Some(stdin) = child.stdin.as_mut() {
        for candidate in &candidates {
            writeln!(stdin, "{candidate}")?;
        }
    }
    let output = child.wait_with_output()?;
    print!("{}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}
