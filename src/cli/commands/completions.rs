//! Generate shell completions.

use crate::cli::Cli;
use crate::error::Result;
use clap::CommandFactory;

pub fn execute(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "cmdhist", &mut std::io::stdout());
    Ok(())
}
