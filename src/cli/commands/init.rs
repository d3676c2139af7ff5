//! Emit shell hook source and optionally start the daemon.
//!
//! The hook text is embedded in the binary; `init` prints it so shells
//! can `eval "$(cmdhist init --shell zsh)"` from their rc file.

use crate::cli::InitArgs;
use crate::config::ConfigStore;
use crate::daemon;
use crate::error::{Error, Result};

const BASH_HOOKS: &str = include_str!("../../../shell/cmdhist.bash");
const ZSH_HOOKS: &str = include_str!("../../../shell/cmdhist.zsh");

const SUPPORTED: &str = "bash, zsh";

pub fn execute(conf: &ConfigStore, args: &InitArgs) -> Result<()> {
    let shell = args
        .shell
        .clone()
        .or_else(|| std::env::var("SHELL").ok())
        .ok_or_else(|| Error::Config("no --shell given and $SHELL is unset".to_string()))?;

    let source = match shell_name(&shell) {
        "bash" => BASH_HOOKS,
        "zsh" => ZSH_HOOKS,
        other => {
            return Err(Error::UnsupportedShell {
                shell: other.to_string(),
                supported: SUPPORTED.to_string(),
            });
        }
    };

    conf.ensure_layout()?;
    print!("{source}");

    if !args.no_daemon {
        let mut daemon_args = vec![
            "--base-dir".to_string(),
            conf.base_path().to_string_lossy().into_owned(),
        ];
        daemon_args.extend(args.daemon_options.iter().cloned());
        daemon::spawn_detached(&daemon_args, args.daemon_outfile.as_deref())?;
    }
    Ok(())
}

/// Reduce a `$SHELL`-style path to the shell's name.
fn shell_name(shell: &str) -> &str {
    shell.rsplit('/').next().unwrap_or(shell)
}
