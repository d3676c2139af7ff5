//! The `daemon` sub-command: thin adapter over [`crate::daemon::run`].

use crate::cli::DaemonArgs;
use crate::config::ConfigStore;
use crate::daemon::{self, DaemonOptions};
use crate::error::Result;

pub fn execute(conf: &ConfigStore, args: &DaemonArgs) -> Result<()> {
    let opts = DaemonOptions {
        no_error: args.no_error,
        restart: args.restart,
        record_path: args.record_path.clone(),
        keep_json: args.keep_json,
        check_duplicate: args.check_duplicate,
        use_polling: args.use_polling,
        log_level: args.log_level,
    };
    daemon::run(conf, &opts)
}
