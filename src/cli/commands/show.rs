//! Print full command records.

use crate::cli::ShowArgs;
use crate::config::ConfigStore;
use crate::error::Result;
use crate::model::FullCommandRecord;
use crate::storage::Store;

pub fn execute(conf: &ConfigStore, args: &ShowArgs) -> Result<()> {
    let store = Store::open(&conf.db_path())?;
    let mut first = true;
    for id in &args.ids {
        let record = store.get_full_command_record(*id, !args.no_session_environ)?;
        if !first {
            println!();
        }
        first = false;
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &FullCommandRecord) {
    println!("command_history_id: {}", record.command_history_id);
    print_field("command", record.command.as_deref());
    print_field("cwd", record.cwd.as_deref());
    print_field("terminal", record.terminal.as_deref());
    print_field("start_time", record.start_time.as_deref());
    print_field("stop_time", record.stop_time.as_deref());
    if let Some(code) = record.exit_code {
        println!("exit_code: {code}");
    }
    if !record.pipestatus.is_empty() {
        let codes: Vec<String> = record.pipestatus.iter().map(ToString::to_string).collect();
        println!("pipestatus: {}", codes.join(" "));
    }
    print_field("session_long_id", record.session_long_id.as_deref());
    print_field("session_start_time", record.session_start_time.as_deref());
    print_field("session_stop_time", record.session_stop_time.as_deref());
    if !record.environ.is_empty() {
        println!("environ:");
        for (name, value) in &record.environ {
            println!("  {name}={value}");
        }
    }
}

fn print_field(name: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("{name}: {value}");
    }
}
