//! Write one JSON record file.
//!
//! Called from the shell hooks. Record files land under
//! `record/<type>/<date>/<time>-<pid>.json`; the timestamped name keeps
//! the lexicographic sweep order chronological.

use crate::cli::{RecordArgs, RecordType};
use crate::config::ConfigStore;
use crate::error::Result;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variables captured into records.
const CAPTURED_ENVIRON: [&str; 3] = ["SHELL", "TERM", "PATH"];

pub fn execute(conf: &ConfigStore, args: &RecordArgs) -> Result<()> {
    conf.ensure_layout()?;
    let now = Utc::now();
    let now_secs = now.timestamp();

    let (kind, data) = match args.record_type {
        RecordType::Command => ("command", command_data(args, now_secs)?),
        RecordType::Init => {
            let start = args.start.unwrap_or(now_secs);
            let session_id = args
                .session_id
                .clone()
                .unwrap_or_else(|| generate_session_id(start));
            if args.print_session_id {
                println!("{session_id}");
            }
            (
                "init",
                json!({
                    "session_id": session_id,
                    "start": start,
                    "environ": captured_environ(),
                }),
            )
        }
        RecordType::Exit => {
            let session_id = args.session_id.clone().unwrap_or_else(|| {
                generate_session_id(args.start.unwrap_or(now_secs))
            });
            (
                "exit",
                json!({
                    "session_id": session_id,
                    "stop": args.stop.unwrap_or(now_secs),
                }),
            )
        }
    };

    let dir = conf
        .record_path()
        .join(kind)
        .join(now.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&dir)?;
    let file = dir.join(format!(
        "{}-{}.json",
        now.format("%H%M%S%f"),
        std::process::id()
    ));
    std::fs::write(&file, serde_json::to_string(&data)?)?;
    Ok(())
}

fn command_data(args: &RecordArgs, now_secs: i64) -> Result<serde_json::Value> {
    let cwd: Option<PathBuf> = match &args.cwd {
        Some(dir) => Some(dir.clone()),
        None => std::env::current_dir().ok(),
    };
    let mut obj = serde_json::Map::new();
    obj.insert("environ".into(), json!(captured_environ()));
    obj.insert("stop".into(), json!(args.stop.unwrap_or(now_secs)));
    obj.insert(
        "terminal".into(),
        json!(args.terminal.clone().unwrap_or_else(detect_terminal)),
    );
    if let Some(command) = &args.command {
        obj.insert("command".into(), json!(command));
    }
    if let Some(cwd) = cwd {
        obj.insert("cwd".into(), json!(cwd.to_string_lossy()));
    }
    if let Some(code) = args.exit_code {
        obj.insert("exit_code".into(), json!(code));
    }
    if !args.pipestatus.is_empty() {
        obj.insert("pipestatus".into(), json!(args.pipestatus));
    }
    if let Some(start) = args.start {
        obj.insert("start".into(), json!(start));
    }
    if let Some(session_id) = &args.session_id {
        obj.insert("session_id".into(), json!(session_id));
    }
    Ok(serde_json::Value::Object(obj))
}

fn captured_environ() -> BTreeMap<String, String> {
    CAPTURED_ENVIRON
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| ((*name).to_string(), v)))
        .collect()
}

/// Stable session identity: `HOST:TTY:PPID:start`.
fn generate_session_id(start: i64) -> String {
    let host = std::env::var("HOST")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "localhost".to_string());
    let tty = std::env::var("TTY")
        .ok()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "NO_TTY".to_string());
    let ppid = nix::unistd::getppid();
    format!("{host}:{tty}:{ppid}:{start}")
}

/// Best-effort terminal detection: multiplexers first, then the most
/// specific terminal variable available.
fn detect_terminal() -> String {
    if std::env::var("TMUX").is_ok_and(|v| !v.is_empty()) {
        return "tmux".to_string();
    }
    if std::env::vars().any(|(k, _)| k.starts_with("BYOBU")) {
        return "byobu".to_string();
    }
    let term = std::env::var("TERM").unwrap_or_default();
    if term.starts_with("screen") {
        return term;
    }
    if let Ok(colorterm) = std::env::var("COLORTERM") {
        if !colorterm.is_empty() {
            return colorterm;
        }
    }
    term
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_four_fields() {
        let id = generate_session_id(1234);
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3], "1234");
        assert!(!parts[0].is_empty());
    }

    #[test]
    fn command_data_skips_missing_fields() {
        let args = RecordArgs {
            record_type: RecordType::Command,
            command: Some("ls".into()),
            exit_code: None,
            pipestatus: Vec::new(),
            cwd: Some(PathBuf::from("/tmp")),
            start: None,
            stop: Some(9),
            terminal: Some("tmux".into()),
            session_id: None,
            print_session_id: false,
        };
        let data = command_data(&args, 10).unwrap();
        assert_eq!(data["command"], "ls");
        assert_eq!(data["stop"], 9);
        assert_eq!(data["cwd"], "/tmp");
        assert!(data.get("exit_code").is_none());
        assert!(data.get("pipestatus").is_none());
        assert!(data.get("session_id").is_none());
    }
}
