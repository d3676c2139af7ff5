//! Record types: the JSON shapes written by the shell hooks and the row
//! types the store hands back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One `record/command/...json` file: a finished command line.
///
/// Every field is optional; hooks emit what they know. Timestamps are
/// POSIX seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub pipestatus: Vec<i64>,
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub terminal: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub environ: BTreeMap<String, String>,
}

/// One `record/init/...json` file: a session started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRecord {
    pub session_id: String,
    pub start: Option<i64>,
    #[serde(default)]
    pub environ: BTreeMap<String, String>,
}

/// One `record/exit/...json` file: a session ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRecord {
    pub session_id: String,
    pub stop: Option<i64>,
}

/// A row from `search_command_record`.
///
/// Enrichment fields are present only when the query joined them in.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandRow {
    pub command_history_id: i64,
    pub command: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub exit_code: Option<i64>,
    pub directory: Option<String>,
    pub terminal: Option<String>,
    pub session_history_id: Option<i64>,
    pub session_long_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd_distance: Option<i64>,
    /// Boolean filter column emitted by context queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<bool>,
}

/// Everything known about one command, as printed by `show`.
#[derive(Debug, Clone, Serialize)]
pub struct FullCommandRecord {
    pub command_history_id: i64,
    pub command: Option<String>,
    pub cwd: Option<String>,
    pub terminal: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub exit_code: Option<i64>,
    pub pipestatus: Vec<i64>,
    pub session_long_id: Option<String>,
    pub session_start_time: Option<String>,
    pub session_stop_time: Option<String>,
    pub environ: BTreeMap<String, String>,
}

/// One `session_history` row.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub session_history_id: i64,
    pub session_long_id: String,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_record_accepts_sparse_json() {
        let rec: CommandRecord = serde_json::from_str(r#"{"command":"ls"}"#).unwrap();
        assert_eq!(rec.command.as_deref(), Some("ls"));
        assert!(rec.pipestatus.is_empty());
        assert!(rec.environ.is_empty());
        assert_eq!(rec.exit_code, None);
    }

    #[test]
    fn init_record_requires_session_id() {
        assert!(serde_json::from_str::<InitRecord>(r#"{"start":1}"#).is_err());
        let rec: InitRecord =
            serde_json::from_str(r#"{"session_id":"h:t:1:2","start":100}"#).unwrap();
        assert_eq!(rec.session_id, "h:t:1:2");
    }

    #[test]
    fn command_record_full_shape() {
        let rec: CommandRecord = serde_json::from_str(
            r#"{"command":"make -j","cwd":"/src","exit_code":2,
                "pipestatus":[0,2],"start":10,"stop":20,
                "terminal":"tmux","session_id":"s",
                "environ":{"PATH":"/bin"}}"#,
        )
        .unwrap();
        assert_eq!(rec.pipestatus, vec![0, 2]);
        assert_eq!(rec.environ.get("PATH").map(String::as_str), Some("/bin"));
    }
}
