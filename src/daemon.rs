//! The indexer daemon: PID-file protocol, signal handling, and the
//! record-directory watch loop.
//!
//! Single-instance: the PID file is the coarse mutex, held by presence
//! plus a liveness probe of the recorded PID. Both SIGTERM and SIGINT
//! raise the same cooperative stop; the in-flight ingest completes and
//! the PID file is removed on every exit path.

use crate::config::{ConfigStore, LogLevel};
use crate::error::{Error, Result};
use crate::indexer::Indexer;
use crate::storage::Store;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use notify::{EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long `--restart` waits for the old daemon to release the PID file.
const RESTART_TIMEOUT: Duration = Duration::from_secs(3);

/// Options of the `daemon` sub-command.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub no_error: bool,
    pub restart: bool,
    pub record_path: Option<PathBuf>,
    pub keep_json: bool,
    pub check_duplicate: bool,
    pub use_polling: bool,
    pub log_level: Option<LogLevel>,
}

/// Daemon lifecycle, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DaemonState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Run the daemon until interrupted. Returns silently when another
/// daemon holds the PID file and `--no-error` is set.
pub fn run(conf: &ConfigStore, opts: &DaemonOptions) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;

    conf.ensure_layout()?;

    if !acquire_pid_file(&conf.daemon_pid_path(), opts)? {
        return Ok(());
    }
    let _pid_file = PidFile::write(conf.daemon_pid_path())?;

    let level = match opts.log_level {
        Some(level) => level,
        None => conf.load_config()?.daemon.log_level.unwrap_or_default(),
    };
    init_daemon_logging(conf, level)?;
    info!(state = ?DaemonState::Starting, pid = std::process::id());

    let record_path = opts
        .record_path
        .clone()
        .unwrap_or_else(|| conf.record_path());
    let store = Store::open(&conf.db_path())?;
    let mut indexer = Indexer::new(
        store,
        record_path.clone(),
        opts.check_duplicate,
        opts.keep_json,
    );

    // Records that arrived while the daemon was down.
    let swept = indexer.index_all()?;
    debug!(swept, "initial sweep complete");

    let (tx, rx) = mpsc::channel();
    let mut watcher = create_watcher(tx, opts.use_polling)?;
    watcher.watch(&record_path, RecursiveMode::Recursive)?;
    info!(state = ?DaemonState::Running, path = %record_path.display());

    let result = watch_loop(&stop, &rx, &mut indexer);

    info!(state = ?DaemonState::Stopping);
    drop(watcher);
    if let Err(e) = &result {
        error!(error = %e, "daemon exiting on error");
    }
    info!(state = ?DaemonState::Stopped);
    result
}

fn watch_loop(
    stop: &AtomicBool,
    rx: &mpsc::Receiver<PathBuf>,
    indexer: &mut Indexer,
) -> Result<()> {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(path) => {
                if path.is_file() {
                    indexer.index_record(&path)?;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

/// Probe the PID file. `Ok(true)` means we may take over; `Ok(false)`
/// means another daemon runs and `--no-error` asked for silence.
fn acquire_pid_file(pid_path: &Path, opts: &DaemonOptions) -> Result<bool> {
    let Some(old_pid) = read_pid(pid_path)? else {
        return Ok(true);
    };
    if !process_alive(old_pid) {
        debug!(old_pid, "stale PID file, taking over");
        return Ok(true);
    }
    if opts.restart {
        let _ = kill(Pid::from_raw(old_pid), Signal::SIGTERM);
        let deadline = std::time::Instant::now() + RESTART_TIMEOUT;
        while pid_path.exists() {
            if std::time::Instant::now() >= deadline {
                return Err(Error::DaemonRestartTimeout {
                    pid: old_pid,
                    timeout_secs: RESTART_TIMEOUT.as_secs(),
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        return Ok(true);
    }
    if opts.no_error {
        return Ok(false);
    }
    Err(Error::DaemonRunning { pid: old_pid })
}

fn read_pid(path: &Path) -> Result<Option<i32>> {
    match std::fs::read_to_string(path) {
        // Unparseable content is treated as stale.
        Ok(text) => Ok(text.trim().parse().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Removes the PID file on drop, covering both clean and error exits.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn write(path: PathBuf) -> Result<Self> {
        std::fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn init_daemon_logging(conf: &ConfigStore, level: LogLevel) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(conf.daemon_log_path())?;
    let filter = EnvFilter::new(format!("cmdhist={}", level.as_filter()));
    // try_init: tests may run several daemons in one process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Recommended (inotify-style) watcher, or the polling fallback.
enum RecordWatcher {
    Recommended(RecommendedWatcher),
    Poll(PollWatcher),
}

impl RecordWatcher {
    fn watch(&mut self, path: &Path, mode: RecursiveMode) -> notify::Result<()> {
        match self {
            Self::Recommended(w) => w.watch(path, mode),
            Self::Poll(w) => w.watch(path, mode),
        }
    }
}

fn create_watcher(tx: mpsc::Sender<PathBuf>, use_polling: bool) -> Result<RecordWatcher> {
    let handler = move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Create(_)) {
                for path in event.paths {
                    // Full channel or a stopped receiver just drops the
                    // event; the next sweep picks the file up.
                    let _ = tx.send(path);
                }
            }
        }
        Err(e) => error!(error = %e, "watcher error"),
    };
    if use_polling {
        let config = notify::Config::default().with_poll_interval(Duration::from_secs(1));
        Ok(RecordWatcher::Poll(PollWatcher::new(handler, config)?))
    } else {
        Ok(RecordWatcher::Recommended(notify::recommended_watcher(
            handler,
        )?))
    }
}

/// Launch `cmdhist daemon --no-error` as a detached child, stdio
/// redirected to `outfile` or the null device. Used by `init`.
pub fn spawn_detached(daemon_args: &[String], outfile: Option<&Path>) -> Result<u32> {
    use std::os::unix::process::CommandExt;
    use std::process::Stdio;

    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("daemon").arg("--no-error").args(daemon_args);
    cmd.stdin(Stdio::null());
    match outfile {
        Some(path) => {
            let out = std::fs::File::create(path)?;
            cmd.stdout(out.try_clone()?);
            cmd.stderr(out);
        }
        None => {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
    }
    // Detach into a new session so the child outlives the shell hook.
    cmd.process_group(0);
    let child = cmd.spawn()?;
    debug!(pid = child.id(), "daemon spawned in background");
    Ok(child.id())
}
