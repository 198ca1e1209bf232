//! Run log: console output duplicated to a log file from the first line.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / log::error!()
//!     |
//! [LogCollector] (log::Log backend)
//!     |-- stderr (console, immediate)
//!     |-- crossbeam channel --> [DiskPersister thread] --> logs/build-<ts>.log
//! ```
//!
//! The file is created synchronously in `new()` so an unwritable log
//! directory fails the run before anything else happens. `flush()` blocks
//! until every queued line is on disk, which the escalation path relies on
//! before uploading the log.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Internal log line or special marker
enum LogMessage {
    Line(String),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// Unified logger writing to the console and the run log file
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_path: PathBuf,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the log file under `log_dir` and start the disk writer.
    pub fn new(log_dir: &Path, level: LevelFilter) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log dir {}: {}", log_dir.display(), e))?;

        let log_path = log_dir.join(format!("build-{}.log", Local::now().format("%Y%m%d-%H%M%S")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to open log file {}: {}", log_path.display(), e))?;

        let (tx, rx) = unbounded::<LogMessage>();
        std::thread::spawn(move || persist(file, rx));

        Ok(LogCollector { tx, log_path, level })
    }

    /// Register as the global `log` backend.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Timestamp a line, echo it to stderr and queue it for disk.
    pub fn record(&self, level: log::Level, message: &str) {
        let line = format!("[{}] {:<5} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), level, message);
        eprintln!("{}", line);
        // The writer thread only exits once every sender is gone
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Block until every queued line has been written.
    pub fn flush_to_disk(&self) -> Result<(), String> {
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|_| "log writer has stopped".to_string())?;
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .map_err(|e| format!("log flush not acknowledged: {}", e))
    }
}

fn persist(mut file: File, rx: crossbeam_channel::Receiver<LogMessage>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMessage::Line(line) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    eprintln!("[Log] [ERROR] Failed to write log line: {}", e);
                }
            }
            LogMessage::Flush(done) => {
                let _ = file.flush();
                let _ = file.sync_data();
                let _ = done.send(());
            }
        }
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.record(record.level(), &record.args().to_string());
        }
    }

    fn flush(&self) {
        if let Err(e) = self.flush_to_disk() {
            eprintln!("[Log] [WARNING] {}", e);
        }
    }
}
