use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{Level, LevelFilter};

use crate::dataset::RecordIssue;
use crate::error::Result;

/// Per-run logging context.
///
/// Every entry goes to the `log` facade; when a file is configured it is
/// also appended there as `LEVEL: timestamp: message`. The log is owned by
/// the command being run and must be closed explicitly so buffered entries
/// reach disk.
pub struct RunLog {
    level: LevelFilter,
    file: Option<(PathBuf, BufWriter<File>)>,
    entries: usize,
}

impl RunLog {
    /// Opens the run log, creating the file if needed and appending to it.
    pub fn open(path: Option<&Path>, level: LevelFilter) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::console(level));
        };

        let handle = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            level,
            file: Some((path.to_path_buf(), BufWriter::new(handle))),
            entries: 0,
        })
    }

    /// A log that only forwards to the `log` facade.
    fn console(level: LevelFilter) -> Self {
        Self {
            level,
            file: None,
            entries: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    /// Entries written to the file so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn info(&mut self, message: &str) -> Result<()> {
        self.write(Level::Info, message)
    }

    pub fn warn(&mut self, message: &str) -> Result<()> {
        self.write(Level::Warn, message)
    }

    pub fn error(&mut self, message: &str) -> Result<()> {
        self.write(Level::Error, message)
    }

    /// Logs each skipped record as a warning.
    pub fn record_issues(&mut self, issues: &[RecordIssue]) -> Result<()> {
        for issue in issues {
            self.warn(&format!("Skipped record: {issue}"))?;
        }
        Ok(())
    }

    fn write(&mut self, level: Level, message: &str) -> Result<()> {
        log::log!(level, "{message}");

        if level > self.level {
            return Ok(());
        }
        if let Some((_, writer)) = self.file.as_mut() {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
            writeln!(writer, "{}: {timestamp}: {message}", level.as_str())?;
            self.entries += 1;
        }
        Ok(())
    }

    /// Flushes and closes the log file.
    pub fn close(self) -> Result<()> {
        let entries = self.entries();
        if let Some((path, mut writer)) = self.file {
            writer.flush()?;
            log::debug!("Closed run log {} after {entries} entries", path.display());
        }
        Ok(())
    }
}
