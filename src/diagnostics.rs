//! Diagnostic log for one module invocation
//!
//! Keeps two insertion-ordered lists: debug entries `(status_code, message)`
//! and error messages. Every error is also a debug entry, so the debug list is
//! never shorter than the error list. The lists only grow; the file writers
//! project a snapshot to disk and never clear memory.
//!
//! File format, one record per line:
//!
//! ```text
//! Debug: 404
//! 404 error
//! Error: 404 error
//! ```
//!
//! Line breaks inside a message are written as the two characters `\n` (or
//! `\r`) so a record never spans more than its own line.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

/// One debug record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub status_code: Option<u16>,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct DiagnosticLog {
    debug_logs: Vec<DiagnosticEntry>,
    errors: Vec<String>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_debug(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        let message = message.into();
        debug!(status_code = ?status_code, "{}", message);
        self.debug_logs.push(DiagnosticEntry {
            status_code,
            message,
        });
    }

    /// Record an error; it is mirrored into the debug list as well.
    pub fn log_error(&mut self, status_code: Option<u16>, message: impl Into<String>) {
        let message = message.into();
        warn!(status_code = ?status_code, "{}", message);
        self.errors.push(message.clone());
        self.log_debug(status_code, message);
    }

    pub fn debug_logs(&self) -> &[DiagnosticEntry] {
        &self.debug_logs
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.debug_logs.is_empty()
    }

    /// Write every debug entry as `Debug: <code>` followed by its message.
    ///
    /// With `append = false` the file ends up holding exactly the current
    /// entries; with `append = true` they are added after whatever is there.
    pub fn write_debug_log_to_file(&self, path: &Path, append: bool) -> Result<()> {
        let mut out = open_log_file(path, append)?;
        for entry in &self.debug_logs {
            match entry.status_code {
                Some(code) => writeln!(out, "Debug: {code}")?,
                None => writeln!(out, "Debug: none")?,
            }
            writeln!(out, "{}", single_line(&entry.message))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Same contract as [`write_debug_log_to_file`](Self::write_debug_log_to_file),
    /// one `Error: <message>` line per error.
    pub fn write_errors_to_file(&self, path: &Path, append: bool) -> Result<()> {
        let mut out = open_log_file(path, append)?;
        for message in &self.errors {
            writeln!(out, "Error: {}", single_line(message))?;
        }
        out.flush()?;
        Ok(())
    }
}

fn single_line(message: &str) -> Cow<'_, str> {
    if message.contains(['\n', '\r']) {
        Cow::Owned(message.replace('\n', "\\n").replace('\r', "\\r"))
    } else {
        Cow::Borrowed(message)
    }
}

fn open_log_file(path: &Path, append: bool) -> Result<BufWriter<std::fs::File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(BufWriter::new(file))
}
