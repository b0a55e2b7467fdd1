use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::error::SpiError;

/// File name of the protocol inside the output directory.
pub const PROTOCOL_FILE: &str = "run_protocol.txt";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

enum Sink {
    File { writer: BufWriter<File>, path: PathBuf },
    Memory(Vec<String>),
}

/// Time-stamped audit trail of a run.
///
/// Every entry is written as `[YYYY-MM-DD HH:MM:SS.ffffff] message` and
/// flushed at once. The protocol is closed with a final line when dropped.
pub struct RunProtocol {
    sink: Sink,
    echo: bool,
    debug: bool,
    write_failed: bool,
}

impl RunProtocol {
    /// Create (truncating) the protocol file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpiError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            sink: Sink::File {
                writer: BufWriter::new(file),
                path: path.to_path_buf(),
            },
            echo: false,
            debug: false,
            write_failed: false,
        })
    }

    /// Protocol kept in memory, for embedding and tests.
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
            echo: false,
            debug: false,
            write_failed: false,
        }
    }

    /// Mirror every entry to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Also record detail entries.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File { path, .. } => Some(path),
            Sink::Memory(_) => None,
        }
    }

    /// Entries recorded by an in-memory protocol, without timestamps.
    pub fn entries(&self) -> &[String] {
        match &self.sink {
            Sink::Memory(entries) => entries,
            Sink::File { .. } => &[],
        }
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        self.write(Severity::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.write(Severity::Warning, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.write(Severity::Error, message.as_ref());
    }

    /// Entry written only in debug mode.
    pub fn detail(&mut self, message: impl AsRef<str>) {
        if self.debug {
            self.write(Severity::Info, message.as_ref());
        }
    }

    fn write(&mut self, severity: Severity, message: &str) {
        if self.echo {
            match severity {
                Severity::Info => println!("{message}"),
                Severity::Warning => println!("{}", message.yellow()),
                Severity::Error => println!("{}", message.red()),
            }
        }

        match &mut self.sink {
            Sink::Memory(entries) => entries.push(message.to_string()),
            Sink::File { writer, path } => {
                let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
                let result = writeln!(writer, "[{stamp}] {message}").and_then(|_| writer.flush());
                if let Err(e) = result {
                    // Reported once; the run goes on without its audit trail.
                    if !self.write_failed {
                        tracing::error!(path = %path.display(), "cannot write run protocol: {e}");
                        self.write_failed = true;
                    }
                }
            }
        }
    }
}

impl Drop for RunProtocol {
    fn drop(&mut self) {
        self.write(Severity::Info, "Protocol closed");
    }
}
