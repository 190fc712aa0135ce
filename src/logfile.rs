//! Append-only CSV log file.
//!
//! A log file's first line is the header for the field set active when the
//! file was created. A header mismatch on an existing file is never
//! silently rewritten; a delimiter comment plus the new header is appended
//! instead, preserving historical rows in a single logical file.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Timestamp format used for rows and the header-change delimiter.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// How to open a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Append,
    Truncate,
}

/// An open, append-mode CSV log file.
pub struct LogFile {
    path: PathBuf,
    header: Option<String>,
    writer: BufWriter<File>,
}

impl LogFile {
    /// Open a log file, reading back the existing header when appending.
    pub fn open(path: impl Into<PathBuf>, mode: OpenMode) -> io::Result<Self> {
        let path = path.into();

        let header = match mode {
            OpenMode::Append => read_first_line(&path)?,
            OpenMode::Truncate => None,
        };

        let file = match mode {
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(&path)?,
            OpenMode::Truncate => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?,
        };

        Ok(Self {
            path,
            header,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file's first line, if the file existed and was non-empty.
    pub fn current_header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Append one CSV row and flush it to storage.
    pub fn append_row(&mut self, fields: &[String]) -> io::Result<()> {
        self.writer.write_all(fields.join(",").as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    /// Make sure the file carries the expected header.
    ///
    /// A new or empty file gets the header as its first line. An existing
    /// file with a different header gets a human-readable delimiter comment
    /// followed by the new header; prior rows are never truncated.
    pub fn ensure_header(&mut self, expected: &[String]) -> io::Result<()> {
        let wanted = expected.join(",");

        match self.header.as_deref() {
            None => {
                self.append_row(expected)?;
                self.header = Some(wanted);
            }
            Some(existing) if existing.trim() != wanted => {
                log::info!(
                    "Sensor configuration changed for {:?}, appending new header",
                    self.path
                );
                let timestamp = Utc::now().format(TIMESTAMP_FORMAT);
                self.writer.write_all(
                    format!("\n### New sensor configuration at {timestamp} ###\n").as_bytes(),
                )?;
                self.writer.flush()?;
                self.append_row(expected)?;
                self.header = Some(wanted);
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Flush and close this file, then open `new_path` with the given
    /// header written immediately.
    pub fn rotate_to(mut self, new_path: impl Into<PathBuf>, header: &[String]) -> io::Result<Self> {
        self.writer.flush()?;
        drop(self);

        let mut next = LogFile::open(new_path, OpenMode::Append)?;
        next.ensure_header(header)?;
        Ok(next)
    }
}

/// First line of a file, if it exists and is non-empty.
pub fn read_first_line(path: &Path) -> io::Result<Option<String>> {
    match File::open(path) {
        Ok(file) => {
            let mut line = String::new();
            BufReader::new(file).read_line(&mut line)?;
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r').to_string();
            Ok(if line.is_empty() { None } else { Some(line) })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete a log file from storage.
pub fn erase(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ensure_header_on_fresh_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("05_2024-03-01.csv");
        let header = fields(&["Time", "Heartrate"]);

        let mut file = LogFile::open(&path, OpenMode::Append).unwrap();
        file.ensure_header(&header).unwrap();
        assert_eq!(file.current_header(), Some("Time,Heartrate"));
        drop(file);

        let reopened = LogFile::open(&path, OpenMode::Append).unwrap();
        assert_eq!(reopened.current_header(), Some("Time,Heartrate"));
    }

    #[test]
    fn test_ensure_header_matching_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let header = fields(&["Time", "Temperature"]);

        let mut file = LogFile::open(&path, OpenMode::Append).unwrap();
        file.ensure_header(&header).unwrap();
        file.ensure_header(&header).unwrap();
        drop(file);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Time,Temperature\n");
    }

    #[test]
    fn test_header_mismatch_appends_delimiter_without_truncating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");

        let mut file = LogFile::open(&path, OpenMode::Append).unwrap();
        file.ensure_header(&fields(&["Time", "Heartrate"])).unwrap();
        file.append_row(&fields(&["2024-03-01 10:00:00.000", "61"]))
            .unwrap();
        drop(file);

        let before = std::fs::metadata(&path).unwrap().len();

        let mut file = LogFile::open(&path, OpenMode::Append).unwrap();
        file.ensure_header(&fields(&["Time", "Heartrate", "Temperature"]))
            .unwrap();
        drop(file);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > before);
        assert!(content.starts_with("Time,Heartrate\n2024-03-01 10:00:00.000,61\n"));
        assert!(content.contains("### New sensor configuration at "));
        assert!(content.trim_end().ends_with("Time,Heartrate,Temperature"));
    }

    #[test]
    fn test_truncate_mode_discards_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "Time,Old\n1,2\n").unwrap();

        let mut file = LogFile::open(&path, OpenMode::Truncate).unwrap();
        assert_eq!(file.current_header(), None);
        file.ensure_header(&fields(&["Time", "Heartrate"])).unwrap();
        drop(file);

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Time,Heartrate\n"
        );
    }

    #[test]
    fn test_rotate_to_writes_header_immediately() {
        let dir = tempdir().unwrap();
        let old_path = dir.path().join("05_2024-01-15.csv");
        let new_path = dir.path().join("05_2024-01-16.csv");
        let header = fields(&["Time", "Heartrate"]);

        let mut file = LogFile::open(&old_path, OpenMode::Append).unwrap();
        file.ensure_header(&header).unwrap();
        file.append_row(&fields(&["2024-01-15 23:59:59.000", "58"]))
            .unwrap();

        let next = file.rotate_to(&new_path, &header).unwrap();
        assert_eq!(next.path(), new_path);
        drop(next);

        assert_eq!(
            std::fs::read_to_string(&new_path).unwrap(),
            "Time,Heartrate\n"
        );
        // Old rows stay in the old file.
        assert!(std::fs::read_to_string(&old_path)
            .unwrap()
            .contains("23:59:59"));
    }

    #[test]
    fn test_erase() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "Time\n").unwrap();
        erase(&path).unwrap();
        assert!(!path.exists());
    }
}
