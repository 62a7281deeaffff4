//! Day-sharded raw snapshot files.
//!
//! Every collection run stores the untouched API pages of its day in one
//! file under `<data>/YYYY/MM/DD.json`. This module manages that layout,
//! the durable write of a day and the streaming decode of a day back into
//! video records.
//!
//! # Directory Layout
//!
//! ```text
//! <data>/
//!   2024/
//!     03/
//!       01.json     # "# API Version: 6.0.2" + concatenated JSON pages
//!       02.json
//!   videoDB.json    # catalog dump (see catalog.rs)
//!   deleted.json    # deletion ledger (see ledger.rs)
//! ```
//!
//! # Invariants
//!
//! - A day file is written once per collection day and never edited.
//! - The write goes to a temporary sibling, is synced, then renamed, so a
//!   reader sees either no file or the complete day.
//! - The first line is a version comment; the rest is a stream of JSON
//!   page documents (no separators required).

use std::fs::{self, File};
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

use crate::error::ErrorCode;
use crate::model::{VideoPage, VideoRecord};

/// Prefix of the header line written above the raw pages.
pub const VERSION_HEADER_PREFIX: &str = "# API Version: ";

/// Midnight UTC of `day`, the timestamp every sample of a day file is filed under.
#[must_use]
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while writing or reading day snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No snapshot exists for the requested day.
    #[error("no snapshot at {}", .0.display())]
    NotFound(PathBuf),

    /// The snapshot exists but one of its page documents is not valid JSON.
    #[error("malformed snapshot {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error during snapshot operations.
    #[error("snapshot I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SnapshotError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Malformed { .. } => ErrorCode::MalformedSnapshot,
            Self::Io { .. } => ErrorCode::StorageIo,
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Reads and writes the raw day files of one data folder.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the day file for `day`.
    #[must_use]
    pub fn snapshot_path(&self, day: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{:02}.json", day.day()))
    }

    #[must_use]
    pub fn has_snapshot(&self, day: NaiveDate) -> bool {
        self.snapshot_path(day).is_file()
    }

    /// Whether any data was ever collected in `year`.
    #[must_use]
    pub fn year_available(&self, year: i32) -> bool {
        self.data_dir.join(format!("{year:04}")).is_dir()
    }

    // -----------------------------------------------------------------------
    // Write
    // -----------------------------------------------------------------------

    /// Durably store the raw pages of one collection day.
    ///
    /// Writes the version header followed by the pages verbatim. Parent
    /// directories are created as needed; an existing file for the same day
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the directories or the file cannot
    /// be written.
    pub fn write_snapshot(
        &self,
        day: NaiveDate,
        raw_pages: &[Vec<u8>],
        server_version: &str,
    ) -> Result<PathBuf, SnapshotError> {
        let path = self.snapshot_path(day);
        let parent = path.parent().unwrap_or(&self.data_dir);
        fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;

        let tmp = path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            writeln!(file, "{VERSION_HEADER_PREFIX}{server_version}")?;
            for page in raw_pages {
                file.write_all(page)?;
                if !page.ends_with(b"\n") {
                    file.write_all(b"\n")?;
                }
            }
            file.flush()?;
            file.sync_data()?;
            fs::rename(&tmp, &path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(SnapshotError::io(&path, e));
        }

        tracing::debug!(
            path = %path.display(),
            pages = raw_pages.len(),
            server_version,
            "raw snapshot written"
        );
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Decode every video record stored for `day`, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::NotFound`] when the day was never collected
    /// and [`SnapshotError::Malformed`] when a page document is corrupt.
    pub fn read_snapshot(&self, day: NaiveDate) -> Result<Vec<VideoRecord>, SnapshotError> {
        let path = self.snapshot_path(day);
        let bytes = fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        decode_pages(&path, &bytes)
    }

    /// API version recorded in the header of `day`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file cannot be read.
    pub fn read_header(&self, day: NaiveDate) -> Result<Option<String>, SnapshotError> {
        let path = self.snapshot_path(day);
        let bytes = fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
        let line = String::from_utf8_lossy(first_line);
        // Older collectors wrote "# Peertube API Version: " and CRLF.
        Ok(line
            .trim_end()
            .strip_prefix('#')
            .and_then(|rest| rest.split_once("API Version: "))
            .map(|(_, version)| version.to_string()))
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Every collected day in ascending order.
    ///
    /// Walks `YYYY/MM/DD.json`; names that do not form a valid date are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if a directory cannot be read.
    pub fn list_days(&self) -> Result<Vec<NaiveDate>, SnapshotError> {
        let mut days = Vec::new();
        for (year, year_dir) in numeric_children(&self.data_dir, 4)? {
            for (month, month_dir) in numeric_children(&year_dir, 2)? {
                let entries = fs::read_dir(&month_dir).map_err(|e| SnapshotError::io(&month_dir, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| SnapshotError::io(&month_dir, e))?;
                    let name = entry.file_name();
                    let Some(day) = name
                        .to_str()
                        .and_then(|n| n.strip_suffix(".json"))
                        .filter(|n| n.len() == 2)
                        .and_then(|n| n.parse::<u32>().ok())
                    else {
                        continue;
                    };
                    let (Ok(year), Ok(month)) = (i32::try_from(year), u32::try_from(month)) else {
                        continue;
                    };
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                        days.push(date);
                    }
                }
            }
        }
        days.sort_unstable();
        Ok(days)
    }

    /// Earliest collected day, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the folder cannot be listed.
    pub fn first_day(&self) -> Result<Option<NaiveDate>, SnapshotError> {
        Ok(self.list_days()?.first().copied())
    }
}

/// Numeric sub-directories of `dir` whose names have exactly `width` digits.
fn numeric_children(dir: &Path, width: usize) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| SnapshotError::io(dir, e))? {
        let entry = entry.map_err(|e| SnapshotError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(value) = name
            .to_str()
            .filter(|n| n.len() == width && n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse().ok())
        {
            out.push((value, path));
        }
    }
    Ok(out)
}

/// Decode the body of a day file: skip the header line, then stream pages.
fn decode_pages(path: &Path, bytes: &[u8]) -> Result<Vec<VideoRecord>, SnapshotError> {
    let body = match bytes.iter().position(|b| *b == b'\n') {
        Some(idx) => &bytes[idx + 1..],
        None => {
            tracing::error!(path = %path.display(), "cannot find version header of raw data");
            bytes
        }
    };

    let mut videos = Vec::new();
    for page in serde_json::Deserializer::from_slice(body).into_iter::<VideoPage>() {
        let page = page.map_err(|source| SnapshotError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        videos.extend(page.data);
    }
    Ok(videos)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
