//! Append-only storage backends for feedback entries

use crate::error::Result;
use crate::types::feedback::FeedbackEntry;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::warn;

/// Append-only record log
pub trait FeedbackStorage: Send + Sync {
    /// Persist one entry; on error nothing is visible to `all`
    fn append(&self, entry: &FeedbackEntry) -> Result<()>;

    /// Every entry in insertion order
    fn all(&self) -> Result<Vec<FeedbackEntry>>;

    fn len(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFeedbackStorage {
    entries: RwLock<Vec<FeedbackEntry>>,
}

impl InMemoryFeedbackStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedbackStorage for InMemoryFeedbackStorage {
    fn append(&self, entry: &FeedbackEntry) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    fn all(&self) -> Result<Vec<FeedbackEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}

/// One JSON object per line.
///
/// Each append is written as a single line, flushed and synced before
/// returning. A trailing line without its newline is a torn append and is
/// skipped on read. The entry count is read once at open and then kept
/// in step with this handle's appends, so the log expects a single writer.
#[derive(Debug)]
pub struct JsonLinesFeedbackStorage {
    path: PathBuf,
    /// Readable entries; the lock also serializes appends
    count: Mutex<usize>,
}

impl JsonLinesFeedbackStorage {
    /// Open (or create) the log at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        let count = read_entries(&path)?.len();
        Ok(Self {
            path,
            count: Mutex::new(count),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure a previous torn write does not glue onto the next line
    fn ends_cleanly(file: &mut File) -> Result<bool> {
        if file.metadata()?.len() == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }
}

impl FeedbackStorage for JsonLinesFeedbackStorage {
    fn append(&self, entry: &FeedbackEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let mut reader = File::open(&self.path)?;
        let clean = Self::ends_cleanly(&mut reader)?;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        if !clean {
            // Terminate the torn line so it stays unparsable on its own
            file.write_all(b"\n")?;
        }
        file.write_all(&line)?;
        file.flush()?;
        file.sync_data()?;
        *count += 1;
        Ok(())
    }

    fn all(&self) -> Result<Vec<FeedbackEntry>> {
        read_entries(&self.path)
    }

    fn len(&self) -> Result<usize> {
        Ok(*self.count.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn read_entries(path: &Path) -> Result<Vec<FeedbackEntry>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if !line.ends_with('\n') {
            warn!(path = %path.display(), "Ignoring unterminated trailing feedback record");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable feedback record");
            }
        }
    }

    Ok(entries)
}
