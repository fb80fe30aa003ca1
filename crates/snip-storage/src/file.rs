//! Append-only file log backend.
//!
//! Every successful write appends one JSON record per line and fsyncs
//! before the in-memory index is updated, so the index is never ahead of the
//! log. On open the log is replayed start to end to rebuild the index and
//! the sequence counter.
//!
//! ## Record format
//!
//! `{"sequence_id":1,"owner_id":"u1","short_key":"0f115db0","original_url":"https://example.com/"}\n`
//!
//! ## Recovery posture
//!
//! A newline-terminated line that fails to decode is corruption and aborts
//! the open. An unterminated final line that fails to decode is a torn
//! append from a crash; it is truncated away and the open proceeds.

use crate::index::UrlIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snip_core::{
    BatchDeleter, DeletionRequest, OwnerId, ReadRepository, Repository, Result, ShortKey,
    Statistics, StorageError, UrlEntry,
};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LogRecord {
    sequence_id: u64,
    owner_id: OwnerId,
    short_key: ShortKey,
    original_url: String,
}

/// Statistics from replaying the log on open.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of records applied to the index.
    pub records: usize,
    /// Bytes dropped from a torn final record.
    pub truncated_bytes: u64,
}

#[derive(Debug)]
struct LogState {
    /// `None` once the backend is closed.
    file: Option<File>,
    /// Length of the log up to the last committed record.
    committed_len: u64,
    last_sequence: u64,
    index: UrlIndex,
}

/// File-log implementation of the Repository trait.
///
/// Reads are served from the in-memory index only. Deletes are not
/// supported by this backend and fail with `Unimplemented`.
#[derive(Debug)]
pub struct FileLogRepository {
    path: PathBuf,
    remove_on_close: bool,
    replay: ReplayStats,
    state: RwLock<LogState>,
}

impl FileLogRepository {
    /// Opens (or creates) the log at `path` and replays it.
    ///
    /// Logs living under the system temporary directory are treated as
    /// ephemeral and removed by [`Repository::close`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let remove_on_close = path.starts_with(std::env::temp_dir());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut index = UrlIndex::default();
        let (replay, committed_len, last_sequence) = replay(&mut file, &mut index)?;

        info!(
            path = %path.display(),
            records = replay.records,
            last_sequence,
            truncated_bytes = replay.truncated_bytes,
            "file log replayed"
        );

        Ok(Self {
            path,
            remove_on_close,
            replay,
            state: RwLock::new(LogState {
                file: Some(file),
                committed_len,
                last_sequence,
                index,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What the replay on open recovered.
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay
    }

    /// Sequence id the next appended record will carry.
    pub fn next_sequence_id(&self) -> u64 {
        self.state.read().last_sequence + 1
    }
}

/// Scans the log and applies every record to `index`.
///
/// Returns the replay statistics, the length of the valid prefix and the
/// highest sequence id seen.
fn replay(file: &mut File, index: &mut UrlIndex) -> Result<(ReplayStats, u64, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&*file);
    let mut stats = ReplayStats::default();
    let mut offset = 0u64;
    let mut last_sequence = 0u64;
    let mut needs_newline = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }

        let terminated = line.last() == Some(&b'\n');
        let body = if terminated { &line[..line.len() - 1] } else { &line[..] };

        if body.iter().all(u8::is_ascii_whitespace) {
            offset += read as u64;
            continue;
        }

        match serde_json::from_slice::<LogRecord>(body) {
            Ok(record) => {
                index.insert(&record.owner_id, &record.short_key, &record.original_url);
                last_sequence = last_sequence.max(record.sequence_id);
                stats.records += 1;
                offset += read as u64;
                needs_newline = !terminated;
            }
            Err(e) if terminated => {
                return Err(StorageError::InvalidData(format!(
                    "malformed log record at byte {offset}: {e}"
                )));
            }
            Err(e) => {
                warn!(offset, bytes = read, error = %e, "dropping torn record at end of log");
                stats.truncated_bytes = read as u64;
                break;
            }
        }
    }
    drop(reader);

    if stats.truncated_bytes > 0 {
        file.set_len(offset)?;
        file.sync_all()?;
    }
    if needs_newline {
        file.write_all(b"\n")?;
        file.sync_all()?;
        offset += 1;
    }

    Ok((stats, offset, last_sequence))
}

impl LogState {
    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::Unavailable("file log is closed".to_string()))
    }

    /// Appends `records` and fsyncs. On failure the log is cut back to the
    /// last committed length so a partial line never precedes later appends.
    fn append(&mut self, records: &[LogRecord]) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buf.push(b'\n');
        }

        let committed_len = self.committed_len;
        let file = self.file()?;
        let written = file.write_all(&buf).and_then(|()| file.sync_all());
        if let Err(e) = written {
            if let Err(truncate_err) = file.set_len(committed_len) {
                error!(error = %truncate_err, "failed to roll back partial log append");
            }
            return Err(e.into());
        }

        self.committed_len += buf.len() as u64;
        Ok(())
    }
}

#[async_trait]
impl ReadRepository for FileLogRepository {
    async fn get(&self, owner: &OwnerId, short_key: &ShortKey) -> Result<String> {
        self.state
            .read()
            .index
            .get(owner, short_key)
            .map(str::to_owned)
            .ok_or_else(|| StorageError::NotFound(short_key.to_string()))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlEntry>> {
        Ok(self.state.read().index.list(owner))
    }

    async fn statistics(&self) -> Result<Statistics> {
        Ok(self.state.read().index.statistics())
    }
}

#[async_trait]
impl BatchDeleter for FileLogRepository {
    async fn delete_batch(&self, _requests: &[DeletionRequest]) -> Result<()> {
        Err(StorageError::Unimplemented("delete_batch"))
    }
}

#[async_trait]
impl Repository for FileLogRepository {
    async fn put(&self, owner: &OwnerId, short_key: &ShortKey, original_url: &str) -> Result<()> {
        let mut state = self.state.write();
        state.file()?;

        if state.index.contains(owner, short_key) {
            return Err(StorageError::Conflict {
                owner: owner.to_string(),
                short_key: short_key.to_string(),
            });
        }

        let record = LogRecord {
            sequence_id: state.last_sequence + 1,
            owner_id: owner.clone(),
            short_key: short_key.clone(),
            original_url: original_url.to_owned(),
        };
        state.append(std::slice::from_ref(&record))?;

        state.last_sequence = record.sequence_id;
        state.index.insert(owner, short_key, original_url);
        debug!(owner = %owner, short_key = %short_key, sequence_id = record.sequence_id, "appended record");
        Ok(())
    }

    async fn put_batch(&self, owner: &OwnerId, entries: Vec<UrlEntry>) -> Result<Vec<UrlEntry>> {
        let mut state = self.state.write();
        state.file()?;

        let mut pending = UrlIndex::default();
        let mut written = Vec::with_capacity(entries.len());
        let mut records = Vec::with_capacity(entries.len());
        let mut sequence = state.last_sequence;

        for entry in entries {
            if state.index.contains(owner, &entry.short_key)
                || !pending.insert(owner, &entry.short_key, &entry.original_url)
            {
                debug!(owner = %owner, short_key = %entry.short_key, "skipping existing batch entry");
                continue;
            }
            sequence += 1;
            records.push(LogRecord {
                sequence_id: sequence,
                owner_id: owner.clone(),
                short_key: entry.short_key.clone(),
                original_url: entry.original_url.clone(),
            });
            written.push(entry);
        }

        if records.is_empty() {
            return Ok(written);
        }

        state.append(&records)?;

        state.last_sequence = sequence;
        for entry in &written {
            state.index.insert(owner, &entry.short_key, &entry.original_url);
        }
        debug!(owner = %owner, count = written.len(), "appended batch");
        Ok(written)
    }

    async fn ping(&self) -> Result<()> {
        if self.state.read().file.is_none() {
            return Err(StorageError::Unavailable("file log is closed".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(file) = self.state.write().file.take() else {
            return Ok(());
        };
        drop(file);

        if self.remove_on_close {
            std::fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "removed temporary file log");
        }
        Ok(())
    }
}
