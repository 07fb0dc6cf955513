use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shortlink_core::{
    Destination, RecordId, Repository, Result, ShortCode, StorageError, StorageStats, UrlRecord,
};
use std::collections::HashSet;
use std::io::{ErrorKind, SeekFrom};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

/// One line of the log.
#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    short_url: String,
    #[serde(alias = "origin_url")]
    original_url: String,
    #[serde(default)]
    token: String,
}

impl LogLine {
    fn into_record(self) -> UrlRecord {
        UrlRecord::new(
            ShortCode::new_unchecked(self.short_url),
            self.original_url,
            self.token,
        )
    }
}

/// Append-only file implementation of the [`Repository`] contract.
///
/// Every record is one JSON object per line. No index is kept: `add` opens
/// the file in append mode, writes a single line and closes it, while reads
/// scan the whole file from the start. When a code was written more than
/// once, the **first** occurrence wins.
///
/// The log has no in-place update, so soft delete is not supported:
/// `resolve_id` never matches and `bulk_soft_delete` touches nothing.
///
/// There is no locking beyond what the filesystem gives a single append.
/// A crash or a reader racing a writer may leave a partially written line.
/// Readers skip it, and the next `add` starts on a fresh line so the torn
/// fragment never swallows a later record.
#[derive(Debug, Clone)]
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    /// Creates a repository backed by the log at `path`. The file is created
    /// on the first `add`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Feeds every well-formed line to `visit` until it breaks.
    ///
    /// Unparseable lines are torn appends. They are skipped wherever they
    /// sit so that one bad write never hides the rest of the log.
    async fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(LogLine) -> ControlFlow<()> + Send,
    {
        let file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<LogLine>(&line) {
                Ok(entry) => {
                    if visit(entry).is_break() {
                        return Ok(());
                    }
                }
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no,
                        error = %err,
                        "skipping malformed record"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Whether the last byte of `file` is missing a newline, as it is after a
/// torn append.
async fn ends_mid_line(file: &mut File) -> Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl Repository for FileRepository {
    async fn add(&self, code: &ShortCode, original_url: &str, owner_token: &str) -> Result<()> {
        let line = LogLine {
            short_url: code.to_string(),
            original_url: original_url.to_owned(),
            token: owner_token.to_owned(),
        };
        let encoded = serde_json::to_vec(&line)
            .map_err(|e| StorageError::InvalidData(format!("cannot encode record: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Appends always land at the end, whatever the read position.
        let mut buf = Vec::with_capacity(encoded.len() + 2);
        if ends_mid_line(&mut file).await? {
            warn!(path = %self.path.display(), "closing torn trailing record");
            buf.push(b'\n');
        }
        buf.extend_from_slice(&encoded);
        buf.push(b'\n');
        file.write_all(&buf).await?;
        file.flush().await?;
        file.sync_data().await?;

        trace!(code = %code, path = %self.path.display(), "appended record");
        Ok(())
    }

    async fn get(&self, code: &ShortCode, _owner_token: &str) -> Result<Destination> {
        let mut found = None;
        self.scan(|entry| {
            if entry.short_url == code.as_str() {
                found = Some(entry.original_url);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })
        .await?;

        found
            .map(Destination::Active)
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn token_exists(&self, token: &str) -> Result<bool> {
        let mut exists = false;
        self.scan(|entry| {
            if entry.token == token {
                exists = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })
        .await?;

        Ok(exists)
    }

    async fn list_by_owner(&self, token: &str) -> Result<Vec<UrlRecord>> {
        let mut records = Vec::new();
        self.scan(|entry| {
            if entry.token == token {
                records.push(entry.into_record());
            }
            ControlFlow::Continue(())
        })
        .await?;

        Ok(records)
    }

    async fn resolve_id(&self, fragment: &str, _owner_token: &str) -> Result<Option<RecordId>> {
        trace!(fragment, "file log has no record ids");
        Ok(None)
    }

    async fn bulk_soft_delete(&self, ids: &[RecordId]) -> Result<u64> {
        if !ids.is_empty() {
            debug!(requested = ids.len(), "file log does not support soft delete");
        }
        Ok(0)
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn original_url_exists(&self, _original_url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let mut codes = HashSet::new();
        let mut users = HashSet::new();
        self.scan(|entry| {
            if !entry.token.is_empty() {
                users.insert(entry.token);
            }
            codes.insert(entry.short_url);
            ControlFlow::Continue(())
        })
        .await?;

        Ok(StorageStats {
            urls: codes.len() as u64,
            users: users.len() as u64,
        })
    }
}
