use async_trait::async_trait;
use parking_lot::RwLock;
use shortlink_core::{
    Destination, RecordId, Repository, Result, ShortCode, StorageError, StorageStats, UrlRecord,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// In-memory storage entry for a URL mapping.
#[derive(Debug, Clone)]
struct Entry {
    id: RecordId,
    record: UrlRecord,
}

#[derive(Debug, Default)]
struct Table {
    by_code: HashMap<ShortCode, Entry>,
    by_id: HashMap<RecordId, ShortCode>,
    last_id: i64,
}

impl Table {
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        RecordId(self.last_id)
    }
}

/// In-memory implementation of the [`Repository`] contract.
///
/// One reader/writer lock guards the whole table and is held for the
/// duration of each operation, so every call is linearizable with respect
/// to the lock. Owner scans are O(n); this backend is meant for small,
/// single-process deployments.
///
/// `add` overwrites on collision: the new record replaces the old one and
/// gets a fresh internal id.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    table: RwLock<Table>,
}

impl InMemoryRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.table.read().by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn add(&self, code: &ShortCode, original_url: &str, owner_token: &str) -> Result<()> {
        let mut table = self.table.write();
        let id = table.next_id();

        let entry = Entry {
            id,
            record: UrlRecord::new(code.clone(), original_url, owner_token),
        };
        if let Some(previous) = table.by_code.insert(code.clone(), entry) {
            trace!(code = %code, previous_id = %previous.id, "overwriting record");
            table.by_id.remove(&previous.id);
        }
        table.by_id.insert(id, code.clone());

        trace!(code = %code, id = %id, "stored record");
        Ok(())
    }

    async fn get(&self, code: &ShortCode, _owner_token: &str) -> Result<Destination> {
        let table = self.table.read();

        let Some(entry) = table.by_code.get(code) else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        if entry.record.deleted {
            return Ok(Destination::Gone);
        }
        Ok(Destination::Active(entry.record.original_url.clone()))
    }

    async fn token_exists(&self, token: &str) -> Result<bool> {
        let table = self.table.read();
        Ok(table
            .by_code
            .values()
            .any(|entry| entry.record.owner_token == token))
    }

    async fn list_by_owner(&self, token: &str) -> Result<Vec<UrlRecord>> {
        let table = self.table.read();
        Ok(table
            .by_code
            .values()
            .filter(|entry| entry.record.owner_token == token)
            .map(|entry| entry.record.clone())
            .collect())
    }

    async fn resolve_id(&self, fragment: &str, owner_token: &str) -> Result<Option<RecordId>> {
        let table = self.table.read();

        // Lowest id wins when several codes share the suffix.
        let id = table
            .by_code
            .values()
            .filter(|entry| {
                entry.record.owner_token == owner_token && entry.record.short_code.ends_with(fragment)
            })
            .map(|entry| entry.id)
            .min();

        trace!(fragment, resolved = ?id, "resolved fragment");
        Ok(id)
    }

    async fn bulk_soft_delete(&self, ids: &[RecordId]) -> Result<u64> {
        let mut table = self.table.write();
        let Table { by_code, by_id, .. } = &mut *table;

        let mut flipped = 0;
        for id in ids {
            let Some(entry) = by_id.get(id).and_then(|code| by_code.get_mut(code)) else {
                trace!(id = %id, "no record for id");
                continue;
            };
            if !entry.record.deleted {
                entry.record.deleted = true;
                flipped += 1;
            }
        }

        debug!(requested = ids.len(), flipped, "soft-deleted records");
        Ok(flipped)
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn original_url_exists(&self, _original_url: &str) -> Result<bool> {
        Ok(false)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let table = self.table.read();
        let users: HashSet<&str> = table
            .by_code
            .values()
            .map(|entry| entry.record.owner_token.as_str())
            .filter(|token| !token.is_empty())
            .collect();

        Ok(StorageStats {
            urls: table.by_code.len() as u64,
            users: users.len() as u64,
        })
    }
}
