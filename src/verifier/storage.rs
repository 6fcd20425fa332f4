//! Session persistence.
use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no entry with key '{0}'")]
    NotFound(String),
    #[error("an entry with key '{0}' already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Backend(String),
}

/// A key-value table with per-entry expiration.
///
/// Entries past their expiration are never returned.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert `data`, generating a key when none is given. Returns the key.
    async fn insert(
        &self,
        key: Option<String>,
        data: Vec<u8>,
        expiration: OffsetDateTime,
    ) -> Result<String, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the data of an existing entry.
    async fn update(
        &self,
        key: &str,
        data: Vec<u8>,
        expiration: OffsetDateTime,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expiration: OffsetDateTime,
}

/// An in-process [`SessionStore`]. Expired entries are dropped when next read and
/// swept on every insert.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, Entry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry that expired at or before `now`.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        self.entries.retain(|_, entry| entry.expiration > now);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(
        &self,
        key: Option<String>,
        data: Vec<u8>,
        expiration: OffsetDateTime,
    ) -> Result<String, StorageError> {
        let now = OffsetDateTime::now_utc();
        self.purge_expired(now);
        let key = key.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        match self.entries.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if slot.get().expiration > now {
                    return Err(StorageError::AlreadyExists(key));
                }
                slot.insert(Entry { data, expiration });
                Ok(key)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry { data, expiration });
                Ok(key)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = OffsetDateTime::now_utc();
        if let Some(entry) = self.entries.get(key) {
            if entry.expiration > now {
                return Ok(Some(entry.data.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(key, |_, entry| entry.expiration <= now);
        Ok(None)
    }

    async fn update(
        &self,
        key: &str,
        data: Vec<u8>,
        expiration: OffsetDateTime,
    ) -> Result<(), StorageError> {
        let now = OffsetDateTime::now_utc();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.expiration > now => {
                *entry = Entry { data, expiration };
                Ok(())
            }
            _ => Err(StorageError::NotFound(key.to_string())),
        }
    }
}
