use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use pagewatch_core::SeenRecord;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table already exists")]
    TableAlreadyExists,
    #[error("entity already exists")]
    EntityAlreadyExists,
    #[error("table {0} does not exist")]
    TableNotFound(String),
    #[error("storage returned status {status}{}", code_suffix(.code))]
    Status { status: u16, code: Option<String> },
    #[error("storage request failed: {0}")]
    Network(String),
    #[error("could not decode storage response: {0}")]
    Decode(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Where the next page of a table listing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub next_partition_key: String,
    pub next_row_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordPage {
    pub row_keys: Vec<String>,
    pub continuation: Option<Continuation>,
}

/// Durable ledger of notified identifiers, one table per watch.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates `table`. Fails with [`StoreError::TableAlreadyExists`] when it
    /// is already there.
    async fn create_table(&self, table: &str) -> Result<(), StoreError>;

    /// Reads one page of row keys, starting at `continuation` or at the
    /// beginning of the table.
    async fn list_page(
        &self,
        table: &str,
        continuation: Option<Continuation>,
    ) -> Result<RecordPage, StoreError>;

    /// Appends a record. Fails with [`StoreError::EntityAlreadyExists`] when a
    /// row with the same keys is present.
    async fn insert(&self, table: &str, record: &SeenRecord) -> Result<(), StoreError>;
}

type Key = (String, String);

/// In-process ledger with the same paging and conflict behaviour as the
/// table service.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<Key, SeenRecord>>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub const DEFAULT_PAGE_SIZE: usize = 1000;

    pub fn new() -> Self {
        Self::with_page_size(Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Creates `table` if needed and adds `identifiers` to it.
    pub fn seed<I, S>(&self, table: &str, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables = self.lock();
        let rows = tables.entry(table.to_string()).or_default();
        for id in identifiers {
            let record = SeenRecord::for_identifier(id.as_ref());
            rows.insert(key_of(&record), record);
        }
    }

    /// Row keys of `table` in key order; empty when the table is missing.
    pub fn row_keys(&self, table: &str) -> Vec<String> {
        self.lock()
            .get(table)
            .map(|rows| rows.values().map(|r| r.row_key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().contains_key(table)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<Key, SeenRecord>>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key_of(record: &SeenRecord) -> Key {
    (record.partition_key.clone(), record.row_key.clone())
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables.contains_key(table) {
            return Err(StoreError::TableAlreadyExists);
        }
        tables.insert(table.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn list_page(
        &self,
        table: &str,
        continuation: Option<Continuation>,
    ) -> Result<RecordPage, StoreError> {
        let tables = self.lock();
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let start: Key = match continuation {
            Some(c) => (c.next_partition_key, c.next_row_key.unwrap_or_default()),
            None => (String::new(), String::new()),
        };

        let mut page = rows.range(start..);
        let row_keys = page
            .by_ref()
            .take(self.page_size)
            .map(|(_, record)| record.row_key.clone())
            .collect();
        let continuation = page.next().map(|((pk, rk), _)| Continuation {
            next_partition_key: pk.clone(),
            next_row_key: Some(rk.clone()),
        });

        Ok(RecordPage {
            row_keys,
            continuation,
        })
    }

    async fn insert(&self, table: &str, record: &SeenRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let key = key_of(record);
        if rows.contains_key(&key) {
            return Err(StoreError::EntityAlreadyExists);
        }
        rows.insert(key, record.clone());
        Ok(())
    }
}
