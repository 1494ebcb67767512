//! Ticket persistence.
//!
//! `MemoryTicketStore` keeps tickets in process memory. `FileTicketStore`
//! keeps the same collection mirrored to a JSON file so ticket ids survive
//! restarts and are never reused.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::ticket::{NewTicket, StatusFilter, Ticket, TicketStatus};

/// Errors raised by ticket persistence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid ticket: {0}")]
    Validation(String),

    #[error("ticket storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ticket storage is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ticket storage unavailable: {0}")]
    Unavailable(String),
}

/// CRUD over tickets. Callers always receive owned copies.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Create a ticket, assigning a fresh id
    async fn create(&self, params: NewTicket) -> Result<Ticket, StoreError>;

    /// Fetch a ticket by id
    async fn get(&self, id: u64) -> Result<Option<Ticket>, StoreError>;

    /// List tickets newest first, filtered by status and capped at `limit`
    async fn list(&self, filter: StatusFilter, limit: usize) -> Result<Vec<Ticket>, StoreError>;

    /// Set a ticket's status; `None` when the id does not resolve
    async fn update_status(
        &self,
        id: u64,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, StoreError>;

    /// Number of tickets per status, in vocabulary order
    async fn count_by_status(&self) -> Result<Vec<(TicketStatus, usize)>, StoreError>;
}

/// Serialized form of the whole collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TicketTable {
    next_id: u64,
    tickets: BTreeMap<u64, Ticket>,
}

impl TicketTable {
    fn new() -> Self {
        Self {
            next_id: 1,
            tickets: BTreeMap::new(),
        }
    }

    fn insert(&mut self, params: NewTicket) -> Result<Ticket, StoreError> {
        let title = params.title.trim();
        if title.is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_string()));
        }

        let now = Utc::now();
        let id = self.next_id.max(1);
        self.next_id = id + 1;

        let ticket = Ticket {
            id,
            title: title.to_string(),
            description: params.description,
            status: TicketStatus::default(),
            priority: params.priority.unwrap_or_default(),
            category: params.category.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.tickets.insert(id, ticket.clone());
        Ok(ticket)
    }

    fn list(&self, filter: StatusFilter, limit: usize) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .values()
            .filter(|t| filter.matches(t.status))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        tickets.truncate(limit);
        tickets
    }

    fn set_status(&mut self, id: u64, status: TicketStatus) -> Option<Ticket> {
        let ticket = self.tickets.get_mut(&id)?;
        ticket.status = status;
        ticket.updated_at = Utc::now().max(ticket.created_at);
        Some(ticket.clone())
    }

    fn counts(&self) -> Vec<(TicketStatus, usize)> {
        TicketStatus::all()
            .iter()
            .map(|status| {
                let count = self.tickets.values().filter(|t| t.status == *status).count();
                (*status, count)
            })
            .collect()
    }
}

fn lock(table: &Mutex<TicketTable>) -> MutexGuard<'_, TicketTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process ticket store
pub struct MemoryTicketStore {
    table: Mutex<TicketTable>,
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(TicketTable::new()),
        }
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create(&self, params: NewTicket) -> Result<Ticket, StoreError> {
        lock(&self.table).insert(params)
    }

    async fn get(&self, id: u64) -> Result<Option<Ticket>, StoreError> {
        Ok(lock(&self.table).tickets.get(&id).cloned())
    }

    async fn list(&self, filter: StatusFilter, limit: usize) -> Result<Vec<Ticket>, StoreError> {
        Ok(lock(&self.table).list(filter, limit))
    }

    async fn update_status(
        &self,
        id: u64,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, StoreError> {
        Ok(lock(&self.table).set_status(id, status))
    }

    async fn count_by_status(&self) -> Result<Vec<(TicketStatus, usize)>, StoreError> {
        Ok(lock(&self.table).counts())
    }
}

/// Ticket store mirrored to a JSON file
pub struct FileTicketStore {
    path: PathBuf,
    table: tokio::sync::Mutex<TicketTable>,
}

impl FileTicketStore {
    /// Open the store at `path`, creating an empty collection if the file is missing
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => TicketTable::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TicketTable::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), tickets = table.tickets.len(), "opened ticket store");

        Ok(Self {
            path,
            table: tokio::sync::Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &TicketTable) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn create(&self, params: NewTicket) -> Result<Ticket, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let ticket = next.insert(params)?;
        self.persist(&next).await?;
        *table = next;
        Ok(ticket)
    }

    async fn get(&self, id: u64) -> Result<Option<Ticket>, StoreError> {
        Ok(self.table.lock().await.tickets.get(&id).cloned())
    }

    async fn list(&self, filter: StatusFilter, limit: usize) -> Result<Vec<Ticket>, StoreError> {
        Ok(self.table.lock().await.list(filter, limit))
    }

    async fn update_status(
        &self,
        id: u64,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let Some(ticket) = next.set_status(id, status) else {
            return Ok(None);
        };
        self.persist(&next).await?;
        *table = next;
        Ok(Some(ticket))
    }

    async fn count_by_status(&self) -> Result<Vec<(TicketStatus, usize)>, StoreError> {
        Ok(self.table.lock().await.counts())
    }
}
