use crate::ticket::Ticket;
use alloy::primitives::Address;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use thiserror::Error;

const LEDGER_DIR: &str = ".boxoffice";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to write ticket ledger: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize ticket ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Locally persisted cache of confirmed purchases.
///
/// Purely a cache: counts always come from chain, and the stored file may
/// be deleted or rebuilt at any time without loss of correctness. A
/// missing or unparseable file is an empty ledger, never an error.
#[derive(Debug)]
pub struct TicketLedger {
    path: PathBuf,
    tickets: Vec<Ticket>,
}

/// Storage is keyed per contract so profiles pointing at different sales
/// never share a cache.
pub fn default_ledger_path(contract: Address) -> Result<PathBuf, std::env::VarError> {
    let home = std::env::var("HOME")?;
    Ok(PathBuf::from(home)
        .join(LEDGER_DIR)
        .join(format!("tickets-{contract}.json")))
}

impl TicketLedger {
    /// Load the persisted sequence, treating corruption as "no cache".
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tickets = load_persisted(&path);
        Self { path, tickets }
    }

    /// Append a confirmed ticket and persist the full sequence.
    /// Re-appending an already-recorded `ticket_id` replaces the entry
    /// instead of duplicating it.
    pub fn append(&mut self, ticket: Ticket) -> Result<(), LedgerError> {
        match self
            .tickets
            .iter_mut()
            .find(|existing| existing.ticket_id == ticket.ticket_id)
        {
            Some(existing) => *existing = ticket,
            None => self.tickets.push(ticket),
        }
        self.persist()
    }

    /// Drop the whole cache, in memory and on disk. Idempotent.
    pub fn clear(&mut self) {
        self.tickets.clear();
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove ledger file");
        }
    }

    /// Replace the cache with the authoritative on-chain sequence.
    pub fn replace_all(&mut self, tickets: Vec<Ticket>) -> Result<(), LedgerError> {
        self.tickets = tickets;
        self.persist()
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Most recent purchases first, bounded; the only rendering the cache
    /// is trusted for.
    pub fn recent(&self, limit: usize) -> Vec<&Ticket> {
        self.tickets.iter().rev().take(limit).collect()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    fn persist(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.tickets)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn load_persisted(path: &Path) -> Vec<Ticket> {
    let Ok(data) = fs::read(path) else {
        return Vec::new();
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }
    match serde_json::from_slice::<Vec<Ticket>>(&data) {
        Ok(tickets) => tickets,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ledger file unparseable; starting empty");
            Vec::new()
        }
    }
}
