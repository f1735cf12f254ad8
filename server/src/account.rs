//! Account persistence behind the [`AccountStore`] trait.
//!
//! The simulation calls into the store synchronously from its handlers, so
//! every implementation answers from memory. [`JsonFileStore`] additionally
//! hands a serialized copy of the whole document to a background writer
//! task after each mutation; the file is rewritten in full each time. A
//! mutation whose write cannot be queued is undone before the error is
//! returned, so memory never runs ahead of what was handed to the writer.

use log::{debug, error, info, warn};
use shared::{Account, Inventory, Rarity};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("account data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown account '{0}'")]
    UnknownAccount(String),
    #[error("not enough {rarity} {base_type} petals: have {have}, want {want}")]
    InsufficientPetals {
        base_type: String,
        rarity: Rarity,
        have: u32,
        want: u32,
    },
    #[error("account writer task has stopped")]
    WriterClosed,
}

/// What a finished play session adds to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionRecord {
    pub xp: u64,
    pub wave: u32,
    pub kills: u32,
    pub died: bool,
}

pub trait AccountStore {
    /// Returns the account, creating it on first sight. Each call counts as
    /// a new session and refreshes `lastSeen`.
    fn load_or_create(&mut self, account_id: &str) -> Result<Account, StoreError>;

    fn account(&self, account_id: &str) -> Result<Account, StoreError>;

    fn add_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError>;

    /// Fails without changing anything if the account holds fewer than
    /// `count` matching petals.
    fn remove_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError>;

    fn record_item(
        &mut self,
        account_id: &str,
        item_type: &str,
        amount: u32,
    ) -> Result<Inventory, StoreError>;

    fn record_session(
        &mut self,
        account_id: &str,
        session: SessionRecord,
    ) -> Result<Account, StoreError>;
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
        .min(u64::MAX as u128) as u64
}

/// Account map plus the mutation rules shared by both stores.
#[derive(Debug, Default)]
struct Ledger {
    accounts: BTreeMap<String, Account>,
}

impl Ledger {
    fn get(&self, account_id: &str) -> Result<&Account, StoreError> {
        self.accounts
            .get(account_id)
            .ok_or_else(|| StoreError::UnknownAccount(account_id.to_string()))
    }

    fn get_mut(&mut self, account_id: &str) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(account_id)
            .ok_or_else(|| StoreError::UnknownAccount(account_id.to_string()))
    }

    fn load_or_create(&mut self, account_id: &str) -> Account {
        let now = unix_millis();
        let account = self
            .accounts
            .entry(account_id.to_string())
            .or_insert_with(|| {
                info!("Created account {}", account_id);
                Account::new(account_id, now)
            });
        account.last_seen = now;
        account.stats.sessions += 1;
        account.clone()
    }

    fn add_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        let account = self.get_mut(account_id)?;
        account.inventory.add_petal(base_type, rarity, count);
        Ok(account.inventory.clone())
    }

    fn remove_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        let account = self.get_mut(account_id)?;
        account
            .inventory
            .remove_petal(base_type, rarity, count)
            .map_err(|have| StoreError::InsufficientPetals {
                base_type: base_type.to_string(),
                rarity,
                have,
                want: count,
            })?;
        Ok(account.inventory.clone())
    }

    fn record_item(
        &mut self,
        account_id: &str,
        item_type: &str,
        amount: u32,
    ) -> Result<Inventory, StoreError> {
        let account = self.get_mut(account_id)?;
        account.inventory.record_item(item_type, amount);
        Ok(account.inventory.clone())
    }

    fn record_session(
        &mut self,
        account_id: &str,
        session: SessionRecord,
    ) -> Result<Account, StoreError> {
        let account = self.get_mut(account_id)?;
        account.total_xp += session.xp;
        account.highest_wave = account.highest_wave.max(session.wave);
        account.stats.total_kills += u64::from(session.kills);
        if session.died {
            account.stats.deaths += 1;
        }
        account.last_seen = unix_millis();
        Ok(account.clone())
    }
}

/// Volatile store used by tests and when persistence is switched off.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Ledger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryStore {
    fn load_or_create(&mut self, account_id: &str) -> Result<Account, StoreError> {
        Ok(self.ledger.load_or_create(account_id))
    }

    fn account(&self, account_id: &str) -> Result<Account, StoreError> {
        self.ledger.get(account_id).cloned()
    }

    fn add_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        self.ledger.add_petal(account_id, base_type, rarity, count)
    }

    fn remove_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        self.ledger.remove_petal(account_id, base_type, rarity, count)
    }

    fn record_item(
        &mut self,
        account_id: &str,
        item_type: &str,
        amount: u32,
    ) -> Result<Inventory, StoreError> {
        self.ledger.record_item(account_id, item_type, amount)
    }

    fn record_session(
        &mut self,
        account_id: &str,
        session: SessionRecord,
    ) -> Result<Account, StoreError> {
        self.ledger.record_session(account_id, session)
    }
}

enum WriterCommand {
    Write(String),
    Flush(oneshot::Sender<()>),
}

/// Store backed by a single JSON document keyed by account id.
pub struct JsonFileStore {
    path: PathBuf,
    ledger: Ledger,
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
}

impl JsonFileStore {
    /// Loads `path` (a missing file means no accounts yet) and starts the
    /// writer task. Must be called from inside a tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let accounts = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} accounts from {}", accounts.len(), path.display());

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), writer_rx));

        Ok(Self {
            path,
            ledger: Ledger { accounts },
            writer_tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves once every write queued so far has reached the disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.writer_tx
            .send(WriterCommand::Flush(tx))
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let document = serde_json::to_string_pretty(&self.ledger.accounts)?;
        self.writer_tx
            .send(WriterCommand::Write(document))
            .map_err(|_| StoreError::WriterClosed)
    }

    /// Applies `change` to one account and queues the write, restoring the
    /// account's previous state if the write cannot be queued.
    fn commit<T>(
        &mut self,
        account_id: &str,
        change: impl FnOnce(&mut Ledger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let before = self.ledger.accounts.get(account_id).cloned();
        let value = change(&mut self.ledger)?;
        if let Err(e) = self.persist() {
            warn!("Rolling back account {}: {}", account_id, e);
            match before {
                Some(account) => {
                    self.ledger.accounts.insert(account_id.to_string(), account);
                }
                None => {
                    self.ledger.accounts.remove(account_id);
                }
            }
            return Err(e);
        }
        Ok(value)
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Write(mut document) => {
                // Only the newest snapshot matters; skip any queued behind it.
                let mut flushes = Vec::new();
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WriterCommand::Write(newer) => document = newer,
                        WriterCommand::Flush(done) => flushes.push(done),
                    }
                }
                if let Err(e) = write_atomically(&path, &document).await {
                    error!("Failed to write accounts to {}: {}", path.display(), e);
                } else {
                    debug!("Wrote {} bytes to {}", document.len(), path.display());
                }
                for done in flushes {
                    let _ = done.send(());
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn write_atomically(path: &Path, document: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, document).await?;
    tokio::fs::rename(&tmp, path).await
}

impl AccountStore for JsonFileStore {
    fn load_or_create(&mut self, account_id: &str) -> Result<Account, StoreError> {
        self.commit(account_id, |ledger| Ok(ledger.load_or_create(account_id)))
    }

    fn account(&self, account_id: &str) -> Result<Account, StoreError> {
        self.ledger.get(account_id).cloned()
    }

    fn add_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        self.commit(account_id, |ledger| {
            ledger.add_petal(account_id, base_type, rarity, count)
        })
    }

    fn remove_petal(
        &mut self,
        account_id: &str,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) -> Result<Inventory, StoreError> {
        self.commit(account_id, |ledger| {
            ledger.remove_petal(account_id, base_type, rarity, count)
        })
    }

    fn record_item(
        &mut self,
        account_id: &str,
        item_type: &str,
        amount: u32,
    ) -> Result<Inventory, StoreError> {
        self.commit(account_id, |ledger| {
            ledger.record_item(account_id, item_type, amount)
        })
    }

    fn record_session(
        &mut self,
        account_id: &str,
        session: SessionRecord,
    ) -> Result<Account, StoreError> {
        self.commit(account_id, |ledger| ledger.record_session(account_id, session))
    }
}
