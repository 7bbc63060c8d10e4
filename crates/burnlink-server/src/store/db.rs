//! redb-backed [`SecretStore`].
//!
//! redb admits one write transaction at a time, and `get` always runs inside
//! one: the expiry check, the view-once removal and the commit form a single
//! atomic step. Reads of unrelated ids serialize behind that lock, which is
//! the price of an embedded single-file database.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::{validate_new, Clock, NewSecret, SecretRecord, SecretStore, StoreError, SystemClock};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Leading byte of every stored record. Bumped when the layout changes.
const RECORD_FORMAT_V1: u8 = 0x01;

enum PutOutcome {
    Stored(SecretRecord),
    Duplicate,
}

/// Thread-safe handle to the redb store. Clones share the database.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RedbStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            clock,
        })
    }

    fn try_put(&self, id: &str, secret: NewSecret) -> Result<PutOutcome> {
        let now_ms = self.clock.now_millis();
        let now = now_ms.div_euclid(1000);

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Clone out of the AccessGuard so the borrow on `table` ends here.
            let existing: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
            let live = match existing {
                Some(bytes) => !decode(&bytes)?.is_expired(now),
                None => false,
            };

            if live {
                PutOutcome::Duplicate
            } else {
                let record = secret.into_record(id, now_ms);
                let bytes = encode(&record)?;
                table.insert(id, bytes.as_slice())?;
                PutOutcome::Stored(record)
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    fn try_get(&self, id: &str) -> Result<Option<SecretRecord>> {
        let now = self.clock.now();

        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(SECRETS)?;
            let raw: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());

            match raw {
                None => None,
                Some(bytes) => {
                    let record = decode(&bytes)?;
                    if record.is_expired(now) {
                        table.remove(id)?;
                        debug!(id = %id, "lazy-evicted expired secret");
                        None
                    } else {
                        if record.view_once {
                            table.remove(id)?;
                            debug!(id = %id, "burned after read");
                        }
                        Some(record)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    fn try_delete(&self, id: &str) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            table.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn try_sweep(&self) -> Result<usize> {
        let now = self.clock.now();

        // Scan and remove in one transaction so a concurrent put cannot
        // revive an id between the two passes.
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SECRETS)?;
            let mut expired = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                if decode(v.value())?.is_expired(now) {
                    expired.push(k.value().to_owned());
                }
            }
            for id in &expired {
                table.remove(id.as_str())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn try_len(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let mut count = 0;
        for item in table.iter()? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

fn backend(e: anyhow::Error) -> StoreError {
    StoreError::Backend(format!("{e:#}"))
}

impl SecretStore for RedbStore {
    fn put(&self, id: &str, secret: NewSecret) -> super::Result<SecretRecord> {
        validate_new(id, &secret)?;
        match self.try_put(id, secret).map_err(backend)? {
            PutOutcome::Stored(record) => Ok(record),
            PutOutcome::Duplicate => Err(StoreError::DuplicateId),
        }
    }

    fn get(&self, id: &str) -> super::Result<SecretRecord> {
        self.try_get(id).map_err(backend)?.ok_or(StoreError::NotFound)
    }

    fn delete(&self, id: &str) -> super::Result<()> {
        self.try_delete(id).map_err(backend)
    }

    fn sweep_expired(&self) -> super::Result<usize> {
        self.try_sweep().map_err(backend)
    }

    fn len(&self) -> super::Result<usize> {
        self.try_len().map_err(backend)
    }
}

/// Encode a record as `[RECORD_FORMAT_V1] + bincode(record)`.
fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_FORMAT_V1);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    match bytes.split_first() {
        Some((&RECORD_FORMAT_V1, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record format {marker:#04x}"),
        None => anyhow::bail!("empty record"),
    }
}
