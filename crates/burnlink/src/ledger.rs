//! Sender-side history of shares, so links can be listed and revoked later.
//!
//! The ledger never leaves the sender's machine. Entries hold full links,
//! keys included, so the file is written readable by the owner only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burnlink_server::store::ContentDescriptor;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{ClientError, SecretService};
use crate::share::Shared;

/// File name inside the data directory.
pub const LEDGER_FILE: &str = "shares.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub link: String,
    #[serde(default)]
    pub name: Option<String>,
    pub is_text: bool,
    pub view_once: bool,
    pub created_at: i64,
    pub expires_at: i64,
}

impl LedgerEntry {
    pub fn new(shared: &Shared, content: &ContentDescriptor, view_once: bool, now: i64) -> Self {
        Self {
            id: shared.id.clone(),
            link: shared.link.clone(),
            name: content.name.clone(),
            is_text: content.is_text,
            view_once,
            created_at: now,
            expires_at: shared.expires_at,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Which entries [`forget`] destroys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    One(&'a str),
    /// Entries whose deadline has passed at the given unix time.
    Expired(i64),
    All,
}

impl Selection<'_> {
    fn matches(&self, entry: &LedgerEntry) -> bool {
        match self {
            Selection::One(id) => entry.id == *id,
            Selection::Expired(now) => entry.is_expired(*now),
            Selection::All => true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    shares: Vec<LedgerEntry>,
}

/// Shares this machine has sent, newest last.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// `shares.json` in the platform data dir, or in `dir` when given.
    pub fn default_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
        Ok(burnlink_server::dirs::data_dir(dir)?.join(LEDGER_FILE))
    }

    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => {
                let file: LedgerFile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse {}", path.display()))?;
                file.shares
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(Self { path, entries })
    }

    /// Write the ledger back, replacing the previous file in one rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("create ledger dir")?;
        }
        let json = serde_json::to_vec_pretty(&LedgerFile {
            shares: self.entries.clone(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        restrict_to_owner(&tmp)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "ledger saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Add an entry, replacing any earlier entry with the same id.
    pub fn record(&mut self, entry: LedgerEntry) {
        self.entries.retain(|e| e.id != entry.id);
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<LedgerEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(idx))
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Outcome of [`forget`].
#[derive(Debug, Default)]
pub struct Forgotten {
    pub destroyed: Vec<String>,
    /// Entries whose delete failed. They stay in the ledger.
    pub failed: Vec<(String, ClientError)>,
}

/// Delete every selected share on the server and drop it from the ledger.
///
/// Deletes are idempotent, so shares that already expired or were viewed
/// are dropped too. The caller decides when to [`Ledger::save`].
pub async fn forget<S>(ledger: &mut Ledger, service: &S, selection: Selection<'_>) -> Forgotten
where
    S: SecretService + ?Sized,
{
    let selected: Vec<String> = ledger
        .entries
        .iter()
        .filter(|e| selection.matches(e))
        .map(|e| e.id.clone())
        .collect();

    let mut out = Forgotten::default();
    for id in selected {
        match service.destroy(&id).await {
            Ok(()) => {
                ledger.remove(&id);
                out.destroyed.push(id);
            }
            Err(e) => {
                warn!(%id, error = %e, "delete failed, keeping ledger entry");
                out.failed.push((id, e));
            }
        }
    }
    out
}
