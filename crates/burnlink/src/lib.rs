//! Client side of burnlink: encryption, links, the HTTP client, and the
//! sender and recipient flows. The server never sees anything this crate
//! does not encrypt first.

pub mod cipher;
pub mod client;
pub mod ledger;
pub mod link;
pub mod session;
pub mod share;

pub use client::{ApiClient, ClientError, SecretService};
pub use ledger::{forget, Ledger, LedgerEntry, Selection};
pub use session::{ContentKind, RetrievalSession, Revealed, SessionError, SessionState};
pub use share::{share, Outgoing, ShareError, Shared};
