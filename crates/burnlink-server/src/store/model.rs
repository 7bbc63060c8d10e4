use serde::{Deserialize, Serialize};

/// Presentation hints supplied by the sender. Never needed for correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub name: Option<String>,
    pub mime_hint: Option<String>,
    pub is_text: bool,
}

/// Best-effort request metadata shown to the recipient as a trust signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMetadata {
    /// Network address the record was created from.
    pub origin: Option<String>,
}

/// Stored in the backing medium as-is.
/// `ciphertext` is the sender's AEAD output; the server never interprets it.
/// All policy fields are plaintext so expiry can be enforced without a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub id: String,
    pub ciphertext: Vec<u8>,
    pub content: ContentDescriptor,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    /// Unix timestamp (seconds) at which the record becomes logically absent.
    pub expires_at: i64,
    /// Consumed by the first successful read.
    pub view_once: bool,
    pub access: AccessMetadata,
}

impl SecretRecord {
    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Input to [`SecretStore::put`](super::SecretStore::put).
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub ciphertext: Vec<u8>,
    pub content: ContentDescriptor,
    pub ttl_seconds: i64,
    pub view_once: bool,
    pub access: AccessMetadata,
}

impl NewSecret {
    pub fn new(ciphertext: Vec<u8>, ttl_seconds: i64, view_once: bool) -> Self {
        Self {
            ciphertext,
            content: ContentDescriptor::default(),
            ttl_seconds,
            view_once,
            access: AccessMetadata::default(),
        }
    }

    pub fn with_content(mut self, content: ContentDescriptor) -> Self {
        self.content = content;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.access.origin = Some(origin.into());
        self
    }

    /// `now_millis` is the store clock in milliseconds. The deadline is
    /// rounded up to the next whole second so the record is never absent
    /// before the full TTL has elapsed.
    pub(crate) fn into_record(self, id: &str, now_millis: i64) -> SecretRecord {
        let deadline_ms = now_millis.saturating_add(self.ttl_seconds.saturating_mul(1000));
        SecretRecord {
            id: id.to_owned(),
            ciphertext: self.ciphertext,
            content: self.content,
            created_at: now_millis.div_euclid(1000),
            expires_at: deadline_ms.saturating_add(999).div_euclid(1000),
            view_once: self.view_once,
            access: self.access,
        }
    }
}

/// Longest accepted secret id.
pub const MAX_ID_LEN: usize = 128;

/// Ids travel in URL paths, so only unreserved characters are accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Generate a random 128-bit id rendered as 32 hex chars.
pub fn generate_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_deadline() {
        let record = NewSecret::new(vec![1, 2, 3], 60, false).into_record("a", 1_000_000);
        assert_eq!(record.created_at, 1_000);
        assert_eq!(record.expires_at, 1_060);
        assert!(!record.is_expired(1_059));
        assert!(record.is_expired(1_060));
        assert!(record.is_expired(5_000));
    }

    #[test]
    fn deadline_rounds_up_to_whole_second() {
        let put_ms = 1_700_000_000_850;
        let record = NewSecret::new(vec![1], 1, false).into_record("a", put_ms);
        assert_eq!(record.created_at, 1_700_000_000);
        assert_eq!(record.expires_at, 1_700_000_002);
        assert!(record.expires_at * 1000 >= put_ms + 1000);

        let huge = NewSecret::new(vec![1], i64::MAX, false).into_record("b", put_ms);
        assert_eq!(huge.expires_at, i64::MAX / 1000);
    }

    #[test]
    fn sub_second_put_keeps_full_ttl() {
        use crate::store::{ManualClock, MemoryStore, SecretStore, StoreError};
        use std::sync::Arc;

        let clock = ManualClock::from_millis(1_700_000_000_850);
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        store.put("short", NewSecret::new(b"ct".to_vec(), 1, false)).unwrap();

        clock.advance_millis(200);
        assert_eq!(store.get("short").unwrap().ciphertext, b"ct");

        clock.set(1_700_000_001);
        clock.advance_millis(999);
        assert!(store.get("short").is_ok());

        clock.advance_millis(1);
        assert!(matches!(store.get("short"), Err(StoreError::NotFound)));
    }

    #[test]
    fn id_charset() {
        assert!(is_valid_id("abc"));
        assert!(is_valid_id("A-b_9"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("a#b"));
        assert!(!is_valid_id("a?b"));
        assert!(!is_valid_id(&"x".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert!(is_valid_id(&a));
        assert_ne!(a, b);
    }
}
