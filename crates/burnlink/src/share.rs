//! Sender side: encrypt locally, upload ciphertext, hand back a link.

use std::time::Duration;

use burnlink_server::api::PutSecretRequest;
use burnlink_server::store::{generate_id, ContentDescriptor};
use thiserror::Error;
use tracing::{debug, info};

use crate::cipher::{self, EncryptionError};
use crate::client::{ClientError, SecretService};
use crate::link;

/// Fresh ids tried after the first collides with a live record.
pub const DUPLICATE_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("ttl must be at least one second")]
    InvalidTtl,

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Upload(#[from] ClientError),
}

/// What the sender wants to share.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub plaintext: Vec<u8>,
    pub content: ContentDescriptor,
    pub ttl: Duration,
    pub view_once: bool,
}

impl Outgoing {
    pub fn text(text: impl Into<String>, ttl: Duration) -> Self {
        Self {
            plaintext: text.into().into_bytes(),
            content: ContentDescriptor {
                is_text: true,
                ..Default::default()
            },
            ttl,
            view_once: true,
        }
    }

    pub fn bytes(plaintext: Vec<u8>, content: ContentDescriptor, ttl: Duration) -> Self {
        Self {
            plaintext,
            content,
            ttl,
            view_once: true,
        }
    }

    pub fn view_once(mut self, view_once: bool) -> Self {
        self.view_once = view_once;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Shared {
    pub id: String,
    pub link: String,
    pub expires_at: i64,
}

/// Encrypt `outgoing` under a fresh key, store it, and compose the link.
///
/// The key only ever appears in the returned link.
pub async fn share<S>(
    service: &S,
    link_base: &str,
    outgoing: Outgoing,
) -> Result<Shared, ShareError>
where
    S: SecretService + ?Sized,
{
    let ttl_seconds = i64::try_from(outgoing.ttl.as_secs()).map_err(|_| ShareError::InvalidTtl)?;
    if ttl_seconds <= 0 {
        return Err(ShareError::InvalidTtl);
    }

    let key = cipher::generate_key();
    let request = PutSecretRequest {
        ciphertext: cipher::encrypt(&outgoing.plaintext, &key)?,
        name: outgoing.content.name,
        mime_hint: outgoing.content.mime_hint,
        is_text: outgoing.content.is_text,
        ttl_seconds,
        view_once: Some(outgoing.view_once),
    };

    let mut attempt = 0;
    let created = loop {
        let id = generate_id();
        match service.upload(&id, &request).await {
            Ok(created) => break created,
            Err(ClientError::DuplicateId) if attempt < DUPLICATE_RETRIES => {
                attempt += 1;
                debug!(attempt, "id collision, retrying with a fresh id");
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!(
        id = %created.id,
        ttl = ttl_seconds,
        view_once = outgoing.view_once,
        bytes = request.ciphertext.len(),
        "shared"
    );

    Ok(Shared {
        link: link::compose(link_base, &created.id, &key.to_hex()),
        id: created.id,
        expires_at: created.expires_at,
    })
}
