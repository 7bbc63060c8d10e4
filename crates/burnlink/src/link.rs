//! Shareable links.
//!
//! ```text
//! https://host/view/<id>#key=<hex key>
//! ```
//!
//! Browsers never send the fragment in a request, so the server that routes
//! on `<id>` never learns the key. Nothing in this module ever places the key
//! before the `#`.

use thiserror::Error;

use crate::cipher::{SecretKey, KEY_LEN};

const VIEW_SEGMENT: &str = "/view/";
const KEY_PARAM: &str = "key=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("link has no #fragment; the key must follow the '#'")]
    MissingFragment,

    #[error("link fragment has no key=<value>")]
    MissingKey,

    #[error("link has no /view/<id> path")]
    MissingId,

    #[error("link key is not {} hex characters", KEY_LEN * 2)]
    InvalidKey,
}

/// The two halves of a parsed link.
#[derive(Clone, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    pub key: String,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("key", &"..")
            .finish()
    }
}

impl Link {
    /// Decode the fragment key.
    pub fn secret_key(&self) -> Result<SecretKey, LinkError> {
        SecretKey::from_hex(&self.key).map_err(|_| LinkError::InvalidKey)
    }
}

/// Build `base_url/view/<id>#key=<key>`.
pub fn compose(base_url: &str, id: &str, key: &str) -> String {
    format!(
        "{}{VIEW_SEGMENT}{id}#{KEY_PARAM}{key}",
        base_url.trim_end_matches('/')
    )
}

/// Split a link back into `(id, key)`.
///
/// Other `&`-separated pairs in the fragment and any query string on the path
/// are ignored.
pub fn parse(url: &str) -> Result<Link, LinkError> {
    let (location, fragment) = url.split_once('#').ok_or(LinkError::MissingFragment)?;

    let key = fragment
        .split('&')
        .find_map(|pair| pair.strip_prefix(KEY_PARAM))
        .filter(|k| !k.is_empty())
        .ok_or(LinkError::MissingKey)?;

    let path = location.split_once('?').map_or(location, |(p, _)| p);
    let (_, id) = path.rsplit_once(VIEW_SEGMENT).ok_or(LinkError::MissingId)?;
    let id = id.trim_end_matches('/');
    if id.is_empty() || id.contains('/') {
        return Err(LinkError::MissingId);
    }

    Ok(Link {
        id: id.to_owned(),
        key: key.to_owned(),
    })
}
