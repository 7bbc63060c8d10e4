//! Account collaborator.
//!
//! The secret store does not need identity to operate. A deployment may gate
//! uploads on a valid session, in which case handlers consult an
//! [`Authenticator`]. [`MemoryAuthenticator`] is the bundled implementation:
//! argon2id password hashes, opaque bearer tokens kept only as SHA-256
//! digests.

use std::collections::HashMap;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::{Clock, SystemClock};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("an account with this email already exists")]
    EmailTaken,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub trait Authenticator: Send + Sync {
    fn register(&self, email: &str, password: &str) -> Result<User, AuthError>;

    fn verify_credentials(&self, email: &str, password: &str) -> Option<User>;

    /// Mint a new bearer token for `user_id`.
    fn issue_token(&self, user_id: &str) -> String;

    fn resolve_token(&self, token: &str) -> Option<User>;

    fn revoke_token(&self, token: &str);
}

struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    /// Keyed by normalised email.
    users: HashMap<String, StoredUser>,
    /// Hex SHA-256 of the token -> user id.
    sessions: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryAuthenticator {
    inner: RwLock<Inner>,
}

impl MemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

/// Hash a token with SHA-256 for storage lookup.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

impl Authenticator for MemoryAuthenticator {
    fn register(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("a valid email is required".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.inner.read().users.contains_key(&email) {
            return Err(AuthError::EmailTaken);
        }

        // Hash outside the lock; argon2 is deliberately slow.
        let password_hash = hash_password(password)?;
        let user = User {
            id: random_hex(16),
            email: email.clone(),
            created_at: SystemClock.now(),
        };

        let mut inner = self.inner.write();
        if inner.users.contains_key(&email) {
            return Err(AuthError::EmailTaken);
        }
        inner.users.insert(
            email,
            StoredUser {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    fn verify_credentials(&self, email: &str, password: &str) -> Option<User> {
        let (user, hash) = {
            let inner = self.inner.read();
            let stored = inner.users.get(&normalize_email(email))?;
            (stored.user.clone(), stored.password_hash.clone())
        };
        verify_password(password, &hash).then_some(user)
    }

    fn issue_token(&self, user_id: &str) -> String {
        let token = random_hex(32);
        self.inner
            .write()
            .sessions
            .insert(token_digest(&token), user_id.to_owned());
        token
    }

    fn resolve_token(&self, token: &str) -> Option<User> {
        let inner = self.inner.read();
        let user_id = inner.sessions.get(&token_digest(token))?;
        inner
            .users
            .values()
            .find(|u| &u.user.id == user_id)
            .map(|u| u.user.clone())
    }

    fn revoke_token(&self, token: &str) {
        self.inner.write().sessions.remove(&token_digest(token));
    }
}
