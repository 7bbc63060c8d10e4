//! Recipient side of a share.
//!
//! A [`RetrievalSession`] walks one link through
//!
//! ```text
//! Fetching -> Decrypting -> Ready -> Destroyed
//!     \           \
//!      +-----------+------> Error
//! ```
//!
//! The link is parsed before anything is fetched, so a malformed link never
//! consumes a view-once secret. Countdowns here are presentation only; the
//! store enforces expiry on its own.

use std::time::Duration;

use burnlink_server::api::SecretResponse;
use burnlink_server::store::ContentDescriptor;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::cipher;
use crate::client::{ClientError, SecretService};
use crate::link::{self, LinkError};

/// Longest countdown a session will schedule, whatever the server reports.
pub const MAX_COUNTDOWN_SECS: i64 = 366 * 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("malformed link: {0}")]
    MalformedLink(#[from] LinkError),

    /// Absent, expired or already viewed. The three are indistinguishable.
    #[error("secret not found, expired, or already viewed")]
    NotFound,

    #[error("could not reach the server: {0}")]
    Transport(String),

    #[error("unable to decrypt")]
    Decryption,

    #[error("nothing has been revealed")]
    NotReady,

    #[error("session was already opened")]
    Spent,
}

impl From<ClientError> for SessionError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound => Self::NotFound,
            other => Self::Transport(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Fetching,
    Decrypting,
    Ready,
    Destroyed,
    Error(SessionError),
}

/// How a revealed payload should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Video,
    Audio,
    Text,
    Generic,
}

impl ContentKind {
    /// `is_text` wins over any MIME hint.
    pub fn classify(mime_hint: Option<&str>, is_text: bool) -> Self {
        if is_text {
            return Self::Text;
        }
        let Some(mime) = mime_hint.map(str::to_ascii_lowercase) else {
            return Self::Generic;
        };
        match mime.split_once('/').map(|(top, _)| top) {
            Some("image") => Self::Image,
            Some("video") => Self::Video,
            Some("audio") => Self::Audio,
            Some("text") => Self::Text,
            _ => Self::Generic,
        }
    }
}

/// A decrypted payload. The plaintext is wiped when dropped.
#[derive(Debug)]
pub struct Revealed {
    pub id: String,
    pub plaintext: Zeroizing<Vec<u8>>,
    pub content: ContentDescriptor,
    pub kind: ContentKind,
    pub view_once: bool,
    pub created_at: i64,
    pub expires_at: i64,
    pub origin: Option<String>,
    pub viewer: Option<String>,
}

impl Revealed {
    fn new(response: &SecretResponse, plaintext: Vec<u8>) -> Self {
        let content = response.content();
        Self {
            id: response.id.clone(),
            plaintext: Zeroizing::new(plaintext),
            kind: ContentKind::classify(content.mime_hint.as_deref(), content.is_text),
            content,
            view_once: response.view_once,
            created_at: response.created_at,
            expires_at: response.expires_at,
            origin: response.origin.clone(),
            viewer: response.viewer.clone(),
        }
    }

    /// The plaintext as UTF-8, if it is.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.plaintext).ok()
    }
}

pub struct RetrievalSession<S> {
    service: S,
    url: String,
    state: SessionState,
    started: bool,
    revealed: Option<Revealed>,
    /// Local monotonic instant matching the server-side `expires_at`.
    deadline: Option<Instant>,
}

impl<S: SecretService> RetrievalSession<S> {
    pub fn new(service: S, url: impl Into<String>) -> Self {
        Self {
            service,
            url: url.into(),
            state: SessionState::Fetching,
            started: false,
            revealed: None,
            deadline: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn revealed(&self) -> Option<&Revealed> {
        self.revealed.as_ref()
    }

    /// Time until the server-side expiry, measured on the local monotonic clock.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fetch and decrypt. Single-shot: a second call fails with
    /// [`SessionError::Spent`], even if the first was cancelled.
    pub async fn open(&mut self) -> Result<&Revealed, SessionError> {
        if self.started {
            return Err(SessionError::Spent);
        }
        self.started = true;

        let parsed = link::parse(&self.url).and_then(|l| l.secret_key().map(|k| (l.id, k)));
        let (id, key) = match parsed {
            Ok(v) => v,
            Err(e) => return Err(self.fail(e.into())),
        };

        let response = match self.service.fetch(&id).await {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e.into())),
        };
        let anchor = Instant::now();

        self.state = SessionState::Decrypting;
        let plaintext = match cipher::decrypt(&response.ciphertext, &key) {
            Ok(p) => p,
            Err(_) => return Err(self.fail(SessionError::Decryption)),
        };

        let remaining = response
            .expires_at
            .saturating_sub(response.server_time)
            .clamp(0, MAX_COUNTDOWN_SECS);
        self.deadline = Some(anchor + Duration::from_secs(remaining.unsigned_abs()));
        info!(%id, view_once = response.view_once, remaining, "secret revealed");

        self.state = SessionState::Ready;
        Ok(&*self.revealed.insert(Revealed::new(&response, plaintext)))
    }

    /// Wipe the local plaintext and delete the record on the server.
    ///
    /// The local copy is gone even if the delete request fails.
    pub async fn self_destruct(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady);
        }
        let Some(revealed) = self.revealed.take() else {
            return Err(SessionError::NotReady);
        };
        let id = revealed.id.clone();
        drop(revealed);
        self.state = SessionState::Destroyed;

        debug!(%id, "self-destruct");
        self.service.destroy(&id).await?;
        Ok(())
    }

    /// For a revealed view-once secret, wait out the server-side expiry and
    /// then self-destruct. Returns immediately in any other case.
    pub async fn run_countdown(&mut self) -> Result<(), SessionError> {
        let view_once = self.revealed.as_ref().is_some_and(|r| r.view_once);
        if self.state != SessionState::Ready || !view_once {
            return Ok(());
        }
        if let Some(deadline) = self.deadline {
            sleep_until(deadline).await;
        }
        self.self_destruct().await
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        self.state = SessionState::Error(error.clone());
        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use burnlink_server::api::{CreatedResponse, PutSecretRequest};
    use parking_lot::Mutex;

    use super::*;
    use crate::cipher::generate_key;

    /// One canned record, plus call counters.
    #[derive(Default)]
    struct Canned {
        response: Mutex<Option<SecretResponse>>,
        fetches: AtomicUsize,
        destroyed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SecretService for Arc<Canned> {
        async fn upload(
            &self,
            _id: &str,
            _request: &PutSecretRequest,
        ) -> Result<CreatedResponse, ClientError> {
            Err(ClientError::Unauthorized)
        }

        async fn fetch(&self, id: &str) -> Result<SecretResponse, ClientError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut slot = self.response.lock();
            match slot.as_ref().map(|r| (r.id == id, r.view_once)) {
                Some((true, true)) => slot.take().ok_or(ClientError::NotFound),
                Some((true, false)) => slot.as_ref().cloned().ok_or(ClientError::NotFound),
                _ => Err(ClientError::NotFound),
            }
        }

        async fn destroy(&self, id: &str) -> Result<(), ClientError> {
            self.destroyed.lock().push(id.to_owned());
            self.response.lock().take();
            Ok(())
        }
    }

    fn canned(plaintext: &[u8], view_once: bool, ttl: i64) -> (Arc<Canned>, String) {
        let key = generate_key();
        let response = SecretResponse {
            id: "abc".into(),
            ciphertext: cipher::encrypt(plaintext, &key).unwrap(),
            name: None,
            mime_hint: None,
            is_text: true,
            view_once,
            created_at: 1_000,
            expires_at: 1_000 + ttl,
            // Server reports it is 10s into the lifetime, whatever the local clock says.
            server_time: 1_010,
            origin: Some("10.0.0.1".into()),
            viewer: Some("10.0.0.2".into()),
        };
        let service = Arc::new(Canned::default());
        *service.response.lock() = Some(response);
        (service, link::compose("https://x", "abc", &key.to_hex()))
    }

    #[tokio::test]
    async fn view_once_reveals_then_second_session_is_not_found() {
        let (service, url) = canned(b"hi", true, 60);

        let mut first = RetrievalSession::new(service.clone(), url.clone());
        assert_eq!(first.state(), &SessionState::Fetching);
        let revealed = first.open().await.unwrap();
        assert_eq!(revealed.as_text(), Some("hi"));
        assert_eq!(revealed.kind, ContentKind::Text);
        assert_eq!(revealed.origin.as_deref(), Some("10.0.0.1"));
        assert_eq!(first.state(), &SessionState::Ready);

        let mut second = RetrievalSession::new(service, url);
        assert_eq!(second.open().await.unwrap_err(), SessionError::NotFound);
        assert_eq!(second.state(), &SessionState::Error(SessionError::NotFound));
    }

    #[tokio::test]
    async fn malformed_link_never_fetches() {
        let (service, url) = canned(b"hi", true, 60);
        let (path, _) = url.split_once('#').unwrap();

        for bad in [path.to_owned(), format!("{path}#key=beef"), format!("{path}#key=")] {
            let mut session = RetrievalSession::new(service.clone(), bad);
            assert!(matches!(
                session.open().await,
                Err(SessionError::MalformedLink(_))
            ));
        }
        assert_eq!(service.fetches.load(Ordering::SeqCst), 0);
        assert!(service.response.lock().is_some());
    }

    #[tokio::test]
    async fn wrong_key_is_decryption_error() {
        let (service, url) = canned(b"hi", false, 60);
        let (path, _) = url.split_once('#').unwrap();
        let wrong = format!("{path}#key={}", generate_key().to_hex());

        let mut session = RetrievalSession::new(service, wrong);
        let err = session.open().await.unwrap_err();
        assert_eq!(err, SessionError::Decryption);
        assert_eq!(err.to_string(), "unable to decrypt");
        assert!(session.revealed().is_none());
    }

    #[tokio::test]
    async fn open_is_single_shot() {
        let (service, url) = canned(b"hi", false, 60);
        let mut session = RetrievalSession::new(service, url);
        session.open().await.unwrap();
        assert_eq!(session.open().await.unwrap_err(), SessionError::Spent);
        assert_eq!(session.state(), &SessionState::Ready);
    }

    #[tokio::test]
    async fn self_destruct_wipes_and_deletes() {
        let (service, url) = canned(b"hi", false, 60);
        let mut session = RetrievalSession::new(service.clone(), url);
        assert_eq!(session.self_destruct().await, Err(SessionError::NotReady));

        session.open().await.unwrap();
        session.self_destruct().await.unwrap();
        assert_eq!(session.state(), &SessionState::Destroyed);
        assert!(session.revealed().is_none());
        assert_eq!(*service.destroyed.lock(), vec!["abc".to_owned()]);
        assert_eq!(session.self_destruct().await, Err(SessionError::NotReady));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_uses_server_clock() {
        // 60s ttl, server says 10s have passed: 50s left regardless of local time.
        let (service, url) = canned(b"hi", true, 60);
        let mut session = RetrievalSession::new(service.clone(), url);
        session.open().await.unwrap();
        assert_eq!(session.remaining(), Some(Duration::from_secs(50)));

        let started = Instant::now();
        session.run_countdown().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(50));
        assert_eq!(session.state(), &SessionState::Destroyed);
        assert_eq!(service.destroyed.lock().len(), 1);
        assert_eq!(session.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn hostile_timestamps_are_clamped() {
        let (service, url) = canned(b"hi", false, 60);
        if let Some(r) = service.response.lock().as_mut() {
            r.expires_at = i64::MAX;
            r.server_time = -10;
        }
        let mut session = RetrievalSession::new(service, url);
        session.open().await.unwrap();
        assert_eq!(
            session.remaining(),
            Some(Duration::from_secs(MAX_COUNTDOWN_SECS as u64))
        );

        let (service, url) = canned(b"hi", false, 60);
        if let Some(r) = service.response.lock().as_mut() {
            r.expires_at = i64::MIN;
            r.server_time = i64::MAX;
        }
        let mut session = RetrievalSession::new(service, url);
        session.open().await.unwrap();
        assert_eq!(session.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_is_noop_unless_ready_and_view_once() {
        let (service, url) = canned(b"hi", false, 60);
        let mut session = RetrievalSession::new(service.clone(), url);
        session.run_countdown().await.unwrap();
        assert_eq!(session.state(), &SessionState::Fetching);

        session.open().await.unwrap();
        let started = Instant::now();
        session.run_countdown().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(session.state(), &SessionState::Ready);
        assert!(service.destroyed.lock().is_empty());
    }

    #[test]
    fn classify_content() {
        use ContentKind::*;
        assert_eq!(ContentKind::classify(Some("image/png"), false), Image);
        assert_eq!(ContentKind::classify(Some("VIDEO/mp4"), false), Video);
        assert_eq!(ContentKind::classify(Some("audio/ogg"), false), Audio);
        assert_eq!(ContentKind::classify(Some("text/plain"), false), Text);
        assert_eq!(ContentKind::classify(Some("image/png"), true), Text);
        assert_eq!(ContentKind::classify(Some("application/pdf"), false), Generic);
        assert_eq!(ContentKind::classify(Some("garbage"), false), Generic);
        assert_eq!(ContentKind::classify(None, false), Generic);
    }
}
