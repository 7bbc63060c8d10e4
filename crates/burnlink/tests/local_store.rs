//! Sender and recipient flows against a store in the same process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use burnlink::{
    share, ClientError, ContentKind, Outgoing, RetrievalSession, SecretService, SessionError,
    SessionState,
};
use burnlink_server::api::{CreatedResponse, PutSecretRequest, SecretResponse};
use burnlink_server::store::{
    Clock, ContentDescriptor, ManualClock, MemoryStore, NewSecret, RedbStore, SecretStore,
    StoreError,
};

const NOW: i64 = 1_700_000_000;

#[derive(Clone)]
struct LocalService {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
}

fn client_error(e: StoreError) -> ClientError {
    match e {
        StoreError::NotFound => ClientError::NotFound,
        StoreError::DuplicateId => ClientError::DuplicateId,
        StoreError::Validation(message) => ClientError::Rejected {
            status: 400,
            message,
        },
        StoreError::Backend(message) => ClientError::Transport(message),
    }
}

#[async_trait]
impl SecretService for LocalService {
    async fn upload(
        &self,
        id: &str,
        request: &PutSecretRequest,
    ) -> Result<CreatedResponse, ClientError> {
        let new = NewSecret::new(
            request.ciphertext.clone(),
            request.ttl_seconds,
            request.view_once(),
        )
        .with_content(request.content());
        let record = self.store.put(id, new).map_err(client_error)?;
        Ok(CreatedResponse {
            id: record.id,
            expires_at: record.expires_at,
        })
    }

    async fn fetch(&self, id: &str) -> Result<SecretResponse, ClientError> {
        let record = self.store.get(id).map_err(client_error)?;
        Ok(SecretResponse::from_record(record, self.clock.now(), None))
    }

    async fn destroy(&self, id: &str) -> Result<(), ClientError> {
        self.store.delete(id).map_err(client_error)
    }
}

fn memory_service() -> (LocalService, ManualClock) {
    let clock = ManualClock::new(NOW);
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let service = LocalService {
        store,
        clock: Arc::new(clock.clone()),
    };
    (service, clock)
}

#[tokio::test]
async fn text_view_once_scenario() {
    let (service, _clock) = memory_service();
    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::text("meet at 6", Duration::from_secs(60)),
    )
    .await
    .unwrap();
    assert_eq!(shared.expires_at, NOW + 60);

    let mut first = RetrievalSession::new(service.clone(), shared.link.clone());
    let revealed = first.open().await.unwrap();
    assert_eq!(revealed.as_text(), Some("meet at 6"));
    assert_eq!(revealed.kind, ContentKind::Text);
    assert!(revealed.view_once);
    assert_eq!(service.store.len().unwrap(), 0);

    let mut second = RetrievalSession::new(service, shared.link);
    assert_eq!(second.open().await.unwrap_err(), SessionError::NotFound);
}

#[tokio::test(start_paused = true)]
async fn file_expires_unread() {
    let (service, clock) = memory_service();
    let content = ContentDescriptor {
        name: Some("plan.png".into()),
        mime_hint: Some("image/png".into()),
        is_text: false,
    };
    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::bytes(vec![0x89, b'P', b'N', b'G'], content, Duration::from_secs(30))
            .view_once(false),
    )
    .await
    .unwrap();

    let mut early = RetrievalSession::new(service.clone(), shared.link.clone());
    let revealed = early.open().await.unwrap();
    assert_eq!(revealed.kind, ContentKind::Image);
    assert_eq!(revealed.content.name.as_deref(), Some("plan.png"));
    assert_eq!(early.remaining(), Some(Duration::from_secs(30)));

    clock.advance(30);
    let mut late = RetrievalSession::new(service, shared.link);
    assert_eq!(late.open().await.unwrap_err(), SessionError::NotFound);
}

#[tokio::test]
async fn reusable_secret_survives_reads_until_burned() {
    let (service, _clock) = memory_service();
    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::text("again", Duration::from_secs(600)).view_once(false),
    )
    .await
    .unwrap();

    for _ in 0..3 {
        let mut session = RetrievalSession::new(service.clone(), shared.link.clone());
        assert_eq!(session.open().await.unwrap().as_text(), Some("again"));
    }

    let mut burner = RetrievalSession::new(service.clone(), shared.link.clone());
    burner.open().await.unwrap();
    burner.self_destruct().await.unwrap();
    assert_eq!(burner.state(), &SessionState::Destroyed);

    let mut after = RetrievalSession::new(service, shared.link);
    assert_eq!(after.open().await.unwrap_err(), SessionError::NotFound);
}

#[tokio::test]
async fn malformed_link_leaves_secret_intact() {
    let (service, _clock) = memory_service();
    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::text("still here", Duration::from_secs(60)),
    )
    .await
    .unwrap();
    let (path, _) = shared.link.split_once('#').unwrap();

    let mut broken = RetrievalSession::new(service.clone(), path.to_owned());
    assert!(matches!(
        broken.open().await,
        Err(SessionError::MalformedLink(_))
    ));
    assert_eq!(service.store.len().unwrap(), 1);

    let mut good = RetrievalSession::new(service, shared.link);
    assert_eq!(good.open().await.unwrap().as_text(), Some("still here"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_reveal_once() {
    let (service, _clock) = memory_service();
    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::text("one reader", Duration::from_secs(60)),
    )
    .await
    .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            let link = shared.link.clone();
            tokio::spawn(async move {
                let mut session = RetrievalSession::new(service, link);
                let text = session.open().await.map(|r| r.as_text().map(str::to_owned));
                text
            })
        })
        .collect();

    let mut revealed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(text) => {
                assert_eq!(text.as_deref(), Some("one reader"));
                revealed += 1;
            }
            Err(e) => assert_eq!(e, SessionError::NotFound),
        }
    }
    assert_eq!(revealed, 1);
}

#[tokio::test]
async fn redb_backend_flow() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(NOW);
    let store = RedbStore::open_with_clock(&dir.path().join("flow.db"), Arc::new(clock.clone()))
        .unwrap();
    let service = LocalService {
        store: Arc::new(store),
        clock: Arc::new(clock),
    };

    let shared = share(
        &service,
        "https://burn.example",
        Outgoing::text("on disk", Duration::from_secs(60)),
    )
    .await
    .unwrap();

    let mut session = RetrievalSession::new(service.clone(), shared.link.clone());
    assert_eq!(session.open().await.unwrap().as_text(), Some("on disk"));

    let mut again = RetrievalSession::new(service, shared.link);
    assert_eq!(again.open().await.unwrap_err(), SessionError::NotFound);
}
