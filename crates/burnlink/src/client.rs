//! Talking to a burnlink server.
//!
//! [`SecretService`] is the seam the sender flow and [`RetrievalSession`]
//! are written against; [`ApiClient`] implements it over HTTP. No method
//! here ever takes a key: only ids and ciphertext cross this boundary.
//!
//! [`RetrievalSession`]: crate::session::RetrievalSession

use async_trait::async_trait;
use burnlink_server::api::{
    CreatedResponse, CredentialsRequest, PutSecretRequest, SecretResponse, SessionResponse,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Absent, expired or already viewed.
    #[error("secret not found, expired, or already viewed")]
    NotFound,

    #[error("id already in use")]
    DuplicateId,

    #[error("unauthorized")]
    Unauthorized,

    #[error("server returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Storage operations a client needs. Retries are the caller's business.
#[async_trait]
pub trait SecretService: Send + Sync {
    async fn upload(&self, id: &str, request: &PutSecretRequest)
        -> Result<CreatedResponse, ClientError>;

    async fn fetch(&self, id: &str) -> Result<SecretResponse, ClientError>;

    async fn destroy(&self, id: &str) -> Result<(), ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    server: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(server: &str) -> Self {
        Self {
            http: Client::new(),
            server: server.trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    /// Attach a bearer token (account session or admin key).
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    /// Upload under a server-generated id.
    pub async fn create(&self, request: &PutSecretRequest) -> Result<CreatedResponse, ClientError> {
        let resp = self
            .authed(self.http.post(format!("{}/secrets", self.server)))
            .json(request)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Ask the server to drop expired records now. Needs the admin key.
    pub async fn sweep(&self) -> Result<u64, ClientError> {
        let resp = self
            .authed(self.http.post(format!("{}/sweep", self.server)))
            .send()
            .await?;
        let json: Value = check(resp).await?.json().await?;
        Ok(json["removed"].as_u64().unwrap_or(0))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SessionResponse, ClientError> {
        self.credentials("register", email, password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionResponse, ClientError> {
        self.credentials("login", email, password).await
    }

    async fn credentials(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionResponse, ClientError> {
        let body = CredentialsRequest {
            email: email.to_owned(),
            password: password.to_owned(),
        };
        let resp = self
            .http
            .post(format!("{}/auth/{action}", self.server))
            .json(&body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Map non-success statuses onto [`ClientError`].
async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound),
        StatusCode::CONFLICT => {
            let message = error_message(resp).await;
            if message.contains("id already in use") {
                Err(ClientError::DuplicateId)
            } else {
                Err(ClientError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        _ => Err(ClientError::Rejected {
            status: status.as_u16(),
            message: error_message(resp).await,
        }),
    }
}

async fn error_message(resp: Response) -> String {
    let json: Value = resp.json().await.unwrap_or_default();
    json["error"].as_str().unwrap_or("").to_owned()
}

#[async_trait]
impl SecretService for ApiClient {
    async fn upload(
        &self,
        id: &str,
        request: &PutSecretRequest,
    ) -> Result<CreatedResponse, ClientError> {
        let resp = self
            .authed(self.http.put(format!("{}/secrets/{id}", self.server)))
            .json(request)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn fetch(&self, id: &str) -> Result<SecretResponse, ClientError> {
        let resp = self
            .http
            .get(format!("{}/secrets/{id}", self.server))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn destroy(&self, id: &str) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(format!("{}/secrets/{id}", self.server))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
