//! JSON bodies exchanged over HTTP. Shared with the client crate so both
//! ends agree on field names and the ciphertext encoding.

use serde::{Deserialize, Serialize};

use crate::store::{ContentDescriptor, SecretRecord};

/// Ciphertext travels as standard base64 inside JSON.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("ciphertext is not valid base64: {e}")))
    }
}

/// Body of `PUT /secrets/{id}` and `POST /secrets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutSecretRequest {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
    #[serde(default)]
    pub is_text: bool,
    pub ttl_seconds: i64,
    /// Defaults to burn-after-read when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_once: Option<bool>,
}

impl PutSecretRequest {
    pub fn content(&self) -> ContentDescriptor {
        ContentDescriptor {
            name: self.name.clone(),
            mime_hint: self.mime_hint.clone(),
            is_text: self.is_text,
        }
    }

    pub fn view_once(&self) -> bool {
        self.view_once.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
    pub expires_at: i64,
}

/// Body of a successful `GET /secrets/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResponse {
    pub id: String,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    pub name: Option<String>,
    pub mime_hint: Option<String>,
    pub is_text: bool,
    pub view_once: bool,
    pub expires_at: i64,
    pub created_at: i64,
    /// The server's clock when the response was built, so clients can
    /// compute time remaining without trusting their own clock.
    pub server_time: i64,
    /// Address the secret was uploaded from, if known.
    pub origin: Option<String>,
    /// Address this retrieval came from, if known.
    pub viewer: Option<String>,
}

impl SecretResponse {
    pub fn from_record(record: SecretRecord, server_time: i64, viewer: Option<String>) -> Self {
        Self {
            id: record.id,
            ciphertext: record.ciphertext,
            name: record.content.name,
            mime_hint: record.content.mime_hint,
            is_text: record.content.is_text,
            view_once: record.view_once,
            expires_at: record.expires_at,
            created_at: record.created_at,
            server_time,
            origin: record.access.origin,
            viewer,
        }
    }

    pub fn content(&self) -> ContentDescriptor {
        ContentDescriptor {
            name: self.name.clone(),
            mime_hint: self.mime_hint.clone(),
            is_text: self.is_text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: crate::accounts::User,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_request_defaults() {
        let req: PutSecretRequest = serde_json::from_value(json!({
            "ciphertext": "AQID",
            "ttl_seconds": 60
        }))
        .unwrap();
        assert_eq!(req.ciphertext, vec![1, 2, 3]);
        assert!(req.view_once());
        assert!(!req.is_text);
        assert_eq!(req.content(), ContentDescriptor::default());
    }

    #[test]
    fn put_request_rejects_bad_base64_and_missing_ttl() {
        assert!(serde_json::from_value::<PutSecretRequest>(json!({
            "ciphertext": "not base64!!",
            "ttl_seconds": 60
        }))
        .is_err());
        assert!(serde_json::from_value::<PutSecretRequest>(json!({
            "ciphertext": "AQID"
        }))
        .is_err());
    }

    #[test]
    fn response_encodes_ciphertext_as_base64() {
        let record = crate::store::NewSecret::new(vec![0xff, 0x00], 10, true)
            .with_origin("1.2.3.4")
            .into_record("r1", 100_000);
        let resp = SecretResponse::from_record(record, 105, Some("5.6.7.8".into()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["ciphertext"], "/wA=");
        assert_eq!(value["expires_at"], 110);
        assert_eq!(value["server_time"], 105);
        assert_eq!(value["origin"], "1.2.3.4");
        assert_eq!(value["viewer"], "5.6.7.8");
    }
}
