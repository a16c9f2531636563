use async_trait::async_trait;
use common::remote::{
    Ack, BlobTransport, CreateSubmission, KeyUpdateSubmission, PatchSubmission, RecoveryBundle,
    Snapshot, SnapshotSubmission,
};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

pub const SIGNATURE_HEADER: &str = "X-Blob-Signature";

#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("remote URL cannot take a path: {0}")]
    InvalidRemote(Url),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// [`BlobTransport`] over the vault server's JSON API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

/// Every response carries `result`, and `message` when it is not "success"
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct FetchBody {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    encrypted_secret: Option<String>,
    #[serde(default)]
    blob: Option<String>,
    #[serde(default)]
    patches: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecoveryBody {
    blob_id: String,
    encrypted_blobdecrypt_key: String,
    #[serde(flatten)]
    snapshot: FetchBody,
}

#[derive(Debug, Default, Deserialize)]
struct AckBody {
    #[serde(default)]
    revision: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ConsolidateRequest<'a> {
    blob_id: &'a str,
    data: &'a str,
    revision: u64,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    blob_id: &'a str,
    username: &'a str,
    data: &'a str,
    auth_secret: &'a str,
    encrypted_secret: &'a str,
    encrypted_blobdecrypt_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct KeyUpdateRequest<'a> {
    blob_id: &'a str,
    data: &'a str,
    revision: u64,
    encrypted_blobdecrypt_key: &'a str,
    encrypted_secret: &'a str,
}

impl FetchBody {
    fn into_snapshot(self) -> Result<Snapshot, HttpTransportError> {
        let document = self
            .blob
            .ok_or_else(|| HttpTransportError::Rejected("response carries no blob".to_string()))?;
        Ok(Snapshot {
            revision: self.revision,
            encrypted_secret: self.encrypted_secret,
            document,
            patches: self.patches,
        })
    }
}

/// `remote` with `segments` appended to its path, each percent-encoded
fn endpoint(remote: &Url, segments: &[&str]) -> Result<Url, HttpTransportError> {
    let mut url = remote.clone();
    url.path_segments_mut()
        .map_err(|_| HttpTransportError::InvalidRemote(remote.clone()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl HttpTransport {
    pub fn new() -> Result<Self, HttpTransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;
        Ok(Self { client })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        signature: Option<&str>,
    ) -> Result<T, HttpTransportError> {
        let request = match signature {
            Some(signature) => request.header(SIGNATURE_HEADER, signature),
            None => request,
        };
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(HttpTransportError::HttpStatus(
                response.status(),
                response.text().await?,
            ));
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.result != "success" {
            return Err(HttpTransportError::Rejected(
                envelope.message.unwrap_or(envelope.result),
            ));
        }
        Ok(envelope.body)
    }
}

#[async_trait]
impl BlobTransport for HttpTransport {
    type Error = HttpTransportError;

    async fn fetch_snapshot(&self, remote: &Url, id: &str) -> Result<Snapshot, Self::Error> {
        let url = endpoint(remote, &["v1", "blob", id])?;
        let body: FetchBody = self.call(self.client.get(url), None).await?;
        body.into_snapshot()
    }

    async fn submit_patch(
        &self,
        remote: &Url,
        submission: PatchSubmission,
    ) -> Result<Ack, Self::Error> {
        let url = endpoint(remote, &["v1", "blob", "patch"])?;
        let request = self.client.post(url).json(&submission);
        let body: AckBody = self.call(request, submission.signature.as_deref()).await?;
        Ok(Ack {
            revision: body.revision.or(Some(submission.revision)),
        })
    }

    async fn submit_snapshot(
        &self,
        remote: &Url,
        submission: SnapshotSubmission,
    ) -> Result<Ack, Self::Error> {
        let url = endpoint(remote, &["v1", "blob", "consolidate"])?;
        let request = self.client.post(url).json(&ConsolidateRequest {
            blob_id: &submission.blob_id,
            data: &submission.document,
            revision: submission.revision,
        });
        let body: AckBody = self.call(request, submission.signature.as_deref()).await?;
        Ok(Ack {
            revision: body.revision,
        })
    }

    async fn create_blob(
        &self,
        remote: &Url,
        submission: CreateSubmission,
    ) -> Result<Ack, Self::Error> {
        let url = endpoint(remote, &["v1", "user"])?;
        let request = self.client.post(url).json(&CreateRequest {
            blob_id: &submission.blob_id,
            username: &submission.account,
            data: &submission.document,
            auth_secret: &submission.auth_secret,
            encrypted_secret: &submission.encrypted_secret,
            encrypted_blobdecrypt_key: &submission.encrypted_blob_key,
            email: submission.email.as_deref(),
        });
        let body: AckBody = self.call(request, submission.signature.as_deref()).await?;
        Ok(Ack {
            revision: body.revision.or(Some(0)),
        })
    }

    async fn fetch_recovery(
        &self,
        remote: &Url,
        account: &str,
    ) -> Result<RecoveryBundle, Self::Error> {
        let url = endpoint(remote, &["v1", "user", "recov", account])?;
        let body: RecoveryBody = self.call(self.client.get(url), None).await?;
        Ok(RecoveryBundle {
            blob_id: body.blob_id,
            encrypted_blob_key: body.encrypted_blobdecrypt_key,
            snapshot: body.snapshot.into_snapshot()?,
        })
    }

    async fn update_keys(
        &self,
        remote: &Url,
        account: &str,
        submission: KeyUpdateSubmission,
    ) -> Result<Ack, Self::Error> {
        let url = endpoint(remote, &["v1", "user", account])?;
        let request = self.client.post(url).json(&KeyUpdateRequest {
            blob_id: &submission.blob_id,
            data: &submission.document,
            revision: submission.revision,
            encrypted_blobdecrypt_key: &submission.encrypted_blob_key,
            encrypted_secret: &submission.encrypted_secret,
        });
        let body: AckBody = self.call(request, submission.signature.as_deref()).await?;
        Ok(Ack {
            revision: body.revision.or(Some(submission.revision)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_envelope() {
        let raw = r#"{"result":"success","revision":7,"blob":"abc","patches":["p1"]}"#;
        let envelope: Envelope<FetchBody> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result, "success");
        assert_eq!(envelope.body.revision, 7);
        assert_eq!(envelope.body.blob.as_deref(), Some("abc"));
        assert_eq!(envelope.body.patches, vec!["p1"]);
        assert_eq!(envelope.body.encrypted_secret, None);
    }

    #[test]
    fn test_error_envelope() {
        let raw = r#"{"result":"error","message":"bad signature"}"#;
        let envelope: Envelope<AckBody> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.result, "error");
        assert_eq!(envelope.message.as_deref(), Some("bad signature"));
        assert_eq!(envelope.body.revision, None);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://host.example/vault").unwrap();
        assert_eq!(
            endpoint(&base, &["v1", "blob", "patch"]).unwrap().as_str(),
            "https://host.example/vault/v1/blob/patch"
        );

        let trailing = Url::parse("https://host.example/vault/").unwrap();
        assert_eq!(
            endpoint(&trailing, &["v1", "user"]).unwrap().as_str(),
            "https://host.example/vault/v1/user"
        );

        let root = Url::parse("http://localhost:8080").unwrap();
        assert_eq!(
            endpoint(&root, &["v1", "blob", "consolidate"]).unwrap().as_str(),
            "http://localhost:8080/v1/blob/consolidate"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let base = Url::parse("https://host.example/vault").unwrap();
        let url = endpoint(&base, &["v1", "blob", "a/b?c"]).unwrap();
        assert_eq!(url.as_str(), "https://host.example/vault/v1/blob/a%2Fb%3Fc");
        assert_eq!(url.query(), None);

        let opaque = Url::parse("mailto:vault@example.com").unwrap();
        assert!(matches!(
            endpoint(&opaque, &["v1"]),
            Err(HttpTransportError::InvalidRemote(_))
        ));
    }

    #[test]
    fn test_recovery_envelope() {
        let raw = r#"{"result":"success","blob_id":"b9","encrypted_blobdecrypt_key":"k",
            "revision":3,"encrypted_secret":"s","blob":"doc","patches":[]}"#;
        let envelope: Envelope<RecoveryBody> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.body.blob_id, "b9");
        assert_eq!(envelope.body.encrypted_blobdecrypt_key, "k");
        let snapshot = envelope.body.snapshot.into_snapshot().unwrap();
        assert_eq!(snapshot.revision, 3);
        assert_eq!(snapshot.document, "doc");
        assert_eq!(snapshot.encrypted_secret.as_deref(), Some("s"));
    }

    #[test]
    fn test_patch_body_omits_signature() {
        let body = serde_json::to_value(PatchSubmission {
            blob_id: "b".to_string(),
            patch: "p".to_string(),
            revision: 2,
            signature: Some("sig".to_string()),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"blob_id": "b", "patch": "p", "revision": 2})
        );
    }
}
