//! Google Cloud Storage destination.
//!
//! Authenticates with a service-account key through the OAuth2 JWT bearer
//! grant and uploads objects with the JSON API's single-request media upload.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{RemoteConfig, RemoteStore};
use crate::error::MirrorError;
use crate::fetcher::install_rustls_provider;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: u64 = 3600;
/// Tokens are refreshed this long before Google would reject them.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key needed to mint access tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, MirrorError> {
        serde_json::from_str(json)
            .map_err(|e| MirrorError::configuration(format!("invalid service-account key: {e}")))
    }

    pub async fn from_file(path: &Path) -> Result<Self, MirrorError> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            MirrorError::configuration(format!(
                "cannot read credentials file `{}`: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug)]
enum TokenSource {
    ServiceAccount(ServiceAccountKey),
    Static(String),
}

/// [`RemoteStore`] writing into a Google Cloud Storage bucket.
#[derive(Debug)]
pub struct GcsStore {
    client: Client,
    bucket: String,
    project: String,
    endpoint: String,
    source: TokenSource,
    token: Mutex<Option<CachedToken>>,
}

impl GcsStore {
    /// Build a store from validated remote settings, loading the key file.
    pub async fn from_config(config: &RemoteConfig) -> Result<Self, MirrorError> {
        let key = ServiceAccountKey::from_file(&config.credentials).await?;
        info!(
            bucket = %config.bucket,
            project = %config.project,
            client_email = %key.client_email,
            "Remote replication to Google Cloud Storage enabled"
        );
        Self::new(
            &config.bucket,
            &config.project,
            TokenSource::ServiceAccount(key),
        )
    }

    /// Store that sends a pre-issued OAuth2 access token with every request.
    pub fn with_access_token(
        bucket: impl Into<String>,
        project: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, MirrorError> {
        Self::new(
            &bucket.into(),
            &project.into(),
            TokenSource::Static(access_token.into()),
        )
    }

    fn new(bucket: &str, project: &str, source: TokenSource) -> Result<Self, MirrorError> {
        install_rustls_provider();
        let client = Client::builder()
            .build()
            .map_err(|e| MirrorError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            project: project.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            source,
            token: Mutex::new(None),
        })
    }

    /// Point the store at another JSON API endpoint (emulators, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(&self.bucket)
        )
    }

    async fn access_token(&self) -> Result<String, MirrorError> {
        let key = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(key) => key,
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let fresh = self.request_token(key).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self, key: &ServiceAccountKey) -> Result<CachedToken, MirrorError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| MirrorError::auth(e.to_string()))?
            .as_secs();
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: STORAGE_SCOPE,
            aud: &key.token_uri,
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| MirrorError::auth(format!("invalid private key: {e}")))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|e| MirrorError::auth(format!("failed to sign token request: {e}")))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| MirrorError::auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MirrorError::auth(format!("malformed token response: {e}")))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS));
        debug!(lifetime_secs = lifetime.as_secs(), "Obtained storage access token");

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }
}

#[async_trait]
impl RemoteStore for GcsStore {
    #[instrument(skip(self, local), fields(local = %local.display()), level = "debug")]
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), MirrorError> {
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| MirrorError::filesystem(local, e))?;
        let size = data.len();
        let token = self.access_token().await?;

        let response = self
            .client
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", remote)])
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, content_type_for(remote))
            .header("x-goog-user-project", &self.project)
            .body(data)
            .send()
            .await
            .map_err(|e| MirrorError::upload(local, remote, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::upload(
                local,
                remote,
                format!("HTTP {status}: {body}"),
            ));
        }

        info!(local = %local.display(), remote, size, "[UPLOAD] File uploaded");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }
}

/// MIME type for an object, from its extension.
pub(crate) fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "m3u8" | "m3u" => "application/vnd.apple.mpegurl",
        "ts" => "video/mp2t",
        "m4s" => "video/iso.segment",
        "mp4" => "video/mp4",
        "aac" => "audio/aac",
        "vtt" => "text/vtt",
        _ => "application/octet-stream",
    }
}
