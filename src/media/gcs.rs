use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{MediaStore, MediaStoreError};

/// Google Cloud Storage media store backend.
///
/// Auth comes from a service-account key file (RS256-signed JWT exchanged
/// for an access token) or, on GCP, from the instance metadata server.
/// Tokens are cached and refreshed shortly before they expire.
pub struct GcsStore {
    bucket: String,
    client: Client,
    token: RwLock<Option<CachedToken>>,
    credentials_file: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Refresh this long before the token actually expires
const EXPIRY_MARGIN_SECS: i64 = 60;

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let store = Self {
            bucket: bucket.to_string(),
            client: Client::builder().build()?,
            token: RwLock::new(None),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        // Fail fast on unusable credentials
        store
            .bearer_token()
            .await
            .map_err(|e| anyhow::anyhow!("GCS auth failed: {e}"))?;
        Ok(store)
    }

    /// Current access token, refreshing through the configured credential
    /// source when the cached one is missing or close to expiry.
    async fn bearer_token(&self) -> Result<String, MediaStoreError> {
        let deadline = Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS);
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > deadline {
                return Ok(cached.value.clone());
            }
        }

        let response = match self.credentials_file {
            Some(ref path) => self.token_from_service_account(path).await?,
            None => self.token_from_metadata_server().await?,
        };

        let cached = CachedToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        };
        let mut lock = self.token.write().await;
        *lock = Some(cached.clone());
        Ok(cached.value)
    }

    async fn token_from_service_account(
        &self,
        path: &str,
    ) -> Result<TokenResponse, MediaStoreError> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)
            .map_err(|e| MediaStoreError::Backend(format!("Invalid service account key: {e}")))?;

        let now = Utc::now().timestamp();
        let header = base64_url_encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = base64_url_encode(
            serde_json::json!({
                "iss": key.client_email,
                "scope": "https://www.googleapis.com/auth/devstorage.read_write",
                "aud": key.token_uri,
                "iat": now,
                "exp": now + 3600,
            })
            .to_string()
            .as_bytes(),
        );
        let unsigned = format!("{header}.{claims}");
        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(format!("Token exchange failed: {e}")))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| MediaStoreError::Backend(format!("Token exchange failed: {e}")))?;

        Ok(resp)
    }

    async fn token_from_metadata_server(&self) -> Result<TokenResponse, MediaStoreError> {
        self.client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(format!("Metadata server unreachable: {e}")))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| MediaStoreError::Backend(format!("Metadata server response: {e}")))
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            urlencode(key)
        )
    }

    /// Object URL; `?alt=media` fetches content, bare fetches metadata.
    fn object_url(&self, key: &str, content: bool) -> String {
        let suffix = if content { "?alt=media" } else { "" };
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}{}",
            self.bucket,
            urlencode(key),
            suffix
        )
    }
}

#[async_trait]
impl MediaStore for GcsStore {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<(), MediaStoreError> {
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&token)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, MediaStoreError> {
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .get(self.object_url(key, true))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MediaStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaStoreError::Backend(format!(
                "GCS download failed ({status}): {body}"
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| MediaStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .delete(self.object_url(key, false))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, MediaStoreError> {
        let token = self.bearer_token().await?;

        let resp = self
            .client
            .get(self.object_url(key, false))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| MediaStoreError::Backend(e.to_string()))?;

        Ok(resp.status().is_success())
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Percent-encode a storage key for use as a single GCS object name segment.
/// Keys contain `/` which must not be treated as a path separator by the
/// JSON API.
fn urlencode(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, MediaStoreError> {
    use base64::Engine;

    // Strip PEM armor and decode the base64 body to DER
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(der_b64.trim())
        .map_err(|e| MediaStoreError::Backend(format!("Invalid private key encoding: {e}")))?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| MediaStoreError::Backend(format!("Failed to parse RSA key: {e}")))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| MediaStoreError::Backend(format!("Failed to sign JWT: {e}")))?;

    Ok(signature)
}
