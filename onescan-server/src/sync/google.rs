//! Google Sheets sink
//!
//! Authenticates with a service-account key (RS256 JWT exchanged for an
//! OAuth access token), then overrides the worksheet with two calls:
//! `values:clear` on the whole sheet and one `values` update with
//! `valueInputOption=RAW`. A missing worksheet is created on first write.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::rows::{LAST_COLUMN, Row};
use super::sink::{SheetSink, SinkError};
use crate::core::config::ConfigError;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
/// Lifetime requested for the signed assertion
const ASSERTION_TTL_SECS: i64 = 3600;
/// Refresh the access token this long before it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Subset of the service-account JSON key we need
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Read and validate a key file; any problem is a configuration error
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingCredentials(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::MalformedCredentials(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let key: ServiceAccountKey = serde_json::from_str(raw)
            .map_err(|e| ConfigError::MalformedCredentials(e.to_string()))?;
        if key.client_email.trim().is_empty() {
            return Err(ConfigError::MalformedCredentials(
                "client_email is empty".to_string(),
            ));
        }
        key.encoding_key()?;
        Ok(key)
    }

    fn encoding_key(&self) -> Result<EncodingKey, ConfigError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| ConfigError::MalformedCredentials(format!("private_key: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct GoogleSheetSink {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    spreadsheet_id: String,
    worksheet: String,
    token: Mutex<Option<CachedToken>>,
    worksheet_ready: AtomicBool,
}

impl std::fmt::Debug for GoogleSheetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetSink")
            .field("client_email", &self.key.client_email)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .finish()
    }
}

impl GoogleSheetSink {
    pub fn new(
        key: ServiceAccountKey,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let encoding_key = key.encoding_key()?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            key,
            encoding_key,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            token: Mutex::new(None),
            worksheet_ready: AtomicBool::new(false),
        })
    }

    /// Signed JWT assertion for the token endpoint
    fn sign_assertion(&self, now_secs: i64) -> Result<String, SinkError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now_secs,
            exp: now_secs + ASSERTION_TTL_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| SinkError::Auth(format!("Failed to sign assertion: {e}")))
    }

    async fn access_token(&self) -> Result<String, SinkError> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached
            && token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
        {
            return Ok(token.value);
        }

        let assertion = self.sign_assertion(chrono::Utc::now().timestamp())?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // The token endpoint answers 400 for a rejected assertion
            return Err(match status.as_u16() {
                400 | 401 | 403 => SinkError::Auth(body),
                code => SinkError::from_status(code, body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Auth(format!("Malformed token response: {e}")))?;
        tracing::debug!(expires_in = token.expires_in, "Obtained Sheets access token");

        let cached = CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        let value = cached.value.clone();
        *self.token.lock() = Some(cached);
        Ok(value)
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url, SinkError> {
        let mut url = Url::parse(SHEETS_API_BASE)
            .map_err(|e| SinkError::Rejected(format!("Invalid API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::Rejected("API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(tail);
        Ok(url)
    }

    fn quoted_sheet(&self) -> String {
        format!("'{}'", self.worksheet.replace('\'', "''"))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::from_status(status.as_u16(), body))
        }
    }

    /// Create the worksheet if the spreadsheet does not have it yet
    async fn ensure_worksheet(&self, token: &str) -> Result<(), SinkError> {
        if self.worksheet_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut url = self.spreadsheet_url(&[&self.spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let meta: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SinkError::Rejected(format!("Malformed spreadsheet metadata: {e}")))?;

        let exists = meta["sheets"]
            .as_array()
            .is_some_and(|sheets| {
                sheets
                    .iter()
                    .any(|s| s["properties"]["title"].as_str() == Some(self.worksheet.as_str()))
            });

        if !exists {
            tracing::info!(worksheet = %self.worksheet, "Creating missing worksheet");
            let url = self.spreadsheet_url(&[&format!("{}:batchUpdate", self.spreadsheet_id)])?;
            let body = json!({
                "requests": [{ "addSheet": { "properties": { "title": self.worksheet } } }]
            });
            let response = self.client.post(url).bearer_auth(token).json(&body).send().await?;
            Self::check(response).await?;
        }

        self.worksheet_ready.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl SheetSink for GoogleSheetSink {
    async fn clear_and_write_rows(&self, rows: &[Row]) -> Result<(), SinkError> {
        let token = self.access_token().await?;
        self.ensure_worksheet(&token).await?;

        let sheet = self.quoted_sheet();
        let clear_url =
            self.spreadsheet_url(&[&self.spreadsheet_id, "values", &format!("{sheet}:clear")])?;
        let response = self
            .client
            .post(clear_url)
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await?;

        if rows.is_empty() {
            return Ok(());
        }

        let range = format!("{sheet}!A1:{LAST_COLUMN}{}", rows.len());
        let mut update_url = self.spreadsheet_url(&[&self.spreadsheet_id, "values", &range])?;
        update_url
            .query_pairs_mut()
            .append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        let response = self
            .client
            .put(update_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::debug!(rows = rows.len(), range = %range, "Worksheet overwritten");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("google-sheets:{}/{}", self.spreadsheet_id, self.worksheet)
    }
}
