use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{OMS_AUDIENCE, OMS_BASE_URL, OMS_TOKEN_URL, OmsCredentials, TransportOptions};
use crate::domain::RunNumber;
use crate::era::{Era, EraSource};
use crate::error::{DqmError, error_chain};

/// Tokens are renewed this long before the issuer says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Bearer token plus the instant after which it must be renewed. Tokens
/// issued without `expires_in` are kept for the whole process.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    renew_at: Option<Instant>,
}

impl CachedToken {
    fn issued(response: TokenResponse, now: Instant) -> Self {
        let renew_at = response.expires_in.map(|secs| {
            let lifetime = Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN);
            now + lifetime
        });
        Self {
            value: response.access_token,
            renew_at,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.renew_at.is_none_or(|renew_at| now < renew_at)
    }
}

#[derive(Debug, Deserialize)]
struct EraPage {
    #[serde(default)]
    data: Vec<EraItem>,
}

#[derive(Debug, Deserialize)]
struct EraItem {
    id: String,
    attributes: EraAttributes,
}

#[derive(Debug, Deserialize)]
struct EraAttributes {
    start_run: u32,
    end_run: u32,
}

impl From<EraItem> for Era {
    fn from(item: EraItem) -> Self {
        Era {
            label: item.id,
            start_run: RunNumber::new(item.attributes.start_run),
            end_run: RunNumber::new(item.attributes.end_run),
        }
    }
}

/// Era lookups against the OMS aggregation API, authenticated with an OIDC
/// client-credentials token fetched on first use.
pub struct OmsHttpClient {
    client: Client,
    base_url: String,
    token_url: String,
    credentials: Option<OmsCredentials>,
    token: Mutex<Option<CachedToken>>,
}

impl OmsHttpClient {
    pub fn new(
        credentials: Option<OmsCredentials>,
        options: &TransportOptions,
    ) -> Result<Self, DqmError> {
        Self::with_endpoints(credentials, options, OMS_BASE_URL, OMS_TOKEN_URL)
    }

    pub fn with_endpoints(
        credentials: Option<OmsCredentials>,
        options: &TransportOptions,
        base_url: &str,
        token_url: &str,
    ) -> Result<Self, DqmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .map_err(|err| DqmError::OmsHttp(err.to_string()))?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout);
        if options.insecure_skip_verify {
            warn!("server certificate verification is disabled for OMS");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|err| DqmError::OmsHttp(error_chain(&err)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    /// `filter[start_run][LE]=<run>&filter[end_run][GE]=<run>`
    pub fn eras_query(&self, run: RunNumber) -> (String, [(String, String); 2]) {
        (
            format!("{}/eras", self.base_url),
            [
                ("filter[start_run][LE]".to_string(), run.to_string()),
                ("filter[end_run][GE]".to_string(), run.to_string()),
            ],
        )
    }

    fn access_token(&self) -> Result<String, DqmError> {
        let mut token = self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = token.as_ref().filter(|cached| cached.is_fresh(Instant::now())) {
            return Ok(cached.value.clone());
        }

        let credentials = self
            .credentials
            .as_ref()
            .ok_or(DqmError::MissingOmsCredentials)?;
        debug!(
            client_id = %credentials.id,
            renewing = token.is_some(),
            "requesting OMS access token"
        );
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.id.as_str()),
                ("client_secret", credentials.secret.as_str()),
                ("audience", OMS_AUDIENCE),
            ])
            .send()
            .map_err(|err| DqmError::OmsHttp(error_chain(&err)))?;
        let body: TokenResponse = Self::handle_status(response)?
            .json()
            .map_err(|err| DqmError::OmsHttp(error_chain(&err)))?;
        let cached = CachedToken::issued(body, Instant::now());
        let value = cached.value.clone();
        *token = Some(cached);
        Ok(value)
    }

    fn handle_status(response: Response) -> Result<Response, DqmError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "OMS request failed".to_string());
        Err(DqmError::OmsStatus { status, message })
    }
}

impl EraSource for OmsHttpClient {
    fn covering_eras(&self, run: RunNumber) -> Result<Vec<Era>, DqmError> {
        let token = self.access_token()?;
        let (url, filters) = self.eras_query(run);
        debug!(%run, %url, "querying OMS eras");
        let response = self
            .client
            .get(&url)
            .query(&filters)
            .bearer_auth(token)
            .send()
            .map_err(|err| DqmError::OmsHttp(error_chain(&err)))?;
        let page: EraPage = Self::handle_status(response)?
            .json()
            .map_err(|err| DqmError::OmsHttp(error_chain(&err)))?;
        Ok(page.data.into_iter().map(Era::from).collect())
    }
}
