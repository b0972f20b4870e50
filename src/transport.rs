use std::io::Read;

use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::{CertificateChain, TransportOptions};
use crate::error::{DqmError, error_chain};

/// Authenticated GET against the archive. Used for directory listings and
/// for the ROOT files themselves.
pub trait ArchiveTransport: Send + Sync {
    fn get(&self, url: &Url) -> Result<Box<dyn Read + Send>, DqmError>;

    fn get_text(&self, url: &Url) -> Result<String, DqmError> {
        let mut body = String::new();
        self.get(url)?
            .read_to_string(&mut body)
            .map_err(|err| DqmError::ArchiveHttp(format!("reading {url}: {err}")))?;
        Ok(body)
    }
}

/// Archive client presenting the user's grid certificate.
#[derive(Clone)]
pub struct CertAuthClient {
    client: Client,
}

impl CertAuthClient {
    pub fn new(chain: &CertificateChain, options: &TransportOptions) -> Result<Self, DqmError> {
        let identity = reqwest::Identity::from_pem(&chain.identity_pem()?)
            .map_err(|err| DqmError::InvalidCredential(error_chain(&err)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .map_err(|err| DqmError::InvalidCredential(err.to_string()))?,
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .identity(identity)
            .timeout(options.timeout);
        if options.insecure_skip_verify {
            warn!("server certificate and hostname verification are disabled for the archive");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|err| DqmError::ArchiveHttp(error_chain(&err)))?;
        Ok(Self { client })
    }

    fn handle_status(url: &Url, response: Response) -> Result<Response, DqmError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(DqmError::ArchiveStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        })
    }
}

impl ArchiveTransport for CertAuthClient {
    fn get(&self, url: &Url) -> Result<Box<dyn Read + Send>, DqmError> {
        debug!(%url, "archive GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| DqmError::ArchiveHttp(format!("{url}: {}", error_chain(&err))))?;
        let response = Self::handle_status(url, response)?;
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn listing_url() -> Url {
        Url::parse("https://cmsweb.cern.ch/dqm/offline/data/browse/ROOT/OnlineData/").unwrap()
    }

    #[test]
    fn non_success_status_is_archive_status() {
        let response = http::Response::builder()
            .status(403)
            .body("forbidden")
            .unwrap();
        let result = CertAuthClient::handle_status(&listing_url(), Response::from(response));
        assert_matches!(
            result,
            Err(DqmError::ArchiveStatus { status: 403, ref url }) if url == listing_url().as_str()
        );
    }

    #[test]
    fn success_status_passes_through() {
        let response = http::Response::builder().status(200).body("<html>").unwrap();
        let response = CertAuthClient::handle_status(&listing_url(), Response::from(response)).unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}
