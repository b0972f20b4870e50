use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DqmError;

pub const CERT_DIR_ENV: &str = "CERN_CERTIFICATE_PATH";
pub const OMS_AUTH_ENV: &str = "OMS_CLIENT_AUTH";
pub const CERT_FILE_NAME: &str = "usercert.pem";
pub const KEY_FILE_NAME: &str = "userkey.pem";

pub const ARCHIVE_BASE_URL: &str = "https://cmsweb.cern.ch/";
pub const OMS_BASE_URL: &str = "https://cmsoms.cern.ch/agg/api/v1";
pub const OMS_TOKEN_URL: &str = "https://auth.cern.ch/auth/realms/cern/api-access/token";
pub const OMS_AUDIENCE: &str = "cmsoms-prod";

/// Client certificate and private key used for the archive's mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl CertificateChain {
    /// Resolves the chain from `override_dir` (CLI flag or environment), or
    /// from `~/.globus` when no override is given.
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, DqmError> {
        let cert_dir = match override_dir {
            Some(dir) => dir,
            None => {
                let dir = default_cert_dir()?;
                warn!(
                    "{CERT_DIR_ENV} is not set; falling back to {}",
                    dir.display()
                );
                dir
            }
        };
        Self::from_dir(&cert_dir)
    }

    pub fn from_dir(cert_dir: &Path) -> Result<Self, DqmError> {
        if !cert_dir.is_dir() {
            return Err(DqmError::MissingCredentialDir(cert_dir.to_path_buf()));
        }
        let cert_file = cert_dir.join(CERT_FILE_NAME);
        if !cert_file.is_file() {
            return Err(DqmError::MissingCredentialFile(cert_file));
        }
        let key_file = cert_dir.join(KEY_FILE_NAME);
        if !key_file.is_file() {
            return Err(DqmError::MissingCredentialFile(key_file));
        }
        Ok(Self {
            cert_file,
            key_file,
        })
    }

    /// Certificate followed by key, the PEM bundle the TLS identity expects.
    pub fn identity_pem(&self) -> Result<Vec<u8>, DqmError> {
        let mut pem = fs::read(&self.cert_file).map_err(|err| {
            DqmError::InvalidCredential(format!("{}: {err}", self.cert_file.display()))
        })?;
        if !pem.ends_with(b"\n") {
            pem.push(b'\n');
        }
        let key = fs::read(&self.key_file).map_err(|err| {
            DqmError::InvalidCredential(format!("{}: {err}", self.key_file.display()))
        })?;
        pem.extend_from_slice(&key);
        Ok(pem)
    }
}

pub fn default_cert_dir() -> Result<PathBuf, DqmError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".globus"))
        .ok_or(DqmError::MissingHomeDir)
}

/// Reads an environment variable as a path, treating blank values as unset.
pub fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Skips server certificate and hostname verification. Off unless the
    /// operator opts in.
    pub insecure_skip_verify: bool,
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            insecure_skip_verify: false,
            timeout: None,
            user_agent: format!("dqm-fetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// OIDC client credentials for the OMS API.
#[derive(Clone, Deserialize, Serialize)]
pub struct OmsCredentials {
    pub id: String,
    pub secret: String,
}

impl std::fmt::Debug for OmsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmsCredentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

pub struct OmsCredentialsLoader;

impl OmsCredentialsLoader {
    /// `path` (CLI flag or environment) wins; otherwise the per-user config
    /// location `<config dir>/dqm-fetch/oms-auth.json` is used.
    pub fn resolve(path: Option<&Path>) -> Result<OmsCredentials, DqmError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_oms_auth_path()?,
        };
        let content =
            fs::read_to_string(&path).map_err(|_| DqmError::OmsCredentialRead(path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<OmsCredentials, DqmError> {
        let credentials: OmsCredentials = serde_json::from_str(content)
            .map_err(|err| DqmError::OmsCredentialParse(err.to_string()))?;
        if credentials.id.trim().is_empty() || credentials.secret.trim().is_empty() {
            return Err(DqmError::OmsCredentialParse(
                "client id and secret must not be empty".to_string(),
            ));
        }
        Ok(credentials)
    }
}

pub fn default_oms_auth_path() -> Result<PathBuf, DqmError> {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("dqm-fetch").join("oms-auth.json"))
        .ok_or(DqmError::MissingHomeDir)
}
