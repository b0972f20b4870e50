use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DqmError {
    #[error("invalid run expression: {0}")]
    #[diagnostic(help("use a single run like 355100 or an inclusive range like 355100-355200"))]
    MalformedRunExpression(String),

    #[error("invalid DAS dataset name: {0}")]
    #[diagnostic(help("expected /<Primary>/<Era>-<Stream>-<Version>/<Tier>"))]
    InvalidDatasetName(String),

    #[error("certificate directory not found: {0}")]
    #[diagnostic(help("set CERN_CERTIFICATE_PATH or pass --cert-dir"))]
    MissingCredentialDir(PathBuf),

    #[error("certificate file not found: {0}")]
    MissingCredentialFile(PathBuf),

    #[error("unable to load client certificate: {0}")]
    InvalidCredential(String),

    #[error("unable to resolve home directory for the default certificate location")]
    MissingHomeDir,

    #[error("failed to read OMS credentials at {0}")]
    OmsCredentialRead(PathBuf),

    #[error("failed to parse OMS credentials: {0}")]
    OmsCredentialParse(String),

    #[error("OMS credentials are not configured")]
    #[diagnostic(help("pass --oms-auth or set OMS_CLIENT_AUTH"))]
    MissingOmsCredentials,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status} for {url}")]
    ArchiveStatus { status: u16, url: String },

    #[error("no entry matching '{pattern}' in {url}")]
    LinkNotFound { pattern: String, url: String },

    #[error("no era covers run {0}")]
    EraNotFound(u32),

    #[error("OMS request failed: {0}")]
    OmsHttp(String),

    #[error("OMS returned status {status}: {message}")]
    OmsStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("resolved file does not have the .root extension: {0}")]
    #[diagnostic(help("the link resolver produced a non-ROOT target; this is a bug"))]
    UnexpectedExtension(String),
}

impl DqmError {
    /// Errors that belong to one (run, dataset) task. The orchestrator records
    /// these and moves on; every other variant aborts the invocation.
    pub fn is_task_level(&self) -> bool {
        matches!(
            self,
            DqmError::ArchiveHttp(_)
                | DqmError::ArchiveStatus { .. }
                | DqmError::LinkNotFound { .. }
                | DqmError::EraNotFound(_)
                | DqmError::OmsHttp(_)
                | DqmError::OmsStatus { .. }
                | DqmError::MissingOmsCredentials
                | DqmError::InvalidDatasetName(_)
                | DqmError::InvalidUrl(_)
                | DqmError::Filesystem(_)
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DqmError::MalformedRunExpression(_)
                | DqmError::MissingCredentialDir(_)
                | DqmError::MissingCredentialFile(_)
                | DqmError::InvalidCredential(_)
                | DqmError::MissingHomeDir
                | DqmError::OmsCredentialRead(_)
                | DqmError::OmsCredentialParse(_)
        )
    }
}

/// Error text followed by each underlying cause, `outer: inner: ...`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
