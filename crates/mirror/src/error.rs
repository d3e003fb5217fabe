use std::path::PathBuf;

use reqwest::StatusCode;

/// Broad failure category of a [`MirrorError`], used by callers to pick an
/// exit status or decide whether a failure may be tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Filesystem,
    Upload,
    Configuration,
    Traversal,
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("HTTP request for {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error on `{}`: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of `{}` to `{remote}` failed: {reason}", local.display())]
    Upload {
        local: PathBuf,
        remote: String,
        reason: String,
    },

    #[error("remote storage authentication failed: {reason}")]
    Auth { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("manifest {url} is at depth {depth}, beyond the limit of {max_depth}")]
    DepthExceeded {
        url: String,
        depth: u32,
        max_depth: u32,
    },
}

impl MirrorError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn upload(
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Upload {
            local: local.into(),
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => ErrorKind::Fetch,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::Upload { .. } | Self::Auth { .. } => ErrorKind::Upload,
            Self::Configuration { .. } | Self::InvalidUrl { .. } => ErrorKind::Configuration,
            Self::DepthExceeded { .. } => ErrorKind::Traversal,
        }
    }

    /// Process exit status for this error. `1` is left for failures outside the engine.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::Fetch => 3,
            ErrorKind::Filesystem => 4,
            ErrorKind::Upload => 5,
            ErrorKind::Traversal => 6,
        }
    }
}
