use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::error::MirrorError;
use crate::proxy::ProxyConfig;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64; rv:57.0) Gecko/20100101 Firefox/57.0";

/// Default marker identifying a media segment line.
pub const DEFAULT_SEGMENT_MARKER: &str = ".ts";

/// Default marker identifying a nested manifest line.
pub const DEFAULT_MANIFEST_MARKER: &str = ".m3u8";

/// Browser-like header set sent with every request.
///
/// Origins hosting playlists frequently reject obvious bot traffic, so the
/// defaults mimic a desktop Firefox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    /// `User-Agent`
    pub user_agent: String,
    /// `Accept`, defaults to `*/*`
    pub accept: String,
    /// `Accept-Language`, defaults to `en-US,en;q=0.5`
    pub accept_language: String,
    /// `Accept-Encoding`, defaults to `gzip, deflate, br`
    pub accept_encoding: String,
    /// `DNT`, defaults to `1`
    pub dnt: String,
    /// `Connection`, defaults to `keep-alive`
    pub connection: String,
    /// `Pragma`, defaults to `no-cache`
    pub pragma: String,
    /// `Cache-Control`, defaults to `no-cache`
    pub cache_control: String,
    /// Additional headers, applied last so they override the fields above
    pub extra: Vec<(String, String)>,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            accept: "*/*".to_owned(),
            accept_language: "en-US,en;q=0.5".to_owned(),
            accept_encoding: "gzip, deflate, br".to_owned(),
            dnt: "1".to_owned(),
            connection: "keep-alive".to_owned(),
            pragma: "no-cache".to_owned(),
            cache_control: "no-cache".to_owned(),
            extra: Vec::new(),
        }
    }
}

impl RequestHeaders {
    pub fn with_extra(mut self, extra: Vec<(String, String)>) -> Self {
        self.extra.extend(extra);
        self
    }

    /// Build the header map handed to the HTTP client.
    pub fn to_header_map(&self) -> Result<HeaderMap, MirrorError> {
        let mut headers = HeaderMap::new();

        let fixed = [
            (header::USER_AGENT, &self.user_agent),
            (header::ACCEPT, &self.accept),
            (header::ACCEPT_LANGUAGE, &self.accept_language),
            (header::ACCEPT_ENCODING, &self.accept_encoding),
            (header::DNT, &self.dnt),
            (header::CONNECTION, &self.connection),
            (header::PRAGMA, &self.pragma),
            (header::CACHE_CONTROL, &self.cache_control),
        ];
        for (name, value) in fixed {
            headers.insert(name, header_value(value)?);
        }

        for (name, value) in &self.extra {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                MirrorError::configuration(format!("invalid header name `{name}`: {e}"))
            })?;
            headers.insert(name, header_value(value)?);
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, MirrorError> {
    HeaderValue::from_str(value)
        .map_err(|e| MirrorError::configuration(format!("invalid header value `{value}`: {e}")))
}

/// HTTP client options for the resource fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Headers sent with every request
    pub headers: RequestHeaders,

    /// Overall request timeout. `Duration::ZERO` leaves requests unbounded.
    pub timeout: Duration,

    /// Explicit proxy. When absent the system proxy settings apply.
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings when no explicit proxy is set
    pub use_system_proxy: bool,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            headers: RequestHeaders::default(),
            timeout: Duration::ZERO,
            proxy: None,
            use_system_proxy: true,
            follow_redirects: true,
            pool_max_idle_per_host: 10,
        }
    }
}

/// What to do when replicating a file to remote storage fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum UploadFailurePolicy {
    /// Abort the whole traversal (default)
    #[default]
    Abort,
    /// Log the failure and keep going; the local copy is already written
    Continue,
}

/// Traversal options.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory receiving the local mirror
    pub output_root: PathBuf,

    /// Substring identifying a media segment line
    pub segment_marker: String,

    /// Substring identifying a nested manifest line
    pub manifest_marker: String,

    /// Deepest manifest level that may be entered (root is 0)
    pub max_depth: u32,

    /// Upper bound on in-flight segment downloads within one manifest
    pub max_concurrent_fetches: usize,

    pub upload_failure_policy: UploadFailurePolicy,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            segment_marker: DEFAULT_SEGMENT_MARKER.to_owned(),
            manifest_marker: DEFAULT_MANIFEST_MARKER.to_owned(),
            max_depth: 16,
            max_concurrent_fetches: 4,
            upload_failure_policy: UploadFailurePolicy::Abort,
        }
    }
}

impl MirrorConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.segment_marker.is_empty() || self.manifest_marker.is_empty() {
            return Err(MirrorError::configuration(
                "segment and manifest markers must not be empty",
            ));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(MirrorError::configuration(
                "max_concurrent_fetches must be at least 1",
            ));
        }
        Ok(())
    }
}
