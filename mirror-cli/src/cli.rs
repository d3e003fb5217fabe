use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mirror_engine::config::{DEFAULT_MANIFEST_MARKER, DEFAULT_SEGMENT_MARKER};
use mirror_engine::{
    FetcherConfig, MirrorConfig, MirrorError, ProxyConfig, RemoteConfig, RequestHeaders,
    UploadFailurePolicy,
};

use crate::error::AppError;
use crate::utils::parse_headers;

/// Fallback for `--gcp-creds-json`, consulted only when replication is requested.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

#[derive(Parser, Debug)]
#[command(
    name = "m3u8-mirror",
    version,
    about = "Mirror an m3u8 manifest tree, with its keys and segments, to local disk",
    long_about = "Recursively downloads a manifest, every nested manifest, encryption key \
                  and media segment it references. Segments already present locally are \
                  not downloaded again. When all four --gcp-* settings are given, every \
                  written file is also uploaded to Google Cloud Storage."
)]
pub struct Args {
    /// Root manifest URL
    pub url: String,

    /// Directory receiving the local mirror
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Google Cloud Storage bucket to replicate into
    #[arg(long)]
    pub gcp_bucket: Option<String>,

    /// Google Cloud project the uploads are billed to
    #[arg(long)]
    pub gcp_project: Option<String>,

    /// Object prefix inside the bucket
    #[arg(long)]
    pub gcp_folder: Option<String>,

    /// Service account key file [default when another --gcp-* option is
    /// given: $GOOGLE_APPLICATION_CREDENTIALS]
    #[arg(long)]
    pub gcp_creds_json: Option<PathBuf>,

    /// Deepest manifest level to enter (the root is level 0)
    #[arg(long, default_value_t = 16)]
    pub max_depth: u32,

    /// Concurrent segment downloads per manifest
    #[arg(short, long, default_value_t = 4)]
    pub concurrency: usize,

    /// Request timeout in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    pub timeout: u64,

    /// Proxy URL for all requests, e.g. http://127.0.0.1:3128 or socks5://127.0.0.1:1080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Proxy username
    #[arg(long, requires = "proxy")]
    pub proxy_username: Option<String>,

    /// Proxy password
    #[arg(long, requires = "proxy_username")]
    pub proxy_password: Option<String>,

    /// Extra request header as key=value (repeatable)
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    /// What to do when an upload fails
    #[arg(long, value_enum, default_value_t = UploadFailurePolicy::Abort)]
    pub upload_errors: UploadFailurePolicy,

    /// Substring marking a segment line
    #[arg(long, default_value = DEFAULT_SEGMENT_MARKER)]
    pub segment_marker: String,

    /// Substring marking a nested manifest line
    #[arg(long, default_value = DEFAULT_MANIFEST_MARKER)]
    pub manifest_marker: String,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn mirror_config(&self) -> MirrorConfig {
        MirrorConfig {
            output_root: self.output.clone(),
            segment_marker: self.segment_marker.clone(),
            manifest_marker: self.manifest_marker.clone(),
            max_depth: self.max_depth,
            max_concurrent_fetches: self.concurrency,
            upload_failure_policy: self.upload_errors,
        }
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig, AppError> {
        let extra = parse_headers(&self.headers)?;
        Ok(FetcherConfig {
            headers: RequestHeaders::default().with_extra(extra),
            timeout: Duration::from_secs(self.timeout),
            proxy: self.proxy_config(),
            ..Default::default()
        })
    }

    fn proxy_config(&self) -> Option<ProxyConfig> {
        let proxy = ProxyConfig::from_url(self.proxy.as_deref()?);
        Some(match &self.proxy_username {
            Some(username) => {
                proxy.with_auth(username, self.proxy_password.as_deref().unwrap_or_default())
            }
            None => proxy,
        })
    }

    /// Remote settings, or `None` when no `--gcp-*` option was given.
    pub fn remote_config(&self) -> Result<Option<RemoteConfig>, MirrorError> {
        self.remote_config_with(std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from))
    }

    /// Like [`Self::remote_config`], with `env_credentials` standing in for
    /// the environment. The fallback only applies once bucket, project or
    /// folder is given, so an exported variable alone never turns a local run
    /// into a partial remote configuration.
    pub fn remote_config_with(
        &self,
        env_credentials: Option<PathBuf>,
    ) -> Result<Option<RemoteConfig>, MirrorError> {
        let remote_requested =
            self.gcp_bucket.is_some() || self.gcp_project.is_some() || self.gcp_folder.is_some();
        let credentials = match &self.gcp_creds_json {
            Some(path) => Some(path.clone()),
            None if remote_requested => env_credentials,
            None => None,
        };

        RemoteConfig::from_parts(
            self.gcp_bucket.clone(),
            self.gcp_project.clone(),
            self.gcp_folder.clone(),
            credentials,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let args = Args::try_parse_from(["m3u8-mirror", "https://h/a/master.m3u8"]).unwrap();
        let config = args.mirror_config();
        let defaults = MirrorConfig::default();

        assert_eq!(config.output_root, defaults.output_root);
        assert_eq!(config.segment_marker, defaults.segment_marker);
        assert_eq!(config.manifest_marker, defaults.manifest_marker);
        assert_eq!(config.max_depth, defaults.max_depth);
        assert_eq!(config.max_concurrent_fetches, defaults.max_concurrent_fetches);
        assert_eq!(config.upload_failure_policy, UploadFailurePolicy::Abort);
    }

    #[test]
    fn parses_tuning_flags() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "-o",
            "/tmp/mirror",
            "-c",
            "8",
            "--max-depth",
            "3",
            "--timeout",
            "30",
            "--upload-errors",
            "continue",
            "-H",
            "Referer=https://h/",
            "--proxy",
            "socks5://127.0.0.1:1080",
        ])
        .unwrap();

        let config = args.mirror_config();
        assert_eq!(config.output_root, PathBuf::from("/tmp/mirror"));
        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.upload_failure_policy, UploadFailurePolicy::Continue);

        let fetcher = args.fetcher_config().unwrap();
        assert_eq!(fetcher.timeout, Duration::from_secs(30));
        assert_eq!(
            fetcher.headers.extra,
            vec![("Referer".to_string(), "https://h/".to_string())]
        );
        assert_eq!(
            fetcher.proxy.map(|p| p.url),
            Some("socks5://127.0.0.1:1080".to_string())
        );
    }

    #[test]
    fn partial_gcp_settings_are_rejected() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "--gcp-bucket",
            "media",
        ])
        .unwrap();

        let err = args.remote_config_with(None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("project"));
    }

    #[test]
    fn exported_credentials_alone_keep_the_run_local() {
        let args = Args::try_parse_from(["m3u8-mirror", "https://h/a/master.m3u8"]).unwrap();
        let remote = args
            .remote_config_with(Some(PathBuf::from("/etc/gcp/key.json")))
            .unwrap();
        assert!(remote.is_none());
    }

    #[test]
    fn exported_credentials_complete_remote_flags() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "--gcp-bucket",
            "media",
            "--gcp-project",
            "proj",
            "--gcp-folder",
            "mirror",
        ])
        .unwrap();

        let remote = args
            .remote_config_with(Some(PathBuf::from("/etc/gcp/key.json")))
            .unwrap()
            .unwrap();
        assert_eq!(remote.credentials, PathBuf::from("/etc/gcp/key.json"));
    }

    #[test]
    fn explicit_credentials_flag_alone_is_incomplete() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "--gcp-creds-json",
            "/etc/key.json",
        ])
        .unwrap();
        assert!(args.remote_config_with(None).is_err());
    }

    #[test]
    fn proxy_credentials_are_forwarded() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "--proxy",
            "http://127.0.0.1:3128",
            "--proxy-username",
            "user",
            "--proxy-password",
            "secret",
        ])
        .unwrap();

        let proxy = args.fetcher_config().unwrap().proxy.unwrap();
        let auth = proxy.auth.unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn proxy_username_requires_proxy() {
        assert!(
            Args::try_parse_from(["m3u8-mirror", "https://h/x.m3u8", "--proxy-username", "u"])
                .is_err()
        );
    }

    #[test]
    fn complete_gcp_settings_build_remote_config() {
        let args = Args::try_parse_from([
            "m3u8-mirror",
            "https://h/a/master.m3u8",
            "--gcp-bucket",
            "media",
            "--gcp-project",
            "proj",
            "--gcp-folder",
            "mirror",
            "--gcp-creds-json",
            "/etc/key.json",
        ])
        .unwrap();

        let remote = args.remote_config_with(None).unwrap().unwrap();
        assert_eq!(remote.bucket, "media");
        assert_eq!(remote.folder, "mirror");
        assert_eq!(remote.credentials, PathBuf::from("/etc/key.json"));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["m3u8-mirror", "https://h/x.m3u8", "-v", "-q"]).is_err());
    }

    #[test]
    fn malformed_header_is_invalid_input() {
        let args =
            Args::try_parse_from(["m3u8-mirror", "https://h/x.m3u8", "-H", "NoSeparator"]).unwrap();
        assert!(matches!(args.fetcher_config(), Err(AppError::InvalidInput(_))));
    }
}
