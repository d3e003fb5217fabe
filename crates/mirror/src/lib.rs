//! Mirror an m3u8 manifest tree to local disk and, optionally, to object storage.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mirror_engine::{FetcherConfig, HttpFetcher, MirrorConfig, Traverser};
//!
//! # async fn run() -> Result<(), mirror_engine::MirrorError> {
//! let fetcher = Arc::new(HttpFetcher::new(&FetcherConfig::default())?);
//! let traverser = Traverser::new(MirrorConfig::new("output"), fetcher);
//! let result = traverser.traverse("https://example.com/vod/show/master.m3u8").await?;
//! println!("{} child manifests", result.manifests.len());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod path;
pub mod proxy;
pub mod storage;
pub mod traverser;

pub use classify::{ManifestClassifier, ManifestRefs};
pub use config::{FetcherConfig, MirrorConfig, RequestHeaders, UploadFailurePolicy};
pub use error::{ErrorKind, MirrorError};
pub use fetcher::{HttpFetcher, ResourceFetcher};
pub use path::{ManifestUrl, PathResolver, ResolvedLocation};
pub use proxy::{ProxyConfig, ProxyType};
pub use storage::{GcsStore, RemoteConfig, RemoteStore};
pub use traverser::{TraversalResult, TraversalStats, Traverser};
