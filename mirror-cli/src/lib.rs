//! Library target for the `m3u8-mirror` package.
//!
//! The binary (`src/main.rs`) only parses arguments, sets up logging and
//! reports the outcome; everything else lives here so it can be tested.

pub mod cli;
pub mod error;
pub mod utils;

use std::sync::Arc;

use mirror_engine::{GcsStore, HttpFetcher, TraversalResult, Traverser};
use tracing::info;

use crate::cli::Args;
use crate::error::AppError;

/// Validate the arguments, wire up the engine and mirror the tree.
///
/// All configuration problems are reported before the first request is sent.
pub async fn run(args: &Args) -> Result<TraversalResult, AppError> {
    let remote = args.remote_config()?;
    let config = args.mirror_config();
    config.validate()?;
    let fetcher_config = args.fetcher_config()?;

    let fetcher = Arc::new(HttpFetcher::new(&fetcher_config)?);
    let mut traverser = Traverser::new(config, fetcher);

    if let Some(remote) = remote {
        let store = GcsStore::from_config(&remote).await?;
        traverser = traverser.with_remote(Arc::new(store), remote.folder.clone());
    }

    info!(
        url = %args.url,
        output = %args.output.display(),
        concurrency = args.concurrency,
        "Starting mirror"
    );

    Ok(traverser.traverse(&args.url).await?)
}
