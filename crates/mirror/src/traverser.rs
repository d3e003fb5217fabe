//! Depth-first mirroring of a manifest tree.
//!
//! Each manifest is fetched, written to its directory and classified; its keys
//! and missing segments are then fetched next to it, and finally its child
//! manifests are visited in declaration order. The walk uses an explicit
//! stack, so tree depth never grows the call stack.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info, warn};

use crate::classify::{ManifestClassifier, extract_key_uri};
use crate::config::{MirrorConfig, UploadFailurePolicy};
use crate::dedup;
use crate::error::MirrorError;
use crate::fetcher::ResourceFetcher;
use crate::path::{ManifestUrl, PathResolver, ResolvedLocation, resource_filename};
use crate::storage::RemoteStore;

/// Counters collected over one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub manifests_written: usize,
    pub keys_fetched: usize,
    pub segments_fetched: usize,
    /// Segments already present locally and therefore not fetched
    pub segments_skipped: usize,
    pub files_uploaded: usize,
    /// Uploads that failed under [`UploadFailurePolicy::Continue`]
    pub upload_failures: usize,
}

/// Outcome of [`Traverser::traverse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalResult {
    /// Every manifest URL found below the root, depth-first in declaration
    /// order, fragments removed. The root itself is not included.
    pub manifests: Vec<String>,
    pub stats: TraversalStats,
}

pub struct Traverser {
    config: MirrorConfig,
    fetcher: Arc<dyn ResourceFetcher>,
    remote: Option<Arc<dyn RemoteStore>>,
    resolver: PathResolver,
    classifier: ManifestClassifier,
}

impl Traverser {
    pub fn new(config: MirrorConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        let resolver = PathResolver::new(config.output_root.clone(), None);
        let classifier =
            ManifestClassifier::new(config.segment_marker.clone(), config.manifest_marker.clone());
        Self {
            config,
            fetcher,
            remote: None,
            resolver,
            classifier,
        }
    }

    /// Replicate every written file to `store`, below the `remote_root` prefix.
    pub fn with_remote(mut self, store: Arc<dyn RemoteStore>, remote_root: impl Into<String>) -> Self {
        self.resolver = PathResolver::new(self.config.output_root.clone(), Some(remote_root.into()));
        self.remote = Some(store);
        self
    }

    /// Mirror the tree rooted at `root_url`.
    ///
    /// The first failing fetch, write or (under [`UploadFailurePolicy::Abort`])
    /// upload stops the traversal and is returned.
    pub async fn traverse(&self, root_url: &str) -> Result<TraversalResult, MirrorError> {
        self.config.validate()?;
        let mut root = url::Url::parse(root_url)
            .map_err(|e| MirrorError::invalid_url(root_url, e.to_string()))?;
        root.set_fragment(None);

        let mut result = TraversalResult::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut pending = vec![(ManifestUrl::new(root.as_str()), 0u32)];

        while let Some((url, depth)) = pending.pop() {
            if !visited.insert(url.as_str().to_string()) {
                debug!(url = %url, "Manifest already visited, skipping");
                continue;
            }
            if depth > self.config.max_depth {
                return Err(MirrorError::DepthExceeded {
                    url: url.as_str().to_string(),
                    depth,
                    max_depth: self.config.max_depth,
                });
            }
            if depth > 0 {
                result.manifests.push(url.as_str().to_string());
            }

            let children = self.mirror_manifest(&url, depth, &mut result.stats).await?;

            // Reversed so the first declared child is visited first.
            pending.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }

        info!(
            root = root_url,
            manifests = result.manifests.len() + 1,
            segments_fetched = result.stats.segments_fetched,
            segments_skipped = result.stats.segments_skipped,
            keys = result.stats.keys_fetched,
            uploads = result.stats.files_uploaded,
            "Traversal complete"
        );

        Ok(result)
    }

    /// Mirror one manifest and its keys and segments; returns its child manifests.
    async fn mirror_manifest(
        &self,
        url: &ManifestUrl,
        depth: u32,
        stats: &mut TraversalStats,
    ) -> Result<Vec<ManifestUrl>, MirrorError> {
        info!(url = %url, depth, "processing manifest");
        let payload = self.fetcher.fetch(url.as_str()).await?;

        let location = self.resolver.resolve(url, depth);
        location.ensure_local_dir().await?;

        let manifest_name = url.filename();
        let manifest_path = location.local_file(manifest_name);
        write_file(&manifest_path, &payload).await?;
        stats.manifests_written += 1;
        self.replicate(&manifest_path, location.remote_object(manifest_name), stats)
            .await?;

        let refs = self.classifier.classify(&String::from_utf8_lossy(&payload));
        debug!(
            url = %url,
            segments = refs.segments.len(),
            manifests = refs.manifests.len(),
            keys = refs.keys.len(),
            "Classified manifest"
        );

        for key_ref in &refs.keys {
            self.mirror_key(url, &location, key_ref, stats).await?;
        }

        self.mirror_segments(url, &location, refs.segments, stats)
            .await?;

        Ok(refs
            .manifests
            .iter()
            .filter_map(|line| child_reference(line))
            .map(|child| ManifestUrl::new(url.join(child)))
            .filter(|child| {
                let is_self = child == url;
                if is_self {
                    debug!(url = %url, "Manifest references itself, skipping");
                }
                !is_self
            })
            .collect())
    }

    async fn mirror_key(
        &self,
        manifest: &ManifestUrl,
        location: &ResolvedLocation,
        key_ref: &str,
        stats: &mut TraversalStats,
    ) -> Result<(), MirrorError> {
        let name = resource_filename(key_ref);
        if name.is_empty() {
            warn!(reference = key_ref, "Key reference has no filename, skipping");
            return Ok(());
        }

        let key_url = manifest.join(key_ref);
        info!(url = %key_url, "downloading key");
        let bytes = self.fetcher.fetch(&key_url).await?;

        let path = location.local_file(name);
        write_file(&path, &bytes).await?;
        stats.keys_fetched += 1;

        self.replicate(&path, location.remote_object(name), stats).await
    }

    async fn mirror_segments(
        &self,
        manifest: &ManifestUrl,
        location: &ResolvedLocation,
        segment_refs: Vec<String>,
        stats: &mut TraversalStats,
    ) -> Result<(), MirrorError> {
        // One download per target file, even if the manifest repeats a segment.
        let mut names = HashSet::new();
        let unique: Vec<String> = segment_refs
            .into_iter()
            .filter(|r| {
                let name = resource_filename(r);
                if name.is_empty() {
                    warn!(reference = %r, "Segment reference has no filename, skipping");
                    return false;
                }
                names.insert(name.to_string())
            })
            .collect();

        let total = unique.len();
        let missing =
            dedup::filter_new(unique, &location.local_dir, &self.config.segment_marker).await?;
        stats.segments_skipped += total - missing.len();

        info!(
            manifest = %manifest,
            existing = total - missing.len(),
            to_fetch = missing.len(),
            "Segment plan"
        );

        let fetched = stream::iter(
            missing
                .iter()
                .map(|segment_ref| self.mirror_segment(manifest, location, segment_ref)),
        )
        .buffer_unordered(self.config.max_concurrent_fetches)
        .try_fold(0usize, |count, ()| async move { Ok(count + 1) })
        .await?;
        stats.segments_fetched += fetched;

        if self.remote.is_some() {
            // Everything on disk goes up, not just this run's downloads, so an
            // interrupted earlier upload heals on the next run.
            let on_disk =
                dedup::list_segment_files(&location.local_dir, &self.config.segment_marker).await?;
            for name in &on_disk {
                self.replicate(&location.local_file(name), location.remote_object(name), stats)
                    .await?;
            }
        }

        Ok(())
    }

    async fn mirror_segment(
        &self,
        manifest: &ManifestUrl,
        location: &ResolvedLocation,
        segment_ref: &str,
    ) -> Result<(), MirrorError> {
        let segment_url = manifest.join(segment_ref);
        info!(url = %segment_url, "downloading");
        let bytes = self.fetcher.fetch(&segment_url).await?;
        write_file(&location.local_file(resource_filename(segment_ref)), &bytes).await
    }

    async fn replicate(
        &self,
        local: &Path,
        remote: Option<String>,
        stats: &mut TraversalStats,
    ) -> Result<(), MirrorError> {
        let (Some(store), Some(remote)) = (&self.remote, remote) else {
            return Ok(());
        };

        match store.upload(local, &remote).await {
            Ok(()) => {
                stats.files_uploaded += 1;
                Ok(())
            }
            Err(e) if self.config.upload_failure_policy == UploadFailurePolicy::Continue => {
                warn!(
                    local = %local.display(),
                    remote = %remote,
                    destination = %store.describe(),
                    error = %e,
                    "Upload failed, continuing with local copy"
                );
                stats.upload_failures += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Location named by a child-manifest line.
///
/// Tag lines such as `#EXT-X-MEDIA` or `#EXT-X-I-FRAME-STREAM-INF` carry the
/// manifest in their `URI` attribute; a tag line without one names nothing.
fn child_reference(line: &str) -> Option<&str> {
    if !line.starts_with('#') {
        return Some(line);
    }
    let uri = extract_key_uri(line);
    if uri.is_none() {
        debug!(line, "Tag line without a URI attribute, skipping");
    }
    uri
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), MirrorError> {
    debug!(path = %path.display(), size = contents.len(), "writing file");
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| MirrorError::filesystem(path, e))
}
