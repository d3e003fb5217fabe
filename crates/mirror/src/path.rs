//! Mapping from manifest URLs to local directories and remote object paths.
//!
//! A manifest at `https://host/a/b/index.m3u8` lives in directory `b` (its
//! folder). Below the root, the folder above it (`a`, the parent folder) is
//! also kept so that sibling renditions sharing a folder name stay apart.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::MirrorError;

/// Strip a trailing `?query` (and `#fragment`) from a reference.
pub fn strip_query(reference: &str) -> &str {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    &reference[..end]
}

/// Local filename for a referenced resource: its last path segment without query.
pub fn resource_filename(reference: &str) -> &str {
    let path = strip_query(reference);
    path.rsplit('/').next().unwrap_or(path)
}

/// URL of a manifest together with the path attributes derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestUrl {
    raw: String,
}

impl ManifestUrl {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segments(&self) -> Vec<&str> {
        strip_query(&self.raw).split('/').collect()
    }

    /// Everything up to and including the last `/`, used to resolve relative references.
    pub fn base(&self) -> &str {
        let path = strip_query(&self.raw);
        match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "",
        }
    }

    /// Last path segment, query stripped.
    pub fn filename(&self) -> &str {
        resource_filename(&self.raw)
    }

    /// Second-to-last path segment: the manifest's own directory name.
    pub fn folder(&self) -> Option<&str> {
        self.segment_from_end(2)
    }

    /// Third-to-last path segment.
    pub fn parent_folder(&self) -> Option<&str> {
        self.segment_from_end(3)
    }

    fn segment_from_end(&self, n: usize) -> Option<&str> {
        let segments = self.segments();
        segments
            .len()
            .checked_sub(n)
            .map(|idx| segments[idx])
            .filter(|s| !s.is_empty())
    }

    /// Resolve a reference found inside this manifest.
    ///
    /// Relative references are resolved against [`Self::base`] with dot
    /// segments removed, so `..` can never become a local folder name.
    /// Absolute references are used as they are. Fragments are dropped: they
    /// never reach the server and would otherwise make one resource look like
    /// several.
    pub fn join(&self, reference: &str) -> String {
        match url::Url::parse(&self.raw).and_then(|base| base.join(reference)) {
            Ok(mut joined) => {
                joined.set_fragment(None);
                joined.to_string()
            }
            Err(_) => format!("{}{}", self.base(), reference),
        }
    }
}

impl std::fmt::Display for ManifestUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Local directory and optional remote prefix assigned to one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub local_dir: PathBuf,
    pub remote_dir: Option<String>,
}

impl ResolvedLocation {
    pub fn local_file(&self, filename: &str) -> PathBuf {
        self.local_dir.join(filename)
    }

    pub fn remote_object(&self, filename: &str) -> Option<String> {
        self.remote_dir
            .as_deref()
            .map(|dir| join_remote([Some(dir), Some(filename)]))
    }

    /// Create the local directory and any missing ancestors.
    pub async fn ensure_local_dir(&self) -> Result<(), MirrorError> {
        create_dirs(&self.local_dir).await
    }
}

pub async fn create_dirs(dir: &Path) -> Result<(), MirrorError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| MirrorError::filesystem(dir, e))
}

fn join_remote<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Computes where the files of a manifest go, locally and remotely.
#[derive(Debug, Clone)]
pub struct PathResolver {
    local_root: PathBuf,
    remote_root: Option<String>,
}

impl PathResolver {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: Option<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root,
        }
    }

    pub fn resolve(&self, url: &ManifestUrl, depth: u32) -> ResolvedLocation {
        let folder = url.folder();
        let parent = if depth > 0 { url.parent_folder() } else { None };

        let mut local_dir = self.local_root.clone();
        for component in [parent, folder].into_iter().flatten() {
            local_dir.push(component);
        }

        let remote_dir = self
            .remote_root
            .as_deref()
            .map(|root| join_remote([Some(root), parent, folder]));

        debug!(url = %url, depth, local_dir = %local_dir.display(), ?remote_dir, "Resolved manifest location");

        ResolvedLocation {
            local_dir,
            remote_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_url_attributes() {
        let url = ManifestUrl::new("https://cdn.example.com/show/ep1/720p/index.m3u8?token=1");

        assert_eq!(url.base(), "https://cdn.example.com/show/ep1/720p/");
        assert_eq!(url.filename(), "index.m3u8");
        assert_eq!(url.folder(), Some("720p"));
        assert_eq!(url.parent_folder(), Some("ep1"));
    }

    #[test]
    fn query_with_slashes_does_not_shift_folders() {
        let url = ManifestUrl::new("https://h/a/b/index.m3u8?redirect=/x/y");
        assert_eq!(url.folder(), Some("b"));
        assert_eq!(url.filename(), "index.m3u8");
    }

    #[test]
    fn resource_filename_strips_query_and_directories() {
        assert_eq!(resource_filename("seg001.ts?token=abc"), "seg001.ts");
        assert_eq!(resource_filename("keys/key.bin?x=1"), "key.bin");
        assert_eq!(resource_filename("https://h/a/seg.ts"), "seg.ts");
        assert_eq!(resource_filename("plain.ts"), "plain.ts");
    }

    #[test]
    fn join_appends_relative_and_keeps_absolute() {
        let url = ManifestUrl::new("https://h/a/b/index.m3u8");
        assert_eq!(url.join("720p/index.m3u8"), "https://h/a/b/720p/index.m3u8");
        assert_eq!(url.join("seg1.ts?t=1"), "https://h/a/b/seg1.ts?t=1");
        assert_eq!(url.join("https://other/k.key"), "https://other/k.key");
    }

    #[test]
    fn join_normalizes_dot_segments_and_drops_base_query() {
        let url = ManifestUrl::new("https://h/a/b/index.m3u8?sig=1");
        assert_eq!(url.join("../c/index.m3u8"), "https://h/a/c/index.m3u8");
        assert_eq!(url.join("/root.m3u8"), "https://h/root.m3u8");
        assert_eq!(url.join("key.bin?v=2"), "https://h/a/b/key.bin?v=2");
    }

    #[test]
    fn join_drops_fragments() {
        let url = ManifestUrl::new("https://h/a/b/master.m3u8");
        assert_eq!(url.join("#EXT-X-MEDIA:TYPE=AUDIO"), "https://h/a/b/master.m3u8");
        assert_eq!(url.join("720p/index.m3u8#t=10"), "https://h/a/b/720p/index.m3u8");
    }

    #[test]
    fn join_falls_back_to_concatenation_for_relative_manifests() {
        let url = ManifestUrl::new("vod/show/index.m3u8");
        assert_eq!(url.join("seg1.ts"), "vod/show/seg1.ts");
    }

    #[test]
    fn root_depth_omits_parent_folder() {
        let resolver = PathResolver::new("output", Some("mirror".to_string()));
        let url = ManifestUrl::new("https://h/a/b/index.m3u8");

        let root = resolver.resolve(&url, 0);
        assert_eq!(root.local_dir, PathBuf::from("output").join("b"));
        assert_eq!(root.remote_dir.as_deref(), Some("mirror/b"));

        let nested = resolver.resolve(&url, 1);
        assert_eq!(nested.local_dir, PathBuf::from("output").join("a").join("b"));
        assert_eq!(nested.remote_dir.as_deref(), Some("mirror/a/b"));
        assert_eq!(
            nested.remote_object("seg1.ts").as_deref(),
            Some("mirror/a/b/seg1.ts")
        );
    }

    #[test]
    fn resolution_is_deterministic_and_remote_root_only_changes_remote() {
        let url = ManifestUrl::new("https://h/a/b/c/index.m3u8");
        let with_remote = PathResolver::new("out", Some("bucket-folder/".to_string()));
        let other_remote = PathResolver::new("out", Some("elsewhere".to_string()));
        let local_only = PathResolver::new("out", None);

        let first = with_remote.resolve(&url, 2);
        assert_eq!(first, with_remote.resolve(&url, 2));

        let second = other_remote.resolve(&url, 2);
        let third = local_only.resolve(&url, 2);
        assert_eq!(first.local_dir, second.local_dir);
        assert_eq!(first.local_dir, third.local_dir);
        assert_eq!(first.remote_dir.as_deref(), Some("bucket-folder/b/c"));
        assert_eq!(second.remote_dir.as_deref(), Some("elsewhere/b/c"));
        assert_eq!(third.remote_dir, None);
        assert_eq!(third.remote_object("x.ts"), None);
    }

    #[tokio::test]
    async fn ensure_local_dir_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(temp.path(), None);
        let location = resolver.resolve(&ManifestUrl::new("https://h/a/b/index.m3u8"), 1);

        location.ensure_local_dir().await.unwrap();
        location.ensure_local_dir().await.unwrap();
        assert!(location.local_dir.is_dir());
    }
}
