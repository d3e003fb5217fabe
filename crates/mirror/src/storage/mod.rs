//! Remote replication of mirrored files.

mod gcs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::MirrorError;

pub use gcs::{GcsStore, ServiceAccountKey};

/// Destination that receives a copy of every locally written file.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload the file at `local` to the object path `remote`, replacing any existing object.
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), MirrorError>;

    /// Human readable destination, e.g. `gs://bucket`.
    fn describe(&self) -> String;
}

/// Settings for the object-storage destination.
///
/// Bucket, project, destination folder and credentials only make sense
/// together; [`RemoteConfig::from_parts`] rejects any partial combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub bucket: String,
    pub project: String,
    /// Prefix under which the mirrored tree is placed
    pub folder: String,
    /// Path to a service-account JSON key
    pub credentials: PathBuf,
}

impl RemoteConfig {
    pub fn from_parts(
        bucket: Option<String>,
        project: Option<String>,
        folder: Option<String>,
        credentials: Option<PathBuf>,
    ) -> Result<Option<Self>, MirrorError> {
        match (bucket, project, folder, credentials) {
            (None, None, None, None) => Ok(None),
            (Some(bucket), Some(project), Some(folder), Some(credentials)) => Ok(Some(Self {
                bucket,
                project,
                folder,
                credentials,
            })),
            (bucket, project, folder, credentials) => {
                let missing: Vec<&str> = [
                    ("bucket", bucket.is_none()),
                    ("project", project.is_none()),
                    ("folder", folder.is_none()),
                    ("credentials", credentials.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();

                Err(MirrorError::configuration(format!(
                    "incomplete remote storage settings, missing: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}
