//! Assets and asynchronous metadata loading
//!
//! An [`Asset`] is an opaque, identity-compared handle. Two handles are equal
//! only if they were cloned from the same [`Asset::new`] call, regardless of
//! the source they point at. The loadable metadata is not part of the handle;
//! a [`MetadataLoader`] produces it asynchronously as a [`LoadReport`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity of an asset handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(Uuid);

impl AssetId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID (used in published notices)
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct AssetInner {
    id: AssetId,
    source: String,
}

/// Opaque handle to a playable media source
#[derive(Debug, Clone)]
pub struct Asset {
    inner: Arc<AssetInner>,
}

impl Asset {
    /// Create a new handle with a fresh identity
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AssetInner {
                id: AssetId::new(),
                source: source.into(),
            }),
        }
    }

    pub fn id(&self) -> AssetId {
        self.inner.id
    }

    /// Where the media lives (URL or path), informational only
    pub fn source(&self) -> &str {
        &self.inner.source
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Asset {}

/// Metadata keys that must load before an asset may play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKey {
    #[serde(rename = "duration")]
    Duration,
    #[serde(rename = "playable")]
    Playable,
    #[serde(rename = "hasProtectedContent")]
    HasProtectedContent,
}

impl MetadataKey {
    /// Keys required to play, in the order their load status is checked
    pub const REQUIRED: [MetadataKey; 3] = [
        MetadataKey::Duration,
        MetadataKey::Playable,
        MetadataKey::HasProtectedContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::Duration => "duration",
            MetadataKey::Playable => "playable",
            MetadataKey::HasProtectedContent => "hasProtectedContent",
        }
    }
}

impl std::fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetadataKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MetadataKey::REQUIRED
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown metadata key '{}'", s))
    }
}

/// Underlying error reported by a loader for one key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LoadError {
    message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Load status of a single key after loading finished
#[derive(Debug, Clone, PartialEq)]
pub enum KeyStatus {
    Loaded,
    /// Loading failed; the error is optional because some engines give none
    Failed(Option<LoadError>),
    Cancelled,
}

/// Property values known once loading finished
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetProperties {
    pub duration_secs: f64,
    pub playable: bool,
    pub has_protected_content: bool,
}

impl Default for AssetProperties {
    /// Unknown values: zero duration, not playable
    fn default() -> Self {
        Self {
            duration_secs: 0.0,
            playable: false,
            has_protected_content: false,
        }
    }
}

/// Outcome of one asynchronous load request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    statuses: Vec<(MetadataKey, KeyStatus)>,
    properties: AssetProperties,
}

impl LoadReport {
    /// Report with every required key loaded
    pub fn loaded(properties: AssetProperties) -> Self {
        Self {
            statuses: MetadataKey::REQUIRED
                .into_iter()
                .map(|key| (key, KeyStatus::Loaded))
                .collect(),
            properties,
        }
    }

    /// Replace the status of one key
    pub fn with_status(mut self, key: MetadataKey, status: KeyStatus) -> Self {
        match self.statuses.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = status,
            None => self.statuses.push((key, status)),
        }
        self
    }

    /// Status of a key; `None` if the loader did not report it
    pub fn status(&self, key: MetadataKey) -> Option<&KeyStatus> {
        self.statuses
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, status)| status)
    }

    pub fn properties(&self) -> AssetProperties {
        self.properties
    }
}

/// Capability to load named metadata keys on an asset
///
/// Implementations may complete on any thread; the caller is responsible for
/// bringing the report back to the controller's owner task.
#[async_trait]
pub trait MetadataLoader: Send + Sync + 'static {
    async fn load_values(&self, asset: &Asset, keys: &[MetadataKey]) -> LoadReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_identity_not_content() {
        let a = Asset::new("file:///clip.mov");
        let b = Asset::new("file:///clip.mov");
        let a2 = a.clone();

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn test_required_key_order() {
        assert_eq!(
            MetadataKey::REQUIRED,
            [
                MetadataKey::Duration,
                MetadataKey::Playable,
                MetadataKey::HasProtectedContent
            ]
        );
    }

    #[test]
    fn test_metadata_key_parse() {
        assert_eq!(
            "hasprotectedcontent".parse::<MetadataKey>().unwrap(),
            MetadataKey::HasProtectedContent
        );
        assert_eq!("duration".parse::<MetadataKey>().unwrap(), MetadataKey::Duration);
        assert!("bitrate".parse::<MetadataKey>().is_err());
    }

    #[test]
    fn test_report_with_status_overrides() {
        let report = LoadReport::loaded(AssetProperties::default())
            .with_status(MetadataKey::Playable, KeyStatus::Cancelled);

        assert_eq!(report.status(MetadataKey::Duration), Some(&KeyStatus::Loaded));
        assert_eq!(report.status(MetadataKey::Playable), Some(&KeyStatus::Cancelled));
    }

    #[test]
    fn test_empty_report_has_no_statuses() {
        let report = LoadReport::default();
        assert!(report.status(MetadataKey::Duration).is_none());
        assert!(!report.properties().playable);
    }
}
