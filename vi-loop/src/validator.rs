//! Asynchronous asset validation
//!
//! **Responsibilities:**
//! - Request the required metadata keys from a [`MetadataLoader`]
//! - Turn the load report into a [`ValidationResult`]
//! - Hand completions back to the owner task over a channel
//!
//! The validator never decides whether a result is still wanted; the
//! controller compares the completion's asset against its current asset when
//! the completion arrives.

use crate::asset::{Asset, KeyStatus, LoadError, LoadReport, MetadataKey, MetadataLoader};
use crate::error::LoopError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outcome of validating one asset
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Ready {
        duration_secs: f64,
        playable: bool,
        has_protected_content: bool,
    },
    Failed(ValidationFailure),
}

/// Why validation rejected an asset
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// First required key (in check order) whose load failed
    MetadataLoad {
        key: MetadataKey,
        error: Option<LoadError>,
    },
    /// Everything loaded, but the asset cannot be played
    NotPlayable,
}

impl From<ValidationFailure> for LoopError {
    fn from(failure: ValidationFailure) -> Self {
        match failure {
            ValidationFailure::MetadataLoad { key, error } => {
                LoopError::MetadataLoadFailure { key, error }
            }
            ValidationFailure::NotPlayable => LoopError::NotPlayable,
        }
    }
}

impl ValidationResult {
    /// Evaluate a finished load report
    ///
    /// Key statuses are checked in [`MetadataKey::REQUIRED`] order and the
    /// first failure wins; later keys are not looked at. Only an explicit
    /// failure rejects; cancelled or unreported keys fall through to the
    /// playability check.
    pub fn from_report(report: &LoadReport) -> Self {
        for key in MetadataKey::REQUIRED {
            if let Some(KeyStatus::Failed(error)) = report.status(key) {
                return ValidationResult::Failed(ValidationFailure::MetadataLoad {
                    key,
                    error: error.clone(),
                });
            }
        }

        let properties = report.properties();
        if !properties.playable || properties.has_protected_content {
            return ValidationResult::Failed(ValidationFailure::NotPlayable);
        }

        ValidationResult::Ready {
            duration_secs: properties.duration_secs,
            playable: properties.playable,
            has_protected_content: properties.has_protected_content,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ValidationResult::Ready { .. })
    }
}

/// Validation result tagged with the asset it was computed for
#[derive(Debug, Clone)]
pub struct ValidationCompletion {
    pub asset: Asset,
    pub result: ValidationResult,
}

/// Validates assets against a metadata loader
#[derive(Clone)]
pub struct AssetValidator {
    loader: Arc<dyn MetadataLoader>,
}

impl std::fmt::Debug for AssetValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetValidator").finish_non_exhaustive()
    }
}

impl AssetValidator {
    pub fn new(loader: Arc<dyn MetadataLoader>) -> Self {
        Self { loader }
    }

    /// Load the required keys and evaluate them
    pub async fn validate(&self, asset: &Asset) -> ValidationResult {
        let report = self
            .loader
            .load_values(asset, &MetadataKey::REQUIRED)
            .await;
        ValidationResult::from_report(&report)
    }

    /// Validate on a background task and post the completion to `completions`
    ///
    /// Must be called from within a tokio runtime. The spawned task touches no
    /// controller state; the receiver side decides whether to apply the result.
    pub fn spawn(&self, asset: Asset, completions: mpsc::UnboundedSender<ValidationCompletion>) {
        let validator = self.clone();
        tokio::spawn(async move {
            let result = validator.validate(&asset).await;
            debug!(asset_id = %asset.id(), ready = result.is_ready(), "Validation finished");
            if completions
                .send(ValidationCompletion { asset, result })
                .is_err()
            {
                debug!("Validation completion dropped: controller is gone");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetProperties;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn playable() -> AssetProperties {
        AssetProperties {
            duration_secs: 10.0,
            playable: true,
            has_protected_content: false,
        }
    }

    /// Loader returning a fixed report and recording requested keys
    struct FixedLoader {
        report: LoadReport,
        requested: Mutex<Vec<Vec<MetadataKey>>>,
    }

    impl FixedLoader {
        fn new(report: LoadReport) -> Arc<Self> {
            Arc::new(Self {
                report,
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MetadataLoader for FixedLoader {
        async fn load_values(&self, _asset: &Asset, keys: &[MetadataKey]) -> LoadReport {
            self.requested.lock().unwrap().push(keys.to_vec());
            self.report.clone()
        }
    }

    #[test]
    fn test_all_loaded_and_playable_is_ready() {
        let result = ValidationResult::from_report(&LoadReport::loaded(playable()));
        assert_eq!(
            result,
            ValidationResult::Ready {
                duration_secs: 10.0,
                playable: true,
                has_protected_content: false,
            }
        );
    }

    #[test]
    fn test_first_failed_key_wins() {
        // Both duration and playable fail: duration is checked first
        let report = LoadReport::loaded(playable())
            .with_status(MetadataKey::Playable, KeyStatus::Failed(Some(LoadError::new("b"))))
            .with_status(MetadataKey::Duration, KeyStatus::Failed(Some(LoadError::new("a"))));

        assert_eq!(
            ValidationResult::from_report(&report),
            ValidationResult::Failed(ValidationFailure::MetadataLoad {
                key: MetadataKey::Duration,
                error: Some(LoadError::new("a")),
            })
        );
    }

    #[test]
    fn test_protected_content_key_failure() {
        let report = LoadReport::loaded(playable())
            .with_status(MetadataKey::HasProtectedContent, KeyStatus::Failed(None));

        assert_eq!(
            ValidationResult::from_report(&report),
            ValidationResult::Failed(ValidationFailure::MetadataLoad {
                key: MetadataKey::HasProtectedContent,
                error: None,
            })
        );
    }

    #[test]
    fn test_key_failure_reported_before_playability() {
        // Not playable AND a key failed: the key failure is what gets reported
        let report = LoadReport::loaded(AssetProperties::default())
            .with_status(MetadataKey::Playable, KeyStatus::Failed(None));

        assert!(matches!(
            ValidationResult::from_report(&report),
            ValidationResult::Failed(ValidationFailure::MetadataLoad {
                key: MetadataKey::Playable,
                ..
            })
        ));
    }

    #[test]
    fn test_not_playable() {
        let report = LoadReport::loaded(AssetProperties {
            playable: false,
            ..playable()
        });
        assert_eq!(
            ValidationResult::from_report(&report),
            ValidationResult::Failed(ValidationFailure::NotPlayable)
        );
    }

    #[test]
    fn test_protected_content_not_playable() {
        let report = LoadReport::loaded(AssetProperties {
            has_protected_content: true,
            ..playable()
        });
        assert_eq!(
            ValidationResult::from_report(&report),
            ValidationResult::Failed(ValidationFailure::NotPlayable)
        );
    }

    #[test]
    fn test_cancelled_key_does_not_reject() {
        let report = LoadReport::loaded(playable())
            .with_status(MetadataKey::Duration, KeyStatus::Cancelled);
        assert!(ValidationResult::from_report(&report).is_ready());
    }

    #[test]
    fn test_failure_converts_to_loop_error() {
        let err: LoopError = ValidationFailure::NotPlayable.into();
        assert_eq!(err, LoopError::NotPlayable);

        let err: LoopError = ValidationFailure::MetadataLoad {
            key: MetadataKey::Playable,
            error: None,
        }
        .into();
        assert!(matches!(
            err,
            LoopError::MetadataLoadFailure {
                key: MetadataKey::Playable,
                error: None
            }
        ));
    }

    #[tokio::test]
    async fn test_validate_requests_required_keys() {
        let loader = FixedLoader::new(LoadReport::loaded(playable()));
        let validator = AssetValidator::new(loader.clone());

        let result = validator.validate(&Asset::new("clip")).await;
        assert!(result.is_ready());
        assert_eq!(
            *loader.requested.lock().unwrap(),
            vec![MetadataKey::REQUIRED.to_vec()]
        );
    }

    #[tokio::test]
    async fn test_spawn_posts_completion_for_same_asset() {
        let loader = FixedLoader::new(LoadReport::loaded(playable()));
        let validator = AssetValidator::new(loader);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let asset = Asset::new("clip");
        validator.spawn(asset.clone(), tx);

        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.asset, asset);
        assert!(completion.result.is_ready());
    }
}
