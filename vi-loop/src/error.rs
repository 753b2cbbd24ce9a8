//! Error types for vi-loop
//!
//! Validation-time errors (`MetadataLoadFailure`, `NotPlayable`) end an asset
//! assignment before any queue mutation. Playback-time errors
//! (`PlaybackFailure`, `QueueExhausted`) stop the loop. None of them is
//! retried; a fresh asset assignment is the recovery path.

use crate::asset::{LoadError, MetadataKey};
use thiserror::Error;
use vi_common::events::HaltReason;

/// Main error type for vi-loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    /// A required asset property failed to load
    #[error("{key} failed to load")]
    MetadataLoadFailure {
        key: MetadataKey,
        #[source]
        error: Option<LoadError>,
    },

    /// Asset loaded but is unplayable or carries protected content
    #[error("asset is not playable or has protected content")]
    NotPlayable,

    /// Queue or current item reported a failed status during playback
    #[error("playback failed ({scope}){}", detail_suffix(.detail))]
    PlaybackFailure {
        scope: FailureScope,
        detail: Option<String>,
    },

    /// Current item went away with nothing left to replace it
    #[error("play queue emptied out, loop ended")]
    QueueExhausted,

    /// The owning service task is gone
    #[error("loop service stopped")]
    ServiceStopped,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Which observed object reported the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Player,
    Item,
}

impl std::fmt::Display for FailureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureScope::Player => write!(f, "player"),
            FailureScope::Item => write!(f, "item"),
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl LoopError {
    /// Message suitable for the error-presentation layer
    pub fn user_message(&self) -> String {
        match self {
            LoopError::MetadataLoadFailure { key, .. } => {
                format!("Can't use this asset because {} failed to load.", key)
            }
            LoopError::NotPlayable => {
                "Can't use this asset because it isn't playable or has protected content."
                    .to_string()
            }
            LoopError::PlaybackFailure { scope, .. } => {
                format!("Looping ended because the {} failed.", scope)
            }
            LoopError::QueueExhausted => {
                "Looping ended because the play queue emptied out.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for errors raised before anything was put in the queue
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            LoopError::MetadataLoadFailure { .. } | LoopError::NotPlayable
        )
    }

    /// Halt reason published for playback-time errors
    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            LoopError::PlaybackFailure {
                scope: FailureScope::Player,
                ..
            } => Some(HaltReason::PlayerFailed),
            LoopError::PlaybackFailure {
                scope: FailureScope::Item,
                ..
            } => Some(HaltReason::ItemFailed),
            LoopError::QueueExhausted => Some(HaltReason::QueueExhausted),
            _ => None,
        }
    }
}

impl From<vi_common::Error> for LoopError {
    fn from(err: vi_common::Error) -> Self {
        LoopError::Config(err.to_string())
    }
}

/// Convenience Result type using LoopError
pub type Result<T> = std::result::Result<T, LoopError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_metadata_failure_message_names_key() {
        let err = LoopError::MetadataLoadFailure {
            key: MetadataKey::Playable,
            error: Some(LoadError::new("network unreachable")),
        };
        assert_eq!(
            err.user_message(),
            "Can't use this asset because playable failed to load."
        );
        assert!(err.is_validation_error());
        assert_eq!(err.halt_reason(), None);
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("network unreachable".to_string())
        );
    }

    #[test]
    fn test_metadata_failure_without_underlying_error() {
        let err = LoopError::MetadataLoadFailure {
            key: MetadataKey::Duration,
            error: None,
        };
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "duration failed to load");
    }

    #[test]
    fn test_playback_failure_display() {
        let err = LoopError::PlaybackFailure {
            scope: FailureScope::Item,
            detail: Some("decoder error".to_string()),
        };
        assert_eq!(err.to_string(), "playback failed (item): decoder error");
        assert_eq!(err.halt_reason(), Some(HaltReason::ItemFailed));
        assert!(!err.is_validation_error());

        let err = LoopError::PlaybackFailure {
            scope: FailureScope::Player,
            detail: None,
        };
        assert_eq!(err.to_string(), "playback failed (player)");
        assert_eq!(err.halt_reason(), Some(HaltReason::PlayerFailed));
    }

    #[test]
    fn test_queue_exhausted_reason() {
        assert_eq!(
            LoopError::QueueExhausted.halt_reason(),
            Some(HaltReason::QueueExhausted)
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let err: LoopError = vi_common::Error::Config("bad level".to_string()).into();
        assert!(matches!(err, LoopError::Config(_)));
        assert!(err.to_string().contains("bad level"));
    }
}
