//! Event types for the Vi notice system
//!
//! Provides the external notice definitions and the EventBus shared by the
//! loop service and anything presenting its state.

mod state_types;

pub use state_types::{HaltReason, LoopState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notices published by a loop controller
///
/// Notices are broadcast via EventBus and can be serialized (JSON lines in the
/// CLI). They describe what happened; they are never fed back into the
/// controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoopNotice {
    /// Derived controller state changed
    StateChanged {
        /// State before the change
        old_state: LoopState,
        /// State after the change
        new_state: LoopState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Validation rejected the assigned asset
    ///
    /// Terminal for that assignment; a fresh assignment is the only recovery.
    AssetRejected {
        /// Rejected asset
        asset_id: Uuid,
        /// Human-readable reason
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback stopped because of a failure after validation
    PlaybackHalted {
        /// Asset that was looping (None if the asset was already cleared)
        asset_id: Option<Uuid>,
        reason: HaltReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A finished item was put back at the tail of the queue
    LoopRestarted {
        asset_id: Uuid,
        /// Number of completed passes so far (1 after the first)
        iteration: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic playback position
    PlaybackProgress {
        asset_id: Uuid,
        position_secs: f64,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LoopNotice {
    /// Short type name, matches the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            LoopNotice::StateChanged { .. } => "StateChanged",
            LoopNotice::AssetRejected { .. } => "AssetRejected",
            LoopNotice::PlaybackHalted { .. } => "PlaybackHalted",
            LoopNotice::LoopRestarted { .. } => "LoopRestarted",
            LoopNotice::PlaybackProgress { .. } => "PlaybackProgress",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central distribution bus for loop notices
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the controller)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use vi_common::events::{EventBus, LoopNotice, LoopState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(LoopNotice::StateChanged {
///     old_state: LoopState::NoAsset,
///     new_state: LoopState::Validating,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoopNotice>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of notices to buffer before dropping old ones.
    ///   Must be greater than zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future notices
    ///
    /// Notices emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LoopNotice> {
        self.tx.subscribe()
    }

    /// Emit a notice to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        notice: LoopNotice,
    ) -> Result<usize, broadcast::error::SendError<LoopNotice>> {
        self.tx.send(notice)
    }

    /// Emit a notice, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, notice: LoopNotice) {
        let _ = self.tx.send(notice);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(old_state: LoopState, new_state: LoopState) -> LoopNotice {
        LoopNotice::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus
            .emit(state_changed(LoopState::NoAsset, LoopState::Validating))
            .is_err());

        // Lossy variant never fails
        bus.emit_lossy(state_changed(LoopState::NoAsset, LoopState::Validating));
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(
            bus.emit(state_changed(LoopState::Ready, LoopState::Playing))
                .unwrap(),
            1
        );

        match rx.recv().await.unwrap() {
            LoopNotice::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, LoopState::Ready);
                assert_eq!(new_state, LoopState::Playing);
            }
            other => panic!("Wrong notice received: {:?}", other),
        }
    }

    #[test]
    fn test_notice_serializes_with_type_tag() {
        let notice = LoopNotice::PlaybackHalted {
            asset_id: None,
            reason: HaltReason::QueueExhausted,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["type"], "PlaybackHalted");
        assert_eq!(json["reason"], "queue_exhausted");
        assert_eq!(notice.event_type(), "PlaybackHalted");
    }

    #[test]
    fn test_loop_state_display_matches_serde() {
        for state in [
            LoopState::NoAsset,
            LoopState::Validating,
            LoopState::Ready,
            LoopState::Playing,
            LoopState::Paused,
            LoopState::Failed,
        ] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json.as_str().unwrap(), state.to_string());
        }
    }

    #[test]
    fn test_loop_state_has_item() {
        assert!(LoopState::Ready.has_item());
        assert!(LoopState::Playing.has_item());
        assert!(LoopState::Paused.has_item());
        assert!(!LoopState::NoAsset.has_item());
        assert!(!LoopState::Validating.has_item());
        assert!(!LoopState::Failed.has_item());
    }
}
