//! Observation hub
//!
//! Owns the watches installed on the playback queue and turns the raw
//! notifications they forward into [`LoopEvent`]s for the controller.
//!
//! **Invariants:**
//! - At most one [`ObservationSubscription`] exists at a time; starting while
//!   observing and stopping while not observing are no-ops.
//! - Every subscription carries the hub's current [`Epoch`]. [`ObservationHub::reset`]
//!   advances the epoch, and notifications from an older epoch are dropped by
//!   [`ObservationHub::translate`], so a torn-down subscription can never
//!   deliver a late callback into the next asset's lifetime.
//! - Stopping and restarting within one epoch keeps already-forwarded
//!   notifications valid; they are delivered in the order the queue emitted
//!   them.

use crate::queue::{
    Epoch, ItemStatus, ObservedChange, PlayableItem, PlaybackQueue, PlayerStatus,
    QueueNotification, WatchKind, WatchSink, WatchToken,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Discrete events delivered to the loop controller
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// Queue-level status became failed
    PlayerFailed,
    /// Current item identity changed; carries the displaced item if any
    CurrentItemChanged(Option<PlayableItem>),
    /// The current item's own status became failed
    CurrentItemFailed,
}

/// The set of watches installed by one `start_observing` call
#[derive(Debug)]
pub struct ObservationSubscription {
    epoch: Epoch,
    tokens: Vec<(WatchKind, WatchToken)>,
}

impl ObservationSubscription {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn kinds(&self) -> Vec<WatchKind> {
        self.tokens.iter().map(|(kind, _)| *kind).collect()
    }
}

/// Subscription lifecycle and notification translation
#[derive(Debug)]
pub struct ObservationHub {
    tx: mpsc::UnboundedSender<ObservedChange>,
    epoch: Epoch,
    subscription: Option<ObservationSubscription>,
}

impl ObservationHub {
    /// Create a hub forwarding into `tx`
    ///
    /// The matching receiver must be drained on the controller's owner task.
    pub fn new(tx: mpsc::UnboundedSender<ObservedChange>) -> Self {
        Self {
            tx,
            epoch: Epoch(0),
            subscription: None,
        }
    }

    pub fn is_observing(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn subscription(&self) -> Option<&ObservationSubscription> {
        self.subscription.as_ref()
    }

    /// Install the three watches (player status, current item, current item status)
    pub fn start_observing<Q: PlaybackQueue + ?Sized>(&mut self, queue: &mut Q) {
        if self.subscription.is_some() {
            trace!("start_observing: already observing");
            return;
        }

        let tokens = WatchKind::ALL
            .into_iter()
            .map(|kind| {
                let sink = WatchSink::new(self.epoch, self.tx.clone());
                (kind, queue.add_watch(kind, sink))
            })
            .collect();

        self.subscription = Some(ObservationSubscription {
            epoch: self.epoch,
            tokens,
        });
        trace!(epoch = self.epoch.0, "Observation started");
    }

    /// Remove all watches of the active subscription
    pub fn stop_observing<Q: PlaybackQueue + ?Sized>(&mut self, queue: &mut Q) {
        let Some(subscription) = self.subscription.take() else {
            trace!("stop_observing: not observing");
            return;
        };

        for (_, token) in subscription.tokens {
            queue.remove_watch(token);
        }
        trace!(epoch = subscription.epoch.0, "Observation stopped");
    }

    /// Stop observing and retire the current epoch
    ///
    /// Anything the old watches already forwarded is discarded on arrival.
    pub fn reset<Q: PlaybackQueue + ?Sized>(&mut self, queue: &mut Q) {
        self.stop_observing(queue);
        self.epoch = Epoch(self.epoch.0 + 1);
        debug!(epoch = self.epoch.0, "Observation epoch advanced");
    }

    /// Map a forwarded notification to a controller event
    ///
    /// Returns `None` for stale epochs and for status changes that are not
    /// failures.
    pub fn translate(&self, change: ObservedChange) -> Option<LoopEvent> {
        if change.epoch != self.epoch {
            debug!(
                stale = change.epoch.0,
                current = self.epoch.0,
                "Dropping notification from a retired subscription"
            );
            return None;
        }

        match change.notification {
            QueueNotification::PlayerStatusChanged(PlayerStatus::Failed) => {
                Some(LoopEvent::PlayerFailed)
            }
            QueueNotification::PlayerStatusChanged(_) => None,
            QueueNotification::CurrentItemChanged { previous } => {
                Some(LoopEvent::CurrentItemChanged(previous))
            }
            QueueNotification::CurrentItemStatusChanged(ItemStatus::Failed) => {
                Some(LoopEvent::CurrentItemFailed)
            }
            QueueNotification::CurrentItemStatusChanged(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use crate::sim::SimulatedQueuePlayer;

    fn hub() -> (ObservationHub, mpsc::UnboundedReceiver<ObservedChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ObservationHub::new(tx), rx)
    }

    #[test]
    fn test_start_installs_three_watches_once() {
        let (mut hub, _rx) = hub();
        let mut queue = SimulatedQueuePlayer::new();

        hub.start_observing(&mut queue);
        hub.start_observing(&mut queue);

        assert!(hub.is_observing());
        assert_eq!(queue.active_watch_count(), 3);
        assert_eq!(queue.total_watch_registrations(), 3);
        assert_eq!(
            hub.subscription().unwrap().kinds(),
            WatchKind::ALL.to_vec()
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut hub, _rx) = hub();
        let mut queue = SimulatedQueuePlayer::new();

        hub.stop_observing(&mut queue);
        hub.start_observing(&mut queue);
        hub.stop_observing(&mut queue);
        hub.stop_observing(&mut queue);

        assert!(!hub.is_observing());
        assert_eq!(queue.active_watch_count(), 0);
    }

    #[test]
    fn test_translate_failures_and_item_changes() {
        let (hub, _rx) = hub();
        let item = PlayableItem::new(Asset::new("clip"), 5.0);
        let change = |notification| ObservedChange {
            epoch: hub.epoch(),
            notification,
        };

        assert_eq!(
            hub.translate(change(QueueNotification::PlayerStatusChanged(
                PlayerStatus::Failed
            ))),
            Some(LoopEvent::PlayerFailed)
        );
        assert_eq!(
            hub.translate(change(QueueNotification::PlayerStatusChanged(
                PlayerStatus::ReadyToPlay
            ))),
            None
        );
        assert_eq!(
            hub.translate(change(QueueNotification::CurrentItemChanged {
                previous: Some(item.clone())
            })),
            Some(LoopEvent::CurrentItemChanged(Some(item)))
        );
        assert_eq!(
            hub.translate(change(QueueNotification::CurrentItemStatusChanged(
                ItemStatus::Failed
            ))),
            Some(LoopEvent::CurrentItemFailed)
        );
        assert_eq!(
            hub.translate(change(QueueNotification::CurrentItemStatusChanged(
                ItemStatus::ReadyToPlay
            ))),
            None
        );
    }

    #[test]
    fn test_reset_drops_stale_notifications() {
        let (mut hub, mut rx) = hub();
        let mut queue = SimulatedQueuePlayer::new();

        hub.start_observing(&mut queue);
        queue.fail_player("output device lost");
        hub.reset(&mut queue);

        let stale = rx.try_recv().unwrap();
        assert_eq!(hub.translate(stale), None);
        assert!(!hub.is_observing());
    }

    #[test]
    fn test_restart_within_epoch_keeps_pending_notifications() {
        let (mut hub, mut rx) = hub();
        let mut queue = SimulatedQueuePlayer::new();

        hub.start_observing(&mut queue);
        queue.fail_player("output device lost");
        hub.stop_observing(&mut queue);
        hub.start_observing(&mut queue);

        let pending = rx.try_recv().unwrap();
        assert_eq!(hub.translate(pending), Some(LoopEvent::PlayerFailed));
    }

    #[test]
    fn test_no_notifications_while_not_observing() {
        let (mut hub, mut rx) = hub();
        let mut queue = SimulatedQueuePlayer::new();

        hub.start_observing(&mut queue);
        hub.stop_observing(&mut queue);
        queue.fail_player("output device lost");

        assert!(rx.try_recv().is_err());
    }
}
