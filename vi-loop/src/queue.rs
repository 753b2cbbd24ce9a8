//! Playback queue contract
//!
//! The controller talks to the underlying queue player only through
//! [`PlaybackQueue`]. Besides queue mutation and transport control the trait
//! exposes watch registration: a watch forwards one kind of state change to a
//! [`WatchSink`], and stops forwarding the moment it is removed.

use crate::asset::{Asset, AssetId};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(Uuid);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue-insertable unit built from a validated asset
///
/// Clones share the same identity. Once inserted, the queue owns the item's
/// playback state; other holders only keep a handle for bookkeeping.
#[derive(Debug, Clone)]
pub struct PlayableItem {
    id: ItemId,
    asset: Asset,
    duration_secs: f64,
}

impl PlayableItem {
    /// Build an item for an asset whose duration validation reported
    pub fn new(asset: Asset, duration_secs: f64) -> Self {
        Self {
            id: ItemId(Uuid::new_v4()),
            asset,
            duration_secs,
        }
    }

    /// Duration known at validation time
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset.id()
    }
}

impl PartialEq for PlayableItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlayableItem {}

/// Status of the queue player as a whole
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    #[default]
    Unknown,
    ReadyToPlay,
    Failed,
}

/// Status of a single item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    #[default]
    Unknown,
    ReadyToPlay,
    Failed,
}

/// What a watch observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    PlayerStatus,
    CurrentItem,
    CurrentItemStatus,
}

impl WatchKind {
    pub const ALL: [WatchKind; 3] = [
        WatchKind::PlayerStatus,
        WatchKind::CurrentItem,
        WatchKind::CurrentItemStatus,
    ];
}

/// Raw state change emitted by a queue to a watch
#[derive(Debug, Clone, PartialEq)]
pub enum QueueNotification {
    PlayerStatusChanged(PlayerStatus),
    /// The current item identity changed; carries the displaced item, if any
    CurrentItemChanged {
        previous: Option<PlayableItem>,
    },
    CurrentItemStatusChanged(ItemStatus),
}

impl QueueNotification {
    /// Watch kind that forwards this notification
    pub fn kind(&self) -> WatchKind {
        match self {
            QueueNotification::PlayerStatusChanged(_) => WatchKind::PlayerStatus,
            QueueNotification::CurrentItemChanged { .. } => WatchKind::CurrentItem,
            QueueNotification::CurrentItemStatusChanged(_) => WatchKind::CurrentItemStatus,
        }
    }
}

/// Subscription epoch a notification was delivered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(pub(crate) u64);

/// Notification tagged with the epoch of the watch that forwarded it
#[derive(Debug, Clone)]
pub struct ObservedChange {
    pub epoch: Epoch,
    pub notification: QueueNotification,
}

/// Destination of a watch
///
/// Delivery is a non-blocking channel send, so a queue may notify from inside
/// its own mutation without re-entering the controller.
#[derive(Debug, Clone)]
pub struct WatchSink {
    epoch: Epoch,
    tx: mpsc::UnboundedSender<ObservedChange>,
}

impl WatchSink {
    pub(crate) fn new(epoch: Epoch, tx: mpsc::UnboundedSender<ObservedChange>) -> Self {
        Self { epoch, tx }
    }

    /// Forward a notification; returns false once the receiver is gone
    pub fn notify(&self, notification: QueueNotification) -> bool {
        self.tx
            .send(ObservedChange {
                epoch: self.epoch,
                notification,
            })
            .is_ok()
    }
}

/// Handle returned by [`PlaybackQueue::add_watch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(pub u64);

/// Queue-based player capability used by the loop controller
///
/// All methods are synchronous and bounded. Positions and durations are
/// floating-point seconds; rate 0 is paused and 1 is normal forward play.
pub trait PlaybackQueue: Send + 'static {
    /// Replace the whole queue with a single item
    fn set_only(&mut self, item: PlayableItem);

    /// Append an item after all existing items
    fn insert_at_tail(&mut self, item: PlayableItem);

    /// Drop every item
    fn remove_all(&mut self);

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    fn current_item(&self) -> Option<PlayableItem>;

    /// Reset an item's own position to zero
    fn seek_to_start(&mut self, item: &PlayableItem);

    /// Status of an item the queue knows about
    fn item_status(&self, item: &PlayableItem) -> ItemStatus;

    fn status(&self) -> PlayerStatus;

    /// Error behind a failed player status, if the engine gave one
    fn error(&self) -> Option<String>;

    /// Error behind a failed current item, if the engine gave one
    fn current_item_error(&self) -> Option<String>;

    /// Register a watch; every matching change is forwarded to `sink`
    fn add_watch(&mut self, kind: WatchKind, sink: WatchSink) -> WatchToken;

    /// Remove a watch; unknown tokens are ignored
    fn remove_watch(&mut self, token: WatchToken);

    fn rate(&self) -> f32;

    fn set_rate(&mut self, rate: f32);

    fn play(&mut self) {
        self.set_rate(1.0);
    }

    fn pause(&mut self) {
        self.set_rate(0.0);
    }

    /// Position within the current item
    fn current_time(&self) -> f64;

    /// Exact-time seek within the current item (zero tolerance either side)
    fn seek(&mut self, secs: f64);

    /// Duration of the current item; 0 when there is none
    fn current_duration(&self) -> f64;
}
