//! Simulated playback engine
//!
//! In-memory stand-ins for the external collaborators, used by the CLI demo
//! and by tests:
//! - [`SimulatedQueuePlayer`]: a queue player honouring watch registration
//! - [`SimulatedLoader`]: a metadata loader backed by a table of reports
//! - [`CollectingReporter`]: an error reporter that records messages
//!
//! The queue player is a cheap clonable handle over shared state, so a test
//! (or a clock task) can drive playback while the controller owns its copy.

use crate::asset::{
    Asset, AssetId, AssetProperties, KeyStatus, LoadError, LoadReport, MetadataKey, MetadataLoader,
};
use crate::error::LoopError;
use crate::queue::{
    ItemId, ItemStatus, PlayableItem, PlaybackQueue, PlayerStatus, QueueNotification, WatchKind,
    WatchSink, WatchToken,
};
use crate::reporter::ErrorReporter;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use vi_common::time::duration_to_secs;

/// Queue mutation recorded by [`SimulatedQueuePlayer`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    SetOnly(ItemId),
    InsertAtTail {
        item: ItemId,
        /// Item position at the moment it was inserted
        position_secs: f64,
        /// Watches registered at the moment it was inserted
        active_watches: usize,
    },
    SeekToStart(ItemId),
    RemoveAll,
}

#[derive(Debug, Clone)]
struct ItemState {
    position_secs: f64,
    duration_secs: f64,
    status: ItemStatus,
    error: Option<String>,
    /// Parked at its end, waiting to be re-queued
    ended: bool,
}

#[derive(Debug)]
struct SimState {
    items: VecDeque<PlayableItem>,
    item_states: HashMap<ItemId, ItemState>,
    status: PlayerStatus,
    error: Option<String>,
    rate: f32,
    watches: Vec<(WatchToken, WatchKind, WatchSink)>,
    next_token: u64,
    total_registrations: usize,
    ops: Vec<QueueOp>,
}

impl SimState {
    fn notify(&mut self, notification: QueueNotification) {
        let kind = notification.kind();
        for (_, watch_kind, sink) in &self.watches {
            if *watch_kind == kind {
                sink.notify(notification.clone());
            }
        }
    }

    fn track(&mut self, item: &PlayableItem) {
        self.item_states.entry(item.id()).or_insert(ItemState {
            position_secs: 0.0,
            duration_secs: item.duration_secs(),
            status: ItemStatus::ReadyToPlay,
            error: None,
            ended: false,
        });
    }

    fn current_state(&self) -> Option<&ItemState> {
        self.items
            .front()
            .and_then(|item| self.item_states.get(&item.id()))
    }

    fn current_state_mut(&mut self) -> Option<&mut ItemState> {
        let id = self.items.front()?.id();
        self.item_states.get_mut(&id)
    }

    /// Pop the current item and announce the change
    fn advance(&mut self) -> Option<PlayableItem> {
        let previous = self.items.pop_front()?;
        self.notify(QueueNotification::CurrentItemChanged {
            previous: Some(previous.clone()),
        });
        Some(previous)
    }

    /// Park the current item at its end and announce it as displaced
    ///
    /// The item stays queued until it is inserted again or the queue is
    /// replaced, so the queue is never empty after a normal finish.
    fn end_current(&mut self) -> Option<PlayableItem> {
        let finished = self.items.front().cloned()?;
        if let Some(current) = self.current_state_mut() {
            current.position_secs = current.duration_secs;
            current.ended = true;
        }
        self.notify(QueueNotification::CurrentItemChanged {
            previous: Some(finished.clone()),
        });
        Some(finished)
    }
}

/// In-memory queue player
///
/// Notifications go only to watches registered at the moment of the change;
/// nothing is buffered for watches added later.
///
/// An item that plays to its end is announced through a current-item change
/// but stays parked in the queue. Inserting an already queued item moves it to
/// the tail instead of duplicating it.
#[derive(Debug, Clone)]
pub struct SimulatedQueuePlayer {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedQueuePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedQueuePlayer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                items: VecDeque::new(),
                item_states: HashMap::new(),
                status: PlayerStatus::ReadyToPlay,
                error: None,
                rate: 0.0,
                watches: Vec::new(),
                next_token: 1,
                total_registrations: 0,
                ops: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance playback by `elapsed` at the current rate
    ///
    /// When the current item reaches its end, watches see a current-item
    /// change carrying it. Returns true if an item finished.
    pub fn tick(&self, elapsed: Duration) -> bool {
        let mut state = self.lock();
        let rate = state.rate as f64;
        if rate <= 0.0 {
            return false;
        }
        let Some(current) = state.current_state_mut() else {
            return false;
        };
        if current.ended {
            return false;
        }
        current.position_secs += duration_to_secs(elapsed) * rate;
        if current.position_secs < current.duration_secs {
            return false;
        }
        state.end_current().is_some()
    }

    /// Play the current item to its end immediately
    pub fn finish_current(&self) -> Option<PlayableItem> {
        self.lock().end_current()
    }

    /// Mark the current item failed and announce it
    pub fn fail_current_item(&self, message: impl Into<String>) {
        let mut state = self.lock();
        let Some(current) = state.current_state_mut() else {
            return;
        };
        current.status = ItemStatus::Failed;
        current.error = Some(message.into());
        state.notify(QueueNotification::CurrentItemStatusChanged(ItemStatus::Failed));
    }

    /// Drop the current item as unplayable, the way an engine discards a bad item
    ///
    /// The item is marked failed and removed without a status announcement.
    pub fn discard_current_item(&self) -> Option<PlayableItem> {
        let mut state = self.lock();
        if let Some(current) = state.current_state_mut() {
            current.status = ItemStatus::Failed;
        }
        state.advance()
    }

    /// Put the whole player into the failed state and announce it
    pub fn fail_player(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.status = PlayerStatus::Failed;
        state.error = Some(message.into());
        state.notify(QueueNotification::PlayerStatusChanged(PlayerStatus::Failed));
    }

    /// Watches currently registered
    pub fn active_watch_count(&self) -> usize {
        self.lock().watches.len()
    }

    /// Watches ever registered
    pub fn total_watch_registrations(&self) -> usize {
        self.lock().total_registrations
    }

    /// Queue mutations so far, oldest first
    pub fn ops(&self) -> Vec<QueueOp> {
        self.lock().ops.clone()
    }

    pub fn items(&self) -> Vec<PlayableItem> {
        self.lock().items.iter().cloned().collect()
    }

    /// Position of any item the player has seen
    pub fn item_position(&self, item: &PlayableItem) -> Option<f64> {
        self.lock()
            .item_states
            .get(&item.id())
            .map(|state| state.position_secs)
    }
}

impl PlaybackQueue for SimulatedQueuePlayer {
    fn set_only(&mut self, item: PlayableItem) {
        let mut state = self.lock();
        let previous = state.items.front().cloned();
        state.items.clear();
        state.track(&item);
        state.items.push_back(item.clone());
        state.ops.push(QueueOp::SetOnly(item.id()));
        if previous.as_ref() != Some(&item) {
            state.notify(QueueNotification::CurrentItemChanged { previous });
        }
    }

    fn insert_at_tail(&mut self, item: PlayableItem) {
        let mut state = self.lock();
        let was_empty = state.items.is_empty();
        state.items.retain(|queued| queued != &item);
        state.track(&item);
        if let Some(item_state) = state.item_states.get_mut(&item.id()) {
            item_state.ended = false;
        }
        let position_secs = state
            .item_states
            .get(&item.id())
            .map(|s| s.position_secs)
            .unwrap_or_default();
        let active_watches = state.watches.len();
        state.ops.push(QueueOp::InsertAtTail {
            item: item.id(),
            position_secs,
            active_watches,
        });
        state.items.push_back(item);
        if was_empty {
            state.notify(QueueNotification::CurrentItemChanged { previous: None });
        }
    }

    fn remove_all(&mut self) {
        let mut state = self.lock();
        let previous = state.items.front().cloned();
        state.items.clear();
        state.ops.push(QueueOp::RemoveAll);
        if previous.is_some() {
            state.notify(QueueNotification::CurrentItemChanged { previous });
        }
    }

    fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn len(&self) -> usize {
        self.lock().items.len()
    }

    fn current_item(&self) -> Option<PlayableItem> {
        self.lock().items.front().cloned()
    }

    fn seek_to_start(&mut self, item: &PlayableItem) {
        let mut state = self.lock();
        if let Some(item_state) = state.item_states.get_mut(&item.id()) {
            item_state.position_secs = 0.0;
        }
        state.ops.push(QueueOp::SeekToStart(item.id()));
    }

    fn item_status(&self, item: &PlayableItem) -> ItemStatus {
        self.lock()
            .item_states
            .get(&item.id())
            .map(|state| state.status)
            .unwrap_or_default()
    }

    fn status(&self) -> PlayerStatus {
        self.lock().status
    }

    fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    fn current_item_error(&self) -> Option<String> {
        self.lock()
            .current_state()
            .and_then(|state| state.error.clone())
    }

    fn add_watch(&mut self, kind: WatchKind, sink: WatchSink) -> WatchToken {
        let mut state = self.lock();
        let token = WatchToken(state.next_token);
        state.next_token += 1;
        state.total_registrations += 1;
        state.watches.push((token, kind, sink));
        token
    }

    fn remove_watch(&mut self, token: WatchToken) {
        self.lock().watches.retain(|(t, _, _)| *t != token);
    }

    fn rate(&self) -> f32 {
        self.lock().rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.lock().rate = rate;
    }

    fn current_time(&self) -> f64 {
        self.lock()
            .current_state()
            .map(|state| state.position_secs)
            .unwrap_or_default()
    }

    fn seek(&mut self, secs: f64) {
        if let Some(current) = self.lock().current_state_mut() {
            current.position_secs = secs.clamp(0.0, current.duration_secs.max(0.0));
        }
    }

    fn current_duration(&self) -> f64 {
        self.lock()
            .current_state()
            .map(|state| state.duration_secs)
            .unwrap_or_default()
    }
}

/// Metadata loader backed by a table of reports
///
/// Assets without an entry fail every key.
#[derive(Debug, Default)]
pub struct SimulatedLoader {
    reports: Mutex<HashMap<AssetId, LoadReport>>,
    delays: Mutex<HashMap<AssetId, Duration>>,
    requests: Mutex<Vec<AssetId>>,
}

impl SimulatedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully loadable, playable asset
    pub fn insert_playable(&self, asset: &Asset, duration_secs: f64) {
        self.insert(
            asset,
            LoadReport::loaded(AssetProperties {
                duration_secs,
                playable: true,
                has_protected_content: false,
            }),
        );
    }

    pub fn insert(&self, asset: &Asset, report: LoadReport) {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(asset.id(), report);
    }

    /// Delay the load of one asset
    pub fn set_delay(&self, asset: &Asset, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(asset.id(), delay);
    }

    /// Assets whose metadata was requested, oldest first
    pub fn requests(&self) -> Vec<AssetId> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl MetadataLoader for SimulatedLoader {
    async fn load_values(&self, asset: &Asset, keys: &[MetadataKey]) -> LoadReport {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(asset.id());

        let delay = self
            .delays
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&asset.id())
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let report = self
            .reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&asset.id())
            .cloned();
        report.unwrap_or_else(|| {
            keys.iter().fold(LoadReport::default(), |report, key| {
                report.with_status(
                    *key,
                    KeyStatus::Failed(Some(LoadError::new(format!(
                        "no media found at {}",
                        asset.source()
                    )))),
                )
            })
        })
    }
}

/// Error reporter that keeps every message
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, Option<LoopError>)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<LoopError> {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter_map(|(_, err)| err.clone())
            .collect()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, message: &str, error: Option<&LoopError>) {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((message.to_string(), error.cloned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Epoch;
    use tokio::sync::mpsc;

    fn item(duration_secs: f64) -> PlayableItem {
        PlayableItem::new(Asset::new("clip"), duration_secs)
    }

    #[test]
    fn test_tick_finishes_item_at_end() {
        let mut queue = SimulatedQueuePlayer::new();
        let item = item(1.0);
        queue.set_only(item.clone());
        queue.play();

        assert!(!queue.tick(Duration::from_millis(600)));
        assert!((queue.current_time() - 0.6).abs() < 1e-9);
        assert!(queue.tick(Duration::from_millis(600)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.item_position(&item), Some(1.0));

        // Parked at the end until re-queued
        assert!(!queue.tick(Duration::from_millis(600)));
        assert_eq!(queue.current_time(), 1.0);
    }

    #[test]
    fn test_finished_item_announced_while_still_queued() {
        let mut queue = SimulatedQueuePlayer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let item = item(2.0);
        queue.set_only(item.clone());
        queue.add_watch(WatchKind::CurrentItem, WatchSink::new(Epoch(0), tx));

        assert_eq!(queue.finish_current(), Some(item.clone()));
        assert_eq!(
            rx.try_recv().unwrap().notification,
            QueueNotification::CurrentItemChanged {
                previous: Some(item.clone())
            }
        );
        assert_eq!(queue.items(), vec![item.clone()]);

        // Re-queueing moves the item rather than duplicating it
        queue.seek_to_start(&item);
        queue.insert_at_tail(item.clone());
        assert_eq!(queue.items(), vec![item.clone()]);
        assert!(rx.try_recv().is_err());

        queue.play();
        assert!(!queue.tick(Duration::from_millis(500)));
        assert_eq!(queue.current_time(), 0.5);
    }

    #[test]
    fn test_discarded_item_leaves_queue_empty() {
        let mut queue = SimulatedQueuePlayer::new();
        let item = item(2.0);
        queue.set_only(item.clone());

        assert_eq!(queue.discard_current_item(), Some(item.clone()));
        assert!(queue.is_empty());
        assert_eq!(queue.item_status(&item), ItemStatus::Failed);
    }

    #[test]
    fn test_failures_keep_their_error() {
        let mut queue = SimulatedQueuePlayer::new();
        queue.set_only(item(2.0));
        assert_eq!(queue.error(), None);
        assert_eq!(queue.current_item_error(), None);

        queue.fail_current_item("decoder gave up");
        assert_eq!(queue.current_item_error().as_deref(), Some("decoder gave up"));

        queue.fail_player("output device lost");
        assert_eq!(queue.status(), PlayerStatus::Failed);
        assert_eq!(queue.error().as_deref(), Some("output device lost"));
    }

    #[test]
    fn test_tick_paused_does_not_advance() {
        let mut queue = SimulatedQueuePlayer::new();
        queue.set_only(item(1.0));

        assert!(!queue.tick(Duration::from_secs(5)));
        assert_eq!(queue.current_time(), 0.0);
    }

    #[test]
    fn test_notifications_only_reach_matching_watches() {
        let mut queue = SimulatedQueuePlayer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        queue.add_watch(WatchKind::PlayerStatus, WatchSink::new(Epoch(0), tx));

        queue.set_only(item(1.0));
        assert!(rx.try_recv().is_err());

        queue.fail_player("output device lost");
        let change = rx.try_recv().unwrap();
        assert_eq!(
            change.notification,
            QueueNotification::PlayerStatusChanged(PlayerStatus::Failed)
        );
    }

    #[test]
    fn test_insert_into_empty_queue_changes_current_item() {
        let mut queue = SimulatedQueuePlayer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = queue.add_watch(WatchKind::CurrentItem, WatchSink::new(Epoch(0), tx));

        queue.insert_at_tail(item(1.0));
        assert_eq!(
            rx.try_recv().unwrap().notification,
            QueueNotification::CurrentItemChanged { previous: None }
        );

        queue.remove_watch(token);
        queue.insert_at_tail(item(1.0));
        assert!(rx.try_recv().is_err());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let mut queue = SimulatedQueuePlayer::new();
        queue.set_only(item(4.0));

        queue.seek(9.0);
        assert_eq!(queue.current_time(), 4.0);
        queue.seek(-1.0);
        assert_eq!(queue.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_loader_unknown_asset_fails_all_keys() {
        let loader = SimulatedLoader::new();
        let asset = Asset::new("missing.mov");

        let report = loader.load_values(&asset, &MetadataKey::REQUIRED).await;
        for key in MetadataKey::REQUIRED {
            assert!(matches!(report.status(key), Some(KeyStatus::Failed(Some(_)))));
        }
        assert_eq!(loader.requests(), vec![asset.id()]);
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::new();
        reporter.report("first", None);
        reporter.report("second", Some(&LoopError::NotPlayable));

        assert_eq!(reporter.messages(), vec!["first", "second"]);
        assert_eq!(reporter.errors(), vec![LoopError::NotPlayable]);
    }
}
