//! Loop controller state machine
//!
//! Orchestrates validation, queue installation, observation and loop
//! continuation for one asset at a time.
//!
//! **Transitions:**
//! - assign asset: tear down observation, retire the old epoch, start validation
//! - validation ready (current asset only): `set_only`, then start observing
//! - validation failed: report, no queue mutation
//! - current item changed with nothing left queued: stop, halt
//! - current item changed with the queue still populated: seek the displaced
//!   item to start, then stop observing, insert at tail, resume observing
//! - player/item failure: stop, halt
//!
//! **Threading:** every method takes `&mut self` and must run on the owner
//! task. Background work (validation) and queue callbacks only ever reach the
//! controller through the channels in [`ControllerInbox`].

use crate::asset::Asset;
use crate::error::{FailureScope, LoopError};
use crate::observation::{LoopEvent, ObservationHub};
use crate::queue::{ItemStatus, ObservedChange, PlayableItem, PlaybackQueue};
use crate::reporter::ErrorReporter;
use crate::validator::{AssetValidator, ValidationCompletion, ValidationResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vi_common::events::{EventBus, LoopNotice, LoopState};
use vi_common::time;

/// Receiving ends of the channels feeding a [`LoopController`]
///
/// Must be drained on the same task that owns the controller.
#[derive(Debug)]
pub struct ControllerInbox {
    pub validations: mpsc::UnboundedReceiver<ValidationCompletion>,
    pub changes: mpsc::UnboundedReceiver<ObservedChange>,
}

/// Stored lifecycle phase; the published [`LoopState`] is derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Validating,
    Installed,
    Failed,
}

/// Point-in-time view of a controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopSnapshot {
    pub state: LoopState,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub rate: f32,
    pub queue_len: usize,
    pub loops_completed: u64,
    pub asset_id: Option<Uuid>,
    pub last_error: Option<String>,
}

/// Keeps a single asset looping on a [`PlaybackQueue`]
pub struct LoopController<Q: PlaybackQueue> {
    queue: Q,
    hub: ObservationHub,
    validator: AssetValidator,
    reporter: Arc<dyn ErrorReporter>,
    bus: EventBus,
    validation_tx: mpsc::UnboundedSender<ValidationCompletion>,

    asset: Option<Asset>,
    /// Non-owning handle to the installed item, for reinsertion bookkeeping
    item: Option<PlayableItem>,
    phase: Phase,
    loops_completed: u64,
    last_error: Option<LoopError>,
    autoplay: bool,

    /// Last state announced on the bus
    published: LoopState,
}

impl<Q: PlaybackQueue> std::fmt::Debug for LoopController<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopController")
            .field("asset", &self.asset.as_ref().map(|a| a.id()))
            .field("phase", &self.phase)
            .field("loops_completed", &self.loops_completed)
            .field("observing", &self.hub.is_observing())
            .finish_non_exhaustive()
    }
}

impl<Q: PlaybackQueue> LoopController<Q> {
    /// Create a controller owning `queue`
    ///
    /// Returns the controller together with the inbox its owner task has to
    /// drain (see [`crate::service::LoopService`]).
    pub fn new(
        queue: Q,
        validator: AssetValidator,
        reporter: Arc<dyn ErrorReporter>,
        bus: EventBus,
    ) -> (Self, ControllerInbox) {
        let (validation_tx, validations) = mpsc::unbounded_channel();
        let (changes_tx, changes) = mpsc::unbounded_channel();

        let controller = Self {
            queue,
            hub: ObservationHub::new(changes_tx),
            validator,
            reporter,
            bus,
            validation_tx,
            asset: None,
            item: None,
            phase: Phase::Idle,
            loops_completed: 0,
            last_error: None,
            autoplay: false,
            published: LoopState::NoAsset,
        };

        (
            controller,
            ControllerInbox {
                validations,
                changes,
            },
        )
    }

    /// Command playback as soon as a validated item is installed
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    // ========================================
    // Asset assignment and validation
    // ========================================

    /// Assign or clear the source asset
    ///
    /// Any active observation is torn down first, and completions still in
    /// flight for earlier assignments will be discarded on arrival. The
    /// previous item is paused and stays queued until the new asset is
    /// installed over it. Clearing empties the queue and leaves the controller
    /// in `NoAsset`.
    pub fn set_asset(&mut self, asset: Option<Asset>) {
        self.hub.reset(&mut self.queue);
        self.item = None;
        self.loops_completed = 0;
        self.last_error = None;

        match asset {
            Some(asset) => {
                info!(asset_id = %asset.id(), source = asset.source(), "Asset assigned, validating");
                self.asset = Some(asset.clone());
                self.phase = Phase::Validating;
                self.queue.pause();
                self.validator.spawn(asset, self.validation_tx.clone());
            }
            None => {
                info!("Asset cleared");
                self.asset = None;
                self.phase = Phase::Idle;
                self.queue.remove_all();
                self.queue.pause();
            }
        }

        self.publish_state();
    }

    /// Apply a validation completion delivered to the owner task
    ///
    /// Completions for anything other than the currently assigned asset, or
    /// arriving after the assignment already settled, change nothing.
    pub fn handle_validation(&mut self, completion: ValidationCompletion) {
        let ValidationCompletion { asset, result } = completion;

        if self.asset.as_ref() != Some(&asset) || self.phase != Phase::Validating {
            debug!(asset_id = %asset.id(), "Discarding stale validation result");
            return;
        }

        match result {
            ValidationResult::Ready { duration_secs, .. } => {
                let item = PlayableItem::new(asset.clone(), duration_secs);
                self.queue.set_only(item.clone());
                self.hub.start_observing(&mut self.queue);
                self.item = Some(item);
                self.phase = Phase::Installed;
                info!(
                    asset_id = %asset.id(),
                    duration_secs,
                    "Asset validated, item installed"
                );

                if self.autoplay {
                    self.queue.play();
                }
            }
            ValidationResult::Failed(failure) => self.fail(LoopError::from(failure)),
        }

        self.publish_state();
    }

    // ========================================
    // Observation
    // ========================================

    /// Translate and apply a change forwarded by a queue watch
    pub fn handle_change(&mut self, change: ObservedChange) {
        if let Some(event) = self.hub.translate(change) {
            self.handle_event(event);
        }
    }

    /// Single dispatch point for observation events
    pub fn handle_event(&mut self, event: LoopEvent) {
        if self.phase != Phase::Installed {
            debug!(?event, phase = ?self.phase, "Ignoring event without an installed item");
            return;
        }

        match event {
            LoopEvent::PlayerFailed => self.fail(LoopError::PlaybackFailure {
                scope: FailureScope::Player,
                detail: self.queue.error(),
            }),
            LoopEvent::CurrentItemFailed => self.fail(LoopError::PlaybackFailure {
                scope: FailureScope::Item,
                detail: self.queue.current_item_error(),
            }),
            LoopEvent::CurrentItemChanged(previous) => self.on_current_item_changed(previous),
        }
    }

    fn on_current_item_changed(&mut self, previous: Option<PlayableItem>) {
        if self.queue.is_empty() {
            self.fail(LoopError::QueueExhausted);
            return;
        }

        match previous {
            Some(item) if self.queue.item_status(&item) == ItemStatus::Failed => {
                debug!(item_id = %item.id(), "Displaced item failed, not reinserting");
            }
            Some(item) => self.continue_loop(item),
            None => debug!("Current item changed with nothing displaced"),
        }
    }

    fn continue_loop(&mut self, finished: PlayableItem) {
        let asset_id = finished.asset_id();

        self.queue.seek_to_start(&finished);

        // Reinsertion must not be observed as a change of its own
        self.hub.stop_observing(&mut self.queue);
        self.queue.insert_at_tail(finished);
        self.hub.start_observing(&mut self.queue);

        self.loops_completed += 1;
        debug!(
            asset_id = %asset_id,
            iteration = self.loops_completed,
            "Item reinserted at tail"
        );
        self.bus.emit_lossy(LoopNotice::LoopRestarted {
            asset_id: asset_id.as_uuid(),
            iteration: self.loops_completed,
            timestamp: time::now(),
        });

        self.publish_state();
    }

    /// Enter `Failed`; no recovery is attempted
    ///
    /// Validation errors are reported and leave the queue untouched. Playback
    /// errors stop observation and playback.
    fn fail(&mut self, err: LoopError) {
        self.phase = Phase::Failed;
        let asset_id = self.asset.as_ref().map(|a| a.id().as_uuid());

        if err.is_validation_error() {
            warn!(asset_id = ?asset_id, error = %err, "Asset rejected");
            let message = err.user_message();
            self.reporter.report(&message, Some(&err));
            if let Some(asset_id) = asset_id {
                self.bus.emit_lossy(LoopNotice::AssetRejected {
                    asset_id,
                    message,
                    timestamp: time::now(),
                });
            }
        } else {
            warn!(asset_id = ?asset_id, error = %err, "Loop halted");
            self.hub.stop_observing(&mut self.queue);
            self.stop();
            if let Some(reason) = err.halt_reason() {
                self.bus.emit_lossy(LoopNotice::PlaybackHalted {
                    asset_id,
                    reason,
                    timestamp: time::now(),
                });
            }
        }

        self.last_error = Some(err);
        self.publish_state();
    }

    // ========================================
    // Transport
    // ========================================

    /// Play, restarting from zero when parked at the end; pause otherwise
    pub fn toggle_play_pause(&mut self) {
        if self.queue.rate() != 1.0 {
            let duration = self.total_duration();
            if duration > 0.0 && self.current_position() >= duration {
                debug!("At end of media, restarting from zero");
                self.queue.seek(0.0);
            }
            self.queue.play();
        } else {
            self.queue.pause();
        }
        self.publish_state();
    }

    /// Command forward playback at rate 1
    pub fn play(&mut self) {
        self.queue.play();
        self.publish_state();
    }

    pub fn pause(&mut self) {
        self.queue.pause();
        self.publish_state();
    }

    /// Halt playback; a no-op when nothing is advancing
    pub fn stop(&mut self) {
        if self.queue.rate() == 0.0 {
            debug!("stop: already stopped");
            return;
        }
        self.queue.pause();
        info!("Playback stopped");
        self.publish_state();
    }

    /// Position within the installed item, in seconds; 0 when none is installed
    pub fn current_position(&self) -> f64 {
        if self.phase != Phase::Installed {
            return 0.0;
        }
        self.queue.current_time()
    }

    /// Exact-time seek, clamped to the installed item
    pub fn set_current_position(&mut self, secs: f64) {
        if !self.state().has_item() {
            debug!(secs, state = %self.state(), "Ignoring seek without an installed item");
            return;
        }
        let target = time::clamp_position(secs, self.total_duration());
        self.queue.seek(target);
        self.publish_state();
    }

    /// Duration of the installed item; 0 when none is installed
    pub fn total_duration(&self) -> f64 {
        if self.phase != Phase::Installed {
            return 0.0;
        }
        self.queue.current_duration()
    }

    pub fn playback_rate(&self) -> f32 {
        self.queue.rate()
    }

    /// Set the rate directly; 0 pauses, negative or non-finite values are ignored
    pub fn set_playback_rate(&mut self, rate: f32) {
        if !rate.is_finite() || rate < 0.0 {
            warn!(rate, "Ignoring invalid playback rate");
            return;
        }
        self.queue.set_rate(rate);
        self.publish_state();
    }

    // ========================================
    // State
    // ========================================

    /// Derived controller state
    pub fn state(&self) -> LoopState {
        match self.phase {
            Phase::Idle => LoopState::NoAsset,
            Phase::Validating => LoopState::Validating,
            Phase::Failed => LoopState::Failed,
            Phase::Installed if self.queue.rate() > 0.0 => LoopState::Playing,
            Phase::Installed if self.current_position() > 0.0 => LoopState::Paused,
            Phase::Installed => LoopState::Ready,
        }
    }

    pub fn asset(&self) -> Option<&Asset> {
        self.asset.as_ref()
    }

    pub fn item(&self) -> Option<&PlayableItem> {
        self.item.as_ref()
    }

    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }

    pub fn last_error(&self) -> Option<&LoopError> {
        self.last_error.as_ref()
    }

    pub fn is_observing(&self) -> bool {
        self.hub.is_observing()
    }

    pub fn observation(&self) -> &ObservationHub {
        &self.hub
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        LoopSnapshot {
            state: self.state(),
            position_secs: self.current_position(),
            duration_secs: self.total_duration(),
            rate: self.playback_rate(),
            queue_len: self.queue.len(),
            loops_completed: self.loops_completed,
            asset_id: self.asset.as_ref().map(|a| a.id().as_uuid()),
            last_error: self.last_error.as_ref().map(|e| e.user_message()),
        }
    }

    /// Progress notice for the current position, only while playing
    pub fn progress_notice(&self) -> Option<LoopNotice> {
        if self.state() != LoopState::Playing {
            return None;
        }
        let asset = self.asset.as_ref()?;
        Some(LoopNotice::PlaybackProgress {
            asset_id: asset.id().as_uuid(),
            position_secs: self.current_position(),
            duration_secs: self.total_duration(),
            timestamp: time::now(),
        })
    }

    /// Announce the derived state if it differs from the last announcement
    pub fn publish_state(&mut self) {
        let new_state = self.state();
        if new_state == self.published {
            return;
        }
        debug!(old = %self.published, new = %new_state, "Loop state changed");
        self.bus.emit_lossy(LoopNotice::StateChanged {
            old_state: self.published,
            new_state,
            timestamp: time::now(),
        });
        self.published = new_state;
    }

    // ========================================
    // Inbox helpers (owner task)
    // ========================================

    /// Wait for the next validation completion and apply it
    ///
    /// Returns false if the channel closed.
    pub async fn apply_next_validation(&mut self, inbox: &mut ControllerInbox) -> bool {
        match inbox.validations.recv().await {
            Some(completion) => {
                self.handle_validation(completion);
                true
            }
            None => false,
        }
    }

    /// Apply every queue change forwarded so far, in arrival order
    pub fn process_pending_changes(&mut self, inbox: &mut ControllerInbox) -> usize {
        let mut applied = 0;
        while let Ok(change) = inbox.changes.try_recv() {
            self.handle_change(change);
            applied += 1;
        }
        applied
    }
}
