//! Owner-task service around a [`LoopController`]
//!
//! The controller lives inside a single tokio task. Callers talk to it through
//! a cloneable [`LoopHandle`]; validation completions and queue changes reach
//! it through the controller's inbox. Everything that mutates controller state
//! therefore runs on that one task, in arrival order.

use crate::asset::Asset;
use crate::controller::{ControllerInbox, LoopController, LoopSnapshot};
use crate::error::{LoopError, Result};
use crate::queue::PlaybackQueue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use vi_common::config::PlaybackConfig;
use vi_common::time::millis_to_duration;

/// Commands accepted by the service task
#[derive(Debug)]
pub enum LoopCommand {
    SetAsset(Option<Asset>),
    Play,
    Pause,
    TogglePlayPause,
    Stop,
    Seek(f64),
    SetRate(f32),
    Snapshot(oneshot::Sender<LoopSnapshot>),
    Shutdown,
}

/// Spawns the owner task
pub struct LoopService;

impl LoopService {
    /// Move `controller` onto its own task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<Q: PlaybackQueue>(
        controller: LoopController<Q>,
        inbox: ControllerInbox,
        config: &PlaybackConfig,
    ) -> LoopHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let progress_every = millis_to_duration(config.progress_interval_ms);

        let task = tokio::spawn(run(controller, inbox, command_rx, progress_every));
        info!("Loop service started");

        LoopHandle {
            command_tx,
            task: std::sync::Arc::new(std::sync::Mutex::new(Some(task))),
        }
    }
}

async fn run<Q: PlaybackQueue>(
    mut controller: LoopController<Q>,
    mut inbox: ControllerInbox,
    mut commands: mpsc::Receiver<LoopCommand>,
    progress_every: std::time::Duration,
) {
    let mut progress = interval(progress_every);
    progress.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Queue changes ahead of commands, in emission order
            biased;

            Some(change) = inbox.changes.recv() => {
                controller.handle_change(change);
            }

            Some(completion) = inbox.validations.recv() => {
                controller.handle_validation(completion);
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All loop handles dropped");
                    break;
                };
                if !apply(&mut controller, command) {
                    break;
                }
            }

            _ = progress.tick() => {
                if let Some(notice) = controller.progress_notice() {
                    controller.bus().emit_lossy(notice);
                }
            }
        }
    }

    controller.set_asset(None);
    info!("Loop service stopped");
}

/// Apply one command; returns false on shutdown
fn apply<Q: PlaybackQueue>(controller: &mut LoopController<Q>, command: LoopCommand) -> bool {
    match command {
        LoopCommand::SetAsset(asset) => controller.set_asset(asset),
        LoopCommand::Play => controller.play(),
        LoopCommand::Pause => controller.pause(),
        LoopCommand::TogglePlayPause => controller.toggle_play_pause(),
        LoopCommand::Stop => controller.stop(),
        LoopCommand::Seek(secs) => controller.set_current_position(secs),
        LoopCommand::SetRate(rate) => controller.set_playback_rate(rate),
        LoopCommand::Snapshot(reply) => {
            // Requester may have given up waiting
            let _ = reply.send(controller.snapshot());
        }
        LoopCommand::Shutdown => return false,
    }
    true
}

/// Cloneable handle to a running [`LoopService`]
#[derive(Debug, Clone)]
pub struct LoopHandle {
    command_tx: mpsc::Sender<LoopCommand>,
    task: std::sync::Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl LoopHandle {
    async fn send(&self, command: LoopCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| LoopError::ServiceStopped)
    }

    pub async fn set_asset(&self, asset: Option<Asset>) -> Result<()> {
        self.send(LoopCommand::SetAsset(asset)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(LoopCommand::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(LoopCommand::Pause).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.send(LoopCommand::TogglePlayPause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(LoopCommand::Stop).await
    }

    pub async fn seek(&self, secs: f64) -> Result<()> {
        self.send(LoopCommand::Seek(secs)).await
    }

    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        self.send(LoopCommand::SetRate(rate)).await
    }

    /// Current controller state as seen by the owner task
    pub async fn snapshot(&self) -> Result<LoopSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LoopCommand::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| LoopError::ServiceStopped)
    }

    /// Ask the service to stop and wait for its task to finish
    ///
    /// Safe to call more than once and from several clones.
    pub async fn shutdown(&self) -> Result<()> {
        // Already gone is as good as stopped
        let _ = self.send(LoopCommand::Shutdown).await;

        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Loop task ended abnormally: {}", e);
                return Err(LoopError::ServiceStopped);
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}
