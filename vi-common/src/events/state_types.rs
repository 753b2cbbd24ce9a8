//! Loop state type definitions
//!
//! Supporting types for the derived controller state and halt reasons.

use serde::{Deserialize, Serialize};

/// Derived state of a loop controller
///
/// Never stored directly by the controller; computed from its phase and the
/// player's rate and position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No asset assigned
    NoAsset,
    /// Asset assigned, metadata loading in flight
    Validating,
    /// Item installed in the queue, not advancing and at its start
    Ready,
    /// Item installed and the player is advancing
    Playing,
    /// Item installed, player stopped part way through
    Paused,
    /// Validation rejected the asset, or playback failed
    Failed,
}

impl LoopState {
    /// True for states that have an item installed in the queue
    pub fn has_item(self) -> bool {
        matches!(self, LoopState::Ready | LoopState::Playing | LoopState::Paused)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::NoAsset => write!(f, "no_asset"),
            LoopState::Validating => write!(f, "validating"),
            LoopState::Ready => write!(f, "ready"),
            LoopState::Playing => write!(f, "playing"),
            LoopState::Paused => write!(f, "paused"),
            LoopState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a loop stopped on its own
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// The queue player reported a failed status
    PlayerFailed,
    /// The current item reported a failed status
    ItemFailed,
    /// The current item went away with nothing left to play
    QueueExhausted,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::PlayerFailed => write!(f, "player_failed"),
            HaltReason::ItemFailed => write!(f, "item_failed"),
            HaltReason::QueueExhausted => write!(f, "queue_exhausted"),
        }
    }
}
