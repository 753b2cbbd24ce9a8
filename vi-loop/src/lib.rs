//! # Vi Loop Player Library (vi-loop)
//!
//! Keeps one asset playing forever on top of a queue-based player.
//!
//! **Purpose:** Validate an asset asynchronously, install it as the only queue
//! item, observe the queue, and put the item back at the tail every time it
//! finishes so playback never runs dry.
//!
//! **Architecture:** A single owner task ([`service::LoopService`]) holds the
//! [`controller::LoopController`]. Validation completions and observed queue
//! changes are marshalled onto that task through channels; no controller state
//! is ever touched from anywhere else.

pub mod asset;
pub mod controller;
pub mod error;
pub mod observation;
pub mod queue;
pub mod reporter;
pub mod service;
pub mod sim;
pub mod validator;

pub use asset::{Asset, AssetId, MetadataKey};
pub use controller::{ControllerInbox, LoopController, LoopSnapshot};
pub use error::{LoopError, Result};
pub use service::{LoopHandle, LoopService};
pub use vi_common::events::LoopState;
