//! # Vi Common Library
//!
//! Shared code for the Vi looping player crates including:
//! - Error types
//! - TOML configuration loading and resolution
//! - External notice types (LoopNotice enum) and the EventBus
//! - Time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
