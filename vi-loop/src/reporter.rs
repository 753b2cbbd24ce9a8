//! Error presentation seam
//!
//! The controller never shows errors itself. Validation failures are handed
//! to an [`ErrorReporter`] with a human-readable message; what happens next
//! (dialog, toast, log line) is up to the embedding application.

use crate::error::LoopError;
use tracing::error;

/// Receives validation-time failures
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, message: &str, error: Option<&LoopError>);
}

/// Reporter that writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, message: &str, err: Option<&LoopError>) {
        match err {
            Some(err) => error!(error = %err, "{}", message),
            None => error!("{}", message),
        }
    }
}
