//! Fulfillment port.
//!
//! Delivery of purchased goods happens by running a command on a remote
//! game server. The adapter owns connection management; callers only see
//! a [`CommandOutcome`].

use crate::domain::{CommandOutcome, Destination};

/// Port trait for executing delivery commands.
#[async_trait::async_trait]
pub trait Fulfillment: Send + Sync + 'static {
    /// Runs one command against a destination. Transport failures are
    /// reported through `CommandOutcome::success`, not as errors, so a
    /// dead server cannot abort the dispatch loop.
    async fn execute(&self, destination: &Destination, command: &str) -> CommandOutcome;
}
