//! Subcommand implementations

pub mod call;
pub mod replay;
pub mod serve;

use std::time::Duration;

use streamfold_core::{CompletionResult, StreamingCall};
use tracing::warn;

/// Wait for `call`, cancelling it on Ctrl-C or once `deadline` passes.
///
/// Cancellation still goes through the driver, so the returned result is the
/// driver's cancellation status rather than a locally made one.
pub async fn wait_for_outcome(
    call: StreamingCall,
    deadline: Option<Duration>,
) -> CompletionResult {
    let cancellation = call.cancellation().clone();
    let outcome = call.outcome();
    tokio::pin!(outcome);

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = &mut outcome => return result,
        _ = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling call"),
        _ = expired => warn!(?deadline, "Deadline reached, cancelling call"),
    }

    cancellation.cancel();
    outcome.await
}
