//! Issue one call against a framed TCP peer

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use streamfold_core::transport::connect;
use streamfold_core::{CompletionResult, StreamingCall};
use tracing::info;

use super::wait_for_outcome;

pub async fn run(
    address: &str,
    connect_timeout: Duration,
    deadline: Option<Duration>,
    request: Bytes,
) -> Result<CompletionResult> {
    let (driver, events) = tokio::time::timeout(connect_timeout, connect(address))
        .await
        .map_err(|_| anyhow!("Timed out connecting to {address} after {connect_timeout:?}"))?
        .with_context(|| format!("Failed to connect to {address}"))?;
    info!(%address, bytes = request.len(), "Connected, sending request");

    let call = StreamingCall::spawn(driver, events, request);
    Ok(wait_for_outcome(call, deadline).await)
}
