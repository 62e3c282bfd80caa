//! Replay a scripted session in-process

use anyhow::Result;
use bytes::Bytes;
use streamfold_core::transport::{loopback, LoopbackError, LoopbackPeer};
use streamfold_core::{CompletionResult, StreamingCall};
use tracing::{debug, info};

use super::wait_for_outcome;
use crate::script::Script;

/// Run `request` against a loopback peer that answers from `script`
pub async fn run(script: Script, request: Bytes) -> Result<CompletionResult> {
    let (driver, events, peer) = loopback::channel();
    let call = StreamingCall::spawn(driver, events, request);
    let peer_task = tokio::spawn(play(peer, script));

    let result = wait_for_outcome(call, None).await;
    if let Err(e) = peer_task.await? {
        // The call ended before the script did (cancelled)
        debug!(error = %e, "Replay: script stopped early");
    }
    Ok(result)
}

async fn play(mut peer: LoopbackPeer, script: Script) -> Result<(), LoopbackError> {
    let request = peer.recv_request().await?;
    info!(bytes = request.len(), chunks = script.chunks.len(), "Replay: request received");

    let delay = script.delay();
    let status = script.status();
    for chunk in script.chunks {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        peer.send(chunk)?;
    }
    peer.finish(status)
}
