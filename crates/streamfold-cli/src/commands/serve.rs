//! Answer framed calls over TCP from a script

use std::sync::Arc;

use anyhow::{Context, Result};
use streamfold_core::transport::{FramedResponder, WireError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::script::Script;

pub async fn run(address: &str, script: Script) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(address = %listener.local_addr()?, "Serving scripted responses");

    let script = Arc::new(script);
    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        };

        let script = Arc::clone(&script);
        tokio::spawn(async move {
            if let Err(e) = respond(socket, &script).await {
                warn!(%peer, error = %e, "Call failed");
            } else {
                info!(%peer, "Call answered");
            }
        });
    }
}

/// Serve one call on `io`
pub async fn respond<T>(io: T, script: &Script) -> Result<(), WireError>
where
    T: AsyncRead + AsyncWrite,
{
    let mut responder = FramedResponder::new(io);
    let request = responder.read_request().await?;
    info!(bytes = request.len(), "Request received");

    for chunk in &script.chunks {
        if let Some(delay) = script.delay() {
            tokio::time::sleep(delay).await;
        }
        responder.send(chunk.clone()).await?;
    }
    responder.finish(script.status()).await
}
