//! DAP server loop.
//!
//! Requests are handled one at a time in arrival order. `launch` and
//! `attach` are the exception: they wait on the configuration handshake, so
//! each runs in its own task while the requests that complete the handshake
//! keep flowing. A single writer task serializes responses and events and
//! stamps them with increasing sequence numbers.

use mibridge_dap::transport::{read_message, write_message};
use mibridge_dap::{DapError, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use crate::backend::BackendEvent;
use crate::bridge::Bridge;
use crate::dispatch::dispatch;
use crate::events::BridgeEvent;

/// Serve one debug session until the client disconnects or closes the
/// stream.
///
/// `events` is the receiver returned by [`Bridge::new`]; `backend_events`
/// carries the backend's asynchronous records.
pub async fn serve<R, W>(
    bridge: Bridge,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
    backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    reader: R,
    writer: W,
) -> Result<(), DapError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let router = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.run_backend_events(backend_events).await })
    };
    let (response_tx, response_rx) = mpsc::unbounded_channel::<Response>();
    let writer_task = tokio::spawn(write_loop(writer, response_rx, events));

    let mut reader = BufReader::new(reader);
    let read_result = loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!("client closed the stream");
                break Ok(());
            }
            Err(e) => break Err(e),
        };
        let request: Request = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("ignoring malformed message: {e}");
                continue;
            }
        };
        if request.message_type != "request" {
            tracing::debug!("ignoring {} message", request.message_type);
            continue;
        }

        if waits_on_handshake(&request.command) {
            let bridge = bridge.clone();
            let response_tx = response_tx.clone();
            tokio::spawn(async move {
                let response = dispatch(&bridge, &request).await;
                let _ = response_tx.send(response);
            });
            continue;
        }

        let response = dispatch(&bridge, &request).await;
        let _ = response_tx.send(response);
        if request.command == "disconnect" {
            tracing::info!("client disconnected");
            break Ok(());
        }
    };

    drop(response_tx);
    let write_result = match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(DapError::Transport(format!("writer task failed: {e}"))),
    };
    router.abort();
    read_result.and(write_result)
}

fn waits_on_handshake(command: &str) -> bool {
    matches!(command, "launch" | "attach")
}

/// Write responses and events until every response sender is gone.
/// Pending events are written before responses.
async fn write_loop<W>(
    mut writer: W,
    mut responses: mpsc::UnboundedReceiver<Response>,
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
) -> Result<(), DapError>
where
    W: AsyncWrite + Unpin,
{
    let mut seq: i64 = 1;
    loop {
        let value = tokio::select! {
            biased;
            Some(event) = events.recv() => {
                let name = event.name();
                match event.into_event() {
                    Ok(mut event) => {
                        event.seq = seq;
                        serde_json::to_value(&event)
                    }
                    Err(e) => {
                        tracing::error!("cannot encode {name} event: {e}");
                        continue;
                    }
                }
            }
            response = responses.recv() => match response {
                Some(mut response) => {
                    response.seq = seq;
                    serde_json::to_value(&response)
                }
                None => break,
            },
        };
        match value {
            Ok(value) => {
                write_message(&mut writer, &value).await?;
                seq += 1;
            }
            Err(e) => tracing::error!("cannot encode outgoing message: {e}"),
        }
    }
    Ok(())
}
