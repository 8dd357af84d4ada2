//! Request dispatch.
//!
//! Decodes the arguments of each frontend request, calls the matching
//! [`Bridge`] method and turns the result into a response. Failures become
//! error responses; nothing here panics on bad input.

use mibridge_dap::{DapError, Request, Response};
use serde::Serialize;
use serde_json::{json, Value};

use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::launch::LaunchOutcome;

/// Name of the custom request that starts a simulated progress sequence.
pub const RUN_PROGRESS_COMMAND: &str = "runProgress";

/// Handle one request and produce its response.
pub async fn dispatch(bridge: &Bridge, request: &Request) -> Response {
    tracing::debug!(seq = request.seq, command = %request.command, "request");
    match handle(bridge, request).await {
        Ok(body) => Response::success(request, body),
        Err(e) => {
            tracing::warn!("{} failed: {e}", request.command);
            Response::error(request, e.to_string())
        }
    }
}

async fn handle(bridge: &Bridge, request: &Request) -> Result<Option<Value>, BridgeError> {
    match request.command.as_str() {
        "initialize" => body(&bridge.initialize(request.arguments_as()?)),
        "launch" => launched(bridge.launch(request.arguments_as()?).await?),
        "attach" => launched(bridge.attach(request.arguments_as()?).await?),
        "configurationDone" => {
            bridge.configuration_done();
            Ok(None)
        }
        "setBreakpoints" => body(&bridge.set_breakpoints(request.arguments_as()?).await?),
        "dataBreakpointInfo" => {
            body(&bridge.data_breakpoint_info(request.arguments_as()?).await)
        }
        "threads" => body(&bridge.threads().await?),
        "stackTrace" => body(&bridge.stack_trace(request.arguments_as()?).await?),
        "scopes" => body(&bridge.scopes(request.arguments_as()?).await?),
        "variables" => body(&bridge.variables(request.arguments_as()?).await?),
        "evaluate" => body(&bridge.evaluate(request.arguments_as()?).await?),
        "continue" => body(&bridge.resume(request.arguments_as()?).await?),
        "reverseContinue" => none(bridge.reverse_continue(request.arguments_as()?).await),
        "next" => none(bridge.next(request.arguments_as()?).await),
        "stepIn" => none(bridge.step_in(request.arguments_as()?).await),
        "stepOut" => none(bridge.step_out(request.arguments_as()?).await),
        "pause" => none(bridge.pause(request.arguments_as()?).await),
        "terminateThreads" => none(bridge.terminate_threads(request.arguments_as()?).await),
        "cancel" => {
            bridge.cancel(request.arguments_as()?);
            Ok(None)
        }
        "disconnect" => {
            bridge.disconnect(request.arguments_as()?).await;
            Ok(None)
        }
        RUN_PROGRESS_COMMAND => Ok(Some(json!({ "progressId": bridge.run_progress() }))),
        other => Err(DapError::UnsupportedCommand(other.to_string()).into()),
    }
}

/// A failed pipeline has already reported itself and sent `terminated`;
/// the request itself still succeeds.
fn launched(outcome: LaunchOutcome) -> Result<Option<Value>, BridgeError> {
    if let LaunchOutcome::Failed(message) = outcome {
        tracing::debug!("launch pipeline ended early: {message}");
    }
    Ok(None)
}

fn none(result: Result<(), BridgeError>) -> Result<Option<Value>, BridgeError> {
    result.map(|()| None)
}

fn body<T: Serialize>(value: &T) -> Result<Option<Value>, BridgeError> {
    serde_json::to_value(value)
        .map(Some)
        .map_err(|e| DapError::InvalidMessage(format!("cannot encode response: {e}")).into())
}
