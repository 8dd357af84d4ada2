//! Adapter entry point: settings, logging, then the DAP session on the
//! process's standard streams.

use std::path::PathBuf;
use std::sync::Arc;

use mibridge_config::{load_config, Config};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::backend::{BackendEvent, MiBackend};
use crate::bridge::Bridge;
use crate::error::BridgeError;
use crate::logging::init_logging;
use crate::server::serve;

/// Where settings come from.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// Explicit config file. It must exist when given.
    pub config_file: Option<PathBuf>,
    /// Directory searched upward for `.mibridge/config.toml`.
    pub project_dir: Option<PathBuf>,
}

/// Load and validate the settings named by `options`.
pub fn load_settings(options: &AdapterOptions) -> Result<Config, BridgeError> {
    let config = load_config(options.config_file.as_deref(), options.project_dir.as_deref())?;
    Ok(config)
}

/// Load settings, start logging and serve one session over `reader` and
/// `writer`.
///
/// A logging setup failure is reported on stderr and the session runs
/// without a log file.
pub async fn run_adapter<R, W>(
    backend: Arc<dyn MiBackend>,
    backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    options: AdapterOptions,
    reader: R,
    writer: W,
) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let config = load_settings(&options)?;
    match init_logging(&config.log) {
        Ok(path) => tracing::info!("mibridge starting, log at {}", path.display()),
        Err(e) => eprintln!("mibridge: logging disabled: {e}"),
    }
    let (bridge, events) = Bridge::new(backend, config);
    serve(bridge, events, backend_events, reader, writer).await?;
    tracing::info!("session closed");
    Ok(())
}

/// [`run_adapter`] on stdin and stdout.
pub async fn run_stdio(
    backend: Arc<dyn MiBackend>,
    backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    options: AdapterOptions,
) -> Result<(), BridgeError> {
    run_adapter(
        backend,
        backend_events,
        options,
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await
}
