use std::sync::Arc;

use ecls_config::Config;
use ecls_statsd::{MetricsTransport, TransportError};
use ecls_system::Controller;

use crate::{FlushService, Session, ShutdownReason, Supervisor, SupervisorError};

/// Indicates the type of failure of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The statsd transport could not be opened.
    #[error("could not open the metrics transport")]
    Transport(#[from] TransportError),
    /// The stream connection could not be established.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Opens the metrics transport and runs the bridge until shutdown.
///
/// The controller must be driven separately, see [`Controller::run`].
pub async fn run(config: Arc<Config>, controller: Controller) -> Result<ShutdownReason, ServerError> {
    let transport =
        MetricsTransport::connect(config.statsd_addr(), config.statsd_max_datagram_size())?;
    let session = Arc::new(Session::new(config, transport, controller));
    Ok(serve(session).await?)
}

/// Runs the supervisor and the flush services of a session.
///
/// The flush services keep running while the supervisor drains the connection, and are stopped
/// only after the supervisor has returned. This function returns after every flush service has
/// performed its final flush. Errors are returned to the caller without being logged.
pub async fn serve(session: Arc<Session>) -> Result<ShutdownReason, SupervisorError> {
    let flushing = Controller::new();
    let flushers: Vec<_> = session
        .sinks()
        .iter()
        .map(|sink| {
            FlushService::new(session.clone(), sink.clone()).start(flushing.shutdown_handle())
        })
        .collect();

    let result = Supervisor::new(session.clone()).run().await;

    session.controller().shutdown();
    flushing.shutdown();
    for flusher in flushers {
        if let Err(error) = flusher.await {
            ecls_log::error!(
                error = &error as &dyn std::error::Error,
                "flush service failed"
            );
        }
    }

    let stats = session.stats().snapshot();
    ecls_log::info!("session summary: {stats}");

    if let Ok(reason) = &result {
        ecls_log::info!(?reason, "shutdown complete");
    }

    result
}
