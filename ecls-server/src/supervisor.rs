use std::fmt;
use std::sync::Arc;

use ecls_config::{ConfigError, redact_url};
use ecls_system::ShutdownHandle;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::{ReconnectBackoff, Session};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The lifecycle state of the stream connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection is open. This is the initial state and the state between reconnects.
    Disconnected,
    /// The handshake is in progress.
    Connecting,
    /// The handshake succeeded and the read and heartbeat loops are running.
    Connected,
    /// A close frame was sent and the supervisor waits for the peer's acknowledgement.
    Draining,
    /// The connection is closed and the supervisor has returned.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why the supervisor stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    /// A shutdown was requested, usually by a process signal.
    Interrupted,
    /// The connection failed and was not, or could no longer be, reestablished.
    TransportFailed,
}

impl ShutdownReason {
    /// Returns the process exit code for this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Interrupted => 0,
            Self::TransportFailed => 1,
        }
    }
}

/// An error that prevents the supervisor from establishing the stream.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The stream URL could not be built from the configuration.
    #[error("invalid stream target")]
    Target(#[from] ConfigError),
    /// The TLS connector could not be created.
    #[error("failed to configure TLS")]
    Tls(#[from] native_tls::Error),
    /// The websocket handshake failed.
    #[error("websocket handshake failed{}", status_suffix(.status))]
    Handshake {
        /// The HTTP status of the rejected upgrade, if the server responded.
        status: Option<u16>,
        /// The underlying websocket error.
        #[source]
        source: Box<tungstenite::Error>,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {status}"),
        None => String::new(),
    }
}

impl SupervisorError {
    fn handshake(source: tungstenite::Error) -> Self {
        let status = match &source {
            tungstenite::Error::Http(response) => Some(response.status().as_u16()),
            _ => None,
        };

        Self::Handshake {
            status,
            source: Box::new(source),
        }
    }
}

/// Owns the streaming connection.
///
/// The supervisor opens the websocket, feeds every inbound frame into the [`Session`] and keeps the
/// connection alive with a heartbeat frame. It returns when the session is shut down or when the
/// connection fails:
///
///  - On shutdown it sends a close frame and waits up to the configured close timeout for the peer
///    to acknowledge, then drops the connection and reports [`ShutdownReason::Interrupted`].
///  - On a read or write failure it drops the connection without a close handshake. If reconnects
///    are enabled it connects again after a backoff, otherwise it reports
///    [`ShutdownReason::TransportFailed`].
///
/// A failed handshake on the first connection attempt is always an error.
#[derive(Debug)]
pub struct Supervisor {
    session: Arc<Session>,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    /// Creates a supervisor for the given session.
    pub fn new(session: Arc<Session>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { session, state }
    }

    /// Subscribes to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Runs the connection until shutdown or an unrecoverable failure.
    pub async fn run(self) -> Result<ShutdownReason, SupervisorError> {
        let result = self.supervise().await;
        self.set_state(ConnectionState::Closed);
        result
    }

    async fn supervise(&self) -> Result<ShutdownReason, SupervisorError> {
        let config = self.session.config();
        let url = config.stream_url()?;
        let mut shutdown = self.session.controller().shutdown_handle();

        let mut backoff = ReconnectBackoff::new(
            config.reconnect_initial_interval(),
            config.reconnect_max_interval(),
        )
        .with_max_retries(config.reconnect_max_retries());
        let mut connected_before = false;

        loop {
            self.set_state(ConnectionState::Connecting);
            ecls_log::info!("connecting to {}", redact_url(&url));

            let result = tokio::select! {
                biased;

                _ = shutdown.notified() => return Ok(ShutdownReason::Interrupted),
                result = self.connect(&url) => result,
            };

            match result {
                Ok(stream) => {
                    connected_before = true;
                    backoff.reset();
                    self.session.stats().record_connection();
                    self.set_state(ConnectionState::Connected);
                    ecls_log::info!("connected to stream");

                    if self.serve(stream, &mut shutdown).await == ShutdownReason::Interrupted {
                        return Ok(ShutdownReason::Interrupted);
                    }
                }
                Err(error) if connected_before && config.reconnect_enabled() => {
                    ecls_log::error!(
                        error = &error as &dyn std::error::Error,
                        "failed to reconnect to stream"
                    );
                }
                Err(error) => return Err(error),
            }

            self.set_state(ConnectionState::Disconnected);

            if !config.reconnect_enabled() {
                return Ok(ShutdownReason::TransportFailed);
            }

            let Some(delay) = backoff.next_backoff() else {
                ecls_log::error!(
                    "giving up after {} reconnect attempts",
                    backoff.attempt()
                );
                return Ok(ShutdownReason::TransportFailed);
            };

            ecls_log::info!(
                "reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                backoff.attempt()
            );

            tokio::select! {
                biased;

                _ = shutdown.notified() => return Ok(ShutdownReason::Interrupted),
                _ = tokio::time::sleep(delay) => (),
            }
        }
    }

    async fn connect(&self, url: &Url) -> Result<Stream, SupervisorError> {
        let verify = self.session.config().verify_tls();
        if !verify {
            ecls_log::warn!("TLS certificate verification is disabled");
        }

        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!verify)
            .danger_accept_invalid_hostnames(!verify)
            .build()?;

        let (stream, _) = tokio_tungstenite::connect_async_tls_with_config(
            url.as_str(),
            None,
            false,
            Some(Connector::NativeTls(connector)),
        )
        .await
        .map_err(SupervisorError::handshake)?;

        Ok(stream)
    }

    /// Runs the read and heartbeat loops of one open connection.
    async fn serve(&self, stream: Stream, shutdown: &mut ShutdownHandle) -> ShutdownReason {
        let config = self.session.config();
        let (mut sink, stream) = stream.split();
        let mut reader = spawn_reader(self.session.clone(), stream);

        let period = config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = &mut reader => return ShutdownReason::TransportFailed,
                _ = heartbeat.tick() => {
                    let payload = chrono::Utc::now().to_rfc3339();
                    if let Err(error) = sink.send(Message::Text(payload)).await {
                        ecls_log::error!(
                            error = &error as &dyn std::error::Error,
                            "failed to send heartbeat"
                        );
                        reader.abort();
                        return ShutdownReason::TransportFailed;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Draining);
        ecls_log::info!("closing stream connection");

        if let Err(error) = sink.send(Message::Close(None)).await {
            ecls_log::debug!(
                error = &error as &dyn std::error::Error,
                "failed to send close frame"
            );
        }

        match tokio::time::timeout(config.close_timeout(), &mut reader).await {
            Ok(_) => ecls_log::debug!("stream closed by peer"),
            Err(_) => {
                ecls_log::warn!("peer did not acknowledge close, closing connection");
                reader.abort();
            }
        }

        ShutdownReason::Interrupted
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        ecls_log::trace!(%state, "connection state changed");
    }
}

/// Spawns the read loop. The task ends when the peer closes the stream or a read fails.
fn spawn_reader<S>(session: Arc<Session>, mut stream: S) -> JoinHandle<()>
where
    S: futures::Stream<Item = Result<Message, tungstenite::Error>> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    session.handle_message(text.as_bytes());
                }
                Ok(Message::Binary(data)) => {
                    session.handle_message(&data);
                }
                Ok(Message::Close(frame)) => {
                    ecls_log::debug!(?frame, "received close frame");
                }
                Ok(_) => (),
                Err(error) => {
                    ecls_log::error!(
                        error = &error as &dyn std::error::Error,
                        "failed to read from stream"
                    );
                    return;
                }
            }
        }

        ecls_log::debug!("stream ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShutdownReason::Interrupted.exit_code(), 0);
        assert_eq!(ShutdownReason::TransportFailed.exit_code(), 1);
    }

    #[test]
    fn test_handshake_status() {
        let response = tungstenite::http::Response::builder()
            .status(403)
            .body(None)
            .unwrap();

        let error = SupervisorError::handshake(tungstenite::Error::Http(response));
        assert_eq!(error.to_string(), "websocket handshake failed with status 403");
        assert!(matches!(
            error,
            SupervisorError::Handshake {
                status: Some(403),
                ..
            }
        ));

        let error = SupervisorError::handshake(tungstenite::Error::ConnectionClosed);
        assert!(matches!(
            error,
            SupervisorError::Handshake { status: None, .. }
        ));
    }
}
