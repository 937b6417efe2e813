use std::sync::Arc;

use ecls_config::Config;
use ecls_event::Decoder;
use ecls_metrics::Deriver;
use ecls_statsd::{MetricSinks, MetricsTransport};
use ecls_system::Controller;

use crate::{Pipeline, ProcessOutcome, SessionStats};

/// The state shared by all tasks of a running bridge.
///
/// A session is created once at startup and handed to the [`Supervisor`](crate::Supervisor) and
/// the [`FlushService`](crate::FlushService)s.
#[derive(Debug)]
pub struct Session {
    config: Arc<Config>,
    controller: Controller,
    pipeline: Pipeline,
    stats: SessionStats,
}

impl Session {
    /// Creates a session with one sink per enabled namespace on the given transport.
    pub fn new(config: Arc<Config>, transport: MetricsTransport, controller: Controller) -> Self {
        let metrics = config.metrics();
        let pipeline = Pipeline::new(
            Decoder::new(config.control_prefix()),
            Deriver::new(metrics),
            MetricSinks::from_config(metrics, transport),
        );

        Self {
            config,
            controller,
            pipeline,
            stats: SessionStats::default(),
        }
    }

    /// Returns the bridge configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Returns the shutdown controller.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Returns the namespace sinks.
    pub fn sinks(&self) -> &MetricSinks {
        self.pipeline.sinks()
    }

    /// Returns the session counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Runs one inbound message through the pipeline and counts its outcome.
    pub fn handle_message(&self, raw: &[u8]) -> ProcessOutcome {
        let outcome = self.pipeline.process(raw);
        self.stats.record(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use ecls_metrics::Namespace;

    use super::*;

    #[test]
    fn test_disabled_namespace_has_no_sink() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": {
                "url": "ws://127.0.0.1:1/stream",
                "control_prefix": "ACK"
            },
            "metrics": {
                "developer": { "enabled": false }
            }
        }))
        .unwrap();

        let (_rx, transport) = ecls_statsd::capturing_transport();
        let session = Session::new(Arc::new(config), transport, Controller::new());

        assert!(session.sinks().get(Namespace::Developer).is_none());
        assert_eq!(session.sinks().iter().count(), 2);

        assert!(matches!(
            session.handle_message(b"ACK subscribed"),
            ProcessOutcome::Control
        ));
        assert!(matches!(
            session.handle_message(br#"{"data":[{"service_name":"svc"}]}"#),
            ProcessOutcome::Processed { mutations: 4, .. }
        ));

        let stats = session.stats().snapshot();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.control_messages, 1);
        assert_eq!(stats.mutations, 4);
    }
}
