use ecls_event::{DecodeError, Decoder, InboundMessage};
use ecls_metrics::Deriver;
use ecls_statsd::MetricSinks;

/// The result of processing one inbound message.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The message was control traffic and was discarded.
    Control,
    /// The message could not be decoded and was dropped.
    Rejected(DecodeError),
    /// The message was decoded and its metrics were buffered.
    Processed {
        /// Mutations applied to the sinks.
        mutations: usize,
        /// Namespaces skipped by a strict inclusion policy.
        skipped: usize,
        /// Numeric fields that failed to parse.
        numeric_failures: usize,
    },
}

/// Decodes inbound messages, derives their metrics and buffers them in the sinks.
#[derive(Debug)]
pub struct Pipeline {
    decoder: Decoder,
    deriver: Deriver,
    sinks: MetricSinks,
}

impl Pipeline {
    /// Creates a new pipeline.
    pub fn new(decoder: Decoder, deriver: Deriver, sinks: MetricSinks) -> Self {
        Self {
            decoder,
            deriver,
            sinks,
        }
    }

    /// Returns the sinks receiving derived metrics.
    pub fn sinks(&self) -> &MetricSinks {
        &self.sinks
    }

    /// Processes one raw message.
    ///
    /// Decode failures are logged and reported in the outcome. They never interrupt the stream.
    pub fn process(&self, raw: &[u8]) -> ProcessOutcome {
        let record = match self.decoder.decode(raw) {
            Ok(InboundMessage::Event(record)) => record,
            Ok(InboundMessage::Control) => {
                ecls_log::debug!(
                    message = %String::from_utf8_lossy(raw),
                    "discarding control message"
                );
                return ProcessOutcome::Control;
            }
            Err(error) => {
                ecls_log::warn!(
                    error = &error as &dyn std::error::Error,
                    "dropping malformed message"
                );
                return ProcessOutcome::Rejected(error);
            }
        };

        let derivation = self.deriver.derive(&record);
        for field in &derivation.numeric_failures {
            ecls_log::debug!(%field, "omitting metric with unparsable value");
        }

        ProcessOutcome::Processed {
            mutations: self.sinks.route(&derivation.mutations),
            skipped: derivation.skipped.len(),
            numeric_failures: derivation.numeric_failures.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ecls_metrics::{InclusionPolicy, MetricsConfig, Namespace};

    use super::*;

    const EVENT: &str = r#"{"data":[{
        "service_name":"svc",
        "package_name":"pkgA",
        "plan_name":"planX",
        "endpoint_name":"ep1",
        "api_method_name":"GET",
        "api_key":"key123",
        "http_status_code":"200",
        "response_string":"OK",
        "bytes":"512",
        "total_request_exec_time":"0.05",
        "uri":"/v1/items?x=1",
        "http_method":"GET"
    }]}"#;

    fn pipeline(config: &MetricsConfig) -> (crossbeam_channel::Receiver<Vec<u8>>, Pipeline) {
        let (rx, transport) = ecls_statsd::capturing_transport();
        let pipeline = Pipeline::new(
            Decoder::default(),
            Deriver::new(config),
            MetricSinks::from_config(config, transport),
        );
        (rx, pipeline)
    }

    #[test]
    fn test_event_end_to_end() {
        let (rx, pipeline) = pipeline(&MetricsConfig::default());

        let outcome = pipeline.process(EVENT.as_bytes());
        assert!(matches!(
            outcome,
            ProcessOutcome::Processed {
                mutations: 12,
                skipped: 0,
                numeric_failures: 0
            }
        ));

        pipeline.sinks().flush_all();
        let lines: Vec<_> = rx
            .try_iter()
            .map(|line| String::from_utf8(line).unwrap())
            .collect();

        insta::assert_debug_snapshot!(lines, @r###"
        [
            "mashery.service.svc.pkgA.planX.ep1.GET.response_string.OK:1|c",
            "mashery.service.svc.pkgA.planX.ep1.GET.status_code.200:1|c",
            "mashery.service.svc.pkgA.planX.ep1.GET.bytes:512|g",
            "mashery.service.svc.pkgA.planX.ep1.GET.total_request_exec_time:50|ms",
            "mashery.developer.key123.response_string.OK:1|c",
            "mashery.developer.key123.status_code.200:1|c",
            "mashery.developer.key123.bytes:512|g",
            "mashery.developer.key123.total_request_exec_time:50|ms",
            "mashery.endpoint.GET./v1/items.response_string.OK:1|c",
            "mashery.endpoint.GET./v1/items.status_code.200:1|c",
            "mashery.endpoint.GET./v1/items.bytes:512|g",
            "mashery.endpoint.GET./v1/items.total_request_exec_time:50|ms",
        ]
        "###);
    }

    #[test]
    fn test_control_message_discarded() {
        let (rx, pipeline) = pipeline(&MetricsConfig::default());

        let outcome = pipeline.process(b"Response To subscribe");
        assert!(matches!(outcome, ProcessOutcome::Control));

        pipeline.sinks().flush_all();
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_malformed_message_dropped() {
        let (_rx, pipeline) = pipeline(&MetricsConfig::default());

        let outcome = pipeline.process(b"{\"data\":");
        assert!(matches!(
            outcome,
            ProcessOutcome::Rejected(DecodeError::InvalidPayload(_))
        ));

        let outcome = pipeline.process(EVENT.as_bytes());
        assert!(matches!(outcome, ProcessOutcome::Processed { .. }));
    }

    #[test]
    fn test_strict_namespace_skipped() {
        let mut config = MetricsConfig::default();
        config.service.inclusion = InclusionPolicy::Strict;
        let (_rx, pipeline) = pipeline(&config);

        let outcome = pipeline.process(br#"{"data":[{"service_name":"svc","bytes":"1"}]}"#);
        assert!(matches!(
            outcome,
            ProcessOutcome::Processed {
                mutations: 6,
                skipped: 1,
                numeric_failures: 1
            }
        ));
        assert_eq!(
            pipeline.sinks().get(Namespace::Service).unwrap().pending(),
            0
        );
    }
}
