use std::collections::BTreeMap;
use std::sync::Arc;

use cadence::StatsdClient;
use cadence::prelude::*;
use ecls_metrics::{
    CounterType, GaugeType, MetricMutation, MetricOp, MetricsConfig, Namespace, TimingType,
};
use parking_lot::Mutex;

use crate::MetricsTransport;

/// Pending metrics of one flush window.
///
/// Counters are summed, gauges keep the last value and timings keep every sample. Metrics are
/// keyed by their name relative to the namespace prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregationBuffer {
    counters: BTreeMap<String, CounterType>,
    gauges: BTreeMap<String, GaugeType>,
    timings: Vec<(String, TimingType)>,
}

impl AggregationBuffer {
    /// Adds `delta` to the counter `name`.
    pub fn increment(&mut self, name: &str, delta: CounterType) {
        match self.counters.get_mut(name) {
            Some(value) => *value = value.saturating_add(delta),
            None => {
                self.counters.insert(name.to_owned(), delta);
            }
        }
    }

    /// Sets the gauge `name`, replacing an earlier value of this window.
    pub fn set_absolute(&mut self, name: &str, value: GaugeType) {
        match self.gauges.get_mut(name) {
            Some(current) => *current = value,
            None => {
                self.gauges.insert(name.to_owned(), value);
            }
        }
    }

    /// Appends a timing sample for `name`.
    pub fn record_timing(&mut self, name: &str, millis: TimingType) {
        self.timings.push((name.to_owned(), millis));
    }

    /// Applies a mutation regardless of its namespace.
    pub fn apply(&mut self, name: &str, op: MetricOp) {
        match op {
            MetricOp::Increment(delta) => self.increment(name, delta),
            MetricOp::SetAbsolute(value) => self.set_absolute(name, value),
            MetricOp::Timing(millis) => self.record_timing(name, millis),
        }
    }

    /// Returns the number of metric lines a flush would emit.
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.timings.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current value of a counter.
    pub fn counter(&self, name: &str) -> Option<CounterType> {
        self.counters.get(name).copied()
    }

    /// Returns the current value of a gauge.
    pub fn gauge(&self, name: &str) -> Option<GaugeType> {
        self.gauges.get(name).copied()
    }

    /// Returns all timing samples recorded for `name`.
    pub fn timings<'a>(&'a self, name: &'a str) -> impl Iterator<Item = TimingType> + 'a {
        self.timings
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, millis)| *millis)
    }
}

/// The outcome of a single flush.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Metric lines handed to the transport.
    pub emitted: usize,
    /// Metric lines the transport rejected. They are not retried.
    pub failed: usize,
}

impl FlushReport {
    /// Returns `true` if nothing was flushed.
    pub fn is_empty(&self) -> bool {
        self.emitted == 0 && self.failed == 0
    }
}

/// Buffers the metrics of one [`Namespace`] and flushes them to the transport.
///
/// Writers and flushes synchronize on the buffer lock. A flush swaps out the buffer under the lock
/// and emits outside of it, so the buffer is cleared even if the transport fails.
pub struct NamespaceSink {
    namespace: Namespace,
    prefix: String,
    buffer: Mutex<AggregationBuffer>,
    client: StatsdClient,
}

impl NamespaceSink {
    /// Creates a sink emitting metrics as `<prefix><name>`.
    pub fn new(namespace: Namespace, prefix: impl Into<String>, transport: MetricsTransport) -> Self {
        Self {
            namespace,
            prefix: prefix.into(),
            buffer: Mutex::new(AggregationBuffer::default()),
            // The prefix is joined manually since metric names already start with a dot.
            client: StatsdClient::from_sink("", transport),
        }
    }

    /// Returns the namespace of this sink.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Returns the metric prefix of this sink.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Adds `delta` to a counter.
    pub fn increment(&self, name: &str, delta: CounterType) {
        self.buffer.lock().increment(name, delta);
    }

    /// Sets a gauge.
    pub fn set_absolute(&self, name: &str, value: GaugeType) {
        self.buffer.lock().set_absolute(name, value);
    }

    /// Records a timing sample in milliseconds.
    pub fn record_timing(&self, name: &str, millis: TimingType) {
        self.buffer.lock().record_timing(name, millis);
    }

    /// Applies a derived mutation to this sink.
    pub fn apply(&self, mutation: &MetricMutation) {
        debug_assert_eq!(mutation.namespace, self.namespace);
        self.buffer.lock().apply(&mutation.name, mutation.op);
    }

    /// Returns a copy of the pending buffer.
    pub fn snapshot(&self) -> AggregationBuffer {
        self.buffer.lock().clone()
    }

    /// Returns the number of pending metric lines.
    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Sends all pending metrics and clears the buffer.
    ///
    /// Lines rejected by the transport are counted in the report and dropped. Flushing an empty
    /// buffer sends nothing.
    pub fn flush(&self) -> FlushReport {
        let buffer = std::mem::take(&mut *self.buffer.lock());
        let mut report = FlushReport::default();

        if buffer.is_empty() {
            return report;
        }

        let mut record = |result: Result<(), cadence::MetricError>| match result {
            Ok(()) => report.emitted += 1,
            Err(error) => {
                ecls_log::debug!(
                    error = &error as &dyn std::error::Error,
                    namespace = %self.namespace,
                    "failed to emit metric"
                );
                report.failed += 1;
            }
        };

        for (name, value) in &buffer.counters {
            let key = format!("{}{name}", self.prefix);
            record(self.client.count(&key, *value).map(drop));
        }

        for (name, value) in &buffer.gauges {
            let key = format!("{}{name}", self.prefix);
            record(self.client.gauge(&key, *value).map(drop));
        }

        for (name, millis) in &buffer.timings {
            let key = format!("{}{name}", self.prefix);
            record(self.client.time(&key, *millis).map(drop));
        }

        if let Err(error) = self.client.flush() {
            ecls_log::warn!(
                error = &error as &dyn std::error::Error,
                namespace = %self.namespace,
                "failed to flush metrics"
            );
        }

        if report.failed > 0 {
            ecls_log::warn!(
                namespace = %self.namespace,
                failed = report.failed,
                "dropped metrics that could not be sent"
            );
        }

        report
    }
}

impl std::fmt::Debug for NamespaceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceSink")
            .field("namespace", &self.namespace)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// The sinks of all enabled namespaces, sharing one transport.
#[derive(Clone, Debug)]
pub struct MetricSinks {
    sinks: Vec<Arc<NamespaceSink>>,
}

impl MetricSinks {
    /// Creates one sink per enabled namespace of the configuration.
    pub fn from_config(config: &MetricsConfig, transport: MetricsTransport) -> Self {
        let sinks = config
            .enabled()
            .map(|namespace| {
                Arc::new(NamespaceSink::new(
                    namespace,
                    config.prefix(namespace),
                    transport.clone(),
                ))
            })
            .collect();

        Self { sinks }
    }

    /// Returns the sink of a namespace, if it is enabled.
    pub fn get(&self, namespace: Namespace) -> Option<&Arc<NamespaceSink>> {
        self.sinks.iter().find(|sink| sink.namespace == namespace)
    }

    /// Returns an iterator over all sinks.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NamespaceSink>> {
        self.sinks.iter()
    }

    /// Routes every mutation to the sink of its namespace.
    ///
    /// Returns the number of applied mutations. Mutations for disabled namespaces are ignored.
    pub fn route<'a>(&self, mutations: impl IntoIterator<Item = &'a MetricMutation>) -> usize {
        let mut applied = 0;
        for mutation in mutations {
            if let Some(sink) = self.get(mutation.namespace) {
                sink.apply(mutation);
                applied += 1;
            }
        }
        applied
    }

    /// Flushes all sinks and returns the combined report.
    pub fn flush_all(&self) -> FlushReport {
        self.sinks
            .iter()
            .map(|sink| sink.flush())
            .fold(FlushReport::default(), |acc, report| FlushReport {
                emitted: acc.emitted + report.emitted,
                failed: acc.failed + report.failed,
            })
    }
}
