use std::fmt;

use crate::Namespace;

/// Type used for counter deltas.
pub type CounterType = i64;

/// Type used for gauge values.
pub type GaugeType = u64;

/// Type used for timing samples in milliseconds.
pub type TimingType = u64;

/// The operation a [`MetricMutation`] applies to its metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricOp {
    /// Increments a counter by the given delta. See [`MetricType::Counter`].
    Increment(CounterType),
    /// Sets a gauge to an absolute value. See [`MetricType::Gauge`].
    SetAbsolute(GaugeType),
    /// Records a single timing sample in milliseconds. See [`MetricType::Timing`].
    Timing(TimingType),
}

impl MetricOp {
    /// Returns the type of metric this operation applies to.
    pub fn ty(&self) -> MetricType {
        match self {
            Self::Increment(_) => MetricType::Counter,
            Self::SetAbsolute(_) => MetricType::Gauge,
            Self::Timing(_) => MetricType::Timing,
        }
    }
}

impl fmt::Display for MetricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increment(value) => value.fmt(f),
            Self::SetAbsolute(value) => value.fmt(f),
            Self::Timing(value) => value.fmt(f),
        }
    }
}

/// The statsd type of a metric, determining its aggregation within a flush window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    /// Counts instances of an event.
    ///
    /// Increments within the same flush window are summed.
    Counter,
    /// Stores an absolute snapshot of a value.
    ///
    /// Only the last value set within a flush window is transmitted.
    Gauge,
    /// Records durations.
    ///
    /// Every sample recorded within a flush window is transmitted.
    Timing,
}

impl MetricType {
    /// Returns the statsd shortcode for this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Timing => "ms",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change to a metric in one namespace.
///
/// The `name` is relative to the namespace prefix and starts with the namespace key, for
/// instance `.svc.pkgA.planX.ep1.GET.bytes`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetricMutation {
    /// The namespace receiving this mutation.
    pub namespace: Namespace,
    /// The metric name relative to the namespace prefix.
    pub name: String,
    /// The operation to apply.
    pub op: MetricOp,
}

impl MetricMutation {
    /// Creates a counter increment.
    pub fn increment(namespace: Namespace, name: impl Into<String>, delta: CounterType) -> Self {
        Self {
            namespace,
            name: name.into(),
            op: MetricOp::Increment(delta),
        }
    }

    /// Creates an absolute gauge update.
    pub fn set_absolute(namespace: Namespace, name: impl Into<String>, value: GaugeType) -> Self {
        Self {
            namespace,
            name: name.into(),
            op: MetricOp::SetAbsolute(value),
        }
    }

    /// Creates a timing sample.
    pub fn timing(namespace: Namespace, name: impl Into<String>, millis: TimingType) -> Self {
        Self {
            namespace,
            name: name.into(),
            op: MetricOp::Timing(millis),
        }
    }
}

/// Formats the mutation in the statsd line protocol, without the namespace prefix.
impl fmt::Display for MetricMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|{}", self.name, self.op, self.op.ty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_line() {
        let counter = MetricMutation::increment(Namespace::Service, ".svc.status_code.200", 1);
        let gauge = MetricMutation::set_absolute(Namespace::Developer, ".key123.bytes", 512);
        let timing =
            MetricMutation::timing(Namespace::Endpoint, ".GET./v1.total_request_exec_time", 50);

        assert_eq!(counter.to_string(), ".svc.status_code.200:1|c");
        assert_eq!(gauge.to_string(), ".key123.bytes:512|g");
        assert_eq!(timing.to_string(), ".GET./v1.total_request_exec_time:50|ms");
    }
}
