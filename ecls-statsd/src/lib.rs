//! Buffered statsd sinks for derived metrics.
//!
//! Every metric [`Namespace`](ecls_metrics::Namespace) owns a [`NamespaceSink`] with its own
//! [`AggregationBuffer`] and metric prefix. All sinks write to one shared [`MetricsTransport`],
//! which packs metric lines into datagrams and sends them to the statsd backend.
//!
//! Within a flush window, counters are summed, gauges keep their last value and timings keep
//! every sample. A flush emits the window as statsd lines and clears it, regardless of whether
//! sending succeeds:
//!
//! ```text
//! mashery.service.svc.pkgA.planX.ep1.GET.status_code.200:2|c
//! mashery.service.svc.pkgA.planX.ep1.GET.bytes:512|g
//! mashery.service.svc.pkgA.planX.ep1.GET.total_request_exec_time:50|ms
//! ```
//!
//! ## Transport
//!
//! ```no_run
//! use ecls_metrics::MetricsConfig;
//! use ecls_statsd::{MetricSinks, MetricsTransport};
//!
//! let transport = MetricsTransport::connect("udp://127.0.0.1:8125", 512).unwrap();
//! let sinks = MetricSinks::from_config(&MetricsConfig::default(), transport);
//! sinks.flush_all();
//! ```

#![warn(missing_docs)]

mod sink;
mod transport;

pub use self::sink::*;
pub use self::transport::*;
