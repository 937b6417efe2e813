use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ecls_statsd::FlushReport;

use crate::ProcessOutcome;

/// Counters of a bridge session.
///
/// Updated by the read loop and the flush services. Totals are logged at shutdown.
#[derive(Debug, Default)]
pub struct SessionStats {
    messages: AtomicU64,
    control_messages: AtomicU64,
    decode_failures: AtomicU64,
    events: AtomicU64,
    mutations: AtomicU64,
    skipped_namespaces: AtomicU64,
    numeric_failures: AtomicU64,
    flushed: AtomicU64,
    flush_failures: AtomicU64,
    connections: AtomicU64,
}

impl SessionStats {
    /// Records the outcome of one inbound message.
    pub fn record(&self, outcome: &ProcessOutcome) {
        self.messages.fetch_add(1, Ordering::Relaxed);

        match outcome {
            ProcessOutcome::Control => {
                self.control_messages.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Rejected(_) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
            }
            ProcessOutcome::Processed {
                mutations,
                skipped,
                numeric_failures,
            } => {
                self.events.fetch_add(1, Ordering::Relaxed);
                self.mutations.fetch_add(*mutations as u64, Ordering::Relaxed);
                self.skipped_namespaces
                    .fetch_add(*skipped as u64, Ordering::Relaxed);
                self.numeric_failures
                    .fetch_add(*numeric_failures as u64, Ordering::Relaxed);
            }
        }
    }

    /// Records the result of a sink flush.
    pub fn record_flush(&self, report: FlushReport) {
        self.flushed
            .fetch_add(report.emitted as u64, Ordering::Relaxed);
        self.flush_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Records an established stream connection.
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a consistent copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            control_messages: self.control_messages.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            skipped_namespaces: self.skipped_namespaces.load(Ordering::Relaxed),
            numeric_failures: self.numeric_failures.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`SessionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// All inbound messages.
    pub messages: u64,
    /// Messages discarded as control traffic.
    pub control_messages: u64,
    /// Messages that failed to decode.
    pub decode_failures: u64,
    /// Decoded event records.
    pub events: u64,
    /// Derived metric mutations.
    pub mutations: u64,
    /// Namespaces skipped by a strict inclusion policy.
    pub skipped_namespaces: u64,
    /// Byte counts and execution times that failed to parse.
    pub numeric_failures: u64,
    /// Metric lines handed to the transport.
    pub flushed: u64,
    /// Metric lines the transport rejected.
    pub flush_failures: u64,
    /// Established stream connections.
    pub connections: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages ({} events, {} control, {} malformed), {} mutations, {} metrics flushed, {} dropped",
            self.messages,
            self.events,
            self.control_messages,
            self.decode_failures,
            self.mutations,
            self.flushed,
            self.flush_failures,
        )
    }
}
