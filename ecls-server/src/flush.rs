use std::sync::Arc;

use ecls_statsd::NamespaceSink;
use ecls_system::ShutdownHandle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::Session;

/// Periodically flushes the buffer of one namespace sink to the transport.
///
/// The first flush happens one interval after start. When the stop handle fires, the service
/// flushes one last time and exits. The stop handle is separate from the session shutdown, so
/// that events read while the connection drains still reach the final flush.
#[derive(Debug)]
pub struct FlushService {
    session: Arc<Session>,
    sink: Arc<NamespaceSink>,
}

impl FlushService {
    /// Creates a flush service for one sink of the session.
    pub fn new(session: Arc<Session>, sink: Arc<NamespaceSink>) -> Self {
        Self { session, sink }
    }

    /// Spawns the flush loop on the current runtime. The loop runs until `stop` is notified.
    pub fn start(self, mut stop: ShutdownHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.session.config().flush_interval();
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            ecls_log::debug!(namespace = %self.sink.namespace(), "flush service started");

            loop {
                tokio::select! {
                    biased;

                    _ = stop.notified() => break,
                    _ = ticker.tick() => self.flush(),
                }
            }

            self.flush();
            ecls_log::debug!(namespace = %self.sink.namespace(), "flush service stopped");
        })
    }

    fn flush(&self) {
        let report = self.sink.flush();
        if report.failed > 0 {
            ecls_log::warn!(
                namespace = %self.sink.namespace(),
                failed = report.failed,
                "dropped metrics during flush"
            );
        }
        ecls_log::trace!(
            namespace = %self.sink.namespace(),
            emitted = report.emitted,
            "flushed metrics"
        );
        self.session.stats().record_flush(report);
    }
}
