use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// The reason a [`Shutdown`] was issued.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ShutdownSignal {
    /// `SIGINT` or Ctrl-C.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// Shutdown requested programmatically through [`Controller::shutdown`].
    Manual,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Manual => write!(f, "manual shutdown"),
        }
    }
}

/// Shutdown request broadcast by the [`Controller`] to all [`ShutdownHandle`]s.
///
/// Receivers must stop accepting new work, finish in-flight work in an orderly manner and then
/// return. There is no acknowledgement; the controller does not wait for receivers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Shutdown {
    /// The signal that initiated the shutdown.
    pub signal: ShutdownSignal,
}

/// Notifies a component about the shutdown of the process.
///
/// Obtain a handle through [`Controller::shutdown_handle`]. Handles can be cloned freely and
/// each clone observes the shutdown independently.
#[derive(Clone, Debug)]
pub struct ShutdownHandle(watch::Receiver<Option<Shutdown>>);

impl ShutdownHandle {
    /// Returns the current shutdown state, if a shutdown has been issued.
    pub fn get(&self) -> Option<Shutdown> {
        *self.0.borrow()
    }

    /// Waits for a shutdown.
    ///
    /// Resolves immediately if the shutdown was issued before this call. If the [`Controller`] is
    /// dropped without issuing a shutdown, this resolves with [`ShutdownSignal::Manual`].
    pub async fn notified(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = *self.0.borrow_and_update() {
                return shutdown;
            }

            if self.0.changed().await.is_err() {
                return Shutdown {
                    signal: ShutdownSignal::Manual,
                };
            }
        }
    }
}

/// Service to start and gracefully stop the bridge.
///
/// The controller owns the shutdown broadcast. Components subscribe through
/// [`shutdown_handle`](Self::shutdown_handle) and wait on [`ShutdownHandle::notified`].
/// [`run`](Self::run) listens for `SIGINT` and `SIGTERM` and issues the shutdown when one
/// arrives.
///
/// ### Example
///
/// ```
/// use ecls_system::{Controller, ShutdownSignal};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let controller = Controller::new();
/// let mut shutdown = controller.shutdown_handle();
///
/// controller.shutdown();
/// assert_eq!(shutdown.notified().await.signal, ShutdownSignal::Manual);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Controller {
    tx: Arc<watch::Sender<Option<Shutdown>>>,
}

impl Controller {
    /// Creates a new controller without a pending shutdown.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a [handle](ShutdownHandle) to receive the shutdown notification.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.subscribe())
    }

    /// Issues a shutdown that is not tied to a process signal.
    pub fn shutdown(&self) {
        self.notify(ShutdownSignal::Manual);
    }

    /// Returns `true` once a shutdown has been issued.
    pub fn is_shutting_down(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Listens for process signals until the first one arrives and broadcasts the shutdown.
    ///
    /// This future should be spawned for the lifetime of the process. It resolves with the signal
    /// that triggered the shutdown, or immediately if a shutdown has already been issued.
    pub async fn run(&self) -> ShutdownSignal {
        let mut handle = self.shutdown_handle();

        let signal = tokio::select! {
            biased;

            shutdown = handle.notified() => return shutdown.signal,
            signal = wait_for_signal() => signal,
        };

        match signal {
            ShutdownSignal::Interrupt => ecls_log::info!("SIGINT received, exiting"),
            ShutdownSignal::Terminate => ecls_log::info!("SIGTERM received, exiting"),
            ShutdownSignal::Manual => {}
        }

        self.notify(signal);
        signal
    }

    fn notify(&self, signal: ShutdownSignal) {
        // Only the first shutdown counts. Later signals must not change the reason.
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Shutdown { signal });
            true
        });
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownSignal {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => Some(term),
        Err(error) => {
            ecls_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to register SIGTERM handler"
            );
            None
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                ecls_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to listen for SIGINT"
                );
                std::future::pending::<()>().await;
            }
            ShutdownSignal::Interrupt
        }
        Some(()) = async {
            match term.as_mut() {
                Some(term) => term.recv().await,
                None => std::future::pending().await,
            }
        } => ShutdownSignal::Terminate,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownSignal {
    if let Err(error) = tokio::signal::ctrl_c().await {
        ecls_log::error!(
            error = &error as &dyn std::error::Error,
            "failed to listen for Ctrl-C"
        );
        std::future::pending::<()>().await;
    }

    ShutdownSignal::Interrupt
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let controller = Controller::new();
        controller.shutdown();

        let mut handle = controller.shutdown_handle();
        let shutdown = handle.notified().await;
        assert_eq!(shutdown.signal, ShutdownSignal::Manual);
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn test_all_handles_notified() {
        let controller = Controller::new();
        let mut first = controller.shutdown_handle();
        let mut second = first.clone();

        let waiter = tokio::spawn(async move { first.notified().await });
        tokio::task::yield_now().await;
        controller.shutdown();

        assert_eq!(waiter.await.unwrap().signal, ShutdownSignal::Manual);
        assert_eq!(second.notified().await.signal, ShutdownSignal::Manual);
    }

    #[tokio::test]
    async fn test_run_returns_on_manual_shutdown() {
        let controller = Controller::new();
        let runner = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run().await })
        };

        controller.shutdown();
        let signal = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Manual);
    }

    #[tokio::test]
    async fn test_dropped_controller_releases_handles() {
        let controller = Controller::new();
        let mut handle = controller.shutdown_handle();
        drop(controller);

        assert_eq!(handle.notified().await.signal, ShutdownSignal::Manual);
        assert_eq!(handle.get(), None);
    }

    #[test]
    fn test_first_signal_wins() {
        let controller = Controller::new();
        controller.notify(ShutdownSignal::Interrupt);
        controller.notify(ShutdownSignal::Terminate);

        let handle = controller.shutdown_handle();
        assert_eq!(
            handle.get(),
            Some(Shutdown {
                signal: ShutdownSignal::Interrupt
            })
        );
    }
}
