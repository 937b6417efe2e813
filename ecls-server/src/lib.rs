//! The ECLS bridge server.
//!
//! This crate ties the other crates together into a running bridge:
//!
//!  1. The [`Supervisor`] opens a websocket to the event stream and keeps it alive with a
//!     periodic heartbeat frame.
//!  2. Every inbound frame goes through the [`Pipeline`]: it is decoded into an event record,
//!     the deriver maps the record into metric mutations and the mutations are buffered in
//!     the sink of their namespace.
//!  3. One [`FlushService`] per namespace sink transmits the buffer to statsd on a fixed
//!     interval.
//!
//! All of these share one [`Session`], which is created at startup. On shutdown, the supervisor
//! closes the connection gracefully and every flush service flushes one last time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ecls_config::Config;
//! use ecls_system::Controller;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(Config::from_path(".ecls")?);
//! let controller = Controller::new();
//!
//! let signals = controller.clone();
//! tokio::spawn(async move { signals.run().await });
//!
//! let reason = ecls_server::run(config, controller).await?;
//! std::process::exit(reason.exit_code());
//! # }
//! ```

#![warn(missing_docs)]

mod backoff;
mod flush;
mod pipeline;
mod service;
mod session;
mod stats;
mod supervisor;

pub use self::backoff::*;
pub use self::flush::*;
pub use self::pipeline::*;
pub use self::service::*;
pub use self::session::*;
pub use self::stats::*;
pub use self::supervisor::*;
