//! Configuration for the ECLS bridge.
//!
//! The configuration is loaded from a `config.yml` file in a configuration folder. Every section
//! and option has a default, so an empty or missing file yields a usable configuration as long as
//! a connection target is supplied. Command line arguments and environment variables are applied
//! on top through [`OverridableConfig`].
//!
//! ```yaml
//! connection:
//!   host: streaming-api.mashery.com
//!   path: /ecls/subscribe/<subscription>/<name>
//!   key: <api key>
//! statsd:
//!   addr: 127.0.0.1:8125
//!   flush_interval: 5
//! metrics:
//!   service:
//!     inclusion: strict
//! logging:
//!   level: info
//! ```

#![warn(missing_docs)]

mod config;

pub use self::config::*;
