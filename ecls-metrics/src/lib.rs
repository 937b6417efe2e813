//! Metric derivation for ECLS events.
//!
//! Every event record is mapped into a set of [`MetricMutation`]s under several independent
//! naming taxonomies, the [`Namespace`]s. Each namespace builds a metric key from the record
//! according to its [`KeyTemplate`] and emits the same four metrics under that key:
//!
//! | metric                          | operation   |
//! |---------------------------------|-------------|
//! | `<key>.bytes`                   | gauge       |
//! | `<key>.status_code.<code>`      | counter `1` |
//! | `<key>.response_string.<tag>`   | counter `1` |
//! | `<key>.total_request_exec_time` | timing (ms) |
//!
//! The [`Deriver`] applies the configured templates and [`InclusionPolicy`] and reports its
//! result as a [`Derivation`]:
//!
//! ```
//! use ecls_event::EventRecord;
//! use ecls_metrics::{Deriver, MetricsConfig, Namespace};
//!
//! let record = EventRecord {
//!     api_key: "key123".into(),
//!     bytes: "512".into(),
//!     ..Default::default()
//! };
//!
//! let derivation = Deriver::new(&MetricsConfig::default()).derive(&record);
//! let developer = derivation.namespace(Namespace::Developer).next().unwrap();
//! assert_eq!(developer.name, ".key123.bytes");
//! ```

#![warn(missing_docs)]

mod deriver;
mod namespace;
mod protocol;
mod sanitize;

pub use self::deriver::*;
pub use self::namespace::*;
pub use self::protocol::*;
pub use self::sanitize::*;
