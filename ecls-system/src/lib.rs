//! Foundational process control for the ECLS statsd bridge.
//!
//! The [`Controller`] listens for process signals and broadcasts a [`Shutdown`] to every
//! component holding a [`ShutdownHandle`].

#![warn(missing_docs)]

mod controller;

pub use self::controller::*;
