//! Schema and decoding of messages received from the ECLS stream.
//!
//! The stream delivers two kinds of text messages:
//!
//!  - **Control messages** such as subscription acknowledgements. They start with a fixed prefix
//!    (`Response To` by default) and carry no telemetry.
//!  - **Event batches** of the form `{"data": [<record>, ...]}`, where every record describes one
//!    completed API call.
//!
//! The [`Decoder`] distinguishes the two and turns an event batch into an [`EventRecord`]. Only the
//! first record of a batch is decoded; the stream sends one record per message in practice.
//!
//! ```
//! use ecls_event::{Decoder, InboundMessage};
//!
//! let decoder = Decoder::default();
//!
//! let message = decoder.decode(br#"{"data":[{"service_name":"svc","bytes":512}]}"#).unwrap();
//! let InboundMessage::Event(record) = message else { unreachable!() };
//! assert_eq!(record.service_name.as_str(), "svc");
//! assert_eq!(record.bytes.as_str(), "512");
//!
//! let message = decoder.decode(b"Response To subscribe").unwrap();
//! assert!(matches!(message, InboundMessage::Control));
//! ```

#![warn(missing_docs)]

mod decode;
mod record;

pub use self::decode::*;
pub use self::record::*;
