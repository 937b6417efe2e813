use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;

use crate::EventRecord;

/// The default prefix of control messages on the stream.
///
/// The stream answers subscription and keepalive frames with messages such as
/// `Response To <request>`.
pub const DEFAULT_CONTROL_PREFIX: &str = "Response To";

/// An error returned when decoding an event batch fails.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the batch shape.
    #[error("invalid event payload")]
    InvalidPayload(#[from] serde_json::Error),
    /// The batch contains no records.
    #[error("event payload contains no records")]
    EmptyBatch,
}

/// A decoded message from the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// A telemetry record.
    Event(Box<EventRecord>),
    /// A control message without telemetry, such as an acknowledgement.
    Control,
}

/// Deserializes only the first element of a sequence and skips the rest.
#[derive(Default)]
struct FirstRecord(Option<EventRecord>);

impl<'de> Deserialize<'de> for FirstRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FirstVisitor;

        impl<'de> Visitor<'de> for FirstVisitor {
            type Value = FirstRecord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a list of event records")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let first = seq.next_element::<EventRecord>()?;
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(FirstRecord(first))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FirstRecord(None))
            }
        }

        deserializer.deserialize_any(FirstVisitor)
    }
}

#[derive(Deserialize)]
struct EventBatch {
    #[serde(default)]
    data: FirstRecord,
}

/// Decodes raw stream messages into [`InboundMessage`]s.
///
/// Messages starting with the control prefix are classified as [`InboundMessage::Control`]
/// without being parsed. All other messages must be event batches.
#[derive(Clone, Debug)]
pub struct Decoder {
    control_prefix: String,
}

impl Decoder {
    /// Creates a decoder that treats messages starting with `control_prefix` as control messages.
    pub fn new(control_prefix: impl Into<String>) -> Self {
        Self {
            control_prefix: control_prefix.into(),
        }
    }

    /// Returns the configured control prefix.
    pub fn control_prefix(&self) -> &str {
        &self.control_prefix
    }

    /// Decodes a single raw message.
    ///
    /// Only the first record of an event batch is returned. The remaining records are validated
    /// as JSON but otherwise skipped.
    pub fn decode(&self, raw: &[u8]) -> Result<InboundMessage, DecodeError> {
        if !self.control_prefix.is_empty() && raw.starts_with(self.control_prefix.as_bytes()) {
            return Ok(InboundMessage::Control);
        }

        let batch: EventBatch = serde_json::from_slice(raw)?;
        match batch.data.0 {
            Some(record) => Ok(InboundMessage::Event(Box::new(record))),
            None => Err(DecodeError::EmptyBatch),
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn decode_event(raw: &str) -> EventRecord {
        match Decoder::default().decode(raw.as_bytes()).unwrap() {
            InboundMessage::Event(record) => *record,
            InboundMessage::Control => panic!("expected an event"),
        }
    }

    #[test]
    fn test_control_message() {
        let decoder = Decoder::default();
        let message = decoder
            .decode(b"Response To subscribe: c47f06e6-2ef8-11e7")
            .unwrap();
        assert_eq!(message, InboundMessage::Control);
    }

    #[test]
    fn test_custom_control_prefix() {
        let decoder = Decoder::new("ACK");
        assert_eq!(decoder.decode(b"ACK 1").unwrap(), InboundMessage::Control);
        assert!(decoder.decode(b"Response To subscribe").is_err());
    }

    #[test]
    fn test_first_record_only() {
        let record = decode_event(
            r#"{"data":[{"service_name":"first"},{"service_name":"second"},{"bytes":{"x":1}}]}"#,
        );
        assert_eq!(record.service_name.as_str(), "first");
    }

    #[test]
    fn test_full_record() {
        let record = decode_event(
            r#"{"data":[{
                "service_name":"svc",
                "package_name":"pkgA",
                "plan_name":"planX",
                "endpoint_name":"ep1",
                "api_method_name":"GET",
                "api_key":"key123",
                "http_status_code":"200",
                "response_string":"OK",
                "bytes":"512",
                "total_request_exec_time":"0.05",
                "uri":"/v1/items?x=1",
                "http_method":"GET"
            }]}"#,
        );

        assert_eq!(
            record,
            EventRecord {
                service_name: "svc".into(),
                package_name: "pkgA".into(),
                plan_name: "planX".into(),
                endpoint_name: "ep1".into(),
                api_method_name: "GET".into(),
                api_key: "key123".into(),
                http_status_code: "200".into(),
                response_string: "OK".into(),
                bytes: "512".into(),
                total_request_exec_time: "0.05".into(),
                uri: "/v1/items?x=1".into(),
                http_method: "GET".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_empty_batch() {
        let decoder = Decoder::default();
        assert!(matches!(
            decoder.decode(br#"{"data":[]}"#),
            Err(DecodeError::EmptyBatch)
        ));
        assert!(matches!(
            decoder.decode(br#"{"data":null}"#),
            Err(DecodeError::EmptyBatch)
        ));
        assert!(matches!(decoder.decode(b"{}"), Err(DecodeError::EmptyBatch)));
        assert!(matches!(
            decoder.decode(br#"{"records":[]}"#),
            Err(DecodeError::EmptyBatch)
        ));
    }

    #[test]
    fn test_malformed_payload() {
        let decoder = Decoder::default();
        assert!(matches!(
            decoder.decode(b"{\"data\":[{"),
            Err(DecodeError::InvalidPayload(_))
        ));
        assert!(matches!(
            decoder.decode(br#"{"data":{"service_name":"svc"}}"#),
            Err(DecodeError::InvalidPayload(_))
        ));
        assert!(matches!(
            decoder.decode(b"2024-01-01 12:00:00 +0000 UTC"),
            Err(DecodeError::InvalidPayload(_))
        ));
    }
}
