use std::fmt;
use std::ops::Deref;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

/// A string field decoded from any primitive JSON value.
///
/// The stream sends all fields as strings, but some producers emit numbers or booleans for
/// numeric fields. These are converted into their textual form. `null` decodes into an empty
/// string. Objects and arrays are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LenientString(pub String);

impl LenientString {
    /// Returns the string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the field was absent, `null` or an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwraps the inner raw string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for LenientString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for LenientString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for LenientString {
    fn from(value: String) -> Self {
        LenientString(value)
    }
}

impl From<&str> for LenientString {
    fn from(value: &str) -> Self {
        LenientString(value.to_owned())
    }
}

impl fmt::Display for LenientString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct LenientStringVisitor;

impl Visitor<'_> for LenientStringVisitor {
    type Value = LenientString;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a primitive value")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(LenientString(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(LenientString(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(LenientString(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(LenientString(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(LenientString(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(LenientString(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientString::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientString::default())
    }
}

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LenientStringVisitor)
    }
}

/// One record of the event stream, describing a single completed API call.
///
/// All fields are optional text. A field missing from the payload is an empty string. Fields not
/// listed here are ignored.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventRecord {
    /// The API key of the calling developer.
    pub api_key: LenientString,
    /// Name of the API method, as configured on the endpoint.
    pub api_method_name: LenientString,
    /// Response size in bytes.
    pub bytes: LenientString,
    /// `1` if the response was served from cache.
    pub cache_hit: LenientString,
    /// Seconds spent transferring the response to the client.
    pub client_transfer_time: LenientString,
    /// Seconds spent connecting to the backend.
    pub connect_time: LenientString,
    /// Name of the endpoint.
    pub endpoint_name: LenientString,
    /// HTTP method of the request.
    pub http_method: LenientString,
    /// HTTP status code of the response.
    pub http_status_code: LenientString,
    /// HTTP protocol version.
    pub http_version: LenientString,
    /// OAuth access token, if one was used.
    pub oauth_access_token: LenientString,
    /// Name of the package the plan belongs to.
    pub package_name: LenientString,
    /// UUID of the package.
    pub package_uuid: LenientString,
    /// Name of the plan the key is subscribed to.
    pub plan_name: LenientString,
    /// UUID of the plan.
    pub plan_uuid: LenientString,
    /// Seconds before the transfer started.
    pub pre_transfer_time: LenientString,
    /// Remaining QPS throttle value.
    pub qps_throttle_value: LenientString,
    /// Remaining quota value.
    pub quota_value: LenientString,
    /// The `Referer` header of the request.
    pub referrer: LenientString,
    /// Seconds spent on the backend.
    pub remote_total_time: LenientString,
    /// Host name of the request.
    pub request_host_name: LenientString,
    /// Request identifier.
    pub request_id: LenientString,
    /// Timestamp of the request.
    pub request_time: LenientString,
    /// Request UUID.
    pub request_uuid: LenientString,
    /// Short response classification, such as `2xx` or an error tag.
    pub response_string: LenientString,
    /// UUID of the endpoint definition.
    pub service_definition_endpoint_uuid: LenientString,
    /// Identifier of the service.
    pub service_id: LenientString,
    /// Name of the service.
    pub service_name: LenientString,
    /// Client IP address.
    pub src_ip: LenientString,
    /// `true` if the request used TLS.
    pub ssl_enabled: LenientString,
    /// Total execution time of the request in fractional seconds.
    pub total_request_exec_time: LenientString,
    /// Name of the traffic manager node.
    pub traffic_manager: LenientString,
    /// Error code assigned by the traffic manager.
    pub traffic_manager_error_code: LenientString,
    /// Request URI including the query string.
    pub uri: LenientString,
    /// The `User-Agent` header of the request.
    pub user_agent: LenientString,
}

impl EventRecord {
    /// Returns the request URI without its query string.
    ///
    /// Everything from the first `?` onwards is removed.
    pub fn request_path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => self.uri.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_lenient_primitives() {
        let record: EventRecord = serde_json::from_str(
            r#"{
                "bytes": 512,
                "total_request_exec_time": 0.05,
                "http_status_code": "200",
                "ssl_enabled": true,
                "cache_hit": null,
                "quota_value": -3
            }"#,
        )
        .unwrap();

        assert_eq!(record.bytes.as_str(), "512");
        assert_eq!(record.total_request_exec_time.as_str(), "0.05");
        assert_eq!(record.http_status_code.as_str(), "200");
        assert_eq!(record.ssl_enabled.as_str(), "true");
        assert_eq!(record.cache_hit.as_str(), "");
        assert_eq!(record.quota_value.as_str(), "-3");
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let record: EventRecord =
            serde_json::from_str(r#"{"service_name":"svc","something_new":"x"}"#).unwrap();

        assert_eq!(record.service_name.as_str(), "svc");
        assert!(record.package_name.is_empty());
        assert!(record.uri.is_empty());
    }

    #[test]
    fn test_nested_value_rejected() {
        let result = serde_json::from_str::<EventRecord>(r#"{"bytes":{"value":1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_path() {
        let mut record = EventRecord {
            uri: "/v1/widgets?foo=bar".into(),
            ..Default::default()
        };
        assert_eq!(record.request_path(), "/v1/widgets");

        record.uri = "/v1/widgets?a=1?b=2".into();
        assert_eq!(record.request_path(), "/v1/widgets");

        record.uri = "/v1/widgets".into();
        assert_eq!(record.request_path(), "/v1/widgets");

        record.uri = LenientString::default();
        assert_eq!(record.request_path(), "");
    }
}
