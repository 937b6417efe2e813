use std::fmt;

use ecls_event::EventRecord;
use serde::{Deserialize, Serialize};

use crate::sanitize_segment;

/// The default substitution for empty key fields.
pub const DEFAULT_PLACEHOLDER: &str = "-";

/// A naming taxonomy under which metrics are emitted.
///
/// Every namespace has its own aggregation sink, prefix and key template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Metrics per service, package, plan, endpoint and method.
    Service,
    /// Metrics per developer API key.
    Developer,
    /// Metrics per request path.
    Endpoint,
}

impl Namespace {
    /// All namespaces in emission order.
    pub const ALL: [Namespace; 3] = [Self::Service, Self::Developer, Self::Endpoint];

    /// Returns the lowercase name of this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Developer => "developer",
            Self::Endpoint => "endpoint",
        }
    }

    /// Returns the metric prefix used when none is configured.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            Self::Service => "mashery.service",
            Self::Developer => "mashery.developer",
            Self::Endpoint => "mashery.endpoint",
        }
    }

    /// Returns the key template used when none is configured.
    pub fn default_template(&self) -> KeyTemplate {
        use EventField::*;

        let fields: &[EventField] = match self {
            Self::Service => &[
                ServiceName,
                PackageName,
                PlanName,
                EndpointName,
                ApiMethodName,
            ],
            Self::Developer => &[ApiKey],
            Self::Endpoint => &[HttpMethod, RequestPath],
        };

        KeyTemplate(fields.iter().copied().map(KeySegment::Field).collect())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls how events with missing package or plan information are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InclusionPolicy {
    /// Substitutes the placeholder for every empty key field.
    #[default]
    Lenient,
    /// Skips the namespace for events without package or plan name.
    ///
    /// Other empty key fields are still substituted with the placeholder.
    Strict,
}

impl std::str::FromStr for InclusionPolicy {
    type Err = ParseInclusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err(ParseInclusionError),
        }
    }
}

/// Error returned when parsing an unknown [`InclusionPolicy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseInclusionError;

impl fmt::Display for ParseInclusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid inclusion policy, expected `lenient` or `strict`")
    }
}

impl std::error::Error for ParseInclusionError {}

/// An event field usable as a key segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    /// [`EventRecord::service_name`].
    ServiceName,
    /// [`EventRecord::package_name`].
    PackageName,
    /// [`EventRecord::plan_name`].
    PlanName,
    /// [`EventRecord::endpoint_name`].
    EndpointName,
    /// [`EventRecord::api_method_name`].
    ApiMethodName,
    /// [`EventRecord::http_method`].
    HttpMethod,
    /// [`EventRecord::api_key`].
    ApiKey,
    /// The request URI without query string, see [`EventRecord::request_path`].
    RequestPath,
    /// [`EventRecord::http_status_code`].
    HttpStatusCode,
    /// [`EventRecord::src_ip`].
    SrcIp,
}

impl EventField {
    /// Returns the raw value of this field in the given record.
    pub fn value<'a>(&self, record: &'a EventRecord) -> &'a str {
        match self {
            Self::ServiceName => &record.service_name,
            Self::PackageName => &record.package_name,
            Self::PlanName => &record.plan_name,
            Self::EndpointName => &record.endpoint_name,
            Self::ApiMethodName => &record.api_method_name,
            Self::HttpMethod => &record.http_method,
            Self::ApiKey => &record.api_key,
            Self::RequestPath => record.request_path(),
            Self::HttpStatusCode => &record.http_status_code,
            Self::SrcIp => &record.src_ip,
        }
    }
}

/// One dot-separated segment of a metric key.
///
/// In configuration files, fields are written by name and literals as a single-entry map:
///
/// ```yaml
/// key: [{ literal: api_key }, api_key]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum KeySegment {
    /// The value of an event field.
    Field(EventField),
    /// Fixed text.
    Literal {
        /// The text of the segment.
        literal: String,
    },
}

impl KeySegment {
    /// Creates a literal segment.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal {
            literal: text.into(),
        }
    }
}

/// The rule for building a metric key from an event.
///
/// A key consists of every segment prefixed with a dot, for instance `.svc.pkgA.planX`. Empty
/// field values are replaced by the placeholder and all values are sanitized for the line
/// protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct KeyTemplate(pub Vec<KeySegment>);

impl KeyTemplate {
    /// Returns `true` if the template has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the segments of this template.
    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Builds the key for the given record.
    pub fn render(&self, record: &EventRecord, placeholder: &str) -> String {
        let mut key = String::new();

        for segment in &self.0 {
            let value = match segment {
                KeySegment::Field(field) => field.value(record),
                KeySegment::Literal { literal } => literal.as_str(),
            };

            key.push('.');
            key.push_str(&sanitize_segment(or_placeholder(value, placeholder)));
        }

        key
    }
}

pub(crate) fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() { placeholder } else { value }
}

/// Configuration of a single namespace.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Emits metrics for this namespace. Defaults to `true`.
    pub enabled: bool,
    /// The metric prefix. Defaults to [`Namespace::default_prefix`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// The treatment of events without package or plan name.
    pub inclusion: InclusionPolicy,
    /// The key template. Defaults to [`Namespace::default_template`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyTemplate>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: None,
            inclusion: InclusionPolicy::default(),
            key: None,
        }
    }
}

/// Configuration of metric derivation for all namespaces.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Substitution for empty key fields. Defaults to `-`.
    pub placeholder: String,
    /// Per-service metrics.
    pub service: NamespaceConfig,
    /// Per-developer metrics.
    pub developer: NamespaceConfig,
    /// Per-endpoint metrics.
    pub endpoint: NamespaceConfig,
}

impl MetricsConfig {
    /// Returns the configuration of the given namespace.
    pub fn namespace(&self, namespace: Namespace) -> &NamespaceConfig {
        match namespace {
            Namespace::Service => &self.service,
            Namespace::Developer => &self.developer,
            Namespace::Endpoint => &self.endpoint,
        }
    }

    /// Returns a mutable reference to the configuration of the given namespace.
    pub fn namespace_mut(&mut self, namespace: Namespace) -> &mut NamespaceConfig {
        match namespace {
            Namespace::Service => &mut self.service,
            Namespace::Developer => &mut self.developer,
            Namespace::Endpoint => &mut self.endpoint,
        }
    }

    /// Returns the effective metric prefix of the given namespace.
    pub fn prefix(&self, namespace: Namespace) -> &str {
        self.namespace(namespace)
            .prefix
            .as_deref()
            .unwrap_or_else(|| namespace.default_prefix())
    }

    /// Returns the effective key template of the given namespace.
    pub fn template(&self, namespace: Namespace) -> KeyTemplate {
        self.namespace(namespace)
            .key
            .clone()
            .unwrap_or_else(|| namespace.default_template())
    }

    /// Returns an iterator over all enabled namespaces.
    pub fn enabled(&self) -> impl Iterator<Item = Namespace> + '_ {
        Namespace::ALL
            .into_iter()
            .filter(|ns| self.namespace(*ns).enabled)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_PLACEHOLDER.to_owned(),
            service: NamespaceConfig::default(),
            developer: NamespaceConfig::default(),
            endpoint: NamespaceConfig::default(),
        }
    }
}
