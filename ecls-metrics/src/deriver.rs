use std::fmt;

use ecls_event::EventRecord;

use crate::namespace::or_placeholder;
use crate::{
    GaugeType, InclusionPolicy, KeyTemplate, MetricMutation, MetricsConfig, Namespace,
    TimingType, sanitize_segment,
};

/// A numeric event field that failed to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericField {
    /// The response size, [`EventRecord::bytes`].
    Bytes,
    /// The execution time, [`EventRecord::total_request_exec_time`].
    TotalRequestExecTime,
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::TotalRequestExecTime => write!(f, "total_request_exec_time"),
        }
    }
}

/// The result of deriving metrics from a single event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Derivation {
    /// All mutations, grouped by namespace in the order of [`Namespace::ALL`].
    pub mutations: Vec<MetricMutation>,
    /// Namespaces skipped due to a strict inclusion policy.
    pub skipped: Vec<Namespace>,
    /// Numeric fields that could not be parsed. Their mutations are omitted in every namespace.
    pub numeric_failures: Vec<NumericField>,
}

impl Derivation {
    /// Returns the mutations of a single namespace.
    pub fn namespace(&self, namespace: Namespace) -> impl Iterator<Item = &MetricMutation> {
        self.mutations
            .iter()
            .filter(move |mutation| mutation.namespace == namespace)
    }

    /// Returns `true` if no mutations were derived.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

#[derive(Clone, Debug)]
struct NamespaceRule {
    namespace: Namespace,
    inclusion: InclusionPolicy,
    template: KeyTemplate,
}

/// Maps event records into metric mutations.
///
/// The deriver resolves the [`MetricsConfig`] once on construction. Disabled namespaces produce
/// no mutations.
#[derive(Clone, Debug)]
pub struct Deriver {
    placeholder: String,
    rules: Vec<NamespaceRule>,
}

impl Deriver {
    /// Creates a deriver for all enabled namespaces of the configuration.
    pub fn new(config: &MetricsConfig) -> Self {
        let rules = config
            .enabled()
            .map(|namespace| NamespaceRule {
                namespace,
                inclusion: config.namespace(namespace).inclusion,
                template: config.template(namespace),
            })
            .collect();

        Self {
            placeholder: config.placeholder.clone(),
            rules,
        }
    }

    /// Returns the namespaces this deriver emits to.
    pub fn namespaces(&self) -> impl Iterator<Item = Namespace> + '_ {
        self.rules.iter().map(|rule| rule.namespace)
    }

    /// Derives all metric mutations for one record.
    ///
    /// A field that fails numeric parsing omits only its own mutation. The counters of the event
    /// are emitted regardless.
    pub fn derive(&self, record: &EventRecord) -> Derivation {
        let mut derivation = Derivation::default();

        let bytes = parse_bytes(&record.bytes);
        if bytes.is_none() {
            derivation.numeric_failures.push(NumericField::Bytes);
        }

        let exec_time = parse_exec_time(&record.total_request_exec_time);
        if exec_time.is_none() {
            derivation
                .numeric_failures
                .push(NumericField::TotalRequestExecTime);
        }

        let status_code = sanitize_segment(or_placeholder(
            &record.http_status_code,
            &self.placeholder,
        ));
        let response_string = sanitize_segment(or_placeholder(
            &record.response_string,
            &self.placeholder,
        ));

        for rule in &self.rules {
            if !is_included(rule.inclusion, record) {
                ecls_log::trace!(
                    namespace = %rule.namespace,
                    "skipping event without package or plan"
                );
                derivation.skipped.push(rule.namespace);
                continue;
            }

            let ns = rule.namespace;
            let key = rule.template.render(record, &self.placeholder);

            if let Some(bytes) = bytes {
                derivation
                    .mutations
                    .push(MetricMutation::set_absolute(ns, format!("{key}.bytes"), bytes));
            }

            derivation.mutations.push(MetricMutation::increment(
                ns,
                format!("{key}.status_code.{status_code}"),
                1,
            ));
            derivation.mutations.push(MetricMutation::increment(
                ns,
                format!("{key}.response_string.{response_string}"),
                1,
            ));

            if let Some(millis) = exec_time {
                derivation.mutations.push(MetricMutation::timing(
                    ns,
                    format!("{key}.total_request_exec_time"),
                    millis,
                ));
            }
        }

        derivation
    }
}

fn is_included(policy: InclusionPolicy, record: &EventRecord) -> bool {
    match policy {
        InclusionPolicy::Lenient => true,
        InclusionPolicy::Strict => !record.package_name.is_empty() && !record.plan_name.is_empty(),
    }
}

/// Parses a byte count as an unsigned integer.
fn parse_bytes(value: &str) -> Option<GaugeType> {
    value.parse().ok()
}

/// Parses fractional seconds into whole milliseconds, truncating the remainder.
///
/// Negative and non-finite values are rejected.
fn parse_exec_time(value: &str) -> Option<TimingType> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    Some((seconds * 1000.0) as TimingType)
}
