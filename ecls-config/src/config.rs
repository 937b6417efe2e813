use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ecls_log::{Level, LogConfig, LogFormat};
use ecls_metrics::{InclusionPolicy, MetricsConfig, Namespace};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// The text substituted for credentials in logs and configuration dumps.
pub const REDACTED: &str = "********";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Defines the source of a config error.
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{origin}")]
pub struct ConfigError {
    kind: ConfigErrorKind,
    origin: ConfigErrorSource,
    #[source]
    cause: Option<BoxError>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            kind,
            origin: ConfigErrorSource::None,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            cause: Some(cause.into()),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &str) -> Self
    where
        E: Into<BoxError>,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.origin = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &str) -> Self {
        self.origin = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// Neither a stream URL nor a stream path was configured.
    #[error("no stream target configured, pass a URL or --host and --path")]
    MissingTarget,
    /// The stream URL uses a scheme other than `ws` or `wss`.
    #[error("unsupported stream URL scheme, expected ws or wss")]
    UnsupportedScheme,
    /// A namespace has an empty key template.
    #[error("key template must not be empty")]
    EmptyKeyTemplate,
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    /// Writes the configuration object to the given writer.
    fn write<W: Write>(&self, writer: &mut W) -> Result<(), ConfigError> {
        serde_yaml::to_writer(writer, self)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Remove all non-user permissions for the newly created file, it may hold the API key.
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        self.write(&mut f).map_err(|e| e.file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The full stream URL, including scheme and path.
    pub url: Option<String>,
    /// The stream host.
    pub host: Option<String>,
    /// The stream path.
    pub path: Option<String>,
    /// The API key appended to the stream URL.
    pub key: Option<String>,
    /// The statsd address.
    pub statsd: Option<String>,
    /// The flush interval in seconds.
    pub flush_interval: Option<String>,
    /// Disables TLS certificate verification.
    pub insecure: bool,
    /// The inclusion policy applied to every namespace.
    pub inclusion: Option<String>,
    /// Enables reconnection after transport failures.
    pub reconnect: bool,
    /// The log level.
    pub log_level: Option<String>,
    /// The log format.
    pub log_format: Option<String>,
}

/// Controls reconnection after transport failures.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
struct Reconnect {
    /// Reconnects after a transport failure instead of exiting.
    enabled: bool,
    /// Delay before the first reconnection attempt in milliseconds.
    initial_interval: u64,
    /// Upper bound of the delay between attempts in milliseconds.
    max_interval: u64,
    /// Attempts before giving up. `0` retries forever.
    max_retries: u32,
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_interval: 1000,
            max_interval: 30_000,
            max_retries: 10,
        }
    }
}

/// Controls the stream connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
struct Connection {
    /// Full stream URL. Takes precedence over scheme, host and path.
    url: Option<String>,
    /// The URL scheme, `ws` or `wss`.
    scheme: String,
    /// The stream host, optionally with a port.
    host: String,
    /// The stream path.
    path: Option<String>,
    /// The API key sent as `key` query parameter.
    key: Option<String>,
    /// Verify the server's TLS certificate.
    verify_tls: bool,
    /// Interval of keepalive frames in seconds.
    heartbeat_interval: u64,
    /// Maximum wait for the close acknowledgement in milliseconds.
    close_timeout: u64,
    /// Prefix of control messages that carry no events.
    control_prefix: String,
    reconnect: Reconnect,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            url: None,
            scheme: "wss".to_owned(),
            host: "streaming-api.mashery.com".to_owned(),
            path: None,
            key: None,
            verify_tls: true,
            heartbeat_interval: 1,
            close_timeout: 1000,
            control_prefix: "Response To".to_owned(),
            reconnect: Reconnect::default(),
        }
    }
}

/// Controls the statsd transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
struct Statsd {
    /// The statsd address: `host:port`, `udp://host:port` or `unixgram:///path`.
    addr: String,
    /// Interval between flushes in seconds.
    flush_interval: u64,
    /// Maximum size of a single datagram in bytes.
    max_datagram_size: usize,
}

impl Default for Statsd {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8125".to_owned(),
            flush_interval: 5,
            max_datagram_size: 512,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct ConfigValues {
    #[serde(default)]
    connection: Connection,
    #[serde(default)]
    statsd: Statsd,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    logging: LogConfig,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Loads a config from the given folder, or the defaults if it contains no config file.
    pub fn from_path_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        if Self::config_exists(&path) {
            return Self::from_path(path);
        }

        Ok(Config {
            values: ConfigValues::default(),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Writes a config file with all default values into the given folder.
    ///
    /// The folder is created if it does not exist. Returns the path of the written file.
    pub fn init_default<P: AsRef<Path>>(path: P) -> Result<PathBuf, ConfigError> {
        let path = path.as_ref();
        fs::create_dir_all(path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(path))?;

        ConfigValues::default().save(path)?;
        Ok(ConfigValues::path(path))
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let connection = &mut self.values.connection;

        if let Some(url) = overrides.url {
            Url::parse(&url).map_err(|err| ConfigError::for_field(err, "url"))?;
            connection.url = Some(url);
        }

        if let Some(host) = overrides.host {
            // An explicit host replaces a URL from the config file.
            connection.url = None;
            connection.host = host;
        }

        if let Some(path) = overrides.path {
            connection.path = Some(path);
        }

        if let Some(key) = overrides.key {
            connection.key = Some(key);
        }

        if overrides.insecure {
            connection.verify_tls = false;
        }

        if overrides.reconnect {
            connection.reconnect.enabled = true;
        }

        let statsd = &mut self.values.statsd;

        if let Some(addr) = overrides.statsd {
            statsd.addr = addr;
        }

        if let Some(interval) = overrides.flush_interval {
            statsd.flush_interval = interval
                .parse()
                .map_err(|err| ConfigError::for_field(err, "flush_interval"))?;
        }

        if let Some(inclusion) = overrides.inclusion {
            let policy = inclusion
                .parse::<InclusionPolicy>()
                .map_err(|err| ConfigError::for_field(err, "inclusion"))?;

            for namespace in Namespace::ALL {
                self.values.metrics.namespace_mut(namespace).inclusion = policy;
            }
        }

        let logging = &mut self.values.logging;

        if let Some(level) = overrides.log_level {
            logging.level = level
                .parse::<Level>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        if let Some(format) = overrides.log_format {
            logging.format = format
                .parse::<LogFormat>()
                .map_err(|err| ConfigError::for_field(err, "log_format"))?;
        }

        Ok(self)
    }

    /// Checks the configuration for values that prevent startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream_url()?;

        let connection = &self.values.connection;
        if connection.heartbeat_interval == 0 {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field("heartbeat_interval")
            );
        }

        let reconnect = &connection.reconnect;
        if reconnect.initial_interval == 0 || reconnect.max_interval < reconnect.initial_interval
        {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("reconnect"));
        }

        let statsd = &self.values.statsd;
        if statsd.addr.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("statsd.addr"));
        }
        if statsd.flush_interval == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("flush_interval"));
        }
        if statsd.max_datagram_size == 0 {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field("max_datagram_size")
            );
        }

        let metrics = &self.values.metrics;
        if metrics.placeholder.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("placeholder"));
        }

        for namespace in metrics.enabled() {
            if metrics.template(namespace).is_empty() {
                return Err(ConfigError::new(ConfigErrorKind::EmptyKeyTemplate)
                    .field(&format!("metrics.{namespace}.key")));
            }
        }

        Ok(())
    }

    /// Checks if the config is already initialized.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    ///
    /// The API key is replaced with [`REDACTED`].
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        let mut values = self.values.clone();
        let connection = &mut values.connection;

        if connection.key.is_some() {
            connection.key = Some(REDACTED.to_owned());
        }

        if let Some(url) = connection.url.as_mut() {
            if let Ok(parsed) = Url::parse(url) {
                *url = redact_url(&parsed).to_string();
            }
        }

        serde_yaml::to_string(&values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the full stream URL including the `key` query parameter.
    ///
    /// The URL is either the configured `url` or assembled from scheme, host and path. A
    /// configured key replaces any `key` parameter already present in the URL.
    pub fn stream_url(&self) -> Result<Url, ConfigError> {
        let connection = &self.values.connection;

        let mut url = match (&connection.url, &connection.path) {
            (Some(url), _) => Url::parse(url).map_err(|err| ConfigError::for_field(err, "url"))?,
            (None, Some(path)) => {
                let separator = if path.starts_with('/') { "" } else { "/" };
                let raw = format!(
                    "{}://{}{separator}{path}",
                    connection.scheme, connection.host
                );
                Url::parse(&raw).map_err(|err| ConfigError::for_field(err, "host"))?
            }
            (None, None) => return Err(ConfigError::new(ConfigErrorKind::MissingTarget)),
        };

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::new(ConfigErrorKind::UnsupportedScheme).field("url"));
        }

        if let Some(key) = &connection.key {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(name, _)| name != "key")
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect();

            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("key", key);
        }

        Ok(url)
    }

    /// Returns `true` if the server's TLS certificate is verified.
    pub fn verify_tls(&self) -> bool {
        self.values.connection.verify_tls
    }

    /// Returns the interval between keepalive frames.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.values.connection.heartbeat_interval)
    }

    /// Returns the maximum wait for the peer's close acknowledgement.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.values.connection.close_timeout)
    }

    /// Returns the prefix of control messages.
    pub fn control_prefix(&self) -> &str {
        &self.values.connection.control_prefix
    }

    /// Returns `true` if the bridge reconnects after transport failures.
    pub fn reconnect_enabled(&self) -> bool {
        self.values.connection.reconnect.enabled
    }

    /// Returns the delay before the first reconnection attempt.
    pub fn reconnect_initial_interval(&self) -> Duration {
        Duration::from_millis(self.values.connection.reconnect.initial_interval)
    }

    /// Returns the upper bound of the delay between reconnection attempts.
    pub fn reconnect_max_interval(&self) -> Duration {
        Duration::from_millis(self.values.connection.reconnect.max_interval)
    }

    /// Returns the number of reconnection attempts, or `None` if unlimited.
    pub fn reconnect_max_retries(&self) -> Option<u32> {
        match self.values.connection.reconnect.max_retries {
            0 => None,
            retries => Some(retries),
        }
    }

    /// Returns the statsd address.
    pub fn statsd_addr(&self) -> &str {
        &self.values.statsd.addr
    }

    /// Returns the interval between sink flushes.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.values.statsd.flush_interval)
    }

    /// Returns the maximum size of a statsd datagram.
    pub fn statsd_max_datagram_size(&self) -> usize {
        self.values.statsd.max_datagram_size
    }

    /// Returns the metric derivation config.
    pub fn metrics(&self) -> &MetricsConfig {
        &self.values.metrics
    }

    /// Returns the logging config.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }
}

/// Returns a copy of the URL with the value of the `key` query parameter replaced.
pub fn redact_url(url: &Url) -> Url {
    let mut redacted = url.clone();
    if url.query().is_none() {
        return redacted;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == "key" {
                REDACTED.to_owned()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn config_with_target() -> Config {
        Config::from_json_value(serde_json::json!({
            "connection": {
                "host": "stream.example.com",
                "path": "/ecls/subscribe/abc/bridge",
                "key": "secret"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert!(config.verify_tls());
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.close_timeout(), Duration::from_millis(1000));
        assert_eq!(config.control_prefix(), "Response To");
        assert!(!config.reconnect_enabled());
        assert_eq!(config.reconnect_max_retries(), Some(10));
        assert_eq!(config.statsd_addr(), "127.0.0.1:8125");
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.statsd_max_datagram_size(), 512);
        assert_eq!(config.metrics().placeholder, "-");
    }

    #[test]
    fn test_missing_target() {
        let config = Config::default();
        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::MissingTarget);
    }

    #[test]
    fn test_stream_url_from_parts() {
        let config = config_with_target();
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://stream.example.com/ecls/subscribe/abc/bridge?key=secret"
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_stream_url_path_without_slash() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": { "scheme": "ws", "host": "localhost:9000", "path": "stream" }
        }))
        .unwrap();

        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "ws://localhost:9000/stream"
        );
    }

    #[test]
    fn test_stream_url_replaces_key() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": {
                "url": "wss://stream.example.com/s?key=old&mode=all",
                "key": "new"
            }
        }))
        .unwrap();

        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://stream.example.com/s?mode=all&key=new"
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": { "url": "https://stream.example.com/s" }
        }))
        .unwrap();

        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::UnsupportedScheme);
        assert_eq!(
            error.to_string(),
            "unsupported stream URL scheme, expected ws or wss (field url)"
        );
    }

    #[test]
    fn test_redact_url() {
        let url = Url::parse("wss://stream.example.com/s?key=secret&mode=all").unwrap();
        assert_eq!(
            redact_url(&url).as_str(),
            "wss://stream.example.com/s?key=********&mode=all"
        );

        let url = Url::parse("ws://localhost/s").unwrap();
        assert_eq!(redact_url(&url).as_str(), "ws://localhost/s");
    }

    #[test]
    fn test_yaml_dump_redacts_key() {
        let mut config = config_with_target();
        config
            .apply_override(OverridableConfig {
                url: Some("wss://other.example.com/s?key=cli-secret".to_owned()),
                ..Default::default()
            })
            .unwrap();

        let yaml = config.to_yaml_string().unwrap();
        assert!(!yaml.contains("secret"));
        assert!(yaml.contains(REDACTED));
    }

    #[test]
    fn test_apply_override() {
        let mut config = config_with_target();
        config
            .apply_override(OverridableConfig {
                host: Some("localhost:9000".to_owned()),
                key: Some("cli".to_owned()),
                statsd: Some("udp://10.0.0.1:8125".to_owned()),
                flush_interval: Some("10".to_owned()),
                insecure: true,
                inclusion: Some("strict".to_owned()),
                reconnect: true,
                log_level: Some("debug".to_owned()),
                log_format: Some("json".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://localhost:9000/ecls/subscribe/abc/bridge?key=cli"
        );
        assert!(!config.verify_tls());
        assert!(config.reconnect_enabled());
        assert_eq!(config.statsd_addr(), "udp://10.0.0.1:8125");
        assert_eq!(config.flush_interval(), Duration::from_secs(10));
        for namespace in Namespace::ALL {
            assert_eq!(
                config.metrics().namespace(namespace).inclusion,
                InclusionPolicy::Strict
            );
        }
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                flush_interval: Some("soon".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field flush_interval)");
        assert!(std::error::Error::source(&error).is_some());

        let error = config
            .apply_override(OverridableConfig {
                inclusion: Some("sometimes".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field inclusion)");
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": { "path": "/s", "heartbeat_interval": 0 }
        }))
        .unwrap();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid config value (field heartbeat_interval)"
        );

        let config = Config::from_json_value(serde_json::json!({
            "connection": { "path": "/s" },
            "statsd": { "flush_interval": 0 }
        }))
        .unwrap();
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "invalid config value (field flush_interval)"
        );
    }

    #[test]
    fn test_validate_rejects_empty_template() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": { "path": "/s" },
            "metrics": { "developer": { "key": [] } }
        }))
        .unwrap();

        let error = config.validate().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::EmptyKeyTemplate);
        assert_eq!(
            error.to_string(),
            "key template must not be empty (field metrics.developer.key)"
        );

        let config = Config::from_json_value(serde_json::json!({
            "connection": { "path": "/s" },
            "metrics": { "developer": { "key": [], "enabled": false } }
        }))
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_unlimited_retries() {
        let config = Config::from_json_value(serde_json::json!({
            "connection": { "reconnect": { "enabled": true, "max_retries": 0 } }
        }))
        .unwrap();
        assert_eq!(config.reconnect_max_retries(), None);
    }

    #[test]
    fn test_init_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("ecls");

        assert!(!Config::config_exists(&folder));
        let file = Config::init_default(&folder).unwrap();
        assert_eq!(file, folder.join("config.yml"));
        assert!(Config::config_exists(&folder));

        let config = Config::from_path(&folder).unwrap();
        assert_eq!(config.statsd_addr(), "127.0.0.1:8125");
        assert_eq!(config.path(), folder.as_path());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "connection:\n  path: /ecls/subscribe/x/y\nmetrics:\n  service:\n    inclusion: strict\n",
        )
        .unwrap();

        let config = Config::from_path_or_default(dir.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.metrics().service.inclusion,
            InclusionPolicy::Strict
        );
        assert_eq!(config.control_prefix(), "Response To");
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "statsd: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        insta::assert_snapshot!(
            error.to_string().replace(&dir.path().display().to_string(), "[dir]"),
            @"could not parse yaml config file (file [dir]/config.yml)"
        );
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path_or_default(dir.path()).unwrap();
        assert_eq!(config.flush_interval(), Duration::from_secs(5));

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
    }
}
