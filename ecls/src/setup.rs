use std::path::Path;

use anyhow::{Context, Result};
use ecls_config::{Config, OverridableConfig, redact_url};

/// Loads the config from the folder, or the defaults if it has no config file, and applies the
/// overrides from the command line.
pub fn load_config(path: &Path, overrides: OverridableConfig) -> Result<Config> {
    let mut config = Config::from_path_or_default(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_override(overrides)?;
    Ok(config)
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if Config::config_exists(config.path()) {
        ecls_log::info!(
            "launching ecls from config folder {}",
            config.path().display()
        );
    } else {
        ecls_log::info!("launching ecls without config file");
    }

    match config.stream_url() {
        Ok(url) => ecls_log::info!("  stream: {}", redact_url(&url)),
        Err(_) => ecls_log::info!("  stream: -"),
    }
    ecls_log::info!("  statsd: {}", config.statsd_addr());
    ecls_log::info!("  flush interval: {}s", config.flush_interval().as_secs());

    let namespaces: Vec<_> = config
        .metrics()
        .enabled()
        .map(|namespace| namespace.as_str())
        .collect();
    ecls_log::info!("  namespaces: {}", namespaces.join(", "));
    ecls_log::info!("  reconnect: {}", config.reconnect_enabled());
    ecls_log::info!("  log level: {}", config.logging().level);
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_overrides_without_config_file() {
        let dir = std::env::temp_dir().join(format!("ecls-setup-{}", std::process::id()));

        let overrides = OverridableConfig {
            url: Some("wss://stream.example.com/sub?key=old".to_owned()),
            key: Some("new".to_owned()),
            ..Default::default()
        };

        let config = load_config(&dir, overrides).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.stream_url().unwrap().as_str(),
            "wss://stream.example.com/sub?key=new"
        );
    }

    #[test]
    fn test_invalid_override() {
        let dir = std::env::temp_dir().join(format!("ecls-setup-bad-{}", std::process::id()));

        let overrides = OverridableConfig {
            flush_interval: Some("soon".to_owned()),
            ..Default::default()
        };

        assert!(load_config(&dir, overrides).is_err());
    }
}
