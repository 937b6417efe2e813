use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use ecls_config::{Config, ConfigErrorKind, OverridableConfig};
use ecls_system::Controller;

use crate::setup;

/// Forwards API traffic events from the Mashery event stream to statsd.
#[derive(Parser, Debug)]
#[command(name = "ecls", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Running the bridge is the default when no subcommand is given.
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the event stream and report metrics to statsd
    Run(RunArgs),

    /// Manage the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration with the API key redacted
    Show(RunArgs),

    /// Write a default config.yml into the config folder
    Init(ConfigArgs),
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Folder containing config.yml
    #[arg(short, long, value_name = "DIR", env = "ECLS_CONFIG", default_value = ".ecls")]
    config: PathBuf,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Full stream URL, for example wss://streaming-api.mashery.com/ecls/subscription/...
    #[arg(value_name = "URL", conflicts_with = "host")]
    url: Option<String>,

    /// The stream host
    #[arg(long, env = "ECLS_HOST")]
    host: Option<String>,

    /// The stream path, including the subscription id
    #[arg(long, env = "ECLS_PATH")]
    path: Option<String>,

    /// The API key used to subscribe to the stream
    #[arg(long, env = "ECLS_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Address of the statsd server, for example 127.0.0.1:8125 or unixgram:///run/statsd.sock
    #[arg(long, value_name = "ADDR", env = "ECLS_STATSD")]
    statsd: Option<String>,

    /// Seconds between metric flushes
    #[arg(long, value_name = "SECS")]
    flush_interval: Option<String>,

    /// Disable TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// How events without package or plan are reported in every namespace
    #[arg(long, value_parser = ["lenient", "strict"])]
    inclusion: Option<String>,

    /// Reconnect with exponential backoff after connection failures
    #[arg(long)]
    reconnect: bool,

    /// The log level (error, warn, info, debug, trace or off)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// The log format (auto, pretty, simplified or json)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

impl RunArgs {
    fn into_overrides(self) -> (PathBuf, OverridableConfig) {
        let overrides = OverridableConfig {
            url: self.url,
            host: self.host,
            path: self.path,
            key: self.key,
            statsd: self.statsd,
            flush_interval: self.flush_interval,
            insecure: self.insecure,
            inclusion: self.inclusion,
            reconnect: self.reconnect,
            log_level: self.log_level,
            log_format: self.log_format,
        };

        (self.config.config, overrides)
    }
}

/// Parses the command line and runs the selected command.
///
/// Returns the process exit code.
pub fn execute() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Run(args)) => run(args),
        Some(Command::Config(ConfigCommand::Show(args))) => show_config(args),
        Some(Command::Config(ConfigCommand::Init(args))) => init_config(args),
        None => run(cli.run),
    }
}

fn run(args: RunArgs) -> Result<i32> {
    let (path, overrides) = args.into_overrides();
    let config = setup::load_config(&path, overrides)?;

    if let Err(error) = config.validate() {
        if error.kind() == ConfigErrorKind::MissingTarget {
            Cli::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "no stream target, pass a URL or --host and --path",
                )
                .exit();
        }

        return Err(error).context("invalid configuration");
    }

    ecls_log::init(config.logging());
    setup::dump_spawn_infos(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("ecls-worker")
        .enable_all()
        .build()
        .context("failed to start the runtime")?;

    let reason = runtime.block_on(async move {
        let controller = Controller::new();

        let signals = controller.clone();
        tokio::spawn(async move { signals.run().await });

        ecls_server::run(Arc::new(config), controller).await
    })?;

    Ok(reason.exit_code())
}

fn show_config(args: RunArgs) -> Result<i32> {
    let (path, overrides) = args.into_overrides();
    let config = setup::load_config(&path, overrides)?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(config.to_yaml_string()?.as_bytes())?;
    Ok(0)
}

fn init_config(args: ConfigArgs) -> Result<i32> {
    if Config::config_exists(&args.config) {
        anyhow::bail!(
            "a config file already exists in {}",
            args.config.display()
        );
    }

    let path = Config::init_default(&args.config)?;
    writeln!(io::stdout(), "wrote default config to {}", path.display())?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ecls").chain(args.iter().copied()))
    }

    #[test]
    fn test_verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = parse(&["wss://example.com/stream", "--insecure"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.url.as_deref(), Some("wss://example.com/stream"));
        assert!(cli.run.insecure);
    }

    #[test]
    fn test_run_overrides() {
        let cli = parse(&[
            "run",
            "--host",
            "stream.example.com",
            "--path",
            "/ecls/subscription/1",
            "--statsd",
            "udp://127.0.0.1:9125",
            "--inclusion",
            "strict",
            "-c",
            "/etc/ecls",
        ])
        .unwrap();

        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run command");
        };

        let (path, overrides) = args.into_overrides();
        assert_eq!(path, PathBuf::from("/etc/ecls"));
        assert_eq!(overrides.host.as_deref(), Some("stream.example.com"));
        assert_eq!(overrides.path.as_deref(), Some("/ecls/subscription/1"));
        assert_eq!(overrides.statsd.as_deref(), Some("udp://127.0.0.1:9125"));
        assert_eq!(overrides.inclusion.as_deref(), Some("strict"));
        assert!(!overrides.reconnect);
    }

    #[test]
    fn test_url_conflicts_with_host() {
        let error = parse(&["run", "wss://example.com/", "--host", "other.com"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_invalid_inclusion() {
        let error = parse(&["--inclusion", "sometimes"]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_config_subcommands() {
        let cli = parse(&["config", "init", "--config", "/tmp/ecls"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Init(ConfigArgs { ref config })))
                if config == &PathBuf::from("/tmp/ecls")
        ));

        let cli = parse(&["config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand::Show(_)))
        ));
    }
}
