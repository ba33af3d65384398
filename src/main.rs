//! brokerlink - keep a managed MQTT session open and log inbound commands

use brokerlink::observability::init_default_logging;
use brokerlink::session::dispatcher::Dispatcher;
use brokerlink::session::InboundCommand;
use brokerlink::transport::mqtt::{MqttConnector, MqttLink};
use brokerlink::{BoxError, LinkHandle, Session, SessionConfig, SessionHandler};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG_PATHS: &[&str] = &["brokerlink.toml", "config/brokerlink.toml"];

/// Managed MQTT client session
#[derive(Parser)]
#[command(name = "brokerlink")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BROKERLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and service the session until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

/// Subscribes the configured command topics on every connect
struct CommandSubscriber {
    topics: Vec<String>,
}

impl SessionHandler<MqttLink> for CommandSubscriber {
    fn on_connect(&mut self, link: &mut LinkHandle<MqttLink>) {
        for topic in &self.topics {
            // subscribe logs its own failures; the next connect retries
            let _ = link.subscribe(topic);
        }
    }

    fn on_disconnect(&mut self, link: &mut LinkHandle<MqttLink>) {
        warn!(
            attempts = link.stats().reconnect_attempts,
            "Lost broker connection, reconnecting"
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting brokerlink v{}", env!("CARGO_PKG_VERSION"));

    let path = match resolve_config_path(cli.config) {
        Some(path) => path,
        None => {
            error!("No configuration file found. Provide one with -c/--config or create brokerlink.toml");
            process::exit(1);
        }
    };

    info!("Loading configuration from: {}", path.display());
    let config = match SessionConfig::load_from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_session(config, path).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    })
}

/// Re-read and validate the configuration file on a `reload` command
fn reload_action(path: PathBuf) -> impl FnMut() -> Result<(), BoxError> + Send {
    move || {
        let config = SessionConfig::load_from_file(&path)?;
        info!(
            path = %path.display(),
            topics = config.commands.topics.len(),
            "Configuration reloaded"
        );
        Ok(())
    }
}

fn log_command(command: &InboundCommand) {
    if command.is_reload() {
        info!(topic = %command.topic, "Reload requested");
    } else {
        info!(
            topic = %command.topic,
            bytes = command.payload.len(),
            payload = %String::from_utf8_lossy(&command.payload),
            "Command received"
        );
    }
}

/// Log every command queued so far; returns how many were drained
fn drain_commands(commands_rx: &mut mpsc::Receiver<InboundCommand>) -> usize {
    let mut drained = 0;
    while let Ok(command) = commands_rx.try_recv() {
        log_command(&command);
        drained += 1;
    }
    drained
}

async fn run_session(config: SessionConfig, path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (commands_tx, mut commands_rx) = mpsc::channel::<InboundCommand>(64);
    let dispatcher = Dispatcher::new(commands_tx, reload_action(path));
    let handler = CommandSubscriber {
        topics: config.commands.topics.clone(),
    };

    let mut session = Session::initialize(&config, &MqttConnector::new(), handler, dispatcher)?;
    let timeout = config.service_timeout();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(
        host = %config.broker.host,
        port = config.broker.port,
        "Session running, waiting for commands"
    );

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            result = session.service(timeout) => {
                if let Err(e) = result {
                    debug!(error = %e, "Service cycle failed");
                }
                drain_commands(&mut commands_rx);
            }
        }
    }

    session.shutdown().await;

    let stats = session.stats();
    info!(
        connects = stats.connects,
        disconnects = stats.disconnects,
        published = stats.published,
        received = stats.messages_received,
        reloads = stats.reloads,
        "Session closed"
    );
    Ok(())
}

fn handle_config_command(config: &SessionConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::path::Path;

    #[test]
    fn test_explicit_config_path_wins() {
        let path = PathBuf::from("/etc/brokerlink/link.toml");
        assert_eq!(resolve_config_path(Some(path.clone())), Some(path));
    }

    #[test]
    fn test_drain_commands_takes_everything_queued() {
        let (tx, mut rx) = mpsc::channel(8);
        for payload in ["reload", "status"] {
            tx.try_send(InboundCommand {
                topic: "/agent/1/inbound/cmd".to_string(),
                payload: Bytes::from(payload),
            })
            .unwrap();
        }

        assert_eq!(drain_commands(&mut rx), 2);
        assert_eq!(drain_commands(&mut rx), 0);
    }

    #[test]
    fn test_reload_action_fails_on_missing_file() {
        let mut reload = reload_action(Path::new("/nonexistent/brokerlink.toml").to_path_buf());
        assert!(reload().is_err());
    }
}
