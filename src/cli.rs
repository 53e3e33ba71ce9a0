//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for ws-session.

use clap::{Args, Parser, Subcommand};

/// ws-session - WebSocket session client with heartbeat keep-alive
///
/// Connects to a WebSocket server, keeps the connection alive with
/// heartbeats, and reports every message the server sends back.
#[derive(Parser, Debug)]
#[command(name = "ws-session")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection options shared by the session commands
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// WebSocket URL (overrides the configured URL)
    #[arg(short, long, env = "WS_SESSION_URL")]
    pub url: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "WS_SESSION_CONFIG")]
    pub config: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open an interactive session (type messages, `ping`, or `quit`)
    Connect {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Reconnect with backoff when the connection drops
        #[arg(long)]
        reconnect: bool,
    },

    /// Run a scripted message exchange and summarize the replies
    Probe {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Seconds to wait for a reply after each send
        #[arg(long, default_value = "5")]
        response_timeout_secs: u64,

        /// Seconds to stay idle mid-probe (0 = skip)
        #[arg(long, default_value = "0")]
        idle_secs: u64,
    },

    /// Send text frames verbatim and print what comes back
    Send {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Seconds to collect replies after the last send
        #[arg(short, long, default_value = "3")]
        wait_secs: u64,

        /// Frames to send, JSON or plain text
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_connect_command() {
        let cli = Cli::parse_from(["ws-session", "connect"]);
        match cli.command {
            Commands::Connect { connection, reconnect } => {
                assert!(connection.config.is_none());
                assert!(!reconnect);
            }
            _ => panic!("Expected Connect command"),
        }
    }

    #[test]
    fn test_connect_with_url_and_reconnect() {
        let cli = Cli::parse_from([
            "ws-session",
            "connect",
            "--url",
            "wss://example.com/websocket",
            "--reconnect",
        ]);
        match cli.command {
            Commands::Connect { connection, reconnect } => {
                assert_eq!(connection.url.as_deref(), Some("wss://example.com/websocket"));
                assert!(reconnect);
            }
            _ => panic!("Expected Connect command"),
        }
    }

    #[test]
    fn test_probe_defaults() {
        let cli = Cli::parse_from(["ws-session", "probe"]);
        match cli.command {
            Commands::Probe {
                response_timeout_secs,
                idle_secs,
                ..
            } => {
                assert_eq!(response_timeout_secs, 5);
                assert_eq!(idle_secs, 0);
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_probe_with_idle() {
        let cli = Cli::parse_from(["ws-session", "probe", "--idle-secs", "15", "-c", "probe.toml"]);
        match cli.command {
            Commands::Probe { connection, idle_secs, .. } => {
                assert_eq!(idle_secs, 15);
                assert_eq!(connection.config.as_deref(), Some("probe.toml"));
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_send_texts() {
        let cli = Cli::parse_from([
            "ws-session",
            "send",
            "--wait-secs",
            "1",
            "Hello from the raw sender",
            r#"{"type":"ping"}"#,
        ]);
        match cli.command {
            Commands::Send { texts, wait_secs, .. } => {
                assert_eq!(wait_secs, 1);
                assert_eq!(texts, vec!["Hello from the raw sender", r#"{"type":"ping"}"#]);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_send_requires_text() {
        assert!(Cli::try_parse_from(["ws-session", "send"]).is_err());
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["ws-session", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["ws-session", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["ws-session", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_validate() {
        let cli = Cli::parse_from(["ws-session", "config", "validate", "--config", "x.toml"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Validate { config },
            } => assert_eq!(config.as_deref(), Some("x.toml")),
            _ => panic!("Expected Config Validate command"),
        }
    }
}
