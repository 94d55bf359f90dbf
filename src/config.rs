use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// tasksync real-time collaboration server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "tasksync-server", version, about = "tasksync real-time collaboration server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "TASKSYNC_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "TASKSYNC_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./tasksync.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "TASKSYNC_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (JWT signing key)
    #[arg(long, env = "TASKSYNC_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Seconds between server-initiated WebSocket pings
    #[arg(long, env = "TASKSYNC_PING_INTERVAL_SECS", default_value = "30")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the connection
    #[arg(long, env = "TASKSYNC_PONG_TIMEOUT_SECS", default_value = "10")]
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./tasksync.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (TASKSYNC_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("TASKSYNC_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# tasksync Real-Time Collaboration Server Configuration
# Place this file at ./tasksync.toml or specify with --config <path>
# All settings can be overridden via environment variables (TASKSYNC_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JWT signing key
# data_dir = "./data"

# WebSocket keepalive: ping interval and pong deadline, in seconds
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
