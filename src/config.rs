use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Studyhall chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "studyhall-server", version, about = "Studyhall real-time chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "STUDYHALL_PORT", default_value = "8090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "STUDYHALL_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./studyhall.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "STUDYHALL_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "STUDYHALL_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Course room admission policy: "open" or "enrolled"
    #[arg(long, env = "STUDYHALL_COURSE_ROOM_POLICY", default_value = "open")]
    pub course_room_policy: String,

    /// Number of messages replayed on room join (capped at 100)
    #[arg(long, env = "STUDYHALL_HISTORY_LIMIT", default_value = "50")]
    pub history_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            bind_address: "0.0.0.0".to_string(),
            config: "./studyhall.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            course_room_policy: "open".to_string(),
            history_limit: 50,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (STUDYHALL_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("STUDYHALL_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Studyhall Chat Server Configuration
# Place this file at ./studyhall.toml or specify with --config <path>
# All settings can be overridden via environment variables (STUDYHALL_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8090)
# port = 8090

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Course room admission policy (default: open)
#   open     — any authenticated user may join course rooms
#   enrolled — students need an active enrollment; staff always admitted
# course_room_policy = "open"

# Number of messages replayed when a client joins a room (capped at 100)
# history_limit = 50
"#
    .to_string()
}
