//! Service configuration: command-line flags with environment fallbacks.
//!
//! A `.env` file in the working directory is loaded first (see [`Settings::load`]).

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "environment-update";
pub const DEFAULT_USERS_HOST: &str = "http://harp-users:8081/harp-users/api/v1/users";
pub const DEFAULT_SCENARIOS_HOST: &str = "http://harp-scenarios:8081/harp-scenarios/api/v1/scenarios";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "harp_environment", about = "Harp environments service", version)]
pub struct Settings {
    /// Address the HTTP API listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8081")]
    pub bind_addr: SocketAddr,

    /// Directory of the environment store
    #[arg(long, env = "DATA_DIR", default_value = "harp_environment_data")]
    pub data_dir: PathBuf,

    /// Keep the store in memory only
    #[arg(long, env = "IN_MEMORY", default_value_t = false)]
    pub in_memory: bool,

    #[arg(long, env = "ENVIRONMENT_UPDATE_TOPIC", default_value = DEFAULT_TOPIC)]
    pub environment_update_topic: String,

    #[arg(long, env = "USERS_HOST", default_value = DEFAULT_USERS_HOST)]
    pub users_host: String,

    #[arg(long, env = "SCENARIOS_HOST", default_value = DEFAULT_SCENARIOS_HOST)]
    pub scenarios_host: String,

    /// Kafka REST proxy base URL; events are only logged when unset
    #[arg(long, env = "KAFKA_REST_URL")]
    pub kafka_rest_url: Option<String>,

    /// HS256 secret shared with the token issuer
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Timeout for calls to the users/scenarios services and the broker proxy
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// Read `.env` (if any), then flags and environment variables.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
