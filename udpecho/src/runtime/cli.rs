use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Network interface to respond on (e.g., "eth0").
    pub interface: String,

    /// Respond only on this UDP port.
    #[arg(
        short,
        long,
        value_name = "PORT",
        env = "UDPECHO_PORT",
        conflicts_with = "range",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Respond on an inclusive UDP port range.
    #[arg(
        short,
        long,
        value_names = ["MIN", "MAX"],
        num_args = 2,
        conflicts_with = "port",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<u16>>,

    /// Set the path to the compiled classifier object.
    #[arg(long, value_name = "FILE", env = "UDPECHO_PROGRAM")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,

    /// Set the path to the configuration file (e.g., "udpecho.yaml").
    #[arg(short, long, value_name = "FILE", env = "UDPECHO_CONFIG_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,

    /// Set the application's log level (e.g., "debug", "warn").
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        env = "UDPECHO_LOG_LEVEL",
        default_value = "info"
    )]
    #[serde(with = "level_serde")]
    pub log_level: Level,
}

mod level_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(level.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<Level>().map_err(serde::de::Error::custom)
    }
}
