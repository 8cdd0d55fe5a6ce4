use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::Deserialize;
use thiserror::Error;
use udpecho_common::PortRange;

use crate::runtime::cli::Cli;

/// Which UDP ports the classifier answers on. Exactly one selection is
/// active for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFilter {
    /// Respond on any UDP port.
    Any,
    /// Respond only on one port.
    Single(u16),
    /// Respond on an inclusive port range.
    Range { min: u16, max: u16 },
}

impl PortFilter {
    /// Validate the raw port/range selection. Conflicting or out-of-range
    /// selections are rejected here, before any kernel state is touched.
    fn from_selection(port: Option<u16>, range: Option<(u16, u16)>) -> Result<Self, ConfigError> {
        match (port, range) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingPortFilter),
            (Some(0), None) => Err(ConfigError::PortOutOfRange(0)),
            (Some(port), None) => Ok(PortFilter::Single(port)),
            (None, Some((min, max))) => {
                if min == 0 {
                    return Err(ConfigError::PortOutOfRange(0));
                }
                if min > max {
                    return Err(ConfigError::EmptyPortRange { min, max });
                }
                Ok(PortFilter::Range { min, max })
            }
            (None, None) => Ok(PortFilter::Any),
        }
    }

    /// The loader-time encoding shared with the classifier object.
    pub fn port_range(self) -> PortRange {
        match self {
            PortFilter::Any => PortRange::ALL,
            PortFilter::Single(port) => PortRange::single(port),
            PortFilter::Range { min, max } => PortRange { min, max },
        }
    }
}

/// Figment extraction target, validated into [`Config`].
#[derive(Debug, Deserialize)]
struct RawConfig {
    interface: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    range: Option<(u16, u16)>,
    #[serde(default = "default_program_path")]
    program: PathBuf,
}

/// Default classifier object location, exported by build.rs.
fn default_program_path() -> PathBuf {
    PathBuf::from(env!("UDPECHO_PROGRAM_PATH"))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub interface: String,
    pub port_filter: PortFilter,
    pub program: PathBuf,
}

impl Config {
    pub fn new(cli: &Cli) -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(cli))
            .join(Env::prefixed("UDPECHO_"));

        if let Some(config_path) = &cli.config {
            figment = figment.join(Yaml::file(config_path));
        }

        let raw: RawConfig = figment.extract()?;

        if raw.interface.is_empty() {
            return Err(ConfigError::EmptyInterface);
        }
        let port_filter = PortFilter::from_selection(raw.port, raw.range)?;

        Ok(Config {
            interface: raw.interface,
            port_filter,
            program: raw.program,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no interface name provided")]
    EmptyInterface,

    #[error("a fixed port and a port range are mutually exclusive")]
    ConflictingPortFilter,

    #[error("port {0} is out of range (1-65535)")]
    PortOutOfRange(u16),

    #[error("empty port range: {min}-{max}")]
    EmptyPortRange { min: u16, max: u16 },

    #[error("configuration error: {0}")]
    Extraction(#[from] figment::Error),
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        path::PathBuf,
        time::{SystemTime, UNIX_EPOCH},
    };

    use clap::Parser as _;
    use serial_test::serial;
    use udpecho_common::PortRange;

    use super::{Config, ConfigError, PortFilter};
    use crate::runtime::cli::Cli;

    fn clear_env_vars() {
        // This helper ensures a clean slate before each test.
        unsafe {
            env::remove_var("UDPECHO_PORT");
            env::remove_var("UDPECHO_PROGRAM");
            env::remove_var("UDPECHO_CONFIG_PATH");
        }
    }

    fn unique_temp_path(filename: &str) -> PathBuf {
        let mut p = env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("{}_{}", nanos, filename));
        p
    }

    #[test]
    #[serial]
    fn bare_interface_gives_unfiltered_run() {
        clear_env_vars();

        let cli = Cli::parse_from(["udpecho", "eth0"]);
        let config = Config::new(&cli).expect("config builds from bare CLI");
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.port_filter, PortFilter::Any);
        assert_eq!(config.program, PathBuf::from(env!("UDPECHO_PROGRAM_PATH")));
    }

    #[test]
    #[serial]
    fn single_port_selection() {
        clear_env_vars();

        let cli = Cli::parse_from(["udpecho", "eth0", "-p", "12345"]);
        let config = Config::new(&cli).expect("config builds with port");
        assert_eq!(config.port_filter, PortFilter::Single(12345));
    }

    #[test]
    #[serial]
    fn range_selection() {
        clear_env_vars();

        let cli = Cli::parse_from(["udpecho", "eth0", "-r", "2000", "3000"]);
        let config = Config::new(&cli).expect("config builds with range");
        assert_eq!(
            config.port_filter,
            PortFilter::Range {
                min: 2000,
                max: 3000
            }
        );
    }

    #[test]
    #[serial]
    fn inverted_range_is_rejected() {
        clear_env_vars();

        let cli = Cli::parse_from(["udpecho", "eth0", "-r", "3000", "2000"]);
        let err = Config::new(&cli).expect_err("inverted range must not build");
        assert!(matches!(
            err,
            ConfigError::EmptyPortRange {
                min: 3000,
                max: 2000
            }
        ));
    }

    #[test]
    #[serial]
    fn conflicting_selection_is_rejected_before_any_kernel_call() {
        clear_env_vars();

        // clap already rejects `-p` together with `-r`; this covers the
        // non-CLI route where both arrive from env and file.
        let cli = Cli {
            interface: "eth0".to_string(),
            port: Some(53),
            range: Some(vec![1000, 2000]),
            program: None,
            config: None,
            log_level: tracing::Level::INFO,
        };
        let err = Config::new(&cli).expect_err("conflicting selection must not build");
        assert!(matches!(err, ConfigError::ConflictingPortFilter));
    }

    #[test]
    #[serial]
    fn loads_port_from_yaml_file() {
        clear_env_vars();
        let path = unique_temp_path("udpecho_conf.yaml");
        fs::write(&path, b"port: 4789\nprogram: /opt/udpecho/udpecho.bpf.o\n")
            .expect("write temp yaml");

        let cli = Cli::parse_from(["udpecho", "eth0", "--config", path.to_str().unwrap()]);
        let config = Config::new(&cli).expect("config loads from yaml");
        assert_eq!(config.port_filter, PortFilter::Single(4789));
        assert_eq!(config.program, PathBuf::from("/opt/udpecho/udpecho.bpf.o"));

        fs::remove_file(path).expect("remove temp yaml");
    }

    #[test]
    #[serial]
    fn cli_port_wins_over_yaml() {
        clear_env_vars();
        let path = unique_temp_path("udpecho_conf_override.yaml");
        fs::write(&path, b"port: 4789\n").expect("write temp yaml");

        let cli = Cli::parse_from([
            "udpecho",
            "eth0",
            "-p",
            "53",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = Config::new(&cli).expect("config builds");
        assert_eq!(config.port_filter, PortFilter::Single(53));

        fs::remove_file(path).expect("remove temp yaml");
    }

    #[test]
    fn port_range_translation() {
        assert_eq!(PortFilter::Any.port_range(), PortRange::ALL);
        assert_eq!(
            PortFilter::Single(7).port_range(),
            PortRange { min: 7, max: 7 }
        );
        assert_eq!(
            PortFilter::Range {
                min: 2000,
                max: 3000
            }
            .port_range(),
            PortRange {
                min: 2000,
                max: 3000
            }
        );
    }

    #[test]
    fn selection_validation() {
        assert_eq!(
            PortFilter::from_selection(None, None).unwrap(),
            PortFilter::Any
        );
        assert_eq!(
            PortFilter::from_selection(Some(7), None).unwrap(),
            PortFilter::Single(7)
        );
        assert_eq!(
            PortFilter::from_selection(None, Some((1, u16::MAX))).unwrap(),
            PortFilter::Range {
                min: 1,
                max: u16::MAX
            }
        );
        assert!(matches!(
            PortFilter::from_selection(Some(0), None),
            Err(ConfigError::PortOutOfRange(0))
        ));
        assert!(matches!(
            PortFilter::from_selection(None, Some((0, 10))),
            Err(ConfigError::PortOutOfRange(0))
        ));
    }
}
