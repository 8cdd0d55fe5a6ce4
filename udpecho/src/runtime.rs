//! Process runtime: CLI parsing and configuration assembly.

use clap::Parser;
use thiserror::Error;

use crate::runtime::{
    cli::Cli,
    conf::{Config, ConfigError},
};

pub mod cli;
pub mod conf;

pub struct Runtime {
    pub cli: Cli,
    pub config: Config,
}

impl Runtime {
    pub fn new() -> Result<Self, RuntimeError> {
        let cli = Cli::parse();
        let config = Config::new(&cli)?;

        Ok(Runtime { cli, config })
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
