use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

pub const DEFAULT_SAVE_PATH: &str = "GameSave.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Clone)]
#[command(name = "minesweeper")]
#[command(about = "Nine-cell mine game with a text save file")]
#[command(long_about = "Nine-cell mine game with a text save file.

Each invocation loads the saved round (starting a new one if there is none,
or if it is finished or unreadable), applies the command and saves again.")]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Save file path
    #[arg(long, env = "MINESWEEPER_SAVE_PATH")]
    pub save_path: Option<PathBuf>,

    /// Seed for placing the mine of a new round
    #[arg(long, env = "MINESWEEPER_SEED")]
    pub seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MINESWEEPER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// TOML settings file filling in anything not given above
    #[arg(long, env = "MINESWEEPER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Discard the saved round and start a new one
    New,
    /// Print the board of the saved round
    Show,
    /// Uncover one area (0-8) and save
    Reveal {
        /// Area index, row by row from the top left
        area: usize,
    },
    /// Print the save file text of the current round
    Dump,
}

/// Contents of the optional settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub save_path: Option<PathBuf>,
    pub seed: Option<u64>,
    pub log_level: Option<String>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }
}

impl Config {
    /// Parse the command line and environment, then apply the settings file
    pub fn load() -> Result<Self> {
        let mut config = Self::parse();
        if let Some(path) = config.config.clone() {
            config.apply(Settings::from_file(&path)?);
        }
        Ok(config)
    }

    /// Fill every option still unset from `settings`
    pub fn apply(&mut self, settings: Settings) {
        if self.save_path.is_none() {
            self.save_path = settings.save_path;
        }
        if self.seed.is_none() {
            self.seed = settings.seed;
        }
        if self.log_level.is_none() {
            self.log_level = settings.log_level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.save_path().as_os_str().is_empty() {
            return Err(anyhow!("save_path cannot be empty"));
        }

        self.log_level()?;

        Ok(())
    }

    pub fn save_path(&self) -> &Path {
        self.save_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_SAVE_PATH))
    }

    pub fn log_level(&self) -> Result<Level> {
        let name = self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        Level::from_str(name).map_err(|_| anyhow!("unknown log level '{}'", name))
    }

    /// Seeded generator if a seed was given, entropy-seeded otherwise
    pub fn rng(&self) -> ChaCha20Rng {
        match self.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        }
    }
}
