use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime configuration, read once from the environment (optionally via a
/// `.env` file) and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Memory budget for retained generation results, in megabytes.
    pub history_size: u64,
    /// Percent of the selection size to grow the mask by.
    pub selection_grow: u32,
    /// Percent of the selection size to feather the mask edge by.
    pub selection_feather: u32,
    /// Percent of the selection size to pad the mask bounds by.
    pub selection_padding: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_size: 1000,
            selection_grow: 5,
            selection_feather: 5,
            selection_padding: 7,
        }
    }
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            history_size: env_or("SUMIE_HISTORY_SIZE", defaults.history_size)?,
            selection_grow: env_or("SUMIE_SELECTION_GROW", defaults.selection_grow)?,
            selection_feather: env_or("SUMIE_SELECTION_FEATHER", defaults.selection_feather)?,
            selection_padding: env_or("SUMIE_SELECTION_PADDING", defaults.selection_padding)?,
        })
    }

    /// The history budget in bytes.
    pub fn history_bytes(&self) -> u64 {
        self.history_size * 1024 * 1024
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a number, got {value:?}")),
        Err(_) => Ok(default),
    }
}
