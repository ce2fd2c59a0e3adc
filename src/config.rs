//! Runtime settings read from the environment (optionally seeded by `.env`).

use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://usafactsstatic.blob.core.windows.net/public/data/covid-19";
pub const DEFAULT_STORE_FILE: &str = "covid.data.txt";
pub const DEFAULT_LOG_FILE: &str = "logs/covid_states.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding cached raw source files.
    pub data_dir: PathBuf,
    /// Durable per-state store (also the ingestion cache).
    pub store_file: PathBuf,
    /// Base URL the remote sources are fetched from.
    pub base_url: String,
    pub log_file_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            store_file: PathBuf::from(DEFAULT_STORE_FILE),
            base_url: DEFAULT_BASE_URL.to_string(),
            log_file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl Config {
    /// Reads `COVID_DATA_DIR`, `COVID_STORE_FILE`, `USAFACTS_BASE_URL` and
    /// `LOG_FILE_PATH`, falling back to defaults for unset variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("COVID_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            store_file: lookup("COVID_STORE_FILE").map_or(defaults.store_file, PathBuf::from),
            base_url: lookup("USAFACTS_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            log_file_path: lookup("LOG_FILE_PATH").map_or(defaults.log_file_path, PathBuf::from),
        }
    }
}
