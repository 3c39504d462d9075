//! Settings for the `caixa` binary.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`caixa.toml` or `--config <path>`), `CAIXA__*` environment variables,
//! then command line flags.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::application::ReportOptions;

pub const DEFAULT_CONFIG_PATH: &str = "caixa.toml";
pub const ENV_PREFIX: &str = "CAIXA";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file
    pub database: String,
    /// Level for this crate's logs when `RUST_LOG` is not set
    pub log_level: String,
    pub report: ReportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: "caixa.db".to_string(),
            log_level: "info".to_string(),
            report: ReportSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Lowers how many ledger rows fit on a settlement page
    pub rows_per_page: Option<usize>,
    /// Printed under the settlement title
    pub issuer: Option<String>,
}

impl Settings {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .with_context(|| {
                format!(
                    "Failed to load settings from {}",
                    path.unwrap_or(DEFAULT_CONFIG_PATH)
                )
            })
    }

    /// Apply command line overrides.
    pub fn with_overrides(mut self, database: Option<String>, verbose: bool) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if verbose {
            self.log_level = "debug".to_string();
        }
        self
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        format!("caixa={}", self.log_level)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            rows_per_page: self.report.rows_per_page,
            issuer: self
                .report
                .issuer
                .clone()
                .filter(|issuer| !issuer.trim().is_empty()),
            ..Default::default()
        }
    }
}
