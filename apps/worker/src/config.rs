//! Layered worker process configuration: defaults -> TOML file -> environment
//! -> CLI flags (spec §6 "Environment variables", §4.2 `sync_interval`).

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::Cli;

/// Which [`hermod_catalog::Catalog`] backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    /// `hermod_catalog::InMemoryCatalog` — not durable, for local smoke-testing.
    Memory,
}

impl Default for CatalogBackend {
    fn default() -> Self {
        Self::Memory
    }
}

/// Resolved worker process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This worker's stable identity, as a UUID string. Generated fresh if
    /// unset or unparsable.
    pub worker_id: Option<String>,
    /// Catalog backend to construct.
    pub catalog: CatalogBackend,
    /// Reconciler sync cycle cadence, in seconds (spec §4.2 default 10, floor 200ms).
    pub sync_interval_secs: u64,
    /// `tracing` `EnvFilter` directive.
    pub log_filter: String,
    /// `true` for newline-delimited JSON logs instead of pretty ANSI.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: None,
            catalog: CatalogBackend::default(),
            sync_interval_secs: hermod_reconciler::DEFAULT_SYNC_INTERVAL.as_secs(),
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration by merging, in ascending priority: compiled-in
    /// defaults, an optional TOML file, `HERMOD_`-prefixed environment
    /// variables, then CLI flags.
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("HERMOD_"));

        match &cli.config {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None if Self::default_path().exists() => {
                figment = figment.merge(Toml::file(Self::default_path()));
            }
            None => {}
        }

        let mut config: Config = figment.extract()?;

        if let Some(worker_id) = &cli.worker_id {
            config.worker_id = Some(worker_id.clone());
        }
        if let Some(catalog) = cli.catalog {
            config.catalog = catalog;
        }
        if let Some(sync_interval) = cli.sync_interval_secs {
            config.sync_interval_secs = sync_interval;
        }
        if cli.log_json {
            config.log_json = true;
        }
        if let Some(filter) = &cli.log_filter {
            config.log_filter = filter.clone();
        }

        Ok(config)
    }

    /// Resolve to a concrete [`hermod_core::WorkerId`], generating one if
    /// the caller left it unset or it fails to parse as a UUID.
    #[must_use]
    pub fn resolved_worker_id(&self) -> hermod_core::WorkerId {
        self.worker_id
            .as_deref()
            .and_then(|s| hermod_core::WorkerId::parse(s).ok())
            .unwrap_or_else(hermod_core::WorkerId::v4)
    }

    /// The config file path candidate checked by default when `--config`
    /// is not passed (not itself loaded unless it exists).
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("hermod-worker.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reconciler_constant() {
        let config = Config::default();
        assert_eq!(config.sync_interval_secs, 10);
        assert_eq!(config.catalog, CatalogBackend::Memory);
    }

    #[test]
    fn resolved_worker_id_is_stable_when_set() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let config = Config {
            worker_id: Some(id.to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolved_worker_id().to_string(), id);
    }

    #[test]
    fn resolved_worker_id_generates_when_unset() {
        let config = Config::default();
        assert!(!config.resolved_worker_id().is_nil());
    }

    #[test]
    fn resolved_worker_id_falls_back_on_unparsable_string() {
        let config = Config {
            worker_id: Some("not-a-uuid".to_string()),
            ..Config::default()
        };
        assert!(!config.resolved_worker_id().is_nil());
    }
}
