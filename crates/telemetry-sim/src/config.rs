//! Simulator configuration
//!
//! Layers, lowest precedence first: built-in defaults, an optional config
//! file, then `TELSIM_`-prefixed environment variables using `__` between
//! section and key (`TELSIM_SINK__URL`). Command-line flags are applied on
//! top by `main`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use telemetry_lib::{
    catalog::CatalogConfig, generator::GeneratorConfig, ingest::IngestConfig, logs::LogsConfig,
    sink::InfluxConfig,
};

const ENV_PREFIX: &str = "TELSIM";

/// Simulator configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub sink: InfluxConfig,
    pub generator: GeneratorConfig,
    pub logs: LogsConfig,
    pub ingest: IngestConfig,
    pub catalog: CatalogConfig,
}

impl SimConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}
