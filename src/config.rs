//! Runtime settings for the workflow
use super::notify::Links;
use super::store::SledStore;
use anyhow::Context;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_STORE_PATH: &str = "slips.db";
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_LOG_FILTER: &str = "slip_approval=info";
const DEFAULT_OUTBOX_CAPACITY: i64 = 64;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub store_path: String,
    /// Prefix of the detail links put in notification bodies.
    pub base_url: String,
    pub log_filter: String,
    pub outbox_capacity: usize,
}

impl WorkflowConfig {
    /// Defaults, then `file` when given and present, then `SLIPS_*`
    /// environment variables.
    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("store_path", DEFAULT_STORE_PATH)?
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("log_filter", DEFAULT_LOG_FILTER)?
            .set_default("outbox_capacity", DEFAULT_OUTBOX_CAPACITY)?;

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("SLIPS"))
            .build()?
            .try_deserialize()
    }

    pub fn open_store(&self) -> anyhow::Result<SledStore> {
        let db = sled::open(&self.store_path)
            .with_context(|| format!("failed to open slip store at {}", self.store_path))?;
        tracing::info!(path = %self.store_path, "slip store opened");
        Ok(SledStore::new(Arc::new(db)))
    }

    pub fn links(&self) -> Links {
        Links::new(&self.base_url)
    }
}
