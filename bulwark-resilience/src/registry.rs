//! Named pipeline registry.
//!
//! Pipelines are registered once at startup under a configuration name
//! (e.g. "timeout-5s", "rate-limit-5-per-3s", "circuit-breaker-10s") and
//! looked up by request handlers. Each named pipeline is independently
//! configured and independently stateful.

use std::sync::Arc;

use bulwark_core::{BulwarkResult, PipelineConfig};
use dashmap::DashMap;
use tracing::info;

use crate::pipeline::ResiliencePipeline;

/// Registry of named resilience pipelines.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, Arc<ResiliencePipeline>>,
}

impl PipelineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a pipeline under `name`, replacing any previous
    /// registration. The configuration is validated here, at startup.
    pub fn register(
        &self,
        name: impl Into<String>,
        config: PipelineConfig,
    ) -> BulwarkResult<Arc<ResiliencePipeline>> {
        let name = name.into();
        let pipeline = Arc::new(ResiliencePipeline::new(name.clone(), config)?);
        info!(pipeline = %name, "Pipeline registered");
        self.pipelines.insert(name, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Look up a pipeline by configuration name.
    pub fn get(&self, name: &str) -> Option<Arc<ResiliencePipeline>> {
        self.pipelines.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Remove a pipeline by name.
    pub fn remove(&self, name: &str) -> Option<Arc<ResiliencePipeline>> {
        self.pipelines.remove(name).map(|(_, pipeline)| pipeline)
    }

    /// Names of all registered pipelines.
    pub fn names(&self) -> Vec<String> {
        self.pipelines
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}
