pub mod analysis;
pub mod baseline;
pub mod coalescer;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod tagged;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use humanscore_provider::{register_from_configs, ProviderRegistry};
use humanscore_store::{InMemorySessionStore, SessionStore, SqliteSessionStore};

pub use analysis::{AnalysisRequester, ChainLink, FallbackChain};
pub use baseline::{BaselineOrchestrator, BaselineProvider, BaselineQuestion, BaselineReport};
pub use coalescer::{PendingSubmit, StepCoalescer};
pub use config::*;
pub use enrich::enrich;
pub use error::PipelineError;
pub use extract::{extract_as, extract_json, ExtractError};
pub use pipeline::AnalysisPipeline;
pub use tagged::extract_section;

/// Registry of every provider that has a credential.
pub fn build_registry(config: &HumanscoreConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let skipped = register_from_configs(&mut registry, &config.providers);
    if !skipped.is_empty() {
        tracing::warn!(?skipped, "providers without credentials are disabled");
    }
    registry
}

pub fn open_store(config: &StoreConfig, root: &Path) -> Result<Arc<dyn SessionStore>> {
    match config.kind {
        StoreKind::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        StoreKind::Sqlite => {
            let path = config.resolved_path(root);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory: {}", parent.display())
                })?;
            }
            let store = SqliteSessionStore::open(&path)
                .with_context(|| format!("failed to open session store: {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}
