use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use humanscore_core::{
    build_registry, open_store, AnalysisPipeline, CoalescerConfig, HumanscoreConfig, StepCoalescer,
};
use humanscore_store::SessionStore;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub coalescer: StepCoalescer,
    pub pipeline: Arc<AnalysisPipeline>,
    /// Provider ids that have a credential, reported by the health route.
    pub providers: Arc<Vec<String>>,
}

impl AppState {
    /// Spawns the coalescer's flush worker; call from inside the runtime.
    pub fn new(
        store: Arc<dyn SessionStore>,
        coalescer: CoalescerConfig,
        pipeline: AnalysisPipeline,
        providers: Vec<String>,
    ) -> Self {
        Self {
            coalescer: StepCoalescer::new(Arc::clone(&store), coalescer),
            store,
            pipeline: Arc::new(pipeline),
            providers: Arc::new(providers),
        }
    }

    pub fn from_config(config: &HumanscoreConfig, root: &Path) -> Result<Self> {
        let registry = build_registry(config);
        let store = open_store(&config.main.store, root)?;
        let pipeline = AnalysisPipeline::from_config(&config.main, &registry);
        let providers = registry.list().into_iter().map(String::from).collect();
        Ok(Self::new(store, config.main.coalescer, pipeline, providers))
    }
}
