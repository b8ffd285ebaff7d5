use std::sync::Arc;

use crate::cache::CacheIndex;
use crate::config::Args;
use crate::error::Result;
use crate::gateway::GenerationGateway;
use crate::orchestrator::Orchestrator;
use crate::store::ArtifactStore;

// app's shared state
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    // Wire store -> index -> gateway -> orchestrator from CLI settings.
    // Does not touch the disk; call `ensure_root` on the store first.
    pub fn from_args(args: &Args) -> Result<Self> {
        let store = Arc::new(ArtifactStore::new(&args.cache_dir));
        let index = Arc::new(CacheIndex::new(args.capacity(), Arc::clone(&store)));
        let gateway = GenerationGateway::new(args.backend_url(), args.timeout())?;
        Ok(Self::new(Orchestrator::new(index, store, gateway)))
    }
}
