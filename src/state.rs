use std::sync::Arc;

use crate::config::Config;
use crate::directory::InMemoryDirectory;
use crate::engine::{Collaborators, Scheduler};
use crate::observability::metrics::Metrics;
use crate::store::{InMemoryStore, ScheduleStore};

pub struct AppState {
    pub scheduler: Scheduler,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<dyn ScheduleStore>,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn ScheduleStore>) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let metrics = Metrics::new();
        let scheduler = Scheduler::new(
            store.clone(),
            Collaborators::from_directory(directory.clone()),
            config.clone(),
            metrics.clone(),
        );

        Self {
            scheduler,
            directory,
            store,
            metrics,
            config,
        }
    }
}
