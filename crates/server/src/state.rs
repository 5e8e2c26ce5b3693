use std::sync::Arc;
use reelhaul_core::{BinaryUpdateManager, JobRegistry, JobScheduler, JobService};

/// Shared application state
pub struct AppState {
    jobs: JobService,
    registry: Arc<JobRegistry>,
    scheduler: Arc<JobScheduler>,
    updater: Option<Arc<BinaryUpdateManager>>,
}

impl AppState {
    pub fn new(
        registry: Arc<JobRegistry>,
        scheduler: Arc<JobScheduler>,
        updater: Option<Arc<BinaryUpdateManager>>,
    ) -> Self {
        Self {
            jobs: JobService::new(Arc::clone(&registry)),
            registry,
            scheduler,
            updater,
        }
    }

    pub fn jobs(&self) -> &JobService {
        &self.jobs
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn updater(&self) -> Option<&Arc<BinaryUpdateManager>> {
        self.updater.as_ref()
    }
}
