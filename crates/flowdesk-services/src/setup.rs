//! Service initialization: wires the store, collaborators and services together.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use flowdesk_core::EngineConfig;
use flowdesk_db::{setup_database, MemoryStore};

use crate::collaborators::{DirectoryService, StaticDirectory, TeamRegistry};
use crate::deadline::DeadlineMonitor;
use crate::engine::WorkflowEngine;
use crate::stats::StatsAggregator;
use crate::store::EngineStore;

/// Every service of the engine, sharing one store handle
#[derive(Clone)]
pub struct FlowdeskServices {
    pub store: EngineStore,
    pub engine: WorkflowEngine,
    pub deadlines: Arc<DeadlineMonitor>,
    pub stats: StatsAggregator,
}

impl FlowdeskServices {
    pub fn new(
        store: EngineStore,
        directory: Arc<dyn DirectoryService>,
        teams: Arc<dyn TeamRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let engine = WorkflowEngine::new(store.clone(), directory, teams, config);
        let deadlines = Arc::new(DeadlineMonitor::new(
            store.clone(),
            engine.notifications().clone(),
            config,
        ));
        let stats = StatsAggregator::new(store.clone(), engine.assignments().clone(), config);
        Self {
            store,
            engine,
            deadlines,
            stats,
        }
    }

    /// Services over a fresh [`MemoryStore`], with `directory` as both collaborators.
    pub fn in_memory(directory: StaticDirectory, config: &EngineConfig) -> Self {
        let directory = Arc::new(directory);
        let store = EngineStore::in_memory(
            MemoryStore::new(),
            Duration::from_secs(config.db_timeout_seconds),
        );
        Self::new(store, directory.clone(), directory, config)
    }
}

/// Connect to PostgreSQL, apply migrations and build the services.
pub async fn initialize_services(
    config: &EngineConfig,
    directory: StaticDirectory,
) -> anyhow::Result<FlowdeskServices> {
    config.validate().context("Invalid engine configuration")?;
    let pool = setup_database(config)
        .await
        .context("Failed to set up the workflow database")?;

    let directory = Arc::new(directory);
    let store = EngineStore::postgres(pool, Duration::from_secs(config.db_timeout_seconds));
    tracing::info!(
        workload_threshold = config.workload_threshold,
        deadline_days_threshold = config.deadline_days_threshold,
        "Workflow services initialized"
    );
    Ok(FlowdeskServices::new(
        store,
        directory.clone(),
        directory,
        config,
    ))
}
