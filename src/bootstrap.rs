//! Bootstrap sequencing for the directory service.
//!
//! `Idle -> SchemaExtracted -> SchemaLoaded -> PartitionsAttached -> Started`,
//! and `Started -> Stopped` on teardown. Each transition hands its product
//! (repository path, schema manager, assembled service) to the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::cache::{CacheService, EntryCache};
use crate::dn::{Dn, SYSTEM_DN};
use crate::error::{DirectoryError, Result};
use crate::extract::SchemaExtractor;
use crate::partition::{Partition, SchemaPartition};
use crate::resource::ResourceContainer;
use crate::schema::SchemaManager;
use crate::service::{DirectoryService, InstanceLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Idle,
    SchemaExtracted,
    SchemaLoaded,
    PartitionsAttached,
    Started,
    Stopped,
}

/// An optional partition, attached after the system partition.
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub id: String,
    pub suffix: String,
    pub indexed_attributes: Vec<String>,
}

impl PartitionSpec {
    pub fn new(id: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            suffix: suffix.into(),
            indexed_attributes: Vec::new(),
        }
    }
    pub fn with_index<S: AsRef<str>>(mut self, attributes: &[S]) -> Self {
        self.indexed_attributes
            .extend(attributes.iter().map(|a| a.as_ref().to_string()));
        self
    }
}

// ------------- Bootstrap -------------
pub struct Bootstrap {
    layout: InstanceLayout,
    containers: Vec<Box<dyn ResourceContainer>>,
    cache: Arc<dyn CacheService>,
    partitions: Vec<PartitionSpec>,
    state: BootstrapState,
    service: Option<Arc<DirectoryService>>,
}

impl Bootstrap {
    pub fn new(working_directory: impl Into<PathBuf>, containers: Vec<Box<dyn ResourceContainer>>) -> Self {
        Self {
            layout: InstanceLayout::new(working_directory),
            containers,
            cache: Arc::new(EntryCache::new()),
            partitions: Vec::new(),
            state: BootstrapState::Idle,
            service: None,
        }
    }
    pub fn with_cache_service(mut self, cache: Arc<dyn CacheService>) -> Self {
        self.cache = cache;
        self
    }
    pub fn with_partition(mut self, partition: PartitionSpec) -> Self {
        self.partitions.push(partition);
        self
    }
    pub fn layout(&self) -> &InstanceLayout {
        &self.layout
    }
    pub fn state(&self) -> BootstrapState {
        self.state
    }
    pub fn service(&self) -> Option<Arc<DirectoryService>> {
        self.service.clone()
    }

    /// Runs the whole startup sequence. Any failure aborts it, leaves the
    /// bootstrap `Idle` and exposes no service.
    pub fn start(&mut self) -> Result<Arc<DirectoryService>> {
        if !matches!(self.state, BootstrapState::Idle | BootstrapState::Stopped) {
            return Err(DirectoryError::Invariant(format!(
                "bootstrap cannot start from state {:?}",
                self.state
            )));
        }
        self.state = BootstrapState::Idle;
        info!(workdir=%self.layout.root().display(), containers = self.containers.len(), "starting directory service");
        match self.run() {
            Ok(service) => Ok(service),
            Err(e) => {
                error!(error=%e, state=?self.state, "directory service bootstrap failed");
                self.state = BootstrapState::Idle;
                self.service = None;
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<Arc<DirectoryService>> {
        let repository = self.extract_schema()?;
        let schema_manager = self.load_schema(&repository)?;
        let service = self.attach_partitions(schema_manager)?;
        self.start_service(service)
    }

    fn extract_schema(&mut self) -> Result<PathBuf> {
        let mut extractor = SchemaExtractor::new(self.layout.partitions_directory());
        extractor
            .extract_or_copy(&self.containers, true)
            .map_err(|e| DirectoryError::ExtractionFailed(Box::new(e)))?;
        self.state = BootstrapState::SchemaExtracted;
        Ok(extractor.schema_directory().to_path_buf())
    }

    fn load_schema(&mut self, repository: &Path) -> Result<Arc<SchemaManager>> {
        let mut schema_manager = SchemaManager::new(repository);
        if !schema_manager.load_all_enabled() {
            return Err(DirectoryError::SchemaLoadFailed {
                errors: schema_manager.errors().to_vec(),
            });
        }
        self.state = BootstrapState::SchemaLoaded;
        Ok(Arc::new(schema_manager))
    }

    // The schema partition goes first: initializing the system partition
    // checks its entries against schema-defined object classes.
    fn attach_partitions(&mut self, schema_manager: Arc<SchemaManager>) -> Result<DirectoryService> {
        let partitions_directory = self.layout.partitions_directory();
        let mut service = DirectoryService::new(self.layout.clone());
        service.set_schema_manager(Arc::clone(&schema_manager))?;
        service.set_change_log_enabled(false);
        service.set_cache_service(Arc::clone(&self.cache));

        let mut schema_partition = SchemaPartition::new(Arc::clone(&schema_manager), self.layout.schema_repository())?;
        schema_partition.initialize()?;
        service.set_schema_partition(schema_partition)?;

        // this is a MANDATORY partition
        let system_partition = Partition::new("system", Dn::parse(SYSTEM_DN)?, &partitions_directory);
        service.set_system_partition(system_partition)?;

        for spec in &self.partitions {
            let mut partition = Partition::new(spec.id.clone(), Dn::parse(&spec.suffix)?, &partitions_directory);
            partition.add_index(&spec.indexed_attributes)?;
            service.add_partition(partition)?;
        }
        self.state = BootstrapState::PartitionsAttached;
        Ok(service)
    }

    fn start_service(&mut self, service: DirectoryService) -> Result<Arc<DirectoryService>> {
        // startup initializes the cache before it opens the partitions
        if let Err(e) = service.startup() {
            if let Err(cache_error) = self.cache.destroy() {
                error!(error=%cache_error, "cache service cleanup after failed startup failed");
            }
            return Err(e);
        }
        let service = Arc::new(service);
        self.service = Some(Arc::clone(&service));
        self.state = BootstrapState::Started;
        Ok(service)
    }

    /// Best-effort teardown: the cache and then the service are stopped,
    /// each failure is logged and the next step still runs.
    pub fn stop(&mut self) {
        let Some(service) = self.service.take() else {
            self.state = BootstrapState::Stopped;
            return;
        };
        if let Err(e) = self.cache.destroy() {
            error!(error=%e, "cache service shutdown failed");
        }
        if let Err(e) = service.shutdown() {
            error!(error=%e, "directory service shutdown failed");
        }
        self.state = BootstrapState::Stopped;
        info!("directory service bootstrap stopped");
    }
}
