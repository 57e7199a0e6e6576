//! The directory service handle.
//!
//! The service is assembled step by step (schema manager, schema partition,
//! system partition, additional partitions) and then started. Once started
//! it is shared read-only with the network listener; only the bootstrap can
//! start or stop it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::dn::{Dn, SYSTEM_DN};
use crate::error::{DirectoryError, Result};
use crate::extract::{CACHE_CONFIG_RESOURCE, ENTRY_UUID_AT, SCHEMA_SUBDIR};
use crate::ldif::LdifEntry;
use crate::partition::{Partition, SchemaPartition};
use crate::schema::SchemaManager;

pub const ADMIN_DN: &str = "uid=admin,ou=system";

// ------------- InstanceLayout -------------
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
    pub fn root(&self) -> &Path {
        &self.root
    }
    pub fn partitions_directory(&self) -> PathBuf {
        self.root.join("partitions")
    }
    /// The extracted schema repository, also the storage of the schema partition.
    pub fn schema_repository(&self) -> PathBuf {
        self.partitions_directory().join(SCHEMA_SUBDIR)
    }
    pub fn cache_directory(&self) -> PathBuf {
        self.root.join("cache")
    }
    pub fn run_directory(&self) -> PathBuf {
        self.root.join("run")
    }
    pub fn cache_config_path(&self) -> PathBuf {
        self.partitions_directory().join(CACHE_CONFIG_RESOURCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    SchemaLoaded,
    PartitionsAttached,
    Started,
    Stopped,
}

// ------------- DirectoryService -------------
pub struct DirectoryService {
    layout: InstanceLayout,
    schema_manager: Option<Arc<SchemaManager>>,
    cache: Option<Arc<dyn CacheService>>,
    change_log_enabled: bool,
    schema_partition: Option<Arc<SchemaPartition>>,
    system_partition: Option<Arc<Partition>>,
    partitions: Vec<Arc<Partition>>,
    attached: Vec<String>,
    state: RwLock<ServiceState>,
}

impl DirectoryService {
    pub fn new(layout: InstanceLayout) -> Self {
        Self {
            layout,
            schema_manager: None,
            cache: None,
            change_log_enabled: true,
            schema_partition: None,
            system_partition: None,
            partitions: Vec::new(),
            attached: Vec::new(),
            state: RwLock::new(ServiceState::Uninitialized),
        }
    }

    pub fn layout(&self) -> &InstanceLayout {
        &self.layout
    }
    pub fn state(&self) -> ServiceState {
        self.state.read().map(|s| *s).unwrap_or(ServiceState::Stopped)
    }
    pub fn is_started(&self) -> bool {
        self.state() == ServiceState::Started
    }
    pub fn schema_manager(&self) -> Option<&Arc<SchemaManager>> {
        self.schema_manager.as_ref()
    }
    pub fn is_change_log_enabled(&self) -> bool {
        self.change_log_enabled
    }
    pub fn schema_partition(&self) -> Option<&Arc<SchemaPartition>> {
        self.schema_partition.as_ref()
    }
    pub fn system_partition(&self) -> Option<&Arc<Partition>> {
        self.system_partition.as_ref()
    }
    /// Ids of the attached partitions, in attachment order.
    pub fn attached_partitions(&self) -> &[String] {
        &self.attached
    }
    pub fn partition(&self, id: &str) -> Option<Arc<Partition>> {
        self.system_partition
            .iter()
            .chain(self.partitions.iter())
            .find(|p| p.id() == id)
            .cloned()
    }

    fn set_state(&self, state: ServiceState) -> Result<()> {
        *self.state.write()? = state;
        Ok(())
    }

    pub fn set_schema_manager(&mut self, schema_manager: Arc<SchemaManager>) -> Result<()> {
        self.schema_manager = Some(schema_manager);
        self.set_state(ServiceState::SchemaLoaded)
    }
    pub fn set_cache_service(&mut self, cache: Arc<dyn CacheService>) {
        self.cache = Some(cache);
    }
    pub fn set_change_log_enabled(&mut self, enabled: bool) {
        self.change_log_enabled = enabled;
    }

    pub fn set_schema_partition(&mut self, partition: SchemaPartition) -> Result<()> {
        if self.schema_manager.is_none() {
            return Err(DirectoryError::Invariant(
                "schema partition attached before the schema was loaded".to_string(),
            ));
        }
        if !partition.is_initialized() {
            return Err(DirectoryError::Invariant("schema partition is not initialized".to_string()));
        }
        debug!(partition = partition.id(), "attaching schema partition");
        self.attached.push(partition.id().to_string());
        self.schema_partition = Some(Arc::new(partition));
        Ok(())
    }

    /// The system partition may reference schema-defined object classes,
    /// so the schema partition has to be attached first.
    pub fn set_system_partition(&mut self, partition: Partition) -> Result<()> {
        if self.schema_partition.is_none() {
            return Err(DirectoryError::Invariant(
                "system partition attached before the schema partition".to_string(),
            ));
        }
        if partition.suffix() != &Dn::parse(SYSTEM_DN)? {
            return Err(DirectoryError::Invariant(format!(
                "system partition must be rooted at {}, not {}",
                SYSTEM_DN,
                partition.suffix()
            )));
        }
        debug!(partition = partition.id(), "attaching system partition");
        self.attached.push(partition.id().to_string());
        self.system_partition = Some(Arc::new(partition));
        self.set_state(ServiceState::PartitionsAttached)
    }

    pub fn add_partition(&mut self, partition: Partition) -> Result<()> {
        if self.system_partition.is_none() {
            return Err(DirectoryError::Invariant(format!(
                "partition {} added before the system partition",
                partition.id()
            )));
        }
        if self.attached.iter().any(|id| id == partition.id()) {
            return Err(DirectoryError::Invariant(format!(
                "partition {} is already attached",
                partition.id()
            )));
        }
        debug!(partition = partition.id(), suffix=%partition.suffix(), "attaching partition");
        self.attached.push(partition.id().to_string());
        self.partitions.push(Arc::new(partition));
        Ok(())
    }

    // ------------- Lifecycle -------------
    pub(crate) fn startup(&self) -> Result<()> {
        if self.state() != ServiceState::PartitionsAttached {
            return Err(DirectoryError::StartupFailed(format!(
                "service cannot start from state {:?}",
                self.state()
            )));
        }
        self.open_storage().map_err(|e| match e {
            DirectoryError::StartupFailed(_) => e,
            other => DirectoryError::StartupFailed(other.to_string()),
        })?;
        self.set_state(ServiceState::Started)?;
        info!(partitions = self.attached.len(), change_log = self.change_log_enabled, "directory service started");
        Ok(())
    }

    fn open_storage(&self) -> Result<()> {
        std::fs::create_dir_all(self.layout.run_directory())?;
        if let Some(cache) = &self.cache {
            cache.initialize(&self.layout)?;
        }
        let system = self
            .system_partition
            .as_ref()
            .ok_or_else(|| DirectoryError::StartupFailed("no system partition".to_string()))?;
        system.initialize()?;
        self.inject_system_context_entry(system)?;
        for partition in &self.partitions {
            partition.initialize()?;
        }
        Ok(())
    }

    fn inject_system_context_entry(&self, system: &Partition) -> Result<()> {
        if system.has_entry(system.suffix())? {
            return Ok(());
        }
        let schema_manager = self
            .schema_manager
            .as_ref()
            .ok_or_else(|| DirectoryError::StartupFailed("no schema manager".to_string()))?;
        let mut entry = LdifEntry::new(system.suffix().to_string());
        for object_class in ["top", "organizationalUnit"] {
            if !schema_manager.is_object_class(object_class) {
                return Err(DirectoryError::StartupFailed(format!(
                    "object class {} is not defined by the loaded schema",
                    object_class
                )));
            }
            entry.add_attribute("objectClass", object_class);
        }
        entry.add_attribute("ou", "system");
        entry.add_attribute("creatorsName", ADMIN_DN);
        entry.add_attribute("createTimestamp", Utc::now().format("%Y%m%d%H%M%S%.3fZ").to_string());
        entry.add_attribute(ENTRY_UUID_AT, Uuid::new_v4().to_string());
        system.add_entry(&entry)?;
        info!(dn=%system.suffix(), "system context entry created");
        Ok(())
    }

    /// Closes the partition storage. Every partition is closed even when
    /// one fails; the first failure is returned.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if self.state() != ServiceState::Started {
            debug!(state=?self.state(), "shutdown of a service that is not running");
            return Ok(());
        }
        let mut first_error = None;
        for partition in self.partitions.iter().rev().chain(self.system_partition.iter()) {
            if let Err(e) = partition.destroy() {
                error!(partition = partition.id(), error=%e, "failed to close partition");
                first_error.get_or_insert(e);
            }
        }
        self.set_state(ServiceState::Stopped)?;
        info!("directory service stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ------------- Reads -------------
    /// Looks an entry up in the partition whose suffix is the closest
    /// ancestor of `dn`.
    pub fn lookup(&self, dn: &Dn) -> Result<Option<LdifEntry>> {
        if !self.is_started() {
            return Err(DirectoryError::Invariant("directory service is not started".to_string()));
        }
        let normalized = dn.normalized();
        if let Some(entry) = self.cache.as_ref().and_then(|c| c.get(&normalized)) {
            return Ok(Some(entry));
        }
        let found = match &self.schema_partition {
            Some(schema) if dn.is_descendant_of(schema.suffix()) => schema.lookup(dn)?,
            _ => match self.storage_partition_for(dn) {
                Some(partition) => partition.lookup(dn)?,
                None => None,
            },
        };
        if let (Some(entry), Some(cache)) = (&found, &self.cache) {
            cache.put(&normalized, entry);
        }
        Ok(found)
    }

    fn storage_partition_for(&self, dn: &Dn) -> Option<&Arc<Partition>> {
        self.system_partition
            .iter()
            .chain(self.partitions.iter())
            .filter(|p| dn.is_descendant_of(p.suffix()))
            .max_by_key(|p| p.suffix().rdns().len())
    }
}
