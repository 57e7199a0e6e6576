//! Auxiliary entry cache attached to the directory service.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::ldif::LdifEntry;
use crate::service::InstanceLayout;

/// Lifecycle seam for the cache subsystem. The directory service
/// initializes it during startup; teardown destroys it.
pub trait CacheService: Send + Sync {
    fn initialize(&self, layout: &InstanceLayout) -> Result<()>;
    fn destroy(&self) -> Result<()>;
    fn get(&self, _normalized_dn: &str) -> Option<LdifEntry> {
        None
    }
    fn put(&self, _normalized_dn: &str, _entry: &LdifEntry) {}
}

fn default_max_entries() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}
impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_entries: default_max_entries() }
    }
}

#[derive(Default)]
struct Entries {
    by_dn: HashMap<String, LdifEntry>,
    order: VecDeque<String>,
}

/// Bounded cache of entries by normalized DN, evicting the oldest insert.
#[derive(Default)]
pub struct EntryCache {
    settings: Mutex<CacheSettings>,
    entries: Mutex<Entries>,
    active: AtomicBool,
}

impl EntryCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn settings(&self) -> CacheSettings {
        self.settings.lock().map(|s| s.clone()).unwrap_or_default()
    }
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.by_dn.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheService for EntryCache {
    fn initialize(&self, layout: &InstanceLayout) -> Result<()> {
        fs::create_dir_all(layout.cache_directory())?;
        let path = layout.cache_config_path();
        let settings = if path.is_file() {
            config::Config::builder()
                .add_source(config::File::new(&path.to_string_lossy(), config::FileFormat::Toml))
                .build()?
                .try_deserialize::<CacheSettings>()?
        } else {
            debug!(path=%path.display(), "no cache configuration, using defaults");
            CacheSettings::default()
        };
        info!(max_entries = settings.max_entries, "entry cache initialized");
        *self.settings.lock()? = settings;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        let mut entries = self.entries.lock()?;
        entries.by_dn.clear();
        entries.order.clear();
        self.active.store(false, Ordering::SeqCst);
        info!("entry cache destroyed");
        Ok(())
    }

    fn get(&self, normalized_dn: &str) -> Option<LdifEntry> {
        if !self.is_active() {
            return None;
        }
        self.entries.lock().ok()?.by_dn.get(normalized_dn).cloned()
    }

    fn put(&self, normalized_dn: &str, entry: &LdifEntry) {
        if !self.is_active() {
            return;
        }
        let capacity = self.settings().max_entries;
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if capacity == 0 || entries.by_dn.contains_key(normalized_dn) {
            return;
        }
        while entries.by_dn.len() >= capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.by_dn.remove(&oldest);
                }
                None => break,
            }
        }
        entries.order.push_back(normalized_dn.to_string());
        entries.by_dn.insert(normalized_dn.to_string(), entry.clone());
    }
}
