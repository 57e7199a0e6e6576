//! Read-only resource containers and the locator that searches them.
//!
//! A host hands the bootstrap an ordered collection of containers. Each one
//! may carry an index resource ([`RESOURCE_INDEX`]) listing the paths of the
//! resources it offers, one per line. Discovery reads every index; direct
//! lookups scan the containers in their fixed order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use regex::Regex;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{DirectoryError, Result};

pub const RESOURCE_INDEX: &str = "META-INF/schema-resources.index";

/// Turns a resource name into a relative path, refusing anything that could
/// escape the directory it is joined onto.
pub(crate) fn relative_resource_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if relative.as_os_str().is_empty() { None } else { Some(relative) }
}

// ------------- Containers -------------
pub trait ResourceContainer: Send + Sync {
    /// Human readable name used in logs.
    fn name(&self) -> &str;
    fn contains(&self, resource: &str) -> bool;
    fn open(&self, resource: &str) -> Result<Vec<u8>>;
    /// Filesystem location of the resource when the container is an
    /// exploded tree rather than a packaged bundle.
    fn loose_path(&self, _resource: &str) -> Option<PathBuf> {
        None
    }
    fn index_lines(&self) -> Result<Vec<String>> {
        if !self.contains(RESOURCE_INDEX) {
            return Ok(Vec::new());
        }
        let bytes = self.open(RESOURCE_INDEX)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            DirectoryError::Container(format!("{}: {} is not valid UTF-8: {}", self.name(), RESOURCE_INDEX, e))
        })?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// A zip archive, the packaged form of a resource bundle.
pub struct ArchiveContainer {
    name: String,
    names: BTreeSet<String>,
    archive: Mutex<ZipArchive<File>>,
}

impl ArchiveContainer {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let archive = ZipArchive::new(File::open(path)?)?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self {
            name: path.display().to_string(),
            names,
            archive: Mutex::new(archive),
        })
    }
}

impl ResourceContainer for ArchiveContainer {
    fn name(&self) -> &str {
        &self.name
    }
    fn contains(&self, resource: &str) -> bool {
        self.names.contains(resource)
    }
    fn open(&self, resource: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.lock()?;
        let mut file = match archive.by_name(resource) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(DirectoryError::NotFound { name: resource.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// An exploded bundle on disk. Its resources are loose files.
pub struct DirectoryContainer {
    name: String,
    root: PathBuf,
}

impl DirectoryContainer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            name: root.display().to_string(),
            root,
        }
    }
    fn resolve(&self, resource: &str) -> Option<PathBuf> {
        relative_resource_path(resource).map(|relative| self.root.join(relative))
    }
}

impl ResourceContainer for DirectoryContainer {
    fn name(&self) -> &str {
        &self.name
    }
    fn contains(&self, resource: &str) -> bool {
        self.resolve(resource).is_some_and(|path| path.is_file())
    }
    fn open(&self, resource: &str) -> Result<Vec<u8>> {
        match self.resolve(resource) {
            Some(path) if path.is_file() => Ok(fs::read(path)?),
            _ => Err(DirectoryError::NotFound { name: resource.to_string() }),
        }
    }
    fn loose_path(&self, resource: &str) -> Option<PathBuf> {
        self.resolve(resource)
    }
}

/// Resources held in memory, e.g. compiled into the host binary.
#[derive(Default)]
pub struct MemoryContainer {
    name: String,
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: HashMap::new(),
        }
    }
    pub fn insert(&mut self, resource: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.insert(resource.into(), bytes.into());
    }
    pub fn with_resource(mut self, resource: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(resource, bytes);
        self
    }
    /// Adds the resource and lists it in the container's index.
    pub fn with_indexed_resource(mut self, resource: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let mut index = self.resources.remove(RESOURCE_INDEX).unwrap_or_default();
        index.extend_from_slice(resource.as_bytes());
        index.push(b'\n');
        self.resources.insert(RESOURCE_INDEX.to_string(), index);
        self.insert(resource, bytes);
        self
    }
}

impl ResourceContainer for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }
    fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }
    fn open(&self, resource: &str) -> Result<Vec<u8>> {
        self.resources
            .get(resource)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { name: resource.to_string() })
    }
}

// ------------- Descriptors -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
    Packaged,
    LooseFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub origin: ResourceOrigin,
}

// ------------- Locator -------------
pub struct ResourceLocator<'c> {
    containers: &'c [Box<dyn ResourceContainer>],
}

impl<'c> ResourceLocator<'c> {
    pub fn new(containers: &'c [Box<dyn ResourceContainer>]) -> Self {
        Self { containers }
    }

    /// Position of the first container offering `name`.
    pub fn locate(&self, name: &str) -> Result<usize> {
        self.containers
            .iter()
            .position(|c| c.contains(name))
            .ok_or_else(|| DirectoryError::NotFound { name: name.to_string() })
    }

    /// Like [`locate`](Self::locate), but exactly one container may offer `name`.
    pub fn locate_unique(&self, name: &str) -> Result<usize> {
        let offering: Vec<usize> = self
            .containers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains(name))
            .map(|(i, _)| i)
            .collect();
        match offering.as_slice() {
            [] => Err(DirectoryError::NotFound { name: name.to_string() }),
            [only] => Ok(*only),
            _ => Err(DirectoryError::Ambiguous {
                name: name.to_string(),
                count: offering.len(),
            }),
        }
    }

    pub fn open(&self, name: &str) -> Result<Vec<u8>> {
        let position = self.locate(name)?;
        self.containers[position].open(name)
    }

    pub fn open_unique(&self, name: &str) -> Result<Vec<u8>> {
        let position = self.locate_unique(name)?;
        self.containers[position].open(name)
    }

    /// Collects every indexed resource whose name fully matches `pattern`.
    ///
    /// Indexes are read concurrently; the results are merged in container
    /// order once every container has answered. A name offered by several
    /// containers keeps the origin of the last one.
    pub fn discover(&self, pattern: &Regex) -> Result<Vec<ResourceDescriptor>> {
        let scanned: Vec<Result<Vec<(String, ResourceOrigin)>>> = std::thread::scope(|scope| {
            let workers: Vec<_> = self
                .containers
                .iter()
                .map(|container| scope.spawn(move || scan_container(container.as_ref(), pattern)))
                .collect();
            workers
                .into_iter()
                .map(|worker| {
                    worker
                        .join()
                        .unwrap_or_else(|_| Err(DirectoryError::Invariant("index scan panicked".to_string())))
                })
                .collect()
        });

        let mut discovered: BTreeMap<String, ResourceOrigin> = BTreeMap::new();
        for (position, hits) in scanned.into_iter().enumerate() {
            for (name, origin) in hits? {
                if let Some(previous) = discovered.insert(name.clone(), origin) {
                    warn!(resource=%name, container=position, previous=?previous, "resource offered by more than one container, last discovered wins");
                }
            }
        }
        debug!(pattern=%pattern, count=discovered.len(), "resource discovery complete");
        Ok(discovered
            .into_iter()
            .map(|(name, origin)| ResourceDescriptor { name, origin })
            .collect())
    }
}

fn scan_container(container: &dyn ResourceContainer, pattern: &Regex) -> Result<Vec<(String, ResourceOrigin)>> {
    let lines = container.index_lines()?;
    Ok(lines
        .into_iter()
        .filter(|line| pattern.is_match(line))
        .map(|line| {
            let origin = match container.loose_path(&line) {
                Some(path) => ResourceOrigin::LooseFile(path),
                None => ResourceOrigin::Packaged,
            };
            (line, origin)
        })
        .collect())
}
