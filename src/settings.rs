//! Host configuration: working directory, port, resource containers and
//! optional partitions. Read from an optional file and `DIRBOOT_*`
//! environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::bootstrap::PartitionSpec;
use crate::error::Result;
use crate::resource::{ArchiveContainer, DirectoryContainer, ResourceContainer};
use crate::server::DEFAULT_PORT;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContainerSettings {
    Archive { path: PathBuf },
    Directory { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionSettings {
    pub id: String,
    pub suffix: String,
    #[serde(default)]
    pub indexed_attributes: Vec<String>,
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("ds")
}
fn default_port() -> i64 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default)]
    pub containers: Vec<ContainerSettings>,
    #[serde(default)]
    pub partitions: Vec<PartitionSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_directory: default_working_directory(),
            port: default_port(),
            containers: Vec::new(),
            partitions: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (format by extension) when given, then
    /// applies `DIRBOOT_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("working_directory", "ds")?
            .set_default("port", DEFAULT_PORT)?;
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("DIRBOOT").try_parsing(true));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Creates the working directory when it does not exist yet.
    pub fn ensure_working_directory(&self) -> Result<PathBuf> {
        if !self.working_directory.is_dir() {
            info!(path=%self.working_directory.display(), "creating working directory");
            fs::create_dir_all(&self.working_directory)?;
        }
        Ok(self.working_directory.clone())
    }

    pub fn open_containers(&self) -> Result<Vec<Box<dyn ResourceContainer>>> {
        self.containers
            .iter()
            .map(|c| -> Result<Box<dyn ResourceContainer>> {
                let container: Box<dyn ResourceContainer> = match c {
                    ContainerSettings::Archive { path } => Box::new(ArchiveContainer::new(path)?),
                    ContainerSettings::Directory { path } => Box::new(DirectoryContainer::new(path.clone())),
                };
                Ok(container)
            })
            .collect()
    }

    pub fn partition_specs(&self) -> Vec<PartitionSpec> {
        self.partitions
            .iter()
            .map(|p| PartitionSpec::new(p.id.clone(), p.suffix.clone()).with_index(&p.indexed_attributes))
            .collect()
    }
}
