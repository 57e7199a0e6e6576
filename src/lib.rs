//! Dirboot – bootstrapping of an embedded directory service.
//!
//! Bringing the directory online happens in a fixed order:
//! * Schema definitions are pulled from read-only resource containers
//!   (zip archives, exploded trees, in-memory bundles) into an on-disk LDIF
//!   repository under `<workdir>/partitions/schema`.
//! * A schema manager loads every enabled schema from that repository.
//! * The `schema` partition (a view over the repository) is attached, then
//!   the mandatory `system` partition rooted at `ou=system`, then any
//!   additional partitions with their attribute indices.
//! * The service starts, after which a TCP listener can be bound to it.
//!
//! Teardown runs the other way and is best effort: the cache subsystem and
//! the service are both stopped even when one of them fails.
//!
//! ## Modules
//! * [`resource`] – Resource containers and the locator that searches them.
//! * [`ldif`] – LDIF parsing (grammar in `ldif.pest`) and canonical output.
//! * [`extract`] – Record normalization, destination resolution and the schema extractor.
//! * [`schema`] – The schema manager loading definitions from the repository.
//! * [`partition`] – SQLite-backed partitions and the LDIF schema partition.
//! * [`service`] – The directory service handle and its instance layout.
//! * [`bootstrap`] – The startup/teardown sequence.
//! * [`server`] – The TCP listener bound to a started service.
//! * [`host`] / [`settings`] – The adapter for a host lifecycle and its configuration.
//!
//! ## Quick Start
//! ```no_run
//! use dirboot::bootstrap::Bootstrap;
//! use dirboot::resource::{ArchiveContainer, ResourceContainer};
//! let containers: Vec<Box<dyn ResourceContainer>> =
//!     vec![Box::new(ArchiveContainer::new("schema-bundle.zip").unwrap())];
//! let mut bootstrap = Bootstrap::new("ds", containers);
//! let service = bootstrap.start().unwrap();
//! assert!(service.is_started());
//! bootstrap.stop();
//! ```

pub mod bootstrap;
pub mod cache;
pub mod dn;
pub mod error;
pub mod extract;
pub mod host;
pub mod ldif;
pub mod partition;
pub mod resource;
pub mod schema;
pub mod server;
pub mod service;
pub mod settings;

pub use error::{DirectoryError, Result};
