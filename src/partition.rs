//! Partitions: independently rooted storage units of the directory.
//!
//! [`Partition`] keeps its entries in a SQLite file under
//! `partitions/<id>/`, with an attribute index table for the attributes
//! marked as indexed. [`SchemaPartition`] is a read-only view over the
//! extracted LDIF schema repository.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dn::{Dn, SCHEMA_DN};
use crate::error::{DirectoryError, Result};
use crate::ldif::{parse_ldif, LdifEntry};
use crate::schema::SchemaManager;

pub const PARTITION_DATABASE: &str = "master.db";

// ------------- Partition -------------
#[derive(Debug)]
pub struct Partition {
    id: String,
    suffix: Dn,
    path: PathBuf,
    indexed_attributes: BTreeSet<String>,
    connection: Mutex<Option<Connection>>,
}

impl Partition {
    pub fn new(id: impl Into<String>, suffix: Dn, partitions_directory: &Path) -> Self {
        let id = id.into();
        let path = partitions_directory.join(&id);
        Self {
            id,
            suffix,
            path,
            indexed_attributes: BTreeSet::new(),
            connection: Mutex::new(None),
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &str> {
        self.indexed_attributes.iter().map(String::as_str)
    }
    pub fn is_indexed(&self, attribute: &str) -> bool {
        self.indexed_attributes.contains(&attribute.to_ascii_lowercase())
    }
    pub fn is_initialized(&self) -> bool {
        self.connection.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Marks attributes for indexed lookup. Indices are created when the
    /// partition initializes, so a running partition refuses new ones.
    pub fn add_index<S: AsRef<str>>(&mut self, attributes: &[S]) -> Result<()> {
        if self.is_initialized() {
            return Err(DirectoryError::Invariant(format!(
                "cannot add an index to running partition {}",
                self.id
            )));
        }
        for attribute in attributes {
            self.indexed_attributes.insert(attribute.as_ref().to_ascii_lowercase());
        }
        Ok(())
    }

    pub fn initialize(&self) -> Result<()> {
        let mut guard = self.connection.lock()?;
        if guard.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.path)?;
        let connection = Connection::open(self.path.join(PARTITION_DATABASE))?;
        connection.execute_batch(
            "
            create table if not exists Entry (
                Entry_Dn text not null,
                Entry_Ldif text not null,
                constraint referenceable_Entry_Dn primary key (
                    Entry_Dn
                )
            );
            create table if not exists AttributeIndex (
                Attribute text not null,
                Value text not null,
                Entry_Dn text not null,
                constraint unique_AttributeIndex unique (
                    Attribute,
                    Value,
                    Entry_Dn
                )
            );
            ",
        )?;
        info!(partition=%self.id, suffix=%self.suffix, indices=self.indexed_attributes.len(), "partition initialized");
        *guard = Some(connection);
        Ok(())
    }

    pub fn add_entry(&self, entry: &LdifEntry) -> Result<()> {
        let dn = Dn::parse(entry.dn())?;
        if !dn.is_descendant_of(&self.suffix) {
            return Err(DirectoryError::Invariant(format!(
                "{} is outside partition {} ({})",
                dn, self.id, self.suffix
            )));
        }
        let mut guard = self.connection.lock()?;
        let connection = guard.as_mut().ok_or_else(|| self.not_initialized())?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "insert into Entry (Entry_Dn, Entry_Ldif) values (?1, ?2)",
            params![dn.normalized(), entry.to_string()],
        )?;
        for attribute in entry.attributes() {
            let name = attribute.name().to_ascii_lowercase();
            if !self.indexed_attributes.contains(&name) {
                continue;
            }
            for value in attribute.values() {
                transaction.execute(
                    "insert or ignore into AttributeIndex (Attribute, Value, Entry_Dn) values (?1, ?2, ?3)",
                    params![name, value.to_lowercase(), dn.normalized()],
                )?;
            }
        }
        transaction.commit()?;
        debug!(partition=%self.id, dn=%dn, "entry added");
        Ok(())
    }

    pub fn lookup(&self, dn: &Dn) -> Result<Option<LdifEntry>> {
        let guard = self.connection.lock()?;
        let connection = guard.as_ref().ok_or_else(|| self.not_initialized())?;
        let ldif: Option<String> = connection
            .query_row(
                "select Entry_Ldif from Entry where Entry_Dn = ?1",
                params![dn.normalized()],
                |row| row.get(0),
            )
            .optional()?;
        match ldif {
            Some(text) => Ok(parse_ldif(&text)?.entries.into_iter().next()),
            None => Ok(None),
        }
    }

    pub fn has_entry(&self, dn: &Dn) -> Result<bool> {
        Ok(self.lookup(dn)?.is_some())
    }

    /// Normalized DNs of the entries holding `value` for an indexed attribute.
    pub fn search_indexed(&self, attribute: &str, value: &str) -> Result<Vec<String>> {
        let attribute = attribute.to_ascii_lowercase();
        if !self.indexed_attributes.contains(&attribute) {
            return Err(DirectoryError::Invariant(format!(
                "attribute {} is not indexed in partition {}",
                attribute, self.id
            )));
        }
        let guard = self.connection.lock()?;
        let connection = guard.as_ref().ok_or_else(|| self.not_initialized())?;
        let mut statement = connection.prepare(
            "select Entry_Dn from AttributeIndex where Attribute = ?1 and Value = ?2 order by Entry_Dn",
        )?;
        let dns = statement
            .query_map(params![attribute, value.to_lowercase()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(dns)
    }

    pub fn destroy(&self) -> Result<()> {
        let mut guard = self.connection.lock()?;
        if let Some(connection) = guard.take() {
            connection.close().map_err(|(_, e)| DirectoryError::from(e))?;
            info!(partition=%self.id, "partition closed");
        }
        Ok(())
    }

    fn not_initialized(&self) -> DirectoryError {
        DirectoryError::Invariant(format!("partition {} is not initialized", self.id))
    }
}

// ------------- SchemaPartition -------------
/// Read-only partition over the extracted LDIF repository. A DN maps onto
/// the repository by reversing its RDNs into directories, the last RDN
/// naming the `.ldif` file.
#[derive(Debug)]
pub struct SchemaPartition {
    id: String,
    suffix: Dn,
    path: PathBuf,
    schema_manager: Arc<SchemaManager>,
    entry_count: Option<usize>,
}

impl SchemaPartition {
    pub fn new(schema_manager: Arc<SchemaManager>, path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            id: "schema".to_string(),
            suffix: Dn::parse(SCHEMA_DN)?,
            path: path.into(),
            schema_manager,
            entry_count: None,
        })
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn schema_manager(&self) -> &Arc<SchemaManager> {
        &self.schema_manager
    }
    pub fn is_initialized(&self) -> bool {
        self.entry_count.is_some()
    }
    pub fn entry_count(&self) -> usize {
        self.entry_count.unwrap_or(0)
    }

    pub fn initialize(&mut self) -> Result<()> {
        if !self.path.is_dir() {
            return Err(DirectoryError::Invariant(format!(
                "schema repository {} does not exist",
                self.path.display()
            )));
        }
        let count = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "ldif"))
            .count();
        info!(partition=%self.id, entries=count, "schema partition initialized");
        self.entry_count = Some(count);
        Ok(())
    }

    fn entry_path(&self, dn: &Dn) -> Option<PathBuf> {
        if dn.is_empty() || !dn.is_descendant_of(&self.suffix) {
            return None;
        }
        let mut path = self.path.clone();
        let rdns: Vec<String> = dn
            .rdns()
            .iter()
            .rev()
            .map(|rdn| format!("{}={}", rdn.attribute().to_ascii_lowercase(), rdn.value().to_lowercase()))
            .collect();
        let (last, parents) = rdns.split_last()?;
        for parent in parents {
            path.push(parent);
        }
        path.push(format!("{}.ldif", last));
        Some(path)
    }

    pub fn lookup(&self, dn: &Dn) -> Result<Option<LdifEntry>> {
        let Some(path) = self.entry_path(dn) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(parse_ldif(&text)?.entries.into_iter().next())
    }
}
