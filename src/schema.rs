//! Schema loading from an extracted LDIF repository.
//!
//! The repository keeps one descriptor per schema at
//! `ou=schema/cn=<name>.ldif` and the schema's definitions below
//! `ou=schema/cn=<name>/ou=<kind>/`, one definition per file. Only enabled
//! schemas are loaded, after the schemas they depend on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::ldif::{parse_ldif, LdifEntry};

pub const SCHEMA_OU: &str = "ou=schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    AttributeType,
    ObjectClass,
    Syntax,
    MatchingRule,
    MatchingRuleUse,
    Comparator,
    Normalizer,
    SyntaxChecker,
    DitContentRule,
    DitStructureRule,
    NameForm,
}

impl DefinitionKind {
    pub fn container(&self) -> &'static str {
        match self {
            Self::AttributeType => "ou=attributetypes",
            Self::ObjectClass => "ou=objectclasses",
            Self::Syntax => "ou=syntaxes",
            Self::MatchingRule => "ou=matchingrules",
            Self::MatchingRuleUse => "ou=matchingruleuse",
            Self::Comparator => "ou=comparators",
            Self::Normalizer => "ou=normalizers",
            Self::SyntaxChecker => "ou=syntaxcheckers",
            Self::DitContentRule => "ou=ditcontentrules",
            Self::DitStructureRule => "ou=ditstructurerules",
            Self::NameForm => "ou=nameforms",
        }
    }
    fn from_container(name: &str) -> Option<Self> {
        const ALL: [DefinitionKind; 11] = [
            DefinitionKind::AttributeType,
            DefinitionKind::ObjectClass,
            DefinitionKind::Syntax,
            DefinitionKind::MatchingRule,
            DefinitionKind::MatchingRuleUse,
            DefinitionKind::Comparator,
            DefinitionKind::Normalizer,
            DefinitionKind::SyntaxChecker,
            DefinitionKind::DitContentRule,
            DefinitionKind::DitStructureRule,
            DefinitionKind::NameForm,
        ];
        ALL.into_iter().find(|k| k.container().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub name: String,
    pub disabled: bool,
    pub dependencies: Vec<String>,
    directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub kind: DefinitionKind,
    pub schema: String,
    pub entry: LdifEntry,
}

// ------------- SchemaManager -------------
#[derive(Debug)]
pub struct SchemaManager {
    repository: PathBuf,
    schemas: BTreeMap<String, SchemaDescriptor>,
    loaded: Vec<String>,
    definitions: HashMap<String, SchemaDefinition>,
    names: HashMap<(DefinitionKind, String), String>,
    errors: Vec<String>,
}

impl SchemaManager {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            schemas: BTreeMap::new(),
            loaded: Vec::new(),
            definitions: HashMap::new(),
            names: HashMap::new(),
            errors: Vec::new(),
        }
    }
    pub fn repository(&self) -> &Path {
        &self.repository
    }
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
    pub fn loaded_schemas(&self) -> &[String] {
        &self.loaded
    }
    pub fn schemas(&self) -> impl Iterator<Item = &SchemaDescriptor> {
        self.schemas.values()
    }
    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }
    pub fn definition(&self, oid: &str) -> Option<&SchemaDefinition> {
        self.definitions.get(oid)
    }
    pub fn lookup(&self, kind: DefinitionKind, name_or_oid: &str) -> Option<&SchemaDefinition> {
        match self.definitions.get(name_or_oid) {
            Some(definition) if definition.kind == kind => Some(definition),
            _ => self
                .names
                .get(&(kind, name_or_oid.to_ascii_lowercase()))
                .and_then(|oid| self.definitions.get(oid)),
        }
    }
    pub fn object_class(&self, name: &str) -> Option<&SchemaDefinition> {
        self.lookup(DefinitionKind::ObjectClass, name)
    }
    pub fn attribute_type(&self, name: &str) -> Option<&SchemaDefinition> {
        self.lookup(DefinitionKind::AttributeType, name)
    }
    pub fn is_object_class(&self, name: &str) -> bool {
        self.object_class(name).is_some()
    }

    /// Loads every enabled schema. Returns false when anything went wrong
    /// (see [`errors`](Self::errors)) or when nothing could be loaded.
    pub fn load_all_enabled(&mut self) -> bool {
        self.read_descriptors();
        let enabled: Vec<String> = self
            .schemas
            .values()
            .filter(|s| !s.disabled)
            .map(|s| s.name.to_ascii_lowercase())
            .collect();
        let mut done = HashSet::new();
        for name in enabled {
            let mut visiting = Vec::new();
            self.load_with_dependencies(&name, &mut visiting, &mut done);
        }
        info!(
            schemas = self.loaded.len(),
            definitions = self.definitions.len(),
            errors = self.errors.len(),
            "schema load finished"
        );
        self.errors.is_empty() && !self.loaded.is_empty()
    }

    fn read_descriptors(&mut self) {
        let root = self.repository.join(SCHEMA_OU);
        let listing = match fs::read_dir(&root) {
            Ok(listing) => listing,
            Err(e) => {
                warn!(path=%root.display(), error=%e, "no schema repository");
                return;
            }
        };
        let mut files: Vec<PathBuf> = listing
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "ldif"))
            .collect();
        files.sort();
        for file in files {
            let Some(entry) = self.read_single_entry(&file) else {
                continue;
            };
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = entry
                .get("cn")
                .map(str::to_string)
                .unwrap_or_else(|| stem.trim_start_matches("cn=").to_string());
            let disabled = entry
                .get("m-disabled")
                .is_some_and(|v| v.eq_ignore_ascii_case("TRUE"));
            let dependencies = entry.get_all("m-dependencies").into_iter().map(str::to_string).collect();
            debug!(schema=%name, disabled, "schema descriptor");
            self.schemas.insert(
                name.to_ascii_lowercase(),
                SchemaDescriptor {
                    name,
                    disabled,
                    dependencies,
                    directory: root.join(stem),
                },
            );
        }
    }

    fn load_with_dependencies(&mut self, key: &str, visiting: &mut Vec<String>, done: &mut HashSet<String>) -> bool {
        if done.contains(key) {
            return self.loaded.iter().any(|l| l.eq_ignore_ascii_case(key));
        }
        if visiting.iter().any(|v| v == key) {
            self.errors.push(format!("cyclic schema dependency: {} -> {}", visiting.join(" -> "), key));
            return false;
        }
        let Some(descriptor) = self.schemas.get(key).cloned() else {
            return false;
        };
        visiting.push(key.to_string());
        let mut satisfied = true;
        for dependency in &descriptor.dependencies {
            let dependency_key = dependency.to_ascii_lowercase();
            let disabled = self.schemas.get(&dependency_key).map(|d| d.disabled);
            match disabled {
                None => {
                    self.errors.push(format!("schema {} depends on unknown schema {}", descriptor.name, dependency));
                    satisfied = false;
                }
                Some(true) => {
                    self.errors.push(format!("schema {} depends on disabled schema {}", descriptor.name, dependency));
                    satisfied = false;
                }
                Some(false) => {
                    if !self.load_with_dependencies(&dependency_key, visiting, done) {
                        satisfied = false;
                    }
                }
            }
        }
        visiting.pop();
        done.insert(key.to_string());
        if satisfied {
            self.load_definitions(&descriptor);
            self.loaded.push(descriptor.name.clone());
        }
        satisfied
    }

    fn load_definitions(&mut self, descriptor: &SchemaDescriptor) {
        if !descriptor.directory.is_dir() {
            debug!(schema=%descriptor.name, "schema without definitions");
            return;
        }
        let files: Vec<PathBuf> = WalkDir::new(&descriptor.directory)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|x| x == "ldif"))
            .collect();
        for file in files {
            let container = file
                .parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let Some(kind) = DefinitionKind::from_container(&container) else {
                debug!(path=%file.display(), "ignoring file outside a known definition container");
                continue;
            };
            let Some(entry) = self.read_single_entry(&file) else {
                continue;
            };
            self.register(descriptor, kind, entry, &file);
        }
    }

    fn register(&mut self, descriptor: &SchemaDescriptor, kind: DefinitionKind, entry: LdifEntry, file: &Path) {
        let Some(oid) = entry.get("m-oid").map(str::to_string) else {
            self.errors.push(format!("{}: definition without m-oid", file.display()));
            return;
        };
        if let Some(existing) = self.definitions.get(&oid) {
            self.errors.push(format!(
                "{}: OID {} already defined by schema {}",
                file.display(),
                oid,
                existing.schema
            ));
            return;
        }
        let names: Vec<String> = entry.get_all("m-name").into_iter().map(str::to_string).collect();
        for name in &names {
            self.names.insert((kind, name.to_ascii_lowercase()), oid.clone());
        }
        self.definitions.insert(
            oid.clone(),
            SchemaDefinition {
                oid,
                names,
                kind,
                schema: descriptor.name.clone(),
                entry,
            },
        );
    }

    fn read_single_entry(&mut self, file: &Path) -> Option<LdifEntry> {
        let text = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                self.errors.push(format!("{}: {}", file.display(), e));
                return None;
            }
        };
        match parse_ldif(&text) {
            Ok(document) if document.entries.len() == 1 => document.entries.into_iter().next(),
            Ok(document) => {
                self.errors.push(format!(
                    "{}: expected one entry, found {}",
                    file.display(),
                    document.entries.len()
                ));
                None
            }
            Err(e) => {
                self.errors.push(format!("{}: {}", file.display(), e));
                None
            }
        }
    }
}
