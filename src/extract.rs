//! Materializes schema resources into an on-disk repository.
//!
//! Schema records are re-rooted below their nearest `schema` ancestor.
//! Packaged records are copied byte for byte; loose files found in exploded
//! containers are normalized on the way: exactly one record per file, an
//! `entryUUID` attribute, and a leading `version: 1` line. The cache
//! configuration lands directly in the output directory. A destination that
//! already exists is never rewritten.

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{DirectoryError, Result};
use crate::ldif::parse_ldif;
use crate::resource::{relative_resource_path, ResourceContainer, ResourceLocator, ResourceOrigin};

pub const SCHEMA_SUBDIR: &str = "schema";
pub const CACHE_CONFIG_RESOURCE: &str = "directory-cacheservice.toml";
pub const ENTRY_UUID_AT: &str = "entryUUID";
pub const LDIF_VERSION_HEADER: &str = "version: 1\n";

const ANCHOR: &str = "schema";

lazy_static! {
    // `schema` must be a whole path segment so every match has an anchor to resolve against
    static ref SCHEMA_RECORD_PATTERN: Regex =
        Regex::new(r"^(.*/)?schema/ou=schema.*\.ldif$").expect("schema record pattern");
    static ref CACHE_CONFIG_PATTERN: Regex =
        Regex::new(r"^directory-cacheservice\.toml$").expect("cache config pattern");
}

// ------------- Normalizer -------------
/// Checks that `text` holds exactly one record, gives it an `entryUUID` when
/// it has none, and renders it with the version header.
pub fn normalize(source_name: &str, text: &str) -> Result<String> {
    let document = parse_ldif(text).map_err(|e| DirectoryError::MalformedRecord {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })?;
    let count = document.entries.len();
    let Some(mut entry) = document.entries.into_iter().next().filter(|_| count == 1) else {
        return Err(DirectoryError::MalformedRecord {
            source_name: source_name.to_string(),
            message: format!("expected exactly one entry, found {}", count),
        });
    };
    if !entry.contains(ENTRY_UUID_AT) {
        entry.add_attribute(ENTRY_UUID_AT, Uuid::new_v4().to_string());
    }
    Ok(format!("{}{}", LDIF_VERSION_HEADER, entry))
}

/// Normalizes `source` into `destination`. The source is fully validated
/// before the destination is opened, so a malformed record leaves nothing
/// behind. A failure while writing may leave a partial file.
pub fn normalize_file(source: &Path, destination: &Path) -> Result<()> {
    let text = fs::read_to_string(source)?;
    let normalized = normalize(&source.display().to_string(), &text)?;
    write_new_file(destination, normalized.as_bytes())
}

fn write_new_file(destination: &Path, bytes: &[u8]) -> Result<()> {
    let failed = |e: std::io::Error| DirectoryError::WriteFailed {
        path: destination.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(failed)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(failed)?;
    file.write_all(bytes).map_err(failed)?;
    file.flush().map_err(failed)
}

// ------------- Destination -------------
/// Re-roots `source` under `output_root`, keeping everything below its
/// nearest `schema` ancestor and placing it one `schema` level down.
///
/// Works on the path alone; the filesystem is never consulted.
pub fn resolve_destination(output_root: &Path, source: &Path) -> Result<PathBuf> {
    let unresolvable = || DirectoryError::UnresolvablePath { path: source.to_path_buf() };
    let file_name = source.file_name().ok_or_else(unresolvable)?;
    let parent = source.parent().ok_or_else(unresolvable)?;

    let mut stack: Vec<&OsStr> = vec![file_name];
    for component in parent.components().rev() {
        match component {
            Component::Normal(name) => {
                if name == ANCHOR {
                    stack.push(OsStr::new(SCHEMA_SUBDIR));
                    return Ok(stack
                        .iter()
                        .rev()
                        .fold(output_root.to_path_buf(), |path, segment| path.join(segment)));
                }
                stack.push(name);
            }
            Component::CurDir => {}
            // root, drive prefix or `..`: the walk cannot go further up
            _ => break,
        }
    }
    Err(unresolvable())
}

// ------------- Extractor -------------
// Resource names are container paths; they must stay below whatever they
// are joined onto.
fn packaged_path(resource: &str) -> Result<PathBuf> {
    relative_resource_path(resource).ok_or_else(|| DirectoryError::UnresolvablePath {
        path: PathBuf::from(resource),
    })
}

#[derive(Debug, Default, Clone)]
pub struct ExtractionReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct SchemaExtractor {
    output_directory: PathBuf,
    schema_directory: PathBuf,
    extracted: bool,
}

impl SchemaExtractor {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        let output_directory = output_directory.into();
        let schema_directory = output_directory.join(SCHEMA_SUBDIR);
        if !output_directory.exists() {
            debug!(path=%output_directory.display(), "creating output directory");
            if let Err(e) = fs::create_dir_all(&output_directory) {
                error!(path=%output_directory.display(), error=%e, "failed to create output directory");
            }
        }
        let extracted = schema_directory.exists();
        info!(path=%schema_directory.display(), extracted, "schema directory state");
        Self {
            output_directory,
            schema_directory,
            extracted,
        }
    }
    pub fn is_extracted(&self) -> bool {
        self.extracted
    }
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }
    pub fn schema_directory(&self) -> &Path {
        &self.schema_directory
    }

    /// Extracts packaged schema resources and copies loose ones.
    ///
    /// Fails with [`DirectoryError::AlreadyExtracted`] when the schema
    /// directory exists and `overwrite` is false. With `overwrite`, files
    /// that are already present are kept as they are.
    pub fn extract_or_copy(
        &mut self,
        containers: &[Box<dyn ResourceContainer>],
        overwrite: bool,
    ) -> Result<ExtractionReport> {
        fs::create_dir_all(&self.output_directory)?;
        if !self.schema_directory.exists() {
            fs::create_dir_all(&self.schema_directory)?;
        } else if !overwrite {
            return Err(DirectoryError::AlreadyExtracted {
                path: self.schema_directory.clone(),
            });
        }

        let locator = ResourceLocator::new(containers);
        let records = locator.discover(&SCHEMA_RECORD_PATTERN)?;
        let configurations = locator.discover(&CACHE_CONFIG_PATTERN)?;
        info!(records = records.len(), configurations = configurations.len(), "schema resources discovered");

        let mut report = ExtractionReport::default();
        for descriptor in &records {
            match &descriptor.origin {
                ResourceOrigin::Packaged => {
                    let position = locator.locate(&descriptor.name)?;
                    let destination = resolve_destination(&self.output_directory, &packaged_path(&descriptor.name)?)?;
                    self.extract_packaged(containers[position].as_ref(), &descriptor.name, destination, &mut report)?;
                }
                ResourceOrigin::LooseFile(path) => self.copy_record(path, &mut report)?,
            }
        }
        for descriptor in &configurations {
            match &descriptor.origin {
                ResourceOrigin::Packaged => {
                    let position = locator.locate_unique(&descriptor.name)?;
                    let destination = self.output_directory.join(packaged_path(&descriptor.name)?);
                    self.extract_packaged(containers[position].as_ref(), &descriptor.name, destination, &mut report)?;
                }
                ResourceOrigin::LooseFile(path) => self.copy_configuration(path, &mut report)?,
            }
        }

        self.extracted = true;
        info!(written = report.written.len(), skipped = report.skipped.len(), "schema extraction complete");
        Ok(report)
    }

    fn extract_packaged(
        &self,
        container: &dyn ResourceContainer,
        resource: &str,
        destination: PathBuf,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        if destination.exists() {
            debug!(destination=%destination.display(), "already extracted, skipping");
            report.skipped.push(destination);
            return Ok(());
        }
        debug!(resource, container = container.name(), destination=%destination.display(), "extracting");
        let bytes = container.open(resource)?;
        write_new_file(&destination, &bytes)?;
        report.written.push(destination);
        Ok(())
    }

    fn copy_record(&self, source: &Path, report: &mut ExtractionReport) -> Result<()> {
        let destination = resolve_destination(&self.output_directory, source)?;
        if destination.exists() {
            debug!(destination=%destination.display(), "already copied, skipping");
            report.skipped.push(destination);
            return Ok(());
        }
        debug!(source=%source.display(), destination=%destination.display(), "normalizing");
        normalize_file(source, &destination)?;
        report.written.push(destination);
        Ok(())
    }

    // Not an LDIF record, so it is copied as is next to the schema directory.
    fn copy_configuration(&self, source: &Path, report: &mut ExtractionReport) -> Result<()> {
        let file_name = source.file_name().ok_or_else(|| DirectoryError::UnresolvablePath {
            path: source.to_path_buf(),
        })?;
        let destination = self.output_directory.join(file_name);
        if destination.exists() {
            report.skipped.push(destination);
            return Ok(());
        }
        let bytes = fs::read(source)?;
        write_new_file(&destination, &bytes)?;
        report.written.push(destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_below_schema_anchor() {
        let destination = resolve_destination(
            Path::new("/out"),
            Path::new("/opt/bundle/foo/schema/ou=schema/bar.ldif"),
        )
        .expect("resolvable");
        assert_eq!(destination, PathBuf::from("/out/schema/ou=schema/bar.ldif"));
    }

    #[test]
    fn nearest_anchor_wins() {
        let destination = resolve_destination(
            Path::new("/out"),
            Path::new("/schema/x/schema/ou=schema/cn=core/ou=attributetypes/m-oid=2.5.4.3.ldif"),
        )
        .expect("resolvable");
        assert_eq!(
            destination,
            PathBuf::from("/out/schema/ou=schema/cn=core/ou=attributetypes/m-oid=2.5.4.3.ldif")
        );
    }

    #[test]
    fn missing_anchor_is_unresolvable() {
        let result = resolve_destination(Path::new("/out"), Path::new("/opt/bundle/ldif/bar.ldif"));
        assert!(matches!(result, Err(DirectoryError::UnresolvablePath { .. })));
        let result = resolve_destination(Path::new("/out"), Path::new("bar.ldif"));
        assert!(matches!(result, Err(DirectoryError::UnresolvablePath { .. })));
    }

    #[test]
    fn parent_segment_stops_the_walk() {
        let result = resolve_destination(Path::new("/out"), Path::new("/schema/../ou=schema/bar.ldif"));
        assert!(matches!(result, Err(DirectoryError::UnresolvablePath { .. })));
    }

    #[test]
    fn relative_source_resolves() {
        let destination = resolve_destination(Path::new("out"), Path::new("./schema/ou=schema.ldif"))
            .expect("resolvable");
        assert_eq!(destination, PathBuf::from("out/schema/ou=schema.ldif"));
    }

    #[test]
    fn patterns_match_expected_names() {
        assert!(SCHEMA_RECORD_PATTERN.is_match("schema/ou=schema/cn=core.ldif"));
        assert!(SCHEMA_RECORD_PATTERN.is_match("schema/ou=schema.ldif"));
        assert!(!SCHEMA_RECORD_PATTERN.is_match("schema/ou=schema/cn=core.ldif.bak"));
        assert!(SCHEMA_RECORD_PATTERN.is_match("apacheds/schema/ou=schema/cn=x.ldif"));
        assert!(!SCHEMA_RECORD_PATTERN.is_match("apacheds-schema/ou=schema/cn=x.ldif"));
        assert!(!SCHEMA_RECORD_PATTERN.is_match("myschema/ou=schema.ldif"));
    }

    #[test]
    fn every_matching_name_resolves() {
        let root = Path::new("/srv/partitions");
        for name in [
            "schema/ou=schema.ldif",
            "schema/ou=schema/cn=core.ldif",
            "apacheds/schema/ou=schema/cn=x.ldif",
            "a/schema/b/schema/ou=schema/cn=y.ldif",
        ] {
            assert!(SCHEMA_RECORD_PATTERN.is_match(name), "{name}");
            assert!(resolve_destination(root, Path::new(name)).is_ok(), "{name}");
        }
        assert!(CACHE_CONFIG_PATTERN.is_match("directory-cacheservice.toml"));
        assert!(!CACHE_CONFIG_PATTERN.is_match("conf/directory-cacheservice.toml"));
    }
}
