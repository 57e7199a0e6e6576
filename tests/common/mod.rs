#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dirboot::resource::{MemoryContainer, ResourceContainer, RESOURCE_INDEX};
use walkdir::WalkDir;
use zip::write::FileOptions;

pub const SYSTEM_DESCRIPTOR_NAME: &str = "schema/ou=schema/cn=system.ldif";
pub const TOP_CLASS_NAME: &str = "schema/ou=schema/cn=system/ou=objectclasses/m-oid=2.5.6.0.ldif";
pub const OU_CLASS_NAME: &str = "schema/ou=schema/cn=system/ou=objectclasses/m-oid=2.5.6.5.ldif";
pub const CACHE_CONFIG_NAME: &str = "directory-cacheservice.toml";

pub const SYSTEM_DESCRIPTOR: &str = "version: 1
dn: cn=system,ou=schema
objectclass: metaSchema
objectclass: top
cn: system
";

pub const TOP_CLASS: &str = "version: 1
dn: m-oid=2.5.6.0,ou=objectClasses,cn=system,ou=schema
m-oid: 2.5.6.0
m-name: top
m-typeObjectClass: ABSTRACT
m-must: objectClass
objectclass: metaObjectClass
objectclass: metaTop
objectclass: top
";

pub const OU_CLASS: &str = "version: 1
dn: m-oid=2.5.6.5,ou=objectClasses,cn=system,ou=schema
m-oid: 2.5.6.5
m-name: organizationalUnit
m-supObjectClass: top
m-must: ou
objectclass: metaObjectClass
objectclass: metaTop
objectclass: top
";

pub const CACHE_CONFIG: &str = "max_entries = 16\n";

/// Three schema records and the cache configuration.
pub fn schema_bundle() -> MemoryContainer {
    MemoryContainer::new("bundle")
        .with_indexed_resource(SYSTEM_DESCRIPTOR_NAME, SYSTEM_DESCRIPTOR)
        .with_indexed_resource(TOP_CLASS_NAME, TOP_CLASS)
        .with_indexed_resource(OU_CLASS_NAME, OU_CLASS)
        .with_indexed_resource(CACHE_CONFIG_NAME, CACHE_CONFIG)
}

pub fn boxed<C: ResourceContainer + 'static>(container: C) -> Vec<Box<dyn ResourceContainer>> {
    vec![Box::new(container)]
}

/// Lays the files out as an exploded container below `root`, index included.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    let mut index = String::new();
    for (name, content) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(&path, content).expect("write resource");
        index.push_str(name);
        index.push('\n');
    }
    let index_path = root.join(RESOURCE_INDEX);
    fs::create_dir_all(index_path.parent().expect("parent")).expect("create dirs");
    fs::write(index_path, index).expect("write index");
}

/// Packs the files into a zip archive at `path`, index included.
pub fn write_archive(path: &Path, files: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).expect("create archive"));
    let options: FileOptions<'_, ()> = FileOptions::default();
    let mut index = String::new();
    for (name, content) in files {
        zip.start_file(*name, options).expect("start file");
        zip.write_all(content.as_bytes()).expect("write file");
        index.push_str(name);
        index.push('\n');
    }
    zip.start_file(RESOURCE_INDEX, options).expect("start index");
    zip.write_all(index.as_bytes()).expect("write index");
    zip.finish().expect("finish archive");
}

pub fn checksum(path: &Path) -> blake3::Hash {
    blake3::hash(&fs::read(path).expect("read for checksum"))
}

/// Every regular file below `root`, relative to it and sorted.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).expect("below root").to_path_buf())
        .collect();
    files.sort();
    files
}
