mod common;

use dirboot::DirectoryError;
use dirboot::resource::{
    ArchiveContainer, DirectoryContainer, MemoryContainer, ResourceContainer, ResourceLocator, ResourceOrigin,
    RESOURCE_INDEX,
};
use regex::Regex;

use common::*;

fn two_containers() -> Vec<Box<dyn ResourceContainer>> {
    vec![
        Box::new(
            MemoryContainer::new("first")
                .with_indexed_resource("schema/ou=schema/cn=a.ldif", "first a")
                .with_indexed_resource("shared.toml", "first shared"),
        ),
        Box::new(
            MemoryContainer::new("second")
                .with_indexed_resource("schema/ou=schema/cn=b.ldif", "second b")
                .with_indexed_resource("shared.toml", "second shared"),
        ),
    ]
}

#[test]
fn locate_returns_the_first_offering_container() {
    let containers = two_containers();
    let locator = ResourceLocator::new(&containers);
    assert_eq!(locator.locate("shared.toml").expect("locate"), 0);
    assert_eq!(locator.locate("schema/ou=schema/cn=b.ldif").expect("locate"), 1);
    assert_eq!(locator.open("shared.toml").expect("open"), b"first shared");
}

#[test]
fn locate_of_a_missing_resource_is_not_found() {
    let containers = two_containers();
    let locator = ResourceLocator::new(&containers);
    assert!(matches!(locator.locate("missing.ldif"), Err(DirectoryError::NotFound { .. })));
    assert!(matches!(locator.locate_unique("missing.ldif"), Err(DirectoryError::NotFound { .. })));
}

#[test]
fn locate_unique_rejects_ambiguous_resources() {
    let containers = two_containers();
    let locator = ResourceLocator::new(&containers);
    match locator.locate_unique("shared.toml") {
        Err(DirectoryError::Ambiguous { name, count }) => {
            assert_eq!(name, "shared.toml");
            assert_eq!(count, 2);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert_eq!(locator.locate_unique("schema/ou=schema/cn=a.ldif").expect("unique"), 0);
    assert_eq!(locator.open_unique("schema/ou=schema/cn=b.ldif").expect("open"), b"second b");
}

#[test]
fn discovery_filters_by_pattern_and_merges_containers() {
    let containers = two_containers();
    let locator = ResourceLocator::new(&containers);
    let pattern = Regex::new(r"^.*schema/ou=schema.*\.ldif$").expect("regex");
    let found = locator.discover(&pattern).expect("discover");
    let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["schema/ou=schema/cn=a.ldif", "schema/ou=schema/cn=b.ldif"]);
    assert!(found.iter().all(|d| d.origin == ResourceOrigin::Packaged));
}

#[test]
fn discovery_keeps_the_last_origin_for_shared_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(dir.path(), &[("shared.toml", "loose shared")]);
    let containers: Vec<Box<dyn ResourceContainer>> = vec![
        Box::new(MemoryContainer::new("packaged").with_indexed_resource("shared.toml", "packaged shared")),
        Box::new(DirectoryContainer::new(dir.path())),
    ];
    let locator = ResourceLocator::new(&containers);
    let found = locator.discover(&Regex::new(r"^shared\.toml$").expect("regex")).expect("discover");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].origin, ResourceOrigin::LooseFile(dir.path().join("shared.toml")));
    // direct lookups still scan in container order
    assert_eq!(locator.locate("shared.toml").expect("locate"), 0);
}

#[test]
fn unindexed_resources_are_not_discovered() {
    let containers = boxed(MemoryContainer::new("plain").with_resource("schema/ou=schema/cn=x.ldif", "x"));
    let locator = ResourceLocator::new(&containers);
    let found = locator.discover(&Regex::new(".*").expect("regex")).expect("discover");
    assert!(found.is_empty());
    assert_eq!(locator.locate("schema/ou=schema/cn=x.ldif").expect("locate"), 0);
}

#[test]
fn directory_container_refuses_escaping_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_tree(&dir.path().join("bundle"), &[("schema/ou=schema/cn=x.ldif", "x")]);
    std::fs::write(dir.path().join("outside.txt"), "secret").expect("write");
    let container = DirectoryContainer::new(dir.path().join("bundle"));
    assert!(container.contains("schema/ou=schema/cn=x.ldif"));
    assert!(!container.contains("../outside.txt"));
    assert!(matches!(container.open("../outside.txt"), Err(DirectoryError::NotFound { .. })));
}

#[test]
fn archive_container_serves_its_entries_and_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bundle.zip");
    write_archive(&path, &[(SYSTEM_DESCRIPTOR_NAME, SYSTEM_DESCRIPTOR), (CACHE_CONFIG_NAME, CACHE_CONFIG)]);
    let container = ArchiveContainer::new(&path).expect("open archive");
    assert!(container.contains(SYSTEM_DESCRIPTOR_NAME));
    assert_eq!(container.open(CACHE_CONFIG_NAME).expect("open"), CACHE_CONFIG.as_bytes());
    assert!(matches!(container.open("missing"), Err(DirectoryError::NotFound { .. })));
    assert_eq!(
        container.index_lines().expect("index"),
        vec![SYSTEM_DESCRIPTOR_NAME.to_string(), CACHE_CONFIG_NAME.to_string()]
    );
    assert_eq!(container.loose_path(SYSTEM_DESCRIPTOR_NAME), None);
}

#[test]
fn index_with_invalid_utf8_names_its_container() {
    let broken = MemoryContainer::new("broken").with_resource(RESOURCE_INDEX, vec![b's', 0xff, 0xfe, b'\n']);
    match broken.index_lines() {
        Err(DirectoryError::Container(message)) => assert!(message.contains("broken"), "{message}"),
        other => panic!("expected a container error, got {other:?}"),
    }

    let containers: Vec<Box<dyn ResourceContainer>> = vec![Box::new(schema_bundle()), Box::new(broken)];
    let locator = ResourceLocator::new(&containers);
    let pattern = Regex::new(r"\.ldif$").expect("pattern");
    assert!(matches!(locator.discover(&pattern), Err(DirectoryError::Container(_))));
}
