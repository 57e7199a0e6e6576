use dirboot::DirectoryError;
use dirboot::dn::Dn;
use dirboot::extract::{normalize, ENTRY_UUID_AT, LDIF_VERSION_HEADER};
use dirboot::ldif::{parse_ldif, LdifEntry};

#[test]
fn parses_version_and_single_record() {
    let doc = parse_ldif("version: 1\ndn: cn=core,ou=schema\nobjectclass: metaSchema\ncn: core\n").expect("parse");
    assert_eq!(doc.version, Some(1));
    assert_eq!(doc.entries.len(), 1);
    let entry = &doc.entries[0];
    assert_eq!(entry.dn(), "cn=core,ou=schema");
    assert_eq!(entry.get("CN"), Some("core"));
    assert_eq!(entry.get_all("objectClass"), vec!["metaSchema"]);
}

#[test]
fn unfolds_continuations_and_skips_comments() {
    let text = "# leading comment\n#  folded comment\n  still comment\ndn: cn=core,\n ou=schema\nm-description: a long\n  description\n";
    let doc = parse_ldif(text).expect("parse");
    assert_eq!(doc.version, None);
    let entry = &doc.entries[0];
    assert_eq!(entry.dn(), "cn=core,ou=schema");
    assert_eq!(entry.get("m-description"), Some("a long description"));
}

#[test]
fn multiple_records_and_multi_values() {
    let text = "dn: cn=a,ou=schema\ncn: a\ncn: alias\n\n\ndn: cn=b,ou=schema\ncn: b\n";
    let doc = parse_ldif(text).expect("parse");
    assert_eq!(doc.entries.len(), 2);
    assert_eq!(doc.entries[0].get_all("cn"), vec!["a", "alias"]);
    assert_eq!(doc.entries[1].dn(), "cn=b,ou=schema");
}

#[test]
fn base64_values_decode_and_unsafe_values_encode() {
    let doc = parse_ldif("dn: cn=x,ou=schema\ndescription:: IGxlYWRpbmcgc3BhY2U=\n").expect("parse");
    let entry = &doc.entries[0];
    assert_eq!(entry.get("description"), Some(" leading space"));
    let written = entry.to_string();
    assert!(written.contains("description:: IGxlYWRpbmcgc3BhY2U="), "got {written}");
    let reparsed = parse_ldif(&written).expect("reparse");
    assert_eq!(&reparsed.entries[0], entry);
}

#[test]
fn url_values_are_refused() {
    let result = parse_ldif("dn: cn=x,ou=schema\njpegPhoto:< file:///tmp/photo.jpg\n");
    assert!(matches!(result, Err(DirectoryError::Parse { .. })));
}

#[test]
fn attribute_line_without_colon_is_a_parse_error() {
    let result = parse_ldif("dn: cn=x,ou=schema\nnot an attribute\n");
    assert!(matches!(result, Err(DirectoryError::Parse { line: Some(_), .. })));
}

#[test]
fn entry_merges_attribute_values_case_insensitively() {
    let mut entry = LdifEntry::new("ou=system");
    entry.add_attribute("objectClass", "top");
    entry.add_attribute("objectclass", "organizationalUnit");
    entry.add_attribute("OBJECTCLASS", "top");
    assert_eq!(entry.attributes().len(), 1);
    assert_eq!(entry.get_all("objectClass"), vec!["top", "organizationalUnit"]);
}

// ------------- Normalizer -------------
#[test]
fn normalize_adds_uuid_and_version_header() {
    let normalized = normalize("cn=core.ldif", "dn: cn=core,ou=schema\ncn: core\n").expect("normalize");
    assert!(normalized.starts_with(LDIF_VERSION_HEADER));
    let doc = parse_ldif(&normalized).expect("parse normalized");
    assert_eq!(doc.version, Some(1));
    assert_eq!(doc.entries.len(), 1);
    let entry = &doc.entries[0];
    assert_eq!(entry.dn(), "cn=core,ou=schema");
    assert_eq!(entry.get("cn"), Some("core"));
    let uuid = entry.get(ENTRY_UUID_AT).expect("entryUUID present");
    assert!(uuid::Uuid::parse_str(uuid).is_ok(), "not a UUID: {uuid}");
}

#[test]
fn normalize_keeps_an_existing_uuid() {
    let text = "version: 1\ndn: cn=core,ou=schema\nentryUUID: 2d1e2f7a-0000-4000-8000-000000000001\n";
    let normalized = normalize("core", text).expect("normalize");
    let doc = parse_ldif(&normalized).expect("parse");
    assert_eq!(
        doc.entries[0].get_all(ENTRY_UUID_AT),
        vec!["2d1e2f7a-0000-4000-8000-000000000001"]
    );
    assert_eq!(normalized.matches("version: 1").count(), 1);
}

#[test]
fn normalize_refuses_empty_and_multi_record_input() {
    for text in ["", "# only a comment\n", "dn: cn=a,ou=schema\n\ndn: cn=b,ou=schema\n"] {
        let result = normalize("bad.ldif", text);
        assert!(
            matches!(result, Err(DirectoryError::MalformedRecord { ref source_name, .. }) if source_name == "bad.ldif"),
            "expected a malformed record for {text:?}, got {result:?}"
        );
    }
}

// ------------- Dn -------------
#[test]
fn dn_comparison_ignores_case_and_spacing() {
    let a = Dn::parse("M-OID=2.5.6.0, ou=objectClasses,cn=system,ou=schema").expect("dn");
    let b = Dn::parse("m-oid=2.5.6.0,ou=objectclasses,cn=system,ou=schema").expect("dn");
    assert_eq!(a, b);
    let schema = Dn::parse("ou=schema").expect("dn");
    assert!(a.is_descendant_of(&schema));
    assert!(schema.is_descendant_of(&schema));
    assert!(!schema.is_descendant_of(&a));
    assert!(Dn::parse("ou=,dc=com").is_err());
}
