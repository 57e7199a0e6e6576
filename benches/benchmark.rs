use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dirboot::extract::{normalize, resolve_destination};
use dirboot::ldif::parse_ldif;

const ATTRIBUTE_TYPE: &str = "version: 1
dn: m-oid=2.5.4.3,ou=attributeTypes,cn=core,ou=schema
m-oid: 2.5.4.3
m-name: cn
m-name: commonName
m-description: RFC4519: common name(s) for which the entity is known
  by
m-supAttributeType: name
m-equality: caseIgnoreMatch
m-substr: caseIgnoreSubstringsMatch
objectclass: metaAttributeType
objectclass: metaTop
objectclass: top
creatorsname: uid=admin,ou=system
";

fn ldif_benchmark(c: &mut Criterion) {
    c.bench_function("parse attribute type", |b| {
        b.iter(|| parse_ldif(black_box(ATTRIBUTE_TYPE)))
    });
    c.bench_function("normalize attribute type", |b| {
        b.iter(|| normalize(black_box("m-oid=2.5.4.3.ldif"), black_box(ATTRIBUTE_TYPE)))
    });
}

fn resolve_benchmark(c: &mut Criterion) {
    let output_root = Path::new("/var/lib/ds/partitions");
    let source = Path::new(
        "/opt/bundles/apacheds-schema/schema/ou=schema/cn=core/ou=attributetypes/m-oid=2.5.4.3.ldif",
    );
    c.bench_function("resolve destination", |b| {
        b.iter(|| resolve_destination(black_box(output_root), black_box(source)))
    });
}

criterion_group!(benches, ldif_benchmark, resolve_benchmark);
criterion_main!(benches);
