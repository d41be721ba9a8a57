//! Schema definition text: syntax (parse success/failure) and semantics
//! (resolution, derivation, layout), plus end-to-end unpack.

use bytestruct::{parse, CodecError, SchemaError, SizeSpec, Value};
use std::io::Write;

// ==================== Syntax: valid programs ====================

#[test]
fn parse_empty_source() {
    let set = parse("").expect("empty source can parse");
    assert!(set.is_empty());
}

#[test]
fn parse_minimal_struct() {
    let src = r#"
struct Point {
  x: f64;
  y: f64;
}
"#;
    let set = parse(src).expect("parse");
    assert_eq!(set.len(), 1);
    let p = set.get("Point").expect("Point");
    assert_eq!(p.name(), "Point");
    assert_eq!(p.len(), 2);
    assert_eq!(p.size(), SizeSpec::Fixed(16));
}

#[test]
fn parse_all_scalar_types() {
    let src = r#"
struct AllScalars {
  a: u8;
  b: i8;
  c: u16;
  d: i16;
  e: u32;
  f: i32;
  g: u64;
  h: i64;
  i: f64;
  j: char;
}
"#;
    let set = parse(src).expect("parse");
    let s = set.get("AllScalars").expect("AllScalars");
    assert_eq!(s.len(), 10);
    assert_eq!(s.size(), SizeSpec::Fixed(1 + 1 + 2 + 2 + 4 + 4 + 8 + 8 + 8 + 1));
}

#[test]
fn parse_with_comments() {
    let src = r#"
struct WithComments {
  // line comment
  id: u8;
  len: u16; /* block */
  data: u8[len];
}
"#;
    let set = parse(src).expect("parse");
    assert_eq!(set.get("WithComments").expect("s").len(), 3);
}

#[test]
fn parse_nested_struct_reference() {
    let src = r#"
struct Point {
  x: f64;
  y: f64;
}
struct BoundingBox {
  northwest: Point;
  southeast: Point;
}
"#;
    let set = parse(src).expect("parse");
    let bb = set.get("BoundingBox").expect("BoundingBox");
    assert_eq!(bb.size(), SizeSpec::Fixed(32));
    assert_eq!(bb.offset_of("southeast"), Some(16));
}

#[test]
fn parse_array_lengths() {
    let src = r#"
struct Mixed {
  count: u32;
  fixed: f64[4];
  counted: f64[count];
  rest: char[];
}
"#;
    let set = parse(src).expect("parse");
    let m = set.get("Mixed").expect("Mixed");
    assert_eq!(m.size(), SizeSpec::Variable);
    assert_eq!(m.offset_of("fixed"), Some(4));
    assert_eq!(m.offset_of("counted"), Some(36));
    assert_eq!(m.offset_of("rest"), None);
}

#[test]
fn parse_defaults() {
    let src = r#"
struct Datagram {
  stx: u8 = 0x02;
  kind: i16 = -1;
  scale: f64 = 0.5;
  sep: char = ',';
  body: u8[];
}
"#;
    let set = parse(src).expect("parse");
    let d = set.get("Datagram").expect("Datagram");
    let inst = d.instance().expect("instance");
    assert_eq!(inst.get("stx").unwrap(), Value::U64(2));
    assert_eq!(inst.get("kind").unwrap(), Value::I64(-1));
    assert_eq!(inst.get("scale").unwrap(), Value::F64(0.5));
    assert_eq!(inst.get("sep").unwrap(), Value::Char(b','));
}

#[test]
fn parse_declaration_order_preserved() {
    let src = r#"
struct Ordered {
  c: u8;
  a: u8;
  b: u8;
}
"#;
    let set = parse(src).expect("parse");
    let names: Vec<_> = set.get("Ordered").expect("s").field_names().collect();
    assert_eq!(names, ["c", "a", "b"]);
}

// ==================== Syntax: invalid programs ====================

#[test]
fn parse_error_on_missing_semicolon() {
    let src = "struct P { x: u8 }";
    assert!(matches!(parse(src), Err(SchemaError::Parse(_))));
}

#[test]
fn parse_error_on_garbage() {
    assert!(matches!(parse("not a schema"), Err(SchemaError::Parse(_))));
}

#[test]
fn parse_error_on_default_for_struct_field() {
    let src = r#"
struct Point {
  x: f64;
}
struct Holder {
  p: Point = 3;
}
"#;
    assert!(matches!(parse(src), Err(SchemaError::Parse(_))));
}

// ==================== Semantics: resolution ====================

#[test]
fn unknown_struct_reference() {
    let src = "struct Holder { p: Missing; }";
    match parse(src) {
        Err(SchemaError::UnknownStruct(name)) => assert_eq!(name, "Missing"),
        other => panic!("expected UnknownStruct, got {:?}", other),
    }
}

#[test]
fn struct_must_be_declared_before_use() {
    let src = r#"
struct Holder {
  p: Point;
}
struct Point {
  x: f64;
}
"#;
    assert!(matches!(parse(src), Err(SchemaError::UnknownStruct(_))));
}

#[test]
fn duplicate_struct_name() {
    let src = r#"
struct P { x: u8; }
struct P { y: u8; }
"#;
    assert!(matches!(parse(src), Err(SchemaError::DuplicateStruct(_))));
}

#[test]
fn duplicate_field_name() {
    let src = "struct P { x: u8; x: u8; }";
    assert!(matches!(parse(src), Err(SchemaError::DuplicateField { .. })));
}

#[test]
fn count_field_must_precede_array() {
    let src = r#"
struct Bad {
  data: u8[count];
  count: u32;
}
"#;
    assert!(matches!(
        parse(src),
        Err(SchemaError::ForwardCountField { .. })
    ));
}

#[test]
fn count_field_must_be_unsigned() {
    let src = r#"
struct Bad {
  count: i32;
  data: u8[count];
}
"#;
    assert!(matches!(parse(src), Err(SchemaError::BadCountField { .. })));
}

#[test]
fn unknown_count_field() {
    let src = "struct Bad { data: u8[nothing]; }";
    assert!(matches!(
        parse(src),
        Err(SchemaError::UnknownCountField { .. })
    ));
}

// ==================== Semantics: derivation ====================

#[test]
fn derived_struct_overloads_placeholder() {
    let src = r#"
struct Point3D {
  x: f64;
  y: f64;
  z: f64;
}
struct GenericBox {
  northwest: none;
  southeast: none;
}
struct Box3D : GenericBox {
  northwest: Point3D;
  southeast: Point3D;
}
"#;
    let set = parse(src).expect("parse");
    let generic = set.get("GenericBox").expect("GenericBox");
    assert!(generic.is_abstract());
    assert!(matches!(
        generic.instance(),
        Err(CodecError::NotImplemented(_))
    ));
    let concrete = set.get("Box3D").expect("Box3D");
    assert!(!concrete.is_abstract());
    assert_eq!(concrete.size(), SizeSpec::Fixed(48));
    let names: Vec<_> = concrete.field_names().collect();
    assert_eq!(names, ["northwest", "southeast"]);
}

#[test]
fn derived_struct_with_new_field_fails() {
    let src = r#"
struct Generic {
  body: none;
}
struct Extended : Generic {
  extra: u8;
}
"#;
    assert!(matches!(
        parse(src),
        Err(SchemaError::NewFieldInDerived { .. })
    ));
}

#[test]
fn derived_struct_with_incompatible_overload_fails() {
    let src = r#"
struct Base {
  tag: u8;
}
struct Derived : Base {
  tag: u32;
}
"#;
    assert!(matches!(
        parse(src),
        Err(SchemaError::IncompatibleOverload { .. })
    ));
}

#[test]
fn unknown_base_struct() {
    let src = "struct Derived : Missing { x: u8; }";
    assert!(matches!(parse(src), Err(SchemaError::UnknownStruct(_))));
}

// ==================== End to end ====================

#[test]
fn parsed_schema_unpacks_counted_array() {
    let src = r#"
struct Point {
  x: f64;
  y: f64;
}
struct Path {
  point_count: u32;
  points: Point[point_count];
}
"#;
    let set = parse(src).expect("parse");
    let path = set.get("Path").expect("Path");
    let mut bytes = 2u32.to_le_bytes().to_vec();
    for v in [0.0f64, 10.0, 10.0, 20.0] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let p = path.unpack(&bytes).expect("unpack");
    assert_eq!(p.array_len("points").unwrap(), 2);
    assert_eq!(p.get("point_count").unwrap(), Value::U32(2));
    assert_eq!(p.pack().expect("pack"), bytes);
}

#[test]
fn schema_loaded_from_file() {
    let src = r#"
struct Record {
  id: u32;
  flag: u8 = 1;
}
"#;
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(src.as_bytes()).expect("write");
    let loaded = std::fs::read_to_string(file.path()).expect("read back");
    let set = parse(&loaded).expect("parse");
    let record = set.get("Record").expect("Record");
    assert_eq!(record.size(), SizeSpec::Fixed(5));
}
