//! Array fields: append, element access, counted/fixed/greedy lengths, and
//! pack-time count consistency.

use bytestruct::{Args, CodecError, Field, Len, Scalar, Schema, SizeSpec, Value};
use std::sync::Arc;

fn point() -> Arc<Schema> {
    Schema::builder("Point")
        .field("x", Field::scalar(Scalar::F64))
        .field("y", Field::scalar(Scalar::F64))
        .build()
        .expect("compose Point")
}

fn path_schema(point: &Arc<Schema>) -> Arc<Schema> {
    Schema::builder("Path")
        .field("point_count", Field::scalar(Scalar::U32))
        .field(
            "points",
            Field::array(
                Field::nested(Arc::clone(point)),
                Len::Ref("point_count".to_string()),
            ),
        )
        .build()
        .expect("compose Path")
}

fn double_list() -> Arc<Schema> {
    Schema::builder("DoubleList")
        .field("count", Field::scalar(Scalar::U32).with_default(6u32))
        .field(
            "doubles",
            Field::array(Field::scalar(Scalar::F64), Len::Fixed(6)),
        )
        .build()
        .expect("compose DoubleList")
}

fn le_f64(vals: &[f64]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_le_bytes()).collect()
}

// ==================== Append ====================

#[test]
fn append_simple_values() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    d.append("doubles", Value::F64(3.0)).expect("append");
    d.append("doubles", Value::F64(4.0)).expect("append");
    assert_eq!(d.elem("doubles", 1).unwrap(), Value::F64(4.0));
}

#[test]
fn append_constructs_composite_elements() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    p.append("points", Args::new().pos(0.0).pos(10.0))
        .expect("append");
    let first = p.elem("points", 0).unwrap();
    assert_eq!(
        first.as_struct().unwrap().items(),
        vec![("x", Value::F64(0.0)), ("y", Value::F64(10.0))]
    );
}

#[test]
fn append_ready_instance() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    let elem = pt.build(Args::new().pos(1.0).pos(2.0)).expect("elem");
    p.append("points", Value::from(elem)).expect("append");
    assert_eq!(p.array_len("points").unwrap(), 1);
}

#[test]
fn append_wrong_schema_is_a_type_error() {
    let pt = point();
    let schema = path_schema(&pt);
    let other = Schema::builder("Pair")
        .field("a", Field::scalar(Scalar::F64))
        .field("b", Field::scalar(Scalar::F64))
        .build()
        .expect("compose Pair");
    let mut p = schema.instance().expect("instance");
    let wrong = other.instance().expect("instance");
    let r = p.append("points", Value::from(wrong));
    assert!(matches!(r, Err(CodecError::Type(_))));
}

#[test]
fn append_to_non_array_is_a_type_error() {
    let pt = point();
    let mut p = pt.instance().expect("instance");
    let r = p.append("x", Value::F64(1.0));
    assert!(matches!(r, Err(CodecError::Type(_))));
}

// ==================== Pack: count consistency ====================

#[test]
fn pack_auto_populates_unset_count() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    p.append("points", Args::new().pos(0.0).pos(10.0))
        .expect("append");
    let mut expected = 1u32.to_le_bytes().to_vec();
    expected.extend(le_f64(&[0.0, 10.0]));
    assert_eq!(p.pack().expect("pack"), expected);
}

#[test]
fn pack_with_agreeing_count() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    p.append("points", Args::new().pos(0.0).pos(10.0))
        .expect("append");
    p.set("point_count", 1u32).expect("set count");
    let mut expected = 1u32.to_le_bytes().to_vec();
    expected.extend(le_f64(&[0.0, 10.0]));
    assert_eq!(p.pack().expect("pack"), expected);
}

#[test]
fn pack_with_disagreeing_count_is_a_consistency_error() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    p.append("points", Args::new().pos(0.0).pos(10.0))
        .expect("append");
    p.set("point_count", 3u32).expect("set count");
    assert!(matches!(p.pack(), Err(CodecError::Consistency(_))));
}

#[test]
fn pack_fixed_array_length_mismatch_is_a_consistency_error() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    d.append("doubles", Value::F64(3.0)).expect("append");
    d.append("doubles", Value::F64(4.0)).expect("append");
    assert!(matches!(d.pack(), Err(CodecError::Consistency(_))));
}

#[test]
fn pack_fixed_array_full() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    for i in 0..6 {
        d.append("doubles", Value::F64(i as f64)).expect("append");
    }
    let packed = d.pack().expect("pack");
    assert_eq!(packed.len(), 4 + 6 * 8);
    assert_eq!(&packed[..4], &6u32.to_le_bytes());
}

// ==================== Unpack ====================

#[test]
fn unpack_counted_array() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut bytes = 2u32.to_le_bytes().to_vec();
    bytes.extend(le_f64(&[0.0, 10.0, 10.0, 20.0]));
    let p = schema.unpack(&bytes).expect("unpack");
    assert_eq!(p.get("point_count").unwrap(), Value::U32(2));
    assert_eq!(p.array_len("points").unwrap(), 2);
    assert_eq!(
        p.elem("points", 0).unwrap().as_struct().unwrap().items(),
        vec![("x", Value::F64(0.0)), ("y", Value::F64(10.0))]
    );
    assert_eq!(
        p.elem("points", 1).unwrap().as_struct().unwrap().items(),
        vec![("x", Value::F64(10.0)), ("y", Value::F64(20.0))]
    );
}

#[test]
fn unpack_greedy_char_array() {
    let schema = Schema::builder("GenericString")
        .field(
            "text",
            Field::array(Field::scalar(Scalar::Char), Len::Remainder),
        )
        .build()
        .expect("compose");
    let s = b"Hello World";
    let o = schema.unpack(s).expect("unpack");
    let expected: Vec<Value> = s.iter().map(|&b| Value::Char(b)).collect();
    assert_eq!(o.elem_slice("text", ..).unwrap(), expected);
    assert_eq!(o.pack().expect("pack"), s.to_vec());
}

#[test]
fn unpack_length_function() {
    let schema = Schema::builder("Grid")
        .field("rows", Field::scalar(Scalar::U8))
        .field("cols", Field::scalar(Scalar::U8))
        .field(
            "cells",
            Field::array(
                Field::scalar(Scalar::F64),
                Len::func(|inst| {
                    let rows = inst.get("rows").ok().and_then(|v| v.as_u64()).unwrap_or(0);
                    let cols = inst.get("cols").ok().and_then(|v| v.as_u64()).unwrap_or(0);
                    (rows * cols) as usize
                }),
            ),
        )
        .build()
        .expect("compose Grid");
    let mut bytes = vec![2u8, 3u8];
    bytes.extend(le_f64(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
    let g = schema.unpack(&bytes).expect("unpack");
    assert_eq!(g.array_len("cells").unwrap(), 6);
    assert_eq!(g.elem("cells", 5).unwrap(), Value::F64(5.0));
}

#[test]
fn counted_round_trip() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut bytes = 3u32.to_le_bytes().to_vec();
    bytes.extend(le_f64(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
    let p = schema.unpack(&bytes).expect("unpack");
    assert_eq!(p.pack().expect("pack"), bytes);
}

// ==================== Element access and mutation ====================

#[test]
fn assign_composite_element_field() {
    let pt = point();
    let schema = path_schema(&pt);
    let mut p = schema.instance().expect("instance");
    for i in 0..4 {
        p.append("points", Args::new().pos(i as f64 * 10.0).pos(i as f64 * 10.0))
            .expect("append");
    }
    p.elem_struct_mut("points", 0)
        .expect("elem")
        .set("x", 3.14159)
        .expect("set");
    assert_eq!(
        p.elem("points", 0).unwrap().as_struct().unwrap().get("x").unwrap(),
        Value::F64(3.14159)
    );
}

#[test]
fn assign_scalar_element_by_index() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    d.append("doubles", Value::F64(4.0)).expect("append");
    d.append("doubles", Value::F64(4.0)).expect("append");
    d.set_elem("doubles", 0, 3.14).expect("set");
    assert_eq!(d.elem("doubles", 0).unwrap(), Value::F64(3.14));
}

#[test]
fn element_index_out_of_range() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    d.append("doubles", Value::F64(1.0)).expect("append");
    assert!(matches!(
        d.elem("doubles", 1),
        Err(CodecError::Index { index: 1, len: 1 })
    ));
    assert!(matches!(
        d.set_elem("doubles", 5, 0.0),
        Err(CodecError::Index { index: 5, len: 1 })
    ));
}

#[test]
fn element_slice_assignment_replaces_span() {
    let schema = double_list();
    let mut d = schema.instance().expect("instance");
    for i in 0..4 {
        d.append("doubles", Value::F64(i as f64)).expect("append");
    }
    // Same-length replacement touches only the addressed span.
    d.set_elem_slice("doubles", 1..3, vec![Value::F64(9.0), Value::F64(8.0)])
        .expect("replace");
    assert_eq!(
        d.elem_slice("doubles", ..).unwrap(),
        vec![
            Value::F64(0.0),
            Value::F64(9.0),
            Value::F64(8.0),
            Value::F64(3.0)
        ]
    );
    // Longer replacement grows the array.
    d.set_elem_slice(
        "doubles",
        1..2,
        vec![Value::F64(7.0), Value::F64(6.0), Value::F64(5.0)],
    )
    .expect("grow");
    assert_eq!(d.array_len("doubles").unwrap(), 6);
    // Shorter replacement shrinks it.
    d.set_elem_slice("doubles", ..4, vec![Value::F64(1.0)])
        .expect("shrink");
    assert_eq!(d.array_len("doubles").unwrap(), 3);
    assert_eq!(d.elem("doubles", 0).unwrap(), Value::F64(1.0));
}

// ==================== Sizing ====================

#[test]
fn per_instance_size_with_dynamic_array() {
    let pt = point();
    let schema = path_schema(&pt);
    assert_eq!(schema.size(), SizeSpec::Variable);
    let mut p = schema.instance().expect("instance");
    assert_eq!(p.size(), 4);
    p.append("points", Args::new().pos(0.0).pos(1.0)).expect("append");
    p.append("points", Args::new().pos(2.0).pos(3.0)).expect("append");
    assert_eq!(p.size(), 4 + 2 * 16);
}
