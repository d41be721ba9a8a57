//! Encode/decode instances to/from little-endian bytes.
//!
//! The wire format is the concatenation of each field's fixed-width encoding
//! in declared order, with no padding or alignment. Array lengths come from
//! the length specification: a fixed count, a sibling count field decoded
//! earlier in the walk, a length closure over the in-progress instance, or
//! the remainder of the buffer.

use crate::instance::Instance;
use crate::schema::{Field, FieldKind, Len, Scalar, Schema};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::sync::Arc;

/// Runtime codec/access error. Composition-time problems are
/// [`crate::schema::SchemaError`] instead and never reach this enum.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("type error: {0}")]
    Type(String),
    #[error("index {index} out of range for length {len}")]
    Index { index: usize, len: usize },
    #[error("unknown field: {0}")]
    Key(String),
    #[error("range error: {0}")]
    Range(String),
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("{remaining} trailing bytes after unpack")]
    Trailing { remaining: usize },
}

/// Integer view of a scalar value, wide enough for every primitive.
fn int_of(v: &Value) -> Option<i128> {
    match v {
        Value::U8(x) => Some(*x as i128),
        Value::I8(x) => Some(*x as i128),
        Value::U16(x) => Some(*x as i128),
        Value::I16(x) => Some(*x as i128),
        Value::U32(x) => Some(*x as i128),
        Value::I32(x) => Some(*x as i128),
        Value::U64(x) => Some(*x as i128),
        Value::I64(x) => Some(*x as i128),
        _ => None,
    }
}

fn int_in_range(kind: Scalar, v: &Value, min: i128, max: i128) -> Result<i128, CodecError> {
    let n = int_of(v).ok_or_else(|| {
        CodecError::Type(format!("expected {} value, got {:?}", kind.name(), v))
    })?;
    if n < min || n > max {
        return Err(CodecError::Range(format!(
            "value {} out of range for {}",
            n,
            kind.name()
        )));
    }
    Ok(n)
}

impl Scalar {
    /// Reads one value of this kind from the cursor. Consumes exactly
    /// [`Scalar::width`] bytes.
    pub(crate) fn read(self, r: &mut Cursor<&[u8]>) -> Result<Value, CodecError> {
        Ok(match self {
            Scalar::U8 => Value::U8(r.read_u8()?),
            Scalar::I8 => Value::I8(r.read_i8()?),
            Scalar::U16 => Value::U16(r.read_u16::<LittleEndian>()?),
            Scalar::I16 => Value::I16(r.read_i16::<LittleEndian>()?),
            Scalar::U32 => Value::U32(r.read_u32::<LittleEndian>()?),
            Scalar::I32 => Value::I32(r.read_i32::<LittleEndian>()?),
            Scalar::U64 => Value::U64(r.read_u64::<LittleEndian>()?),
            Scalar::I64 => Value::I64(r.read_i64::<LittleEndian>()?),
            Scalar::F64 => Value::F64(r.read_f64::<LittleEndian>()?),
            Scalar::Char => Value::Char(r.read_u8()?),
        })
    }

    /// Writes one value of this kind. Accepts any integer-family value that
    /// fits the primitive's range; out-of-range values fail with
    /// [`CodecError::Range`].
    pub(crate) fn write(self, w: &mut Vec<u8>, v: &Value) -> Result<(), CodecError> {
        match self {
            Scalar::U8 => {
                let n = int_in_range(self, v, 0, u8::MAX as i128)?;
                w.write_u8(n as u8)?;
            }
            Scalar::I8 => {
                let n = int_in_range(self, v, i8::MIN as i128, i8::MAX as i128)?;
                w.write_i8(n as i8)?;
            }
            Scalar::U16 => {
                let n = int_in_range(self, v, 0, u16::MAX as i128)?;
                w.write_u16::<LittleEndian>(n as u16)?;
            }
            Scalar::I16 => {
                let n = int_in_range(self, v, i16::MIN as i128, i16::MAX as i128)?;
                w.write_i16::<LittleEndian>(n as i16)?;
            }
            Scalar::U32 => {
                let n = int_in_range(self, v, 0, u32::MAX as i128)?;
                w.write_u32::<LittleEndian>(n as u32)?;
            }
            Scalar::I32 => {
                let n = int_in_range(self, v, i32::MIN as i128, i32::MAX as i128)?;
                w.write_i32::<LittleEndian>(n as i32)?;
            }
            Scalar::U64 => {
                let n = int_in_range(self, v, 0, u64::MAX as i128)?;
                w.write_u64::<LittleEndian>(n as u64)?;
            }
            Scalar::I64 => {
                let n = int_in_range(self, v, i64::MIN as i128, i64::MAX as i128)?;
                w.write_i64::<LittleEndian>(n as i64)?;
            }
            Scalar::F64 => {
                let x = match v {
                    Value::F64(x) => *x,
                    other => int_of(other).ok_or_else(|| {
                        CodecError::Type(format!("expected f64 value, got {:?}", other))
                    })? as f64,
                };
                w.write_f64::<LittleEndian>(x)?;
            }
            Scalar::Char => {
                let n = match v {
                    Value::Char(c) => *c as i128,
                    other => int_in_range(self, other, 0, u8::MAX as i128)?,
                };
                w.write_u8(n as u8)?;
            }
        }
        Ok(())
    }
}

/// Encodes a whole instance in declared field order.
///
/// A scalar field that some later array references as its count encodes the
/// actual element count when its slot is unset; a set count that disagrees
/// with the actual length fails with [`CodecError::Consistency`].
pub(crate) fn encode_instance(inst: &Instance, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let schema = inst.schema();
    for (i, (name, field)) in schema.fields().iter().enumerate() {
        let slot = &inst.slots()[i];
        if let FieldKind::Scalar(kind) = &field.kind {
            if let Some(arrays) = schema.counted_arrays(name) {
                let count = required_count(inst, arrays, name)?;
                if slot.is_unset() {
                    kind.write(out, &Value::U64(count as u64))?;
                } else {
                    let wire = field.resolve_store(slot)?;
                    let have = int_of(&wire).ok_or_else(|| {
                        CodecError::Type(format!(
                            "count field `{}` has no integer value",
                            name
                        ))
                    })?;
                    if have != count as i128 {
                        return Err(CodecError::Consistency(format!(
                            "count field `{}` is {} but the array has {} elements",
                            name, have, count
                        )));
                    }
                    kind.write(out, &wire)?;
                }
                continue;
            }
        }
        encode_node(name, field, slot, out)?;
    }
    Ok(())
}

/// Element count every array referencing `count_name` currently holds.
fn required_count(
    inst: &Instance,
    arrays: &[usize],
    count_name: &str,
) -> Result<usize, CodecError> {
    let mut required = None;
    for &i in arrays {
        let n = inst.slots()[i].as_array().map(|a| a.len()).unwrap_or(0);
        match required {
            Some(r) if r != n => {
                return Err(CodecError::Consistency(format!(
                    "arrays counted by `{}` have different lengths",
                    count_name
                )))
            }
            _ => required = Some(n),
        }
    }
    Ok(required.unwrap_or(0))
}

fn encode_node(
    name: &str,
    field: &Field,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    match &field.kind {
        FieldKind::Scalar(kind) => {
            if value.is_unset() {
                return Err(CodecError::Type(format!("field `{}` is unset", name)));
            }
            let wire = field.resolve_store(value)?;
            kind.write(out, &wire)
        }
        FieldKind::Struct(schema) => match value {
            Value::Struct(sub) => encode_instance(sub, out),
            Value::Unset => Err(CodecError::Type(format!("field `{}` is unset", name))),
            other => Err(CodecError::Type(format!(
                "field `{}` expects a `{}` instance, got {:?}",
                name,
                schema.name(),
                other
            ))),
        },
        FieldKind::Array(def) => {
            let elems = value.as_array().ok_or_else(|| {
                CodecError::Type(format!("field `{}` expects an array", name))
            })?;
            if let Len::Fixed(n) = def.len {
                if elems.len() != n {
                    return Err(CodecError::Consistency(format!(
                        "array `{}` has {} elements, fixed length is {}",
                        name,
                        elems.len(),
                        n
                    )));
                }
            }
            for v in elems {
                encode_node(name, &def.elem, v, out)?;
            }
            Ok(())
        }
        FieldKind::Placeholder => Err(CodecError::NotImplemented(format!(
            "field `{}` is an un-overloaded placeholder",
            name
        ))),
    }
}

/// Decodes one instance, walking fields left to right. Arrays resolve their
/// length against the slots decoded so far.
pub(crate) fn decode_instance(
    schema: &Arc<Schema>,
    r: &mut Cursor<&[u8]>,
) -> Result<Instance, CodecError> {
    if schema.is_abstract() {
        return Err(CodecError::NotImplemented(format!(
            "schema `{}` has un-overloaded placeholder fields",
            schema.name()
        )));
    }
    let mut inst = Instance::new_unset(schema);
    for (i, (name, field)) in schema.fields().iter().enumerate() {
        let v = decode_node(name, field, r, &inst)?;
        inst.slots_mut()[i] = v;
    }
    Ok(inst)
}

fn decode_node(
    name: &str,
    field: &Field,
    r: &mut Cursor<&[u8]>,
    inst: &Instance,
) -> Result<Value, CodecError> {
    match &field.kind {
        FieldKind::Scalar(kind) => {
            let raw = kind.read(r)?;
            field.resolve_load(&raw)
        }
        FieldKind::Struct(schema) => {
            let sub = decode_instance(schema, r)?;
            Ok(Value::Struct(Box::new(sub)))
        }
        FieldKind::Array(def) => {
            let count = match &def.len {
                Len::Fixed(n) => *n,
                Len::Ref(count_field) => {
                    let owner = inst.schema();
                    let idx = owner
                        .index_of(count_field)
                        .ok_or_else(|| CodecError::Key(count_field.clone()))?;
                    inst.slots()[idx].as_u64().ok_or_else(|| {
                        CodecError::Type(format!(
                            "count field `{}` has no integer value",
                            count_field
                        ))
                    })? as usize
                }
                Len::Func(f) => f(inst),
                Len::Remainder => {
                    let elem_size = def.elem.fixed_size().ok_or_else(|| {
                        CodecError::Type(format!("array `{}`: element has no fixed size", name))
                    })?;
                    if elem_size == 0 {
                        return Err(CodecError::Type(format!(
                            "array `{}`: zero-size element cannot be greedy",
                            name
                        )));
                    }
                    let remaining = r.get_ref().len() - r.position() as usize;
                    remaining / elem_size
                }
            };
            // Counts come from the wire; cap the preallocation.
            let mut elems = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                elems.push(decode_node(name, &def.elem, r, inst)?);
            }
            Ok(Value::Array(elems))
        }
        FieldKind::Placeholder => Err(CodecError::NotImplemented(format!(
            "field `{}` is an un-overloaded placeholder",
            name
        ))),
    }
}
