//! Live, mutable values conforming to a [`Schema`].
//!
//! An [`Instance`] holds one value slot per declared field, in declaration
//! order. Construction is value mode (positional/mapping/named arguments with
//! defaults for omitted fields) or unpack mode (consume a byte buffer).
//! Access is by name, dotted path, integer index, or field slice; arrays add
//! append and element-level get/set.

use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use crate::codec::{self, CodecError};
use crate::path;
use crate::schema::{ArrayDef, FieldKind, Schema};
use crate::value::Value;

/// Constructor/update arguments: positional field values bound in declared
/// order, at most one mapping form, and named overrides. Named values take
/// precedence over a conflicting mapping entry; a conflict with a positional
/// binding is an error.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Value>,
    forms: Vec<Vec<(String, Value)>>,
    named: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Args::default()
    }

    /// Appends one positional field value.
    pub fn pos(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Supplies a mapping argument (binds by field name).
    pub fn mapping<K, V, I>(mut self, pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.forms
            .push(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Supplies one named (keyword) value.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }
}

impl From<Value> for Args {
    fn from(v: Value) -> Self {
        Args::new().pos(v)
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args {
            positional: values,
            ..Args::default()
        }
    }
}

impl From<Instance> for Args {
    fn from(inst: Instance) -> Self {
        Args::new().pos(Value::from(inst))
    }
}

impl From<Vec<(String, Value)>> for Args {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Args::new().mapping(pairs)
    }
}

impl From<Vec<(&str, Value)>> for Args {
    fn from(pairs: Vec<(&str, Value)>) -> Self {
        Args::new().mapping(pairs)
    }
}

/// A live value conforming to a schema: one slot per declared field.
#[derive(Debug, Clone)]
pub struct Instance {
    schema: Arc<Schema>,
    slots: Vec<Value>,
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.slots == other.slots
    }
}

impl Instance {
    /// All-unset slots; unpack mode fills every one of them.
    pub(crate) fn new_unset(schema: &Arc<Schema>) -> Instance {
        Instance {
            schema: Arc::clone(schema),
            slots: vec![Value::Unset; schema.len()],
        }
    }

    /// Value-mode construction: defaults applied, nested instances built
    /// recursively, arrays empty.
    pub(crate) fn new_default(schema: &Arc<Schema>) -> Result<Instance, CodecError> {
        if schema.is_abstract() {
            return Err(CodecError::NotImplemented(format!(
                "schema `{}` has un-overloaded placeholder fields",
                schema.name()
            )));
        }
        let mut slots = Vec::with_capacity(schema.len());
        for (_, field) in schema.fields() {
            let slot = if let Some(default) = &field.default {
                default.clone()
            } else {
                match &field.kind {
                    FieldKind::Struct(sub) => Value::Struct(Box::new(sub.instance()?)),
                    FieldKind::Array(_) => Value::Array(Vec::new()),
                    _ => Value::Unset,
                }
            };
            slots.push(slot);
        }
        Ok(Instance {
            schema: Arc::clone(schema),
            slots,
        })
    }

    pub(crate) fn from_args(schema: &Arc<Schema>, args: Args) -> Result<Instance, CodecError> {
        let mut inst = Instance::new_default(schema)?;
        if args.forms.len() > 1 || (!args.positional.is_empty() && !args.forms.is_empty()) {
            return Err(CodecError::Type(format!(
                "constructor expected at most 1 positional form, got {}",
                args.forms.len() + usize::from(!args.positional.is_empty())
            )));
        }
        if args.positional.len() > schema.len() {
            return Err(CodecError::Type(format!(
                "schema `{}` has {} fields, got {} positional values",
                schema.name(),
                schema.len(),
                args.positional.len()
            )));
        }
        let bound = args.positional.len();
        for (i, v) in args.positional.into_iter().enumerate() {
            inst.set_index(i, v)?;
        }
        for form in args.forms {
            for (name, v) in form {
                inst.reject_rebind(&name, bound)?;
                inst.set_field(&name, v)?;
            }
        }
        for (name, v) in args.named {
            inst.reject_rebind(&name, bound)?;
            inst.set_field(&name, v)?;
        }
        Ok(inst)
    }

    /// A mapping/named value for a field already bound positionally is the
    /// same error Python raises for duplicate keyword arguments.
    fn reject_rebind(&self, name: &str, positional_bound: usize) -> Result<(), CodecError> {
        match self.schema.index_of(name) {
            Some(i) if i < positional_bound => Err(CodecError::Type(format!(
                "got multiple values for field `{}`",
                name
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn unpack(schema: &Arc<Schema>, bytes: &[u8]) -> Result<Instance, CodecError> {
        let mut r = std::io::Cursor::new(bytes);
        let inst = codec::decode_instance(schema, &mut r)?;
        let remaining = bytes.len() - r.position() as usize;
        if remaining > 0 {
            return Err(CodecError::Trailing { remaining });
        }
        Ok(inst)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn slots(&self) -> &[Value] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut Vec<Value> {
        &mut self.slots
    }

    /// Declared field count.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Gets a field value by name or dotted path (`"northwest.y"`).
    pub fn get(&self, path: &str) -> Result<Value, CodecError> {
        path::get(self, path)
    }

    /// Sets a field value by name or dotted path.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), CodecError> {
        path::set(self, path, value.into())
    }

    pub(crate) fn get_local(&self, name: &str) -> Result<&Value, CodecError> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| CodecError::Key(name.to_string()))?;
        Ok(&self.slots[idx])
    }

    pub(crate) fn set_field(&mut self, name: &str, value: Value) -> Result<(), CodecError> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| CodecError::Key(name.to_string()))?;
        let (_, field) = self.schema.field_at(idx).ok_or(CodecError::Index {
            index: idx,
            len: self.slots.len(),
        })?;
        check_value(name, &field.kind, &value)?;
        self.slots[idx] = value;
        Ok(())
    }

    /// Mutable access to a nested composite field.
    pub fn nested_mut(&mut self, name: &str) -> Result<&mut Instance, CodecError> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| CodecError::Key(name.to_string()))?;
        self.slots[idx]
            .as_struct_mut()
            .ok_or_else(|| CodecError::Type(format!("field `{}` is not a composite", name)))
    }

    /// Gets the Nth declared field's value.
    pub fn get_index(&self, index: usize) -> Result<Value, CodecError> {
        self.slots
            .get(index)
            .cloned()
            .ok_or(CodecError::Index {
                index,
                len: self.slots.len(),
            })
    }

    /// Sets the Nth declared field's value.
    pub fn set_index(&mut self, index: usize, value: impl Into<Value>) -> Result<(), CodecError> {
        let (name, field) = self.schema.field_at(index).ok_or(CodecError::Index {
            index,
            len: self.slots.len(),
        })?;
        let value = value.into();
        check_value(name, &field.kind, &value)?;
        self.slots[index] = value;
        Ok(())
    }

    /// Field values over a range of declared fields, in order. Bounds clamp
    /// to the field count.
    pub fn get_slice(&self, range: impl RangeBounds<usize>) -> Vec<Value> {
        let (start, end) = self.normalize(range);
        self.slots[start..end].to_vec()
    }

    /// Replaces the addressed span of fields; the value count must equal the
    /// span length, and fields outside the span are untouched.
    pub fn set_slice(
        &mut self,
        range: impl RangeBounds<usize>,
        values: Vec<Value>,
    ) -> Result<(), CodecError> {
        let (start, end) = self.normalize(range);
        if values.len() != end - start {
            return Err(CodecError::Type(format!(
                "slice assignment expected {} values, got {}",
                end - start,
                values.len()
            )));
        }
        for (offset, value) in values.into_iter().enumerate() {
            self.set_index(start + offset, value)?;
        }
        Ok(())
    }

    fn normalize(&self, range: impl RangeBounds<usize>) -> (usize, usize) {
        normalize_over(range, self.slots.len())
    }

    /// `(name, value)` pairs in declared order, whatever the construction
    /// method was.
    pub fn items(&self) -> Vec<(&str, Value)> {
        self.schema
            .field_names()
            .zip(self.slots.iter().cloned())
            .collect()
    }

    /// Field values in declared order.
    pub fn values(&self) -> Vec<Value> {
        self.slots.clone()
    }

    /// Bulk update from at most one mapping form plus named overrides; named
    /// values win on conflict.
    pub fn update(&mut self, args: impl Into<Args>) -> Result<(), CodecError> {
        let args = args.into();
        let positional = args.positional.len() + args.forms.len();
        if positional > 1 {
            return Err(CodecError::Type(format!(
                "update expected at most 1 arguments, got {}",
                positional
            )));
        }
        if let Some(v) = args.positional.first() {
            return Err(CodecError::Type(format!(
                "update expected a mapping or a sequence of (name, value) pairs, got {:?}",
                v
            )));
        }
        for form in args.forms {
            for (name, v) in form {
                self.set_field(&name, v)?;
            }
        }
        for (name, v) in args.named {
            self.set_field(&name, v)?;
        }
        Ok(())
    }

    /// Serializes to bytes: store transforms applied, fields concatenated in
    /// declared order.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = match self.schema.size() {
            crate::schema::SizeSpec::Fixed(n) => Vec::with_capacity(n),
            crate::schema::SizeSpec::Variable => Vec::new(),
        };
        codec::encode_instance(self, &mut out)?;
        Ok(out)
    }

    /// Current byte size; per-instance when any array length is dynamic.
    pub fn size(&self) -> usize {
        match self.schema.size() {
            crate::schema::SizeSpec::Fixed(n) => n,
            crate::schema::SizeSpec::Variable => self.dynamic_size(),
        }
    }

    fn dynamic_size(&self) -> usize {
        self.schema
            .fields()
            .iter()
            .zip(self.slots.iter())
            .map(|((_, field), slot)| match &field.kind {
                FieldKind::Scalar(s) => s.width(),
                FieldKind::Struct(sub) => match slot.as_struct() {
                    Some(inst) => inst.size(),
                    None => match sub.size() {
                        crate::schema::SizeSpec::Fixed(n) => n,
                        crate::schema::SizeSpec::Variable => 0,
                    },
                },
                FieldKind::Array(def) => {
                    let count = slot.as_array().map(|a| a.len()).unwrap_or(0);
                    count * def.elem.fixed_size().unwrap_or(0)
                }
                FieldKind::Placeholder => 0,
            })
            .sum()
    }

    fn array_def(&self, field: &str) -> Result<(usize, &ArrayDef), CodecError> {
        let idx = self
            .schema
            .index_of(field)
            .ok_or_else(|| CodecError::Key(field.to_string()))?;
        match self.schema.field_at(idx).map(|(_, f)| &f.kind) {
            Some(FieldKind::Array(def)) => Ok((idx, def)),
            _ => Err(CodecError::Type(format!("field `{}` is not an array", field))),
        }
    }

    /// Appends one element to an array field. Accepts a ready element value
    /// (positional), or constructor arguments forwarded to the element
    /// schema for composite elements.
    pub fn append(&mut self, field: &str, args: impl Into<Args>) -> Result<(), CodecError> {
        let args = args.into();
        let (idx, def) = self.array_def(field)?;
        let elem = match &def.elem.kind {
            FieldKind::Struct(sub) => {
                let ready = args.forms.is_empty()
                    && args.named.is_empty()
                    && args.positional.len() == 1
                    && matches!(args.positional[0], Value::Struct(_));
                if ready {
                    let v = args.positional.into_iter().next().ok_or_else(|| {
                        CodecError::Type("missing element value".to_string())
                    })?;
                    check_value(field, &def.elem.kind, &v)?;
                    v
                } else {
                    Value::from(sub.build(args)?)
                }
            }
            kind => {
                if args.positional.len() != 1 || !args.forms.is_empty() || !args.named.is_empty() {
                    return Err(CodecError::Type(format!(
                        "array `{}` append expects exactly one element value",
                        field
                    )));
                }
                let v = args.positional.into_iter().next().ok_or_else(|| {
                    CodecError::Type("missing element value".to_string())
                })?;
                check_value(field, kind, &v)?;
                v
            }
        };
        match self.slots[idx].as_array_mut() {
            Some(elems) => {
                elems.push(elem);
                Ok(())
            }
            None => {
                self.slots[idx] = Value::Array(vec![elem]);
                Ok(())
            }
        }
    }

    /// Current element count of an array field.
    pub fn array_len(&self, field: &str) -> Result<usize, CodecError> {
        let (idx, _) = self.array_def(field)?;
        Ok(self.slots[idx].as_array().map(|a| a.len()).unwrap_or(0))
    }

    /// Bounds-checked element access.
    pub fn elem(&self, field: &str, index: usize) -> Result<Value, CodecError> {
        let (idx, _) = self.array_def(field)?;
        let elems = self.slots[idx].as_array().unwrap_or(&[]);
        elems.get(index).cloned().ok_or(CodecError::Index {
            index,
            len: elems.len(),
        })
    }

    /// Bounds-checked element replacement.
    pub fn set_elem(
        &mut self,
        field: &str,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), CodecError> {
        let value = value.into();
        let (idx, def) = self.array_def(field)?;
        check_value(field, &def.elem.kind, &value)?;
        let elems = self.slots[idx]
            .as_array_mut()
            .ok_or_else(|| CodecError::Type(format!("field `{}` holds no array value", field)))?;
        let len = elems.len();
        match elems.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CodecError::Index { index, len }),
        }
    }

    /// Mutable access to a composite array element, for in-place field
    /// mutation.
    pub fn elem_struct_mut(
        &mut self,
        field: &str,
        index: usize,
    ) -> Result<&mut Instance, CodecError> {
        let (idx, _) = self.array_def(field)?;
        let elems = self.slots[idx]
            .as_array_mut()
            .ok_or_else(|| CodecError::Type(format!("field `{}` holds no array value", field)))?;
        let len = elems.len();
        match elems.get_mut(index) {
            Some(Value::Struct(inst)) => Ok(inst),
            Some(_) => Err(CodecError::Type(format!(
                "array `{}` elements are not composites",
                field
            ))),
            None => Err(CodecError::Index { index, len }),
        }
    }

    /// Element values over a range; bounds clamp to the element count.
    pub fn elem_slice(
        &self,
        field: &str,
        range: impl RangeBounds<usize>,
    ) -> Result<Vec<Value>, CodecError> {
        let (idx, _) = self.array_def(field)?;
        let elems = self.slots[idx].as_array().unwrap_or(&[]);
        let (start, end) = normalize_over(range, elems.len());
        Ok(elems[start..end].to_vec())
    }

    /// Replaces the addressed element span. The array grows or shrinks when
    /// the replacement length differs from the span.
    pub fn set_elem_slice(
        &mut self,
        field: &str,
        range: impl RangeBounds<usize>,
        values: Vec<Value>,
    ) -> Result<(), CodecError> {
        let (idx, def) = self.array_def(field)?;
        for v in &values {
            check_value(field, &def.elem.kind, v)?;
        }
        let elems = self.slots[idx]
            .as_array_mut()
            .ok_or_else(|| CodecError::Type(format!("field `{}` holds no array value", field)))?;
        let (start, end) = normalize_over(range, elems.len());
        elems.splice(start..end, values);
        Ok(())
    }
}

fn normalize_over(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s + 1,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e + 1,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    (start.min(end), end)
}

/// Assignment-time shape check: scalars take scalar values, composites take
/// instances of the identical schema, arrays take element-checked sequences.
/// Numeric range fitting is the codec's job at encode time.
fn check_value(name: &str, kind: &FieldKind, value: &Value) -> Result<(), CodecError> {
    if value.is_unset() {
        return Ok(());
    }
    match kind {
        FieldKind::Scalar(s) => match value {
            Value::Struct(_) | Value::Array(_) => Err(CodecError::Type(format!(
                "field `{}` expects a {} scalar, got {:?}",
                name,
                s.name(),
                value
            ))),
            _ => Ok(()),
        },
        FieldKind::Struct(expected) => match value {
            Value::Struct(inst) if Arc::ptr_eq(inst.schema(), expected) => Ok(()),
            Value::Struct(inst) => Err(CodecError::Type(format!(
                "field `{}` expects a `{}` instance, got `{}`",
                name,
                expected.name(),
                inst.schema().name()
            ))),
            other => Err(CodecError::Type(format!(
                "field `{}` expects a `{}` instance, got {:?}",
                name,
                expected.name(),
                other
            ))),
        },
        FieldKind::Array(def) => match value {
            Value::Array(elems) => {
                for v in elems {
                    check_value(name, &def.elem.kind, v)?;
                }
                Ok(())
            }
            other => Err(CodecError::Type(format!(
                "field `{}` expects an array, got {:?}",
                name, other
            ))),
        },
        FieldKind::Placeholder => Err(CodecError::NotImplemented(format!(
            "field `{}` is an un-overloaded placeholder",
            name
        ))),
    }
}
