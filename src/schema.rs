//! Schema composition: named field nodes (scalars, nested schemas, arrays,
//! placeholders), derived-schema overloading, and eager layout derivation.
//!
//! A [`Schema`] is built once with [`SchemaBuilder`], validated at `build()`
//! time, and shared as `Arc<Schema>` for the lifetime of the process. All
//! byte-size and offset bookkeeping happens here, never on the pack/unpack
//! hot path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::CodecError;
use crate::instance::{Args, Instance};
use crate::value::Value;

/// Store/load hook: converts between the user-facing value and the primitive
/// the codec encodes. Store and load are expected to be mutual inverses.
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, CodecError> + Send + Sync>;

/// Length hook for arrays: called with the in-progress instance during decode.
pub type LenFn = Arc<dyn Fn(&Instance) -> usize + Send + Sync>;

/// Fixed-width scalar primitives. Encoding is little-endian everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F64,
    Char,
}

impl Scalar {
    /// Wire width in bytes. Constant per kind, known at composition time.
    pub fn width(self) -> usize {
        match self {
            Scalar::U8 | Scalar::I8 | Scalar::Char => 1,
            Scalar::U16 | Scalar::I16 => 2,
            Scalar::U32 | Scalar::I32 => 4,
            Scalar::U64 | Scalar::I64 | Scalar::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scalar::U8 => "u8",
            Scalar::I8 => "i8",
            Scalar::U16 => "u16",
            Scalar::I16 => "i16",
            Scalar::U32 => "u32",
            Scalar::I32 => "i32",
            Scalar::U64 => "u64",
            Scalar::I64 => "i64",
            Scalar::F64 => "f64",
            Scalar::Char => "char",
        }
    }

    pub(crate) fn is_unsigned_int(self) -> bool {
        matches!(self, Scalar::U8 | Scalar::U16 | Scalar::U32 | Scalar::U64)
    }
}

/// Array length specification.
#[derive(Clone)]
pub enum Len {
    /// Fixed element count, known at composition time.
    Fixed(usize),
    /// Count read from a sibling field declared before the array.
    Ref(String),
    /// Count computed from the in-progress instance at decode time.
    Func(LenFn),
    /// Greedy: consume the rest of the buffer on unpack.
    Remainder,
}

impl Len {
    pub fn func(f: impl Fn(&Instance) -> usize + Send + Sync + 'static) -> Self {
        Len::Func(Arc::new(f))
    }
}

impl fmt::Debug for Len {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Len::Fixed(n) => write!(f, "Fixed({})", n),
            Len::Ref(name) => write!(f, "Ref({:?})", name),
            Len::Func(_) => write!(f, "Func(..)"),
            Len::Remainder => write!(f, "Remainder"),
        }
    }
}

/// Homogeneous repetition of one element node.
#[derive(Debug, Clone)]
pub struct ArrayDef {
    pub elem: Box<Field>,
    pub len: Len,
}

/// Payload of a field node.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(Scalar),
    Struct(Arc<Schema>),
    Array(ArrayDef),
    /// No concrete payload; must be overloaded by a derived schema.
    Placeholder,
}

/// One named slot in a schema: payload kind, optional default, optional
/// store/load transform pair.
#[derive(Clone)]
pub struct Field {
    pub kind: FieldKind,
    pub default: Option<Value>,
    pub(crate) store: Option<TransformFn>,
    pub(crate) load: Option<TransformFn>,
}

impl Field {
    pub fn scalar(kind: Scalar) -> Self {
        Field {
            kind: FieldKind::Scalar(kind),
            default: None,
            store: None,
            load: None,
        }
    }

    pub fn nested(schema: Arc<Schema>) -> Self {
        Field {
            kind: FieldKind::Struct(schema),
            default: None,
            store: None,
            load: None,
        }
    }

    pub fn array(elem: Field, len: Len) -> Self {
        Field {
            kind: FieldKind::Array(ArrayDef {
                elem: Box::new(elem),
                len,
            }),
            default: None,
            store: None,
            load: None,
        }
    }

    pub fn placeholder() -> Self {
        Field {
            kind: FieldKind::Placeholder,
            default: None,
            store: None,
            load: None,
        }
    }

    /// Declared default, used when a value-mode construction omits this field.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Store/load transform pair. Store maps the user-facing value to the
    /// primitive that gets encoded; load is the inverse, applied after decode.
    pub fn with_transform(
        mut self,
        store: impl Fn(&Value) -> Result<Value, CodecError> + Send + Sync + 'static,
        load: impl Fn(&Value) -> Result<Value, CodecError> + Send + Sync + 'static,
    ) -> Self {
        self.store = Some(Arc::new(store));
        self.load = Some(Arc::new(load));
        self
    }

    /// Declared default, or `Unset` when none was declared.
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Unset)
    }

    pub(crate) fn resolve_store(&self, value: &Value) -> Result<Value, CodecError> {
        match &self.store {
            Some(f) => f(value),
            None => Ok(value.clone()),
        }
    }

    pub(crate) fn resolve_load(&self, value: &Value) -> Result<Value, CodecError> {
        match &self.load {
            Some(f) => f(value),
            None => Ok(value.clone()),
        }
    }

    /// Byte size if derivable at composition time.
    pub(crate) fn fixed_size(&self) -> Option<usize> {
        match &self.kind {
            FieldKind::Scalar(s) => Some(s.width()),
            FieldKind::Struct(schema) => match schema.size() {
                SizeSpec::Fixed(n) => Some(n),
                SizeSpec::Variable => None,
            },
            FieldKind::Array(a) => match a.len {
                Len::Fixed(count) => a.elem.fixed_size().map(|e| e * count),
                _ => None,
            },
            FieldKind::Placeholder => None,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("has_transform", &self.store.is_some())
            .finish()
    }
}

/// Total byte size of a schema, derived at composition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    Fixed(usize),
    /// Contains a dynamically-sized array; byte size is per-instance only.
    Variable,
}

/// Schema composition error, raised eagerly when the schema is declared.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate field `{field}` in schema `{schema}`")]
    DuplicateField { schema: String, field: String },
    #[error("schema `{schema}` declares new field `{field}`; derivation may only overload fields of `{base}`")]
    NewFieldInDerived {
        schema: String,
        base: String,
        field: String,
    },
    #[error("incompatible overload of field `{field}` in schema `{schema}`")]
    IncompatibleOverload { schema: String, field: String },
    #[error("array `{field}` in schema `{schema}`: element has no fixed size")]
    VariableArrayElement { schema: String, field: String },
    #[error("array `{field}` references unknown count field `{count}`")]
    UnknownCountField { field: String, count: String },
    #[error("array `{field}` must be declared after its count field `{count}`")]
    ForwardCountField { field: String, count: String },
    #[error("count field `{count}` for array `{field}` must be an unsigned integer scalar")]
    BadCountField { field: String, count: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown struct: {0}")]
    UnknownStruct(String),
    #[error("duplicate struct name: {0}")]
    DuplicateStruct(String),
}

/// An ordered collection of named field nodes defining one record type.
///
/// Declaration order is the wire order and the order of every enumeration.
pub struct Schema {
    name: String,
    fields: Vec<(String, Field)>,
    index: HashMap<String, usize>,
    size: SizeSpec,
    offsets: Vec<Option<usize>>,
    is_abstract: bool,
    /// Count-field name -> indices of arrays whose length it declares.
    counted_by: HashMap<String, Vec<usize>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("size", &self.size)
            .finish()
    }
}

impl Schema {
    /// Starts a new schema declaration.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            base: None,
            fields: Vec::new(),
        }
    }

    /// Starts a derived schema declaration. Fields declared on the builder
    /// overload fields of `base`; declaring a name the base does not have is
    /// a composition error.
    pub fn derive(base: &Arc<Schema>, name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            base: Some(Arc::clone(base)),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field count.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when any field is an un-overloaded placeholder. Abstract schemas
    /// cannot be instantiated.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&i| &self.fields[i].1)
    }

    pub fn field_at(&self, index: usize) -> Option<(&str, &Field)> {
        self.fields.get(index).map(|(n, f)| (n.as_str(), f))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Total byte size, or `Variable` when any member has dynamic length.
    pub fn size(&self) -> SizeSpec {
        self.size
    }

    /// Byte offset of a field, known only while the preceding prefix is
    /// fixed-size.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).and_then(|&i| self.offsets[i])
    }

    pub(crate) fn fields(&self) -> &[(String, Field)] {
        &self.fields
    }

    pub(crate) fn counted_arrays(&self, count_field: &str) -> Option<&[usize]> {
        self.counted_by.get(count_field).map(|v| v.as_slice())
    }

    /// Value-mode construction with every field at its default (or unset).
    pub fn instance(self: &Arc<Self>) -> Result<Instance, CodecError> {
        Instance::new_default(self)
    }

    /// Value-mode construction from positional/mapping/named arguments.
    pub fn build(self: &Arc<Self>, args: impl Into<Args>) -> Result<Instance, CodecError> {
        Instance::from_args(self, args.into())
    }

    /// Unpack mode: consume `bytes` field by field in declared order.
    /// Trailing bytes are an error.
    pub fn unpack(self: &Arc<Self>, bytes: &[u8]) -> Result<Instance, CodecError> {
        Instance::unpack(self, bytes)
    }
}

/// Ordered, validated schema construction. All composition errors surface at
/// [`SchemaBuilder::build`], never at instance time.
pub struct SchemaBuilder {
    name: String,
    base: Option<Arc<Schema>>,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    /// Declares the next field. Order of calls is the wire order.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let name = self.name;

        let fields = match &self.base {
            None => {
                let mut seen = HashMap::new();
                for (i, (fname, _)) in self.fields.iter().enumerate() {
                    if seen.insert(fname.clone(), i).is_some() {
                        return Err(SchemaError::DuplicateField {
                            schema: name,
                            field: fname.clone(),
                        });
                    }
                }
                self.fields
            }
            Some(base) => {
                // Derivation starts from the ancestor's field list and may
                // only replace payloads, never extend the list.
                let mut merged: Vec<(String, Field)> = base.fields.clone();
                for (fname, field) in self.fields {
                    let slot = match base.index_of(&fname) {
                        Some(i) => i,
                        None => {
                            return Err(SchemaError::NewFieldInDerived {
                                schema: name,
                                base: base.name().to_string(),
                                field: fname,
                            })
                        }
                    };
                    if !overload_allowed(&merged[slot].1.kind, &field.kind) {
                        return Err(SchemaError::IncompatibleOverload {
                            schema: name,
                            field: fname,
                        });
                    }
                    merged[slot].1 = field;
                }
                merged
            }
        };

        let mut index = HashMap::with_capacity(fields.len());
        let mut offsets = Vec::with_capacity(fields.len());
        let mut counted_by: HashMap<String, Vec<usize>> = HashMap::new();
        let mut offset = Some(0usize);
        let mut is_abstract = false;

        for (i, (fname, field)) in fields.iter().enumerate() {
            index.insert(fname.clone(), i);
            offsets.push(offset);

            match &field.kind {
                FieldKind::Placeholder => is_abstract = true,
                FieldKind::Array(a) => {
                    if a.elem.fixed_size().is_none() {
                        return Err(SchemaError::VariableArrayElement {
                            schema: name,
                            field: fname.clone(),
                        });
                    }
                    if let Len::Ref(count) = &a.len {
                        let target = match fields.iter().position(|(n, _)| n == count) {
                            Some(t) => t,
                            None => {
                                return Err(SchemaError::UnknownCountField {
                                    field: fname.clone(),
                                    count: count.clone(),
                                })
                            }
                        };
                        if target >= i {
                            return Err(SchemaError::ForwardCountField {
                                field: fname.clone(),
                                count: count.clone(),
                            });
                        }
                        match fields[target].1.kind {
                            FieldKind::Scalar(s) if s.is_unsigned_int() => {}
                            _ => {
                                return Err(SchemaError::BadCountField {
                                    field: fname.clone(),
                                    count: count.clone(),
                                })
                            }
                        }
                        counted_by.entry(count.clone()).or_default().push(i);
                    }
                }
                _ => {}
            }

            offset = match (offset, field.fixed_size()) {
                (Some(o), Some(s)) => Some(o + s),
                _ => None,
            };
        }

        // The running offset after the last field is the total size.
        let size = match offset {
            Some(total) => SizeSpec::Fixed(total),
            None => SizeSpec::Variable,
        };

        Ok(Arc::new(Schema {
            name,
            fields,
            index,
            size,
            offsets,
            is_abstract,
            counted_by,
        }))
    }
}

/// A placeholder may be overloaded by any concrete payload; a concrete
/// payload only by the identical payload type.
fn overload_allowed(base: &FieldKind, new: &FieldKind) -> bool {
    match base {
        FieldKind::Placeholder => true,
        _ => same_payload(base, new),
    }
}

fn same_payload(a: &FieldKind, b: &FieldKind) -> bool {
    match (a, b) {
        (FieldKind::Scalar(x), FieldKind::Scalar(y)) => x == y,
        (FieldKind::Struct(x), FieldKind::Struct(y)) => Arc::ptr_eq(x, y),
        (FieldKind::Array(x), FieldKind::Array(y)) => {
            same_payload(&x.elem.kind, &y.elem.kind) && same_len(&x.len, &y.len)
        }
        (FieldKind::Placeholder, FieldKind::Placeholder) => true,
        _ => false,
    }
}

fn same_len(a: &Len, b: &Len) -> bool {
    match (a, b) {
        (Len::Fixed(x), Len::Fixed(y)) => x == y,
        (Len::Ref(x), Len::Ref(y)) => x == y,
        (Len::Remainder, Len::Remainder) => true,
        // Closures have no identity worth comparing.
        _ => false,
    }
}
