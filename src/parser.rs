//! Parse schema definition source into composed schemas using PEST.
//!
//! The textual format is a convenience for loading schemas from data; it
//! drives the same [`SchemaBuilder`] validation as the host-language API, so
//! every composition error surfaces at parse time. Transforms and length
//! closures have no textual form.

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::{Field, FieldKind, Len, Scalar, Schema, SchemaBuilder, SchemaError};
use crate::value::Value;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Named schemas composed from one source text, in declaration order.
#[derive(Debug)]
pub struct SchemaSet {
    order: Vec<String>,
    by_name: HashMap<String, Arc<Schema>>,
}

impl SchemaSet {
    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Parse schema source into a [`SchemaSet`].
pub fn parse(source: &str) -> Result<SchemaSet, SchemaError> {
    let pairs = SchemaParser::parse(Rule::schema_set, source)
        .map_err(|e| SchemaError::Parse(e.to_string()))?;
    let root = pairs
        .into_iter()
        .next()
        .ok_or_else(|| SchemaError::Parse("empty parse".to_string()))?;

    let mut set = SchemaSet {
        order: Vec::new(),
        by_name: HashMap::new(),
    };
    for inner in root.into_inner() {
        if inner.as_rule() == Rule::struct_def {
            let (name, schema) = build_struct(inner, &set)?;
            if set.by_name.insert(name.clone(), schema).is_some() {
                return Err(SchemaError::DuplicateStruct(name));
            }
            set.order.push(name);
        }
    }
    Ok(set)
}

fn build_struct(
    pair: pest::iterators::Pair<Rule>,
    set: &SchemaSet,
) -> Result<(String, Arc<Schema>), SchemaError> {
    let mut name = String::new();
    let mut base: Option<Arc<Schema>> = None;
    let mut decls: Vec<(String, Field)> = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::base_clause => {
                let base_name = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::ident)
                    .ok_or_else(|| SchemaError::Parse("base clause: missing name".to_string()))?
                    .as_str()
                    .to_string();
                let schema = set
                    .get(&base_name)
                    .ok_or(SchemaError::UnknownStruct(base_name))?;
                base = Some(Arc::clone(schema));
            }
            Rule::field_decl => decls.push(build_field(inner, set)?),
            _ => {}
        }
    }

    let mut builder: SchemaBuilder = match &base {
        Some(b) => Schema::derive(b, name.as_str()),
        None => Schema::builder(name.as_str()),
    };
    for (fname, field) in decls {
        builder = builder.field(fname, field);
    }
    let schema = builder.build()?;
    Ok((name, schema))
}

fn build_field(
    pair: pest::iterators::Pair<Rule>,
    set: &SchemaSet,
) -> Result<(String, Field), SchemaError> {
    let mut name = String::new();
    let mut field: Option<Field> = None;
    let mut default: Option<Value> = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => {
                if name.is_empty() {
                    name = inner.as_str().to_string();
                }
            }
            Rule::type_spec => field = Some(build_type(inner, set)?),
            Rule::default_clause => {
                let lit = inner
                    .into_inner()
                    .next()
                    .ok_or_else(|| SchemaError::Parse("empty default".to_string()))?;
                default = Some(build_literal(lit)?);
            }
            _ => {}
        }
    }

    let mut field =
        field.ok_or_else(|| SchemaError::Parse(format!("field `{}`: missing type", name)))?;
    if let Some(d) = default {
        if !matches!(field.kind, FieldKind::Scalar(_)) {
            return Err(SchemaError::Parse(format!(
                "field `{}`: default values are only valid on scalar fields",
                name
            )));
        }
        field = field.with_default(d);
    }
    Ok((name, field))
}

fn build_type(
    pair: pest::iterators::Pair<Rule>,
    set: &SchemaSet,
) -> Result<Field, SchemaError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SchemaError::Parse("empty type".to_string()))?;
    match inner.as_rule() {
        Rule::scalar_type => Ok(Field::scalar(scalar_of(inner.as_str())?)),
        Rule::placeholder_type => Ok(Field::placeholder()),
        Rule::ident => {
            let schema = set
                .get(inner.as_str())
                .ok_or_else(|| SchemaError::UnknownStruct(inner.as_str().to_string()))?;
            Ok(Field::nested(Arc::clone(schema)))
        }
        Rule::array_type => {
            let mut elem: Option<Field> = None;
            // No length clause means a greedy array.
            let mut len = Len::Remainder;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::elem_type => {
                        let e = part
                            .into_inner()
                            .next()
                            .ok_or_else(|| SchemaError::Parse("empty element type".to_string()))?;
                        elem = Some(match e.as_rule() {
                            Rule::scalar_type => Field::scalar(scalar_of(e.as_str())?),
                            Rule::ident => {
                                let schema = set.get(e.as_str()).ok_or_else(|| {
                                    SchemaError::UnknownStruct(e.as_str().to_string())
                                })?;
                                Field::nested(Arc::clone(schema))
                            }
                            other => {
                                return Err(SchemaError::Parse(format!(
                                    "unexpected element type rule: {:?}",
                                    other
                                )))
                            }
                        });
                    }
                    Rule::array_len => {
                        let l = part
                            .into_inner()
                            .next()
                            .ok_or_else(|| SchemaError::Parse("empty array length".to_string()))?;
                        len = match l.as_rule() {
                            Rule::integer => {
                                let n = l.as_str().parse::<usize>().map_err(|e| {
                                    SchemaError::Parse(format!(
                                        "array length `{}`: {}",
                                        l.as_str(),
                                        e
                                    ))
                                })?;
                                Len::Fixed(n)
                            }
                            Rule::ident => Len::Ref(l.as_str().to_string()),
                            other => {
                                return Err(SchemaError::Parse(format!(
                                    "unexpected array length rule: {:?}",
                                    other
                                )))
                            }
                        };
                    }
                    _ => {}
                }
            }
            let elem =
                elem.ok_or_else(|| SchemaError::Parse("array: missing element type".to_string()))?;
            Ok(Field::array(elem, len))
        }
        other => Err(SchemaError::Parse(format!(
            "unexpected type rule: {:?}",
            other
        ))),
    }
}

fn scalar_of(name: &str) -> Result<Scalar, SchemaError> {
    match name {
        "u8" => Ok(Scalar::U8),
        "i8" => Ok(Scalar::I8),
        "u16" => Ok(Scalar::U16),
        "i16" => Ok(Scalar::I16),
        "u32" => Ok(Scalar::U32),
        "i32" => Ok(Scalar::I32),
        "u64" => Ok(Scalar::U64),
        "i64" => Ok(Scalar::I64),
        "f64" => Ok(Scalar::F64),
        "char" => Ok(Scalar::Char),
        other => Err(SchemaError::Parse(format!("unknown scalar type: {}", other))),
    }
}

fn build_literal(pair: pest::iterators::Pair<Rule>) -> Result<Value, SchemaError> {
    let pair = pair
        .into_inner()
        .next()
        .ok_or_else(|| SchemaError::Parse("empty literal".to_string()))?;
    match pair.as_rule() {
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(Value::F64)
            .map_err(|e| SchemaError::Parse(format!("float literal: {}", e))),
        Rule::hex => u64::from_str_radix(&pair.as_str()[2..], 16)
            .map(Value::U64)
            .map_err(|e| SchemaError::Parse(format!("hex literal: {}", e))),
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(Value::I64)
            .map_err(|e| SchemaError::Parse(format!("integer literal: {}", e))),
        Rule::char_lit => {
            let c = pair
                .as_str()
                .chars()
                .nth(1)
                .ok_or_else(|| SchemaError::Parse("empty char literal".to_string()))?;
            if !c.is_ascii() {
                return Err(SchemaError::Parse(format!(
                    "char literal `{}` is not a single byte",
                    c
                )));
            }
            Ok(Value::Char(c as u8))
        }
        other => Err(SchemaError::Parse(format!(
            "unexpected literal rule: {:?}",
            other
        ))),
    }
}
