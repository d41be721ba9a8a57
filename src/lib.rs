//! # bytestruct — declarative binary-struct schemas and codec
//!
//! A schema is an ordered collection of named fields: fixed-width scalars,
//! nested schemas, or arrays of either. Declared once, a schema derives its
//! byte layout (total size, per-field offsets) and packs/unpacks instances
//! with no padding, in declared field order, little-endian.
//!
//! ## Field nodes
//!
//! - Scalars: `u8`, `i8`, `u16`, `i16`, `u32`, `i32`, `u64`, `i64`, `f64`,
//!   `char` (one byte)
//! - Nested schemas, and `placeholder` fields overloaded by derived schemas
//! - Arrays: fixed count, count from a sibling field, a length closure, or
//!   the remainder of the buffer
//! - Optional default values and store/load transform pairs per field
//!
//! ## Example
//!
//! ```
//! use bytestruct::{Args, Field, Scalar, Schema};
//!
//! let point = Schema::builder("Point")
//!     .field("x", Field::scalar(Scalar::F64))
//!     .field("y", Field::scalar(Scalar::F64))
//!     .build()?;
//!
//! let p = point.build(Args::new().pos(5000.0).pos(300.5))?;
//! let bytes = p.pack()?;
//! assert_eq!(bytes.len(), 16);
//! assert_eq!(point.unpack(&bytes)?, p);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Schemas can also be loaded from a small textual format; see [`parse`] and
//! the `tests/dsl.rs` suite for the syntax.

pub mod codec;
pub mod dump;
pub mod instance;
pub mod parser;
mod path;
pub mod schema;
pub mod value;

pub use codec::CodecError;
pub use instance::{Args, Instance};
pub use parser::{parse, SchemaSet};
pub use schema::{
    ArrayDef, Field, FieldKind, Len, Scalar, Schema, SchemaBuilder, SchemaError, SizeSpec,
};
pub use value::Value;
