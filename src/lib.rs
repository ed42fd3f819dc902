//! Field selection, record filtering and iteration over XCDF files.
//!
//! An XCDF file is a self-describing sequence of records. Its header carries
//! a catalog of numeric fields (unsigned, signed or floating point, each with
//! a quantization resolution and optionally a parent field giving a vector
//! length). [`XcdfFile`] opens a file and hands out records as [`Tuple`]s,
//! either for every field or for a comma-separated list of names, optionally
//! filtered by an expression such as `nhit > 20 && rec.zenith < 0.5`.

pub mod ast;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod file;
pub mod iter;
pub mod select;
pub mod types;
pub mod visitor;

#[cfg(test)]
mod tests;

pub use crate::ast::EventSelectExpression;
pub use crate::catalog::{Catalog, FieldDescriptor, HeaderVisitor};
pub use crate::config::XcdfConfig;
pub use crate::error::{ErrorKind, Result, XcdfError};
pub use crate::file::{FileMode, XcdfFile};
pub use crate::iter::{FieldCursor, FieldIter, RecordCursor, RecordIter};
pub use crate::select::FieldsByNameSelector;
pub use crate::types::{ChecksumType, CompressionType, Datum, FieldData, FieldType, Value};
pub use crate::visitor::{FieldVisitor, Tuple, TupleSetter};
