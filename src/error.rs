//! Error type shared by every public operation.

use std::io;

use thiserror::Error;

use crate::engine::err::DecodeError;

/// Broad classification of an [`XcdfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad selector, expression, field definition or argument. Raised when
    /// the offending object is constructed.
    Configuration,
    /// I/O failure, corrupt data or an invalid record id.
    Engine,
    /// The handle is closed or was opened in the other mode.
    NotOpen,
}

#[derive(Debug, Error)]
pub enum XcdfError {
    #[error("file: not open")]
    NotOpen,

    #[error("file: operation requires {expected} mode")]
    WrongMode { expected: &'static str },

    #[error("invalid file mode '{0}'")]
    InvalidMode(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("invalid field list '{0}'")]
    InvalidFieldList(String),

    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),

    #[error("field '{0}' already exists")]
    DuplicateField(String),

    #[error("invalid resolution {resolution} for field '{field}'")]
    InvalidResolution { field: String, resolution: String },

    #[error("invalid parent '{parent}' for field '{field}': {reason}")]
    InvalidParent {
        field: String,
        parent: String,
        reason: String,
    },

    #[error("cannot add field '{0}': records have already been written")]
    CatalogFrozen(String),

    #[error("expression error at column {position}: {message}")]
    Expression { position: usize, message: String },

    #[error("schema parse error at line {line}: {message}")]
    SchemaParse { line: usize, message: String },

    #[error("config parse error at line {line}: {message}")]
    ConfigParse { line: usize, message: String },

    #[error("field '{field}' holds {found} values but parent '{parent}' requires {expected}")]
    VectorLength {
        field: String,
        parent: String,
        expected: usize,
        found: usize,
    },

    #[error("tuple overflow: more than {capacity} fields visited")]
    TupleOverflow { capacity: usize },

    #[error("Invalid event number {0}")]
    InvalidRecord(u64),

    #[error("file '{0}' is empty")]
    EmptyFile(String),

    #[error("corrupt record {record}: {source}")]
    CorruptRecord {
        record: u64,
        #[source]
        source: DecodeError,
    },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl XcdfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XcdfError::NotOpen | XcdfError::WrongMode { .. } => ErrorKind::NotOpen,
            XcdfError::InvalidMode(_)
            | XcdfError::InvalidArgument(_)
            | XcdfError::UnknownField(_)
            | XcdfError::InvalidFieldList(_)
            | XcdfError::InvalidFieldName(_)
            | XcdfError::DuplicateField(_)
            | XcdfError::InvalidResolution { .. }
            | XcdfError::InvalidParent { .. }
            | XcdfError::CatalogFrozen(_)
            | XcdfError::Expression { .. }
            | XcdfError::SchemaParse { .. }
            | XcdfError::ConfigParse { .. }
            | XcdfError::VectorLength { .. } => ErrorKind::Configuration,
            XcdfError::TupleOverflow { .. }
            | XcdfError::InvalidRecord(_)
            | XcdfError::EmptyFile(_)
            | XcdfError::CorruptRecord { .. }
            | XcdfError::Decode(_)
            | XcdfError::Io(_) => ErrorKind::Engine,
        }
    }
}

pub type Result<T> = std::result::Result<T, XcdfError>;

#[test]
fn test_kinds() {
    assert_eq!(XcdfError::NotOpen.kind(), ErrorKind::NotOpen);
    assert_eq!(XcdfError::UnknownField("x".into()).kind(), ErrorKind::Configuration);
    assert_eq!(XcdfError::InvalidArgument("NULL string".into()).kind(), ErrorKind::Configuration);
    assert_eq!(XcdfError::InvalidRecord(9).kind(), ErrorKind::Engine);
    assert_eq!(XcdfError::InvalidRecord(9).to_string(), "Invalid event number 9");
}
