use thiserror::Error;

/// Failures while decoding the binary layout.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("EOF")]
    Eof,
    #[error("Unexpected end of file")]
    UnexpectedEof,
    #[error("Decompression error")]
    DecompressionError,
    #[error("Checksum error")]
    ChecksumError,
    #[error("Bad UTF-8 encoding")]
    BadUtf8,
    #[error("Bad magic bytes {0:?}")]
    BadMagic([u8; 4]),
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid varint encoding")]
    InvalidVarint,
    #[error("Unknown field type byte {0:#04x}")]
    UnknownFieldType(u8),
    #[error("Unknown compression marker {0:#04x}")]
    UnknownCompression(u8),
    #[error("Unexpected block marker {0:#04x}")]
    UnexpectedMarker(u8),
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("Record payload malformed: {0}")]
    MalformedRecord(String),
}
