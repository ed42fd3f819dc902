//! Byte-level storage: buffers, checksumming wrappers and the record codec.

pub mod adlerbuf;
pub mod buf;
pub mod codec;
pub mod err;
pub mod filebuf;
pub mod mmapbuf;
pub mod vecbuf;
