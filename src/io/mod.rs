//! Reading and writing meshes and grids.
//!
//! Meshes use the `!TXT_TMESH` text format, grids a big endian binary layout. Both round trip
//! exactly.
use crate::*;
use byteorder::*;
use std::io::{Cursor, Read, Write};

mod grid;
mod trimesh;

pub use self::grid::*;
pub use self::trimesh::*;

/// A truncated read is a malformed file rather than an I/O failure.
fn eof_malformed(e: std::io::Error) -> SurfaceError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        SurfaceError::MalformedFile("unexpected end of file".into())
    } else {
        SurfaceError::Io(e)
    }
}
