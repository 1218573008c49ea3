//! Reader/writer for Torque Game Engine compiled DSO script files.
//!
//! Two-layer architecture:
//! - **Layer 1** (`cursor`): Raw little-endian reads over a byte slice
//! - **Layer 2** (`file`): The parsed container (string table, float table,
//!   code segment, identifier fixups), exposed as [`FileData`]
//!
//! The `writer` module builds DSO images from parts; it exists for test
//! fixtures and tooling, not for re-emitting decompiler output.

pub mod cursor;
pub mod error;
pub mod file;
pub mod writer;

pub use error::{Error, Result};
pub use file::FileData;
