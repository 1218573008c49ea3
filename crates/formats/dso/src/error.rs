use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("unsupported DSO version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("string at offset {offset:#x} is not valid UTF-8: {source}")]
    InvalidString {
        offset: usize,
        source: std::string::FromUtf8Error,
    },

    #[error("invalid string table offset {offset:#x} (table is {len} bytes)")]
    InvalidStringOffset { offset: usize, len: usize },

    #[error("invalid float table index {index} (table has {len} entries)")]
    InvalidFloatIndex { index: usize, len: usize },

    #[error("identifier fixup targets code offset {offset:#x}, but code has {code_size} words")]
    FixupOutOfRange { offset: usize, code_size: usize },

    #[error("{0} bytes of trailing data after the identifier table")]
    TrailingData(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
