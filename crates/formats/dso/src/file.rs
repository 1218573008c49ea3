use std::collections::HashMap;

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Raw identifier word meaning "no identifier".
pub const NO_IDENT: u32 = u32::MAX;

/// A parsed DSO file with identifier fixups already applied.
///
/// Layout on disk, after the version word: global string table
/// (`u32` byte length + NUL-terminated strings), global float table
/// (`u32` count + `f64`s), code segment (`u32` word count + `u32` words),
/// identifier fixup table (`u32` entry count, each entry
/// `raw_word, offset_count, offset...`). Every listed code offset is
/// patched with `raw_word` during parsing, so consumers see resolved
/// identifier words in the code stream.
#[derive(Debug)]
pub struct FileData {
    version: u32,
    strings: Vec<u8>,
    floats: Vec<f64>,
    code: Vec<u32>,
    /// Code offset → string table offset, from the fixup table.
    idents: HashMap<u32, u32>,
}

impl FileData {
    /// Parse a DSO image. `expected_version`, when given, must match the
    /// file's version word exactly.
    pub fn parse(data: &[u8], expected_version: Option<u32>) -> Result<Self> {
        let mut c = Cursor::new(data);

        let version = c.read_u32()?;
        if let Some(expected) = expected_version {
            if version != expected {
                return Err(Error::VersionMismatch {
                    expected,
                    found: version,
                });
            }
        }

        let string_len = c.read_u32()? as usize;
        let strings = c.read_bytes(string_len)?.to_vec();

        let float_count = c.read_u32()? as usize;
        let mut floats = Vec::with_capacity(float_count);
        for _ in 0..float_count {
            floats.push(c.read_f64()?);
        }

        let code_size = c.read_u32()? as usize;
        let mut code = Vec::with_capacity(code_size);
        for _ in 0..code_size {
            code.push(c.read_u32()?);
        }

        let mut idents = HashMap::new();
        let fixup_count = c.read_u32()? as usize;
        for _ in 0..fixup_count {
            let raw_word = c.read_u32()?;
            let offset_count = c.read_u32()? as usize;
            for _ in 0..offset_count {
                let offset = c.read_u32()?;
                if offset as usize >= code.len() {
                    return Err(Error::FixupOutOfRange {
                        offset: offset as usize,
                        code_size: code.len(),
                    });
                }
                code[offset as usize] = raw_word;
                idents.insert(offset, raw_word);
            }
        }

        if !c.is_empty() {
            return Err(Error::TrailingData(c.remaining()));
        }

        Ok(Self {
            version,
            strings,
            floats,
            code,
            idents,
        })
    }

    /// Assemble a `FileData` directly from its parts. Used by tests and
    /// tools that synthesize code without going through a disk image;
    /// `idents` entries overwrite the corresponding code words the same way
    /// the on-disk fixup table does.
    pub fn from_parts(
        version: u32,
        strings: Vec<u8>,
        floats: Vec<f64>,
        mut code: Vec<u32>,
        idents: HashMap<u32, u32>,
    ) -> Self {
        for (&offset, &raw) in &idents {
            if let Some(word) = code.get_mut(offset as usize) {
                *word = raw;
            }
        }
        Self {
            version,
            strings,
            floats,
            code,
            idents,
        }
    }

    /// The file's version word.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of 32-bit words in the code segment.
    pub fn code_size(&self) -> u32 {
        self.code.len() as u32
    }

    /// Code word at index `at`, or `None` past the end.
    pub fn op(&self, at: u32) -> Option<u32> {
        self.code.get(at as usize).copied()
    }

    /// Resolve the identifier reference at code offset `at`.
    ///
    /// The fixup table takes precedence; otherwise `raw` itself is used as
    /// the string table offset. `NO_IDENT` means no identifier.
    pub fn identifier(&self, at: u32, raw: u32) -> Option<String> {
        let offset = self.idents.get(&at).copied().unwrap_or(raw);
        if offset == NO_IDENT {
            return None;
        }
        self.string_table(offset).ok()
    }

    /// String at byte offset `raw` in the global string table
    /// (NUL-terminated).
    pub fn string_table(&self, raw: u32) -> Result<String> {
        let start = raw as usize;
        if start > self.strings.len() {
            return Err(Error::InvalidStringOffset {
                offset: start,
                len: self.strings.len(),
            });
        }
        let tail = &self.strings[start..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        String::from_utf8(tail[..end].to_vec()).map_err(|e| Error::InvalidString {
            offset: start,
            source: e,
        })
    }

    /// Float at index `raw` in the global float table.
    pub fn float_table(&self, raw: u32) -> Result<f64> {
        self.floats
            .get(raw as usize)
            .copied()
            .ok_or(Error::InvalidFloatIndex {
                index: raw as usize,
                len: self.floats.len(),
            })
    }
}
