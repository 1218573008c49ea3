//! DSO image builder.
//!
//! Builds a byte image in the on-disk layout that [`crate::FileData::parse`]
//! reads back. Fixture construction for tests and tooling; decompiler output
//! is never re-encoded.

use std::collections::BTreeMap;

/// Builder for a DSO image. All writes are little-endian.
pub struct DsoBuilder {
    version: u32,
    strings: Vec<u8>,
    floats: Vec<f64>,
    code: Vec<u32>,
    /// string table offset → code offsets to patch
    fixups: BTreeMap<u32, Vec<u32>>,
}

impl DsoBuilder {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            strings: Vec::new(),
            floats: Vec::new(),
            code: Vec::new(),
            fixups: BTreeMap::new(),
        }
    }

    /// Intern a string, returning its byte offset in the string table.
    /// Duplicates are not collapsed; callers interning the same name twice
    /// get two table entries, which the format permits.
    pub fn add_string(&mut self, s: &str) -> u32 {
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        offset
    }

    /// Append a float, returning its table index.
    pub fn add_float(&mut self, v: f64) -> u32 {
        self.floats.push(v);
        (self.floats.len() - 1) as u32
    }

    /// Append a code word, returning its offset.
    pub fn emit(&mut self, word: u32) -> u32 {
        self.code.push(word);
        (self.code.len() - 1) as u32
    }

    /// Append a placeholder code word carrying an identifier reference.
    /// The emitted word is patched to `string_offset` via the fixup table.
    pub fn emit_ident(&mut self, string_offset: u32) -> u32 {
        let at = self.emit(0);
        self.fixups.entry(string_offset).or_default().push(at);
        at
    }

    /// Next code offset (the address the next `emit` will use).
    pub fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Patch a previously emitted code word (for backpatching jump targets).
    pub fn patch(&mut self, at: u32, word: u32) {
        self.code[at as usize] = word;
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());

        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.strings);

        out.extend_from_slice(&(self.floats.len() as u32).to_le_bytes());
        for f in &self.floats {
            out.extend_from_slice(&f.to_le_bytes());
        }

        out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        for w in &self.code {
            out.extend_from_slice(&w.to_le_bytes());
        }

        out.extend_from_slice(&(self.fixups.len() as u32).to_le_bytes());
        for (raw, offsets) in &self.fixups {
            out.extend_from_slice(&raw.to_le_bytes());
            out.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
            for off in offsets {
                out.extend_from_slice(&off.to_le_bytes());
            }
        }

        out
    }
}
