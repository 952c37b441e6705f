//! Compiled list writer and reader

use super::format::*;

/// Error type for compiled-list loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Missing or invalid compiled-list header")]
    BadHeader,
    #[error("Compiled-list version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: String },
    #[error("Malformed compiled line {line}")]
    MalformedLine { line: usize },
    #[error("Engine is frozen; reset it before loading")]
    Frozen,
    #[error("Engine capacity exceeded")]
    CapacityExceeded,
}

// =============================================================================
// Writer
// =============================================================================

/// Append-only compiled-list writer.
#[derive(Debug, Clone)]
pub struct CompiledWriter {
    name: String,
    lines: Vec<String>,
}

impl CompiledWriter {
    /// Start a list with the given provenance name.
    pub fn new(name: &str) -> Self {
        // Names are single-line
        let name = name.replace(['\n', '\r', '\t'], " ");
        Self {
            name,
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, entry: &CompiledEntry) {
        self.lines.push(entry.encode());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Produce the full compiled text, header first.
    pub fn finish(self) -> String {
        let mut out = header_line(&self.name);
        for line in &self.lines {
            out.push('\n');
            out.push_str(line);
        }
        out.push('\n');
        out
    }
}

// =============================================================================
// Reader
// =============================================================================

/// One decoded body line.
#[derive(Debug, Clone)]
pub struct CompiledLine<'a> {
    /// 1-based line number in the compiled text
    pub line: usize,
    /// Encoded line text, used for duplicate detection
    pub text: &'a str,
    pub entry: CompiledEntry,
}

/// Reader over a compiled list. The header is validated on construction.
pub struct CompiledReader<'a> {
    name: &'a str,
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> CompiledReader<'a> {
    pub fn new(text: &'a str) -> Result<Self, LoadError> {
        let mut lines = text.lines().enumerate();
        let header = match lines.next() {
            Some((_, header)) => header,
            None => return Err(LoadError::BadHeader),
        };
        match parse_header(header) {
            Header::Valid { name } => Ok(Self { name, lines }),
            Header::WrongVersion { found } => Err(LoadError::VersionMismatch {
                expected: COMPILED_VERSION,
                found: found.to_string(),
            }),
            Header::Invalid => Err(LoadError::BadHeader),
        }
    }

    /// List name from the header.
    pub fn name(&self) -> &'a str {
        self.name
    }
}

impl<'a> Iterator for CompiledReader<'a> {
    type Item = Result<CompiledLine<'a>, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, text) = self.lines.next()?;
            if text.is_empty() {
                continue;
            }
            let line = index + 1;
            return Some(match CompiledEntry::decode(text) {
                Some(entry) => Ok(CompiledLine { line, text, entry }),
                None => Err(LoadError::MalformedLine { line }),
            });
        }
    }
}
