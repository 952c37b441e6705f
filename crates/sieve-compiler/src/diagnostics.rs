//! Per-line rejection reports

use std::fmt;

use crate::compiler::CompileError;
use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Parse(ParseError),
    Compile(CompileError),
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Parse(e) => write!(f, "{}", e),
            DiagnosticKind::Compile(e) => write!(f, "{}", e),
        }
    }
}

/// A rejected filter line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number of the (first physical line of the) filter
    pub line: usize,
    pub text: String,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.kind, self.text)
    }
}

/// Receiver for rejected lines. Compilation never stops on a bad line.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Discards everything.
impl DiagnosticSink for () {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}
