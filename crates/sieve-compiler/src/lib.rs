//! Netsieve Filter List Compiler
//!
//! This crate parses ABP/uBO network filter lists and compiles them into the
//! line format that `sieve_core::Engine` loads.
//!
//! - `parser`: line classification and option parsing
//! - `tokenizer`: index token selection
//! - `optimizer`: `$badfilter` and duplicate removal per list
//! - `compiler`: rule and list compilation
//! - `diagnostics`: rejected-line reports

pub mod compiler;
pub mod diagnostics;
pub mod optimizer;
pub mod parser;
pub mod tokenizer;

pub use compiler::{compile_list, CompileError, CompileStats, CompiledList, Compiler};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{logical_lines, parse_line, NetworkRule, ParseError, ParsedLine};
pub use tokenizer::TokenPolicy;
