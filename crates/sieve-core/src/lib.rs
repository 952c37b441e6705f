//! Netsieve Core Library
//!
//! This crate provides the static network filtering engine: it loads
//! compiled filter lists, indexes them by token, and classifies requests as
//! blocked, allowed or unmatched.
//!
//! # Architecture
//!
//! Lists are compiled ahead of time (see `sieve-compiler`) into a line
//! format that the engine ingests without re-parsing filter syntax. Each
//! filter becomes an immutable record filed under one token in one of three
//! realms (important, exception, block). Pure `||host^` filters go to
//! per-list hostname dictionaries instead. After `freeze()` the engine is
//! read-only and can be shared between threads; a `selfie` snapshot restores
//! it without reloading lists.
//!
//! # Modules
//!
//! - `compiled`: compiled-list line format, writer and reader
//! - `config`: engine tuning knobs
//! - `domain_set`: bucketed string set for hostnames and `domain=` scopes
//! - `engine`: loading, freezing and request matching
//! - `filter`: immutable filter records and pattern evaluation
//! - `hash`: token hashing, line fingerprints and CRC32
//! - `index`: per-realm token index
//! - `psl`: registrable-domain helpers for third-party detection
//! - `selfie`: binary engine snapshot
//! - `types`: shared type definitions
//! - `url`: fast URL scanning

pub mod compiled;
pub mod config;
pub mod domain_set;
pub mod engine;
pub mod filter;
pub mod hash;
pub mod index;
pub mod psl;
pub mod selfie;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use compiled::{CompiledEntry, CompiledReader, CompiledWriter, LoadError, NetworkEntry, TokenSlot};
pub use config::EngineConfig;
pub use domain_set::DomainSet;
pub use engine::{Engine, EngineStats, Hit, LoadStats, LogData, MatchVerdict, Winner};
pub use filter::{FilterError, FilterRecord};
pub use hash::hash_token;
pub use psl::{get_etld1, is_third_party};
pub use selfie::SelfieError;
pub use types::{FilterFlags, FilteringContext, MatchKind, MatchResult, PartyMask, Realm, RequestType};
