//! Compiled List Format and Stream
//!
//! This module provides the line-oriented intermediate format between raw
//! filter text and a loaded engine, with its writer and reader.

mod format;
mod stream;

pub use format::*;
pub use stream::*;
