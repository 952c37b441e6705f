//! Selfie: binary engine snapshot
//!
//! A selfie captures a loaded engine so that it can be restored without
//! re-reading compiled lists. Contents are written in sorted order, so the
//! same loaded lists always produce the same bytes whether or not the engine
//! was frozen or optimized.

mod codec;
mod format;

pub use codec::*;
pub use format::*;
