//! Selfie Format v1 Constants
//!
//! All values are little-endian. Strings are `(offset: u32, length: u32)`
//! references into the string pool section.

/// Magic bytes: "SNSF"
pub const SELFIE_MAGIC: [u8; 4] = *b"SNSF";

/// Current format version
pub const SELFIE_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Section directory entry size
pub const SECTION_ENTRY_SIZE: usize = 16;

/// Size of one record in the records section
pub const RECORD_SIZE: usize = 36;

// =============================================================================
// Header Field Offsets
// =============================================================================

/// Header field byte offsets.
pub mod header {
    /// u8[4] magic = "SNSF"
    pub const MAGIC: usize = 0;
    /// u16 version
    pub const VERSION: usize = 4;
    /// u16 flags
    pub const FLAGS: usize = 6;
    /// u32 headerBytes (always 64)
    pub const HEADER_BYTES: usize = 8;
    /// u32 sectionCount
    pub const SECTION_COUNT: usize = 12;
    /// u32 sectionDirOffset
    pub const SECTION_DIR_OFFSET: usize = 16;
    /// u32 recordCount
    pub const RECORD_COUNT: usize = 20;
    /// u32 listCount
    pub const LIST_COUNT: usize = 24;
    /// u32 selfieCrc32
    pub const SELFIE_CRC32: usize = 28;
}

/// Header flags.
pub mod header_flags {
    /// Selfie includes CRC32 checksum
    pub const HAS_CRC32: u16 = 1 << 0;
}

// =============================================================================
// Section Directory Entry Offsets
// =============================================================================

pub mod section_entry {
    /// u16 section id
    pub const ID: usize = 0;
    /// u16 flags
    pub const FLAGS: usize = 2;
    /// u32 file offset
    pub const OFFSET: usize = 4;
    /// u32 byte length
    pub const LENGTH: usize = 8;
    /// u32 entry count
    pub const COUNT: usize = 12;
}

// =============================================================================
// Record Field Offsets
// =============================================================================

pub mod record {
    /// u8 match kind
    pub const KIND: usize = 0;
    /// u8 filter flags
    pub const FLAGS: usize = 1;
    /// u8 party mask
    pub const PARTY: usize = 2;
    /// u32 request type mask
    pub const TYPES: usize = 4;
    /// u16 list id
    pub const LIST_ID: usize = 8;
    /// str pattern
    pub const PATTERN: usize = 12;
    /// str domain option
    pub const DOMAIN: usize = 20;
    /// str raw text
    pub const RAW: usize = 28;
}

// =============================================================================
// Section IDs
// =============================================================================

/// Section type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum SectionId {
    /// String pool for all interned strings
    StrPool = 0x0001,
    /// List names, indexed by list id
    Lists = 0x0002,
    /// Record table, indexed by record id
    Records = 0x0003,
    /// Per-realm token buckets plus no-token and regex buckets
    Tokens = 0x0004,
    /// Per-realm, per-list hostname dictionaries
    Hostnames = 0x0005,
}

impl SectionId {
    pub const ALL: [SectionId; 5] = [
        SectionId::StrPool,
        SectionId::Lists,
        SectionId::Records,
        SectionId::Tokens,
        SectionId::Hostnames,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionId::StrPool => "strpool",
            SectionId::Lists => "lists",
            SectionId::Records => "records",
            SectionId::Tokens => "tokens",
            SectionId::Hostnames => "hostnames",
        }
    }
}

impl TryFrom<u16> for SectionId {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(Self::StrPool),
            0x0002 => Ok(Self::Lists),
            0x0003 => Ok(Self::Records),
            0x0004 => Ok(Self::Tokens),
            0x0005 => Ok(Self::Hostnames),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Align offset to boundary.
#[inline]
pub const fn align_offset(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Validate magic bytes.
#[inline]
pub fn validate_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == SELFIE_MAGIC
}

/// Read u16 little-endian. Returns `None` past the end of `data`.
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read u32 little-endian. Returns `None` past the end of `data`.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn write_u16_le(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
