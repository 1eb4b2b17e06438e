//! The UDF bridge subset.
//!
//! ECMA-167 structures sufficient to dual-publish an ISO9660 tree as a UDF
//! 2.60 volume on the same media: the volume recognition sequence, anchor
//! pointers, the main/reserve volume descriptor sequences, the logical
//! volume integrity descriptor, and the file structures (file set
//! descriptor, file entries, file identifier descriptors). Nothing beyond
//! what the bridge format needs is implemented.

pub mod descs;
pub mod tag;

pub use descs::*;
pub use tag::{DescriptorTag, TagIdentifier, crc16};


/// The fixed logical block the first anchor lives at.
pub const ANCHOR_LOCATION: u32 = 256;

/// Where the partition of a bridge volume starts.
pub const PARTITION_START: u32 = 257;

/// A volume recognition sequence block (ECMA-167 part 2 § 9).
///
/// `kind` is one of `b"BEA01"`, `b"NSR03"`, `b"TEA01"`.
pub fn recognition_block(kind: &[u8; 5]) -> [u8; crate::vd::BLOCK_SIZE] {
    let mut buf = [0u8; crate::vd::BLOCK_SIZE];
    buf[0] = 0; // structure type
    buf[1..6].copy_from_slice(kind);
    buf[6] = 1; // structure version
    buf
}

/// Classifies a volume recognition block, if it is one.
pub fn classify_recognition(block: &[u8]) -> Option<[u8; 5]> {
    if block.len() < 7 {
        return None;
    }
    match &block[1..6] {
        id @ (b"BEA01" | b"NSR02" | b"NSR03" | b"TEA01" | b"BOOT2" | b"CD001" | b"CDW02") => {
            Some(id.try_into().unwrap())
        },
        _ => None,
    }
}
