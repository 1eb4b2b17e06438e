//! UDF descriptor tags.
//!
//! Every ECMA-167 descriptor opens with a 16-byte tag carrying its type,
//! its own block number, a CRC of the descriptor body and an 8-bit
//! checksum of the tag itself (part 3 § 7.2).

use from_to_repr::from_to_other;

use crate::endian::{need, read_u16_le, read_u32_le};
use crate::error::{Error, Result};


/// Tag identifier values used by the bridge subset.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum TagIdentifier {
    PrimaryVolume = 1,
    AnchorPointer = 2,
    VolumePointer = 3,
    ImplementationUseVolume = 4,
    Partition = 5,
    LogicalVolume = 6,
    UnallocatedSpace = 7,
    Terminating = 8,
    LogicalVolumeIntegrity = 9,
    FileSet = 256,
    FileIdentifier = 257,
    AllocationExtent = 258,
    Indirect = 259,
    TerminalEntry = 260,
    File = 261,
    ExtendedAttributeHeader = 262,
    UnallocatedSpaceEntry = 263,
    SpaceBitmap = 264,
    PartitionIntegrity = 265,
    ExtendedFile = 266,
    Other(u16),
}

/// CRC-16/IBM-3740 over a byte slice (polynomial 0x1021, initial value
/// 0xFFFF, no reflection).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &b in data {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// A decoded descriptor tag.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DescriptorTag {
    pub identifier: TagIdentifier,
    pub serial: u16,
    pub location: u32,
}
impl DescriptorTag {
    pub const LEN: usize = 16;

    /// Prefixes `body` with its tag, computing the descriptor CRC and the
    /// tag checksum.
    pub fn wrap(identifier: TagIdentifier, location: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; Self::LEN + body.len()];
        out[0..2].copy_from_slice(&identifier.to_base_type().to_le_bytes());
        out[2..4].copy_from_slice(&3u16.to_le_bytes()); // descriptor version (NSR03)
        // byte 4 is the checksum, byte 5 reserved
        out[6..8].copy_from_slice(&0u16.to_le_bytes()); // tag serial number
        out[8..10].copy_from_slice(&crc16(body).to_le_bytes());
        out[10..12].copy_from_slice(&(body.len() as u16).to_le_bytes());
        out[12..16].copy_from_slice(&location.to_le_bytes());
        out[4] = Self::header_checksum(&out[0..Self::LEN]);
        out[Self::LEN..].copy_from_slice(body);
        out
    }

    /// The 8-bit sum of the tag bytes, excluding the checksum byte itself.
    fn header_checksum(tag: &[u8]) -> u8 {
        let mut sum = 0u8;
        for (i, &b) in tag.iter().take(Self::LEN).enumerate() {
            if i != 4 {
                sum = sum.wrapping_add(b);
            }
        }
        sum
    }

    /// Validates the tag at the head of `block` and returns it with the
    /// CRC-covered body slice.
    pub fn unwrap(block: &[u8]) -> Result<(Self, &[u8])> {
        need(block, Self::LEN, "UDF descriptor tag")?;
        let checksum = Self::header_checksum(&block[0..Self::LEN]);
        if checksum != block[4] {
            return Err(Error::invalid_iso(format!(
                "UDF tag checksum is {:#04X}, expected {:#04X}", block[4], checksum,
            )));
        }
        let identifier = TagIdentifier::from_base_type(read_u16_le(&block[0..2]));
        let crc_len = read_u16_le(&block[10..12]) as usize;
        need(block, Self::LEN + crc_len, "UDF descriptor body")?;
        let body = &block[Self::LEN..Self::LEN + crc_len];
        let expected_crc = read_u16_le(&block[8..10]);
        let actual_crc = crc16(body);
        if expected_crc != actual_crc {
            return Err(Error::invalid_iso(format!(
                "UDF descriptor CRC is {:#06X}, computed {:#06X}", expected_crc, actual_crc,
            )));
        }
        Ok((
            Self {
                identifier,
                serial: read_u16_le(&block[6..8]),
                location: read_u32_le(&block[12..16]),
            },
            body,
        ))
    }

    /// Peeks at the tag identifier without validating checksums, for
    /// classification only.
    pub fn peek_identifier(block: &[u8]) -> Option<TagIdentifier> {
        if block.len() < Self::LEN {
            return None;
        }
        if Self::header_checksum(&block[0..Self::LEN]) != block[4] {
            return None;
        }
        Some(TagIdentifier::from_base_type(read_u16_le(&block[0..2])))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // the classic IBM-3740 check: CRC of "123456789" is 0x29B1
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(b""), 0xFFFF);
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let body = vec![0x42u8; 48];
        let wrapped = DescriptorTag::wrap(TagIdentifier::FileSet, 257, &body);
        assert_eq!(wrapped.len(), 64);

        let (tag, reread_body) = DescriptorTag::unwrap(&wrapped).unwrap();
        assert_eq!(tag.identifier, TagIdentifier::FileSet);
        assert_eq!(tag.location, 257);
        assert_eq!(reread_body, &body[..]);
    }

    #[test]
    fn test_corrupt_body_fails_crc() {
        let mut wrapped = DescriptorTag::wrap(TagIdentifier::Partition, 33, &[1, 2, 3, 4]);
        wrapped[17] ^= 0xFF;
        assert!(DescriptorTag::unwrap(&wrapped).is_err());
    }

    #[test]
    fn test_corrupt_header_fails_checksum() {
        let mut wrapped = DescriptorTag::wrap(TagIdentifier::Partition, 33, &[1, 2, 3, 4]);
        wrapped[12] ^= 0x01;
        assert!(DescriptorTag::unwrap(&wrapped).is_err());
        assert_eq!(DescriptorTag::peek_identifier(&wrapped), None);
    }
}
