//! The isohybrid MBR prelude.
//!
//! syslinux's isohybrid post-processor turns a bootable ISO into something
//! a BIOS will also boot from disk: logical block 0 gains an MBR whose
//! single active partition aliases the ISO contents, using a fixed
//! 64-head, 32-sector geometry, and the image is padded to a whole number
//! of cylinders.

use crate::endian::{need, read_u32_le};
use crate::error::{Error, Result};


pub const GEOMETRY_HEADS: u32 = 64;
pub const GEOMETRY_SECTORS: u32 = 32;

/// Bytes per cylinder at the fixed geometry: 64 × 32 × 512 = 1 MiB.
pub const CYLINDER_BYTES: u64 = GEOMETRY_HEADS as u64 * GEOMETRY_SECTORS as u64 * 512;

/// Partition type syslinux uses for the aliasing partition.
const PARTITION_TYPE: u8 = 0x17;


/// The synthetic master boot record written to block 0.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsohybridMbr {
    /// Also emit the UEFI/Mac GPT-protective flavor entries.
    pub mac: bool,
    /// Disk identifier at offset 440.
    pub mbr_id: u32,
    /// Partition entry slot (0-3) holding the aliasing partition.
    pub part_slot: u8,
}
impl IsohybridMbr {
    /// Packs a logical 512-byte sector number into CHS bytes at the fixed
    /// geometry.
    fn chs(sector512: u32) -> [u8; 3] {
        let sector = sector512 % GEOMETRY_SECTORS + 1;
        let head = (sector512 / GEOMETRY_SECTORS) % GEOMETRY_HEADS;
        let cylinder = (sector512 / (GEOMETRY_SECTORS * GEOMETRY_HEADS)).min(1023);
        [
            head as u8,
            (((cylinder >> 8) as u8) << 6) | sector as u8,
            cylinder as u8,
        ]
    }

    /// The image length after padding to whole cylinders.
    pub fn padded_size(iso_bytes: u64) -> u64 {
        iso_bytes.div_ceil(CYLINDER_BYTES) * CYLINDER_BYTES
    }

    /// Encodes the 512-byte prelude for an image of `iso_bytes` (before
    /// padding).
    pub fn to_bytes(&self, iso_bytes: u64) -> [u8; 512] {
        let total_sectors = (Self::padded_size(iso_bytes) / 512) as u32;
        let mut buf = [0u8; 512];
        buf[440..444].copy_from_slice(&self.mbr_id.to_le_bytes());

        let entry = 446 + usize::from(self.part_slot) * 16;
        buf[entry] = 0x80;
        buf[entry+1..entry+4].copy_from_slice(&Self::chs(0));
        buf[entry+4] = PARTITION_TYPE;
        buf[entry+5..entry+8].copy_from_slice(&Self::chs(total_sectors - 1));
        // partition starts at LBA 0 so the alias covers the whole image
        buf[entry+8..entry+12].copy_from_slice(&0u32.to_le_bytes());
        buf[entry+12..entry+16].copy_from_slice(&total_sectors.to_le_bytes());

        if self.mac {
            // a second, inactive entry marks the image as carrying EFI
            // system partition data for Mac firmware
            let efi = 446 + ((usize::from(self.part_slot) + 1) % 4) * 16;
            buf[efi+4] = 0xEF;
            buf[efi+8..efi+12].copy_from_slice(&0u32.to_le_bytes());
            buf[efi+12..efi+16].copy_from_slice(&total_sectors.to_le_bytes());
        }

        buf[510] = 0x55;
        buf[511] = 0xAA;
        buf
    }

    /// Recognises an isohybrid prelude in a system area block.
    ///
    /// Returns `None` for an all-zero or non-MBR block; a present but
    /// malformed MBR is reported as an error.
    pub fn parse(block: &[u8]) -> Result<Option<Self>> {
        need(block, 512, "isohybrid MBR")?;
        if block[510] != 0x55 || block[511] != 0xAA {
            return Ok(None);
        }
        let mut part_slot = None;
        let mut mac = false;
        for slot in 0..4u8 {
            let entry = 446 + usize::from(slot) * 16;
            if block[entry] == 0x80 && block[entry+4] != 0 {
                if part_slot.is_some() {
                    return Err(Error::invalid_iso(
                        "isohybrid MBR has more than one active partition",
                    ));
                }
                part_slot = Some(slot);
            }
            if block[entry] != 0x80 && block[entry+4] == 0xEF {
                mac = true;
            }
        }
        let Some(part_slot) = part_slot else {
            return Ok(None);
        };
        Ok(Some(Self {
            mac,
            mbr_id: read_u32_le(&block[440..444]),
            part_slot,
        }))
    }
}
