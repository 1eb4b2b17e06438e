//! The El Torito boot catalog.
//!
//! "El Torito" Bootable CD-ROM Format Specification 1.0: a boot record
//! volume descriptor points at a catalog of 32-byte entries. The catalog
//! opens with a validation entry whose 16-bit word sum is zero, followed by
//! the initial/default entry and any number of section headers with their
//! section entries.

use from_to_repr::from_to_other;

use crate::endian::{need, read_u16_le, read_u32_le};
use crate::error::{Error, Result};
use crate::vd::BLOCK_SIZE;


/// Catalog entries are exactly this long.
pub const ENTRY_LEN: usize = 32;

/// The isolinux boot-info-table signature bytes expected at offset 0x40 of
/// a boot file before isohybrid processing makes sense.
pub const ISOLINUX_SIGNATURE: [u8; 4] = [0xFB, 0xC0, 0x78, 0x70];


/// Platform id of a validation entry or section header.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum PlatformId {
    X86 = 0x00,
    PowerPc = 0x01,
    Mac = 0x02,
    Efi = 0xEF,
    Other(u8),
}
impl Default for PlatformId {
    fn default() -> Self { Self::X86 }
}

/// Boot media type of a boot entry.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum BootMedia {
    NoEmulation = 0x00,
    Floppy1200 = 0x01,
    Floppy1440 = 0x02,
    Floppy2880 = 0x03,
    HardDisk = 0x04,
    Other(u8),
}
impl Default for BootMedia {
    fn default() -> Self { Self::NoEmulation }
}
impl BootMedia {
    /// Picks the floppy media byte matching an exact image size.
    pub fn floppy_for_size(size: u64) -> Result<Self> {
        match size {
            s if s == 1200 * 1024 => Ok(Self::Floppy1200),
            s if s == 1440 * 1024 => Ok(Self::Floppy1440),
            s if s == 2880 * 1024 => Ok(Self::Floppy2880),
            other => Err(Error::invalid_input(format!(
                "floppy boot image size {} is not 1200, 1440 or 2880 KiB", other,
            ))),
        }
    }
}

/// The validation entry opening the catalog.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ValidationEntry {
    pub platform_id: PlatformId,
    pub id_string: [u8; 24],
}
impl Default for ValidationEntry {
    fn default() -> Self {
        Self {
            platform_id: PlatformId::X86,
            id_string: [0u8; 24],
        }
    }
}
impl ValidationEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0] = 0x01;
        buf[1] = self.platform_id.to_base_type();
        buf[4..28].copy_from_slice(&self.id_string);
        buf[30] = 0x55;
        buf[31] = 0xAA;
        let checksum = Self::balancing_checksum(&buf);
        buf[28..30].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// The value for the checksum field that makes the 16-bit word sum of
    /// the whole entry come out to zero.
    fn balancing_checksum(buf: &[u8; ENTRY_LEN]) -> u16 {
        let mut sum = 0u16;
        for pair in buf.chunks(2) {
            sum = sum.wrapping_add(read_u16_le(pair));
        }
        0u16.wrapping_sub(sum)
    }

    /// Sums the entry's sixteen little-endian words; zero means valid.
    pub fn word_sum(buf: &[u8]) -> u16 {
        let mut sum = 0u16;
        for pair in buf[..ENTRY_LEN].chunks(2) {
            sum = sum.wrapping_add(read_u16_le(pair));
        }
        sum
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        need(buf, ENTRY_LEN, "El Torito validation entry")?;
        if buf[0] != 0x01 {
            return Err(Error::invalid_iso(format!(
                "El Torito validation entry has header id {:#04X}", buf[0],
            )));
        }
        if buf[30] != 0x55 || buf[31] != 0xAA {
            return Err(Error::invalid_iso("El Torito validation entry key bytes are wrong"));
        }
        if Self::word_sum(buf) != 0 {
            return Err(Error::invalid_iso("El Torito validation entry checksum is not zero"));
        }
        Ok(Self {
            platform_id: PlatformId::from_base_type(buf[1]),
            id_string: buf[4..28].try_into().unwrap(),
        })
    }
}

/// An initial or section boot entry.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct BootEntry {
    pub bootable: bool,
    pub media: BootMedia,
    pub load_segment: u16,
    pub system_type: u8,
    /// Count of 512-byte virtual sectors to load.
    pub sector_count: u16,
    /// First logical block of the boot image.
    pub load_rba: u32,
    /// Selection criteria bytes of a section entry; zero on the initial
    /// entry.
    pub selection_criteria: [u8; 19],
}
impl BootEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0] = if self.bootable { 0x88 } else { 0x00 };
        buf[1] = self.media.to_base_type();
        buf[2..4].copy_from_slice(&self.load_segment.to_le_bytes());
        buf[4] = self.system_type;
        buf[6..8].copy_from_slice(&self.sector_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.load_rba.to_le_bytes());
        buf[13..32].copy_from_slice(&self.selection_criteria);
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        need(buf, ENTRY_LEN, "El Torito boot entry")?;
        let bootable = match buf[0] {
            0x88 => true,
            0x00 => false,
            other => {
                return Err(Error::invalid_iso(format!(
                    "El Torito boot entry has boot indicator {:#04X}", other,
                )));
            },
        };
        Ok(Self {
            bootable,
            media: BootMedia::from_base_type(buf[1] & 0x0F),
            load_segment: read_u16_le(&buf[2..4]),
            system_type: buf[4],
            sector_count: read_u16_le(&buf[6..8]),
            load_rba: read_u32_le(&buf[8..12]),
            selection_criteria: buf[13..32].try_into().unwrap(),
        })
    }
}

/// A section header and its entries.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BootSection {
    pub platform_id: PlatformId,
    pub id_string: [u8; 28],
    pub entries: Vec<BootEntry>,
}
impl BootSection {
    fn header_bytes(&self, last: bool) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0] = if last { 0x91 } else { 0x90 };
        buf[1] = self.platform_id.to_base_type();
        buf[2..4].copy_from_slice(&(self.entries.len() as u16).to_le_bytes());
        buf[4..32].copy_from_slice(&self.id_string);
        buf
    }
}

/// The whole boot catalog.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BootCatalog {
    pub validation: ValidationEntry,
    pub initial: BootEntry,
    pub sections: Vec<BootSection>,
}
impl BootCatalog {
    pub fn new(platform_id: PlatformId) -> Self {
        Self {
            validation: ValidationEntry {
                platform_id,
                ..ValidationEntry::default()
            },
            initial: BootEntry::default(),
            sections: Vec::new(),
        }
    }

    /// Encodes the catalog, padded to one logical block.
    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..32].copy_from_slice(&self.validation.to_bytes());
        buf[32..64].copy_from_slice(&self.initial.to_bytes());
        let mut pos = 64;
        for (i, section) in self.sections.iter().enumerate() {
            let last = i + 1 == self.sections.len();
            buf[pos..pos+32].copy_from_slice(&section.header_bytes(last));
            pos += 32;
            for entry in &section.entries {
                buf[pos..pos+32].copy_from_slice(&entry.to_bytes());
                pos += 32;
            }
        }
        buf
    }

    /// The number of entries that fit one catalog block.
    fn entries_fit(&self) -> bool {
        let entries: usize = self.sections.iter().map(|s| 1 + s.entries.len()).sum();
        (2 + entries) * ENTRY_LEN <= BLOCK_SIZE
    }

    /// Checks a section can still be appended.
    pub fn check_room_for_entry(&self) -> Result<()> {
        if !self.entries_fit() {
            return Err(Error::invalid_input("El Torito boot catalog is full"));
        }
        Ok(())
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        need(block, 64, "El Torito boot catalog")?;
        let validation = ValidationEntry::parse(&block[0..32])?;
        let initial = BootEntry::parse(&block[32..64])?;

        let mut sections = Vec::new();
        let mut pos = 64;
        while pos + ENTRY_LEN <= block.len() {
            let header_indicator = block[pos];
            if header_indicator != 0x90 && header_indicator != 0x91 {
                break;
            }
            let entry_count = read_u16_le(&block[pos+2..pos+4]) as usize;
            let mut section = BootSection {
                platform_id: PlatformId::from_base_type(block[pos+1]),
                id_string: block[pos+4..pos+32].try_into().unwrap(),
                entries: Vec::with_capacity(entry_count),
            };
            pos += ENTRY_LEN;
            for _ in 0..entry_count {
                need(&block[pos..], ENTRY_LEN, "El Torito section entry")?;
                section.entries.push(BootEntry::parse(&block[pos..pos+ENTRY_LEN])?);
                pos += ENTRY_LEN;
            }
            sections.push(section);
            if header_indicator == 0x91 {
                break;
            }
        }

        Ok(Self {
            validation,
            initial,
            sections,
        })
    }
}

/// The boot info table isolinux-family loaders expect patched into their
/// boot file at offset 8.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootInfoTable {
    /// First block of the volume descriptor set, always 16.
    pub pvd_extent: u32,
    pub boot_file_extent: u32,
    pub boot_file_length: u32,
    /// Sum of the file's 32-bit little-endian words from offset 64 on.
    pub checksum: u32,
}
impl BootInfoTable {
    /// Computes the table for boot file contents.
    pub fn for_contents(contents: &[u8], boot_file_extent: u32) -> Self {
        let mut checksum = 0u32;
        let mut pos = 64;
        while pos + 4 <= contents.len() {
            checksum = checksum.wrapping_add(read_u32_le(&contents[pos..pos+4]));
            pos += 4;
        }
        if pos < contents.len() {
            let mut tail = [0u8; 4];
            tail[..contents.len() - pos].copy_from_slice(&contents[pos..]);
            checksum = checksum.wrapping_add(u32::from_le_bytes(tail));
        }
        Self {
            pvd_extent: 16,
            boot_file_extent,
            boot_file_length: contents.len() as u32,
            checksum,
        }
    }

    /// Patches the table into the boot file contents at offset 8, zeroing
    /// the 40 reserved bytes that follow the four fields.
    pub fn patch_into(&self, contents: &mut [u8]) -> Result<()> {
        if contents.len() < 64 {
            return Err(Error::invalid_input(
                "boot file is too short for a boot info table",
            ));
        }
        contents[8..12].copy_from_slice(&self.pvd_extent.to_le_bytes());
        contents[12..16].copy_from_slice(&self.boot_file_extent.to_le_bytes());
        contents[16..20].copy_from_slice(&self.boot_file_length.to_le_bytes());
        contents[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        for b in &mut contents[24..64] {
            *b = 0;
        }
        Ok(())
    }
}

/// Checks that a hard-disk-emulation boot image opens with a master boot
/// record holding exactly one active partition.
pub fn check_hdemul_image(contents: &[u8]) -> Result<()> {
    if contents.len() < 512 || contents[510] != 0x55 || contents[511] != 0xAA {
        return Err(Error::invalid_input(
            "hard disk emulation boot image has no MBR signature",
        ));
    }
    let mut active = 0;
    let mut used = 0;
    for i in 0..4 {
        let entry = &contents[446 + i*16..446 + (i+1)*16];
        if entry[4] != 0 {
            used += 1;
        }
        if entry[0] == 0x80 {
            active += 1;
        }
    }
    if used != 1 || active != 1 {
        return Err(Error::invalid_input(format!(
            "hard disk emulation boot image must have exactly one active partition \
             ({} used, {} active)", used, active,
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_entry_sums_to_zero() {
        let entry = ValidationEntry::default();
        let bytes = entry.to_bytes();
        assert_eq!(bytes[28..30], 0x55AAu16.to_le_bytes());
        assert_eq!(ValidationEntry::word_sum(&bytes), 0);
        assert_eq!(ValidationEntry::parse(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_validation_entry_rejects_bad_checksum() {
        let mut bytes = ValidationEntry::default().to_bytes();
        bytes[4] = 0x77;
        assert!(ValidationEntry::parse(&bytes).is_err());
    }

    #[test]
    fn test_catalog_round_trip() {
        let mut catalog = BootCatalog::new(PlatformId::X86);
        catalog.initial = BootEntry {
            bootable: true,
            media: BootMedia::NoEmulation,
            load_segment: 0,
            system_type: 0,
            sector_count: 4,
            load_rba: 26,
            selection_criteria: [0u8; 19],
        };
        catalog.sections.push(BootSection {
            platform_id: PlatformId::Efi,
            id_string: [0u8; 28],
            entries: vec![BootEntry {
                bootable: true,
                media: BootMedia::NoEmulation,
                load_segment: 0,
                system_type: 0,
                sector_count: 1,
                load_rba: 27,
                selection_criteria: [0u8; 19],
            }],
        });

        let block = catalog.to_block();
        assert_eq!(block[0], 0x01);
        assert_eq!(block[32], 0x88);
        assert_eq!(block[64], 0x91);

        let reread = BootCatalog::parse(&block).unwrap();
        assert_eq!(reread, catalog);
    }

    #[test]
    fn test_floppy_sizes() {
        assert_eq!(BootMedia::floppy_for_size(1440 * 1024).unwrap(), BootMedia::Floppy1440);
        assert!(BootMedia::floppy_for_size(1000).is_err());
    }

    #[test]
    fn test_boot_info_table() {
        let mut contents = vec![0u8; 2048];
        contents[0x40..0x44].copy_from_slice(&ISOLINUX_SIGNATURE);
        let table = BootInfoTable::for_contents(&contents, 26);
        assert_eq!(table.pvd_extent, 16);
        assert_eq!(table.boot_file_length, 2048);
        assert_eq!(table.checksum, u32::from_le_bytes(ISOLINUX_SIGNATURE));

        table.patch_into(&mut contents).unwrap();
        assert_eq!(&contents[12..16], &26u32.to_le_bytes());
    }

    #[test]
    fn test_hdemul_validation() {
        let mut image = vec![0u8; 1024];
        assert!(check_hdemul_image(&image).is_err());
        image[510] = 0x55;
        image[511] = 0xAA;
        assert!(check_hdemul_image(&image).is_err());
        image[446] = 0x80;
        image[446 + 4] = 0x0C;
        assert!(check_hdemul_image(&image).is_ok());
    }
}
