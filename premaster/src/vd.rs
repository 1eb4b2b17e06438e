//! Volume descriptors.
//!
//! The volume descriptor set starts at logical block 16 and runs until a
//! set terminator. This crate reads and writes the Primary descriptor
//! (ECMA-119 § 8.4), the Supplementary descriptor carrying Joliet
//! (§ 8.5 plus the Joliet escape sequences), the Enhanced descriptor of
//! ISO9660:1999, the El Torito boot record (§ 8.2) and the terminator
//! (§ 8.3).

use bitflags::bitflags;
use from_to_repr::from_to_other;
use tracing::debug;

use crate::datetime::VolumeTimestamp;
use crate::dirrec::DirectoryRecord;
use crate::endian::{EndianPair, read_both_u16, read_both_u32, read_u32_le, write_both_u16, write_both_u32};
use crate::error::{Error, Result};
use crate::ident::Escaped;


/// The number of bytes per logical block.
///
/// ECMA-119 § 6.1.2 allows any power of two of at least 2048; in practice
/// every mastering tool uses exactly 2048 and so does this crate.
pub const BLOCK_SIZE: usize = 2048;

/// The first logical block of the data area (§ 6.2.1); blocks 0 to 15 are
/// the system area.
pub const DATA_AREA_START: u32 = 16;

/// The standard identifier at offset 1 of every volume descriptor.
///
/// See ECMA-119 § 8.1.2.
pub const STANDARD_IDENTIFIER: [u8; 5] = *b"CD001";

/// The boot system identifier El Torito requires in its boot record.
pub const ELTORITO_SYSTEM_IDENTIFIER: &[u8] = b"EL TORITO SPECIFICATION";


/// The type byte of a volume descriptor.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum DescriptorType {
    BootRecord = 0x00,
    Primary = 0x01,
    SupplementaryOrEnhanced = 0x02,
    Partition = 0x03,
    SetTerminator = 0xFF,
    Other(u8),
}
impl Default for DescriptorType {
    fn default() -> Self { Self::Primary }
}

bitflags! {
    /// Volume flags of a supplementary descriptor (§ 8.5.3).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct VolumeFlags : u8 {
        /// At least one escape sequence is not registered per ISO 2375.
        const NON_ISO_2375_ESCAPES = 0x01;
    }
}

/// Which flavor a [`VolumeDescriptor`] represents.
///
/// Primary and Supplementary/Enhanced descriptors share a layout; the
/// differences are the type byte, the version bytes and whether the escape
/// sequence field is meaningful.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VolumeDescriptorKind {
    Primary,
    /// Joliet supplementary descriptor; the payload is the escape sequence
    /// level (1, 2 or 3 selecting `%/@`, `%/C`, `%/E`).
    Supplementary(u8),
    /// ISO9660:1999 enhanced descriptor (version and file structure 2).
    Enhanced,
}

/// A primary, supplementary or enhanced volume descriptor.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VolumeDescriptor {
    pub kind: VolumeDescriptorKind,
    pub flags: VolumeFlags,
    pub system_identifier: [u8; 32],
    pub volume_identifier: [u8; 32],
    pub space_size: EndianPair<u32>,
    pub escape_sequences: [u8; 32],
    pub set_size: EndianPair<u16>,
    pub seqnum: EndianPair<u16>,
    pub logical_block_size: EndianPair<u16>,
    pub path_table_size: EndianPair<u32>,
    pub le_path_table_location: u32,
    pub le_path_table_backup_location: u32,
    pub be_path_table_location: u32,
    pub be_path_table_backup_location: u32,
    pub root_directory_record: DirectoryRecord,
    pub volume_set_identifier: [u8; 128],
    pub publisher_identifier: [u8; 128],
    pub data_preparer_identifier: [u8; 128],
    pub application_identifier: [u8; 128],
    pub copyright_file_identifier: [u8; 37],
    pub abstract_file_identifier: [u8; 37],
    pub bibliographic_file_identifier: [u8; 37],
    pub creation_timestamp: VolumeTimestamp,
    pub modification_timestamp: VolumeTimestamp,
    pub expiration_timestamp: VolumeTimestamp,
    pub effective_timestamp: VolumeTimestamp,
    pub app_use: [u8; 512],
}
impl VolumeDescriptor {
    /// The Joliet escape sequence for a level, left-padded into the
    /// 32-byte field.
    pub fn joliet_escape_sequences(level: u8) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0] = b'%';
        buf[1] = b'/';
        buf[2] = match level {
            1 => b'@',
            2 => b'C',
            _ => b'E',
        };
        buf
    }

    fn version_byte(&self) -> u8 {
        match self.kind {
            VolumeDescriptorKind::Enhanced => 2,
            _ => 1,
        }
    }

    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        let type_byte = match self.kind {
            VolumeDescriptorKind::Primary => DescriptorType::Primary,
            _ => DescriptorType::SupplementaryOrEnhanced,
        };
        buf[0] = type_byte.to_base_type();
        buf[1..6].copy_from_slice(&STANDARD_IDENTIFIER);
        buf[6] = self.version_byte();
        buf[7] = self.flags.bits();
        buf[8..40].copy_from_slice(&self.system_identifier);
        buf[40..72].copy_from_slice(&self.volume_identifier);
        write_both_u32(&mut buf[80..88], self.space_size.get());
        buf[88..120].copy_from_slice(&self.escape_sequences);
        write_both_u16(&mut buf[120..124], self.set_size.get());
        write_both_u16(&mut buf[124..128], self.seqnum.get());
        write_both_u16(&mut buf[128..132], self.logical_block_size.get());
        write_both_u32(&mut buf[132..140], self.path_table_size.get());
        buf[140..144].copy_from_slice(&self.le_path_table_location.to_le_bytes());
        buf[144..148].copy_from_slice(&self.le_path_table_backup_location.to_le_bytes());
        buf[148..152].copy_from_slice(&self.be_path_table_location.to_be_bytes());
        buf[152..156].copy_from_slice(&self.be_path_table_backup_location.to_be_bytes());
        let root = self.root_directory_record.to_bytes();
        buf[156..156 + root.len()].copy_from_slice(&root);
        buf[190..318].copy_from_slice(&self.volume_set_identifier);
        buf[318..446].copy_from_slice(&self.publisher_identifier);
        buf[446..574].copy_from_slice(&self.data_preparer_identifier);
        buf[574..702].copy_from_slice(&self.application_identifier);
        buf[702..739].copy_from_slice(&self.copyright_file_identifier);
        buf[739..776].copy_from_slice(&self.abstract_file_identifier);
        buf[776..813].copy_from_slice(&self.bibliographic_file_identifier);
        buf[813..830].copy_from_slice(&self.creation_timestamp.to_bytes());
        buf[830..847].copy_from_slice(&self.modification_timestamp.to_bytes());
        buf[847..864].copy_from_slice(&self.expiration_timestamp.to_bytes());
        buf[864..881].copy_from_slice(&self.effective_timestamp.to_bytes());
        buf[881] = match self.kind {
            VolumeDescriptorKind::Enhanced => 2,
            _ => 1,
        };
        buf[883..1395].copy_from_slice(&self.app_use);
        buf
    }

    pub fn parse(block: &[u8], kind_hint: DescriptorType) -> Result<Self> {
        if block.len() < BLOCK_SIZE {
            return Err(Error::invalid_iso("volume descriptor block is short"));
        }
        let version = block[6];
        let kind = match (kind_hint, version) {
            (DescriptorType::Primary, _) => VolumeDescriptorKind::Primary,
            (DescriptorType::SupplementaryOrEnhanced, 2) => VolumeDescriptorKind::Enhanced,
            (DescriptorType::SupplementaryOrEnhanced, _) => {
                let level = match &block[88..91] {
                    b"%/@" => 1,
                    b"%/C" => 2,
                    b"%/E" => 3,
                    other => {
                        debug!(
                            "supplementary descriptor without a Joliet escape sequence: {}",
                            Escaped(other),
                        );
                        3
                    },
                };
                VolumeDescriptorKind::Supplementary(level)
            },
            _ => {
                return Err(Error::invalid_iso(format!(
                    "descriptor type {:?} is not a volume descriptor", kind_hint,
                )));
            },
        };

        let root_len = block[156];
        let mut root_pos = 156;
        let root = DirectoryRecord::parse(block, &mut root_pos, root_len)?;

        Ok(Self {
            kind,
            flags: VolumeFlags::from_bits_retain(block[7]),
            system_identifier: block[8..40].try_into().unwrap(),
            volume_identifier: block[40..72].try_into().unwrap(),
            space_size: read_both_u32(&block[80..88]),
            escape_sequences: block[88..120].try_into().unwrap(),
            set_size: read_both_u16(&block[120..124]),
            seqnum: read_both_u16(&block[124..128]),
            logical_block_size: read_both_u16(&block[128..132]),
            path_table_size: read_both_u32(&block[132..140]),
            le_path_table_location: read_u32_le(&block[140..144]),
            le_path_table_backup_location: read_u32_le(&block[144..148]),
            be_path_table_location: u32::from_be_bytes(block[148..152].try_into().unwrap()),
            be_path_table_backup_location: u32::from_be_bytes(block[152..156].try_into().unwrap()),
            root_directory_record: root,
            volume_set_identifier: block[190..318].try_into().unwrap(),
            publisher_identifier: block[318..446].try_into().unwrap(),
            data_preparer_identifier: block[446..574].try_into().unwrap(),
            application_identifier: block[574..702].try_into().unwrap(),
            copyright_file_identifier: block[702..739].try_into().unwrap(),
            abstract_file_identifier: block[739..776].try_into().unwrap(),
            bibliographic_file_identifier: block[776..813].try_into().unwrap(),
            creation_timestamp: VolumeTimestamp::parse(block[813..830].try_into().unwrap())?,
            modification_timestamp: VolumeTimestamp::parse(block[830..847].try_into().unwrap())?,
            expiration_timestamp: VolumeTimestamp::parse(block[847..864].try_into().unwrap())?,
            effective_timestamp: VolumeTimestamp::parse(block[864..881].try_into().unwrap())?,
            app_use: block[883..1395].try_into().unwrap(),
        })
    }
}

/// The El Torito boot record volume descriptor.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BootRecordDescriptor {
    /// First block of the boot catalog, stored little-endian at the start
    /// of the boot system use field.
    pub catalog_extent: u32,
}
impl BootRecordDescriptor {
    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = DescriptorType::BootRecord.to_base_type();
        buf[1..6].copy_from_slice(&STANDARD_IDENTIFIER);
        buf[6] = 1;
        buf[7..7 + ELTORITO_SYSTEM_IDENTIFIER.len()]
            .copy_from_slice(ELTORITO_SYSTEM_IDENTIFIER);
        // boot identifier (39..71) stays zero
        buf[71..75].copy_from_slice(&self.catalog_extent.to_le_bytes());
        buf
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() < BLOCK_SIZE {
            return Err(Error::invalid_iso("boot record block is short"));
        }
        let sys_ident = &block[7..39];
        if &sys_ident[..ELTORITO_SYSTEM_IDENTIFIER.len()] != ELTORITO_SYSTEM_IDENTIFIER {
            return Err(Error::invalid_iso(format!(
                "boot record system identifier {} is not El Torito",
                Escaped(&sys_ident[..ELTORITO_SYSTEM_IDENTIFIER.len()]),
            )));
        }
        Ok(Self {
            catalog_extent: read_u32_le(&block[71..75]),
        })
    }
}

/// Encodes the volume descriptor set terminator (§ 8.3).
pub fn terminator_block() -> [u8; BLOCK_SIZE] {
    let mut buf = [0u8; BLOCK_SIZE];
    buf[0] = DescriptorType::SetTerminator.to_base_type();
    buf[1..6].copy_from_slice(&STANDARD_IDENTIFIER);
    buf[6] = 1;
    buf
}

/// Classifies a descriptor block, checking the standard identifier.
pub fn classify(block: &[u8]) -> Result<DescriptorType> {
    if block.len() < BLOCK_SIZE {
        return Err(Error::invalid_iso("descriptor block is short"));
    }
    if block[1..6] != STANDARD_IDENTIFIER {
        return Err(Error::invalid_iso(format!(
            "bad standard identifier {} (expected CD001)", Escaped(&block[1..6]),
        )));
    }
    Ok(DescriptorType::from_base_type(block[0]))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::RecordTimestamp;
    use crate::dirrec::{FileFlags, IDENT_DOT};

    fn sample_vd(kind: VolumeDescriptorKind) -> VolumeDescriptor {
        VolumeDescriptor {
            kind,
            flags: VolumeFlags::empty(),
            system_identifier: [b' '; 32],
            volume_identifier: [b' '; 32],
            space_size: EndianPair::of(24),
            escape_sequences: match kind {
                VolumeDescriptorKind::Supplementary(level)
                    => VolumeDescriptor::joliet_escape_sequences(level),
                _ => [0u8; 32],
            },
            set_size: EndianPair::of(1),
            seqnum: EndianPair::of(1),
            logical_block_size: EndianPair::of(2048),
            path_table_size: EndianPair::of(10),
            le_path_table_location: 19,
            le_path_table_backup_location: 0,
            be_path_table_location: 21,
            be_path_table_backup_location: 0,
            root_directory_record: DirectoryRecord::new(
                IDENT_DOT, 23, 2048, FileFlags::DIRECTORY,
                RecordTimestamp::default(), 1,
            ),
            volume_set_identifier: [b' '; 128],
            publisher_identifier: [b' '; 128],
            data_preparer_identifier: [b' '; 128],
            application_identifier: [b' '; 128],
            copyright_file_identifier: [b' '; 37],
            abstract_file_identifier: [b' '; 37],
            bibliographic_file_identifier: [b' '; 37],
            creation_timestamp: VolumeTimestamp::unspecified(),
            modification_timestamp: VolumeTimestamp::unspecified(),
            expiration_timestamp: VolumeTimestamp::unspecified(),
            effective_timestamp: VolumeTimestamp::unspecified(),
            app_use: [0u8; 512],
        }
    }

    #[test]
    fn test_pvd_round_trip() {
        let vd = sample_vd(VolumeDescriptorKind::Primary);
        let block = vd.to_block();
        assert_eq!(block[0], 1);
        assert_eq!(&block[1..6], b"CD001");
        assert_eq!(block[6], 1);
        assert_eq!(block[881], 1);

        assert_eq!(classify(&block).unwrap(), DescriptorType::Primary);
        let reread = VolumeDescriptor::parse(&block, DescriptorType::Primary).unwrap();
        assert_eq!(reread, vd);
    }

    #[test]
    fn test_joliet_svd_round_trip() {
        let vd = sample_vd(VolumeDescriptorKind::Supplementary(3));
        let block = vd.to_block();
        assert_eq!(block[0], 2);
        assert_eq!(&block[88..91], b"%/E");

        let reread = VolumeDescriptor::parse(
            &block, DescriptorType::SupplementaryOrEnhanced,
        ).unwrap();
        assert_eq!(reread.kind, VolumeDescriptorKind::Supplementary(3));
    }

    #[test]
    fn test_enhanced_vd_version_bytes() {
        let vd = sample_vd(VolumeDescriptorKind::Enhanced);
        let block = vd.to_block();
        assert_eq!(block[0], 2);
        assert_eq!(block[6], 2);
        assert_eq!(block[881], 2);

        let reread = VolumeDescriptor::parse(
            &block, DescriptorType::SupplementaryOrEnhanced,
        ).unwrap();
        assert_eq!(reread.kind, VolumeDescriptorKind::Enhanced);
    }

    #[test]
    fn test_boot_record_round_trip() {
        let br = BootRecordDescriptor { catalog_extent: 25 };
        let block = br.to_block();
        assert_eq!(block[0], 0);
        assert_eq!(&block[7..30], b"EL TORITO SPECIFICATION");
        assert_eq!(BootRecordDescriptor::parse(&block).unwrap(), br);
    }

    #[test]
    fn test_terminator() {
        let block = terminator_block();
        assert_eq!(block[0], 0xFF);
        assert_eq!(classify(&block).unwrap(), DescriptorType::SetTerminator);
    }

    #[test]
    fn test_bad_standard_identifier() {
        let mut block = terminator_block();
        block[3] = b'X';
        assert!(classify(&block).is_err());
    }
}
