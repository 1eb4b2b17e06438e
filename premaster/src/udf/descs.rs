//! UDF descriptors of the bridge subset.
//!
//! Encoders fill in the constants a bridge volume always uses (one
//! partition, short allocation descriptors, strategy 4 ICBs) and expose
//! only the fields that vary between volumes. Decoders are total and
//! verify tags before trusting any field.

use crate::datetime::RecordTimestamp;
use crate::endian::{need, read_u16_le, read_u32_le, read_u64_le};
use crate::error::{Error, Result};
use crate::ident::{decode_udf_dchars, encode_udf_dchars};
use crate::udf::tag::{DescriptorTag, TagIdentifier};
use crate::vd::BLOCK_SIZE;


/// Entity identifier this implementation records in the fields ECMA-167
/// reserves for the mastering application.
pub const IMPLEMENTATION_ID: &[u8] = b"*premaster";

/// The OSTA domain identifier of a UDF-compliant logical volume.
pub const DOMAIN_ID: &[u8] = b"*OSTA UDF Compliant";

/// UDF revision recorded in entity identifier suffixes, BCD 2.60.
pub const UDF_REVISION: u16 = 0x0260;


/// An extent of blocks: length in bytes, start block (extent_ad).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExtentAd {
    pub length: u32,
    pub location: u32,
}
impl ExtentAd {
    fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.location.to_le_bytes());
    }

    fn read(buf: &[u8]) -> Self {
        Self {
            length: read_u32_le(&buf[0..4]),
            location: read_u32_le(&buf[4..8]),
        }
    }
}

/// A short allocation descriptor: length and block within the partition.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ShortAd {
    pub length: u32,
    pub position: u32,
}

/// A long allocation descriptor: length plus block and partition number.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LongAd {
    pub length: u32,
    pub block: u32,
    pub partition: u16,
}
impl LongAd {
    const LEN: usize = 16;

    fn write(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block.to_le_bytes());
        buf[8..10].copy_from_slice(&self.partition.to_le_bytes());
        // implementation use stays zero
    }

    fn read(buf: &[u8]) -> Self {
        Self {
            length: read_u32_le(&buf[0..4]),
            block: read_u32_le(&buf[4..8]),
            partition: read_u16_le(&buf[8..10]),
        }
    }
}

/// Writes a regid (entity identifier) with a UDF revision suffix.
fn write_regid(buf: &mut [u8], identifier: &[u8], with_revision: bool) {
    buf[0] = 0;
    let id_len = identifier.len().min(23);
    buf[1..1+id_len].copy_from_slice(&identifier[..id_len]);
    for b in &mut buf[1+id_len..24] {
        *b = 0;
    }
    if with_revision {
        buf[24..26].copy_from_slice(&UDF_REVISION.to_le_bytes());
        for b in &mut buf[26..32] {
            *b = 0;
        }
    } else {
        for b in &mut buf[24..32] {
            *b = 0;
        }
    }
}

/// Writes the CS0 charspec.
fn write_charspec(buf: &mut [u8]) {
    buf[0] = 0;
    let name = b"OSTA Compressed Unicode";
    buf[1..1+name.len()].copy_from_slice(name);
    for b in &mut buf[1+name.len()..64] {
        *b = 0;
    }
}

/// Writes a fixed-size dstring: compressed content, length in the final
/// byte.
fn write_dstring(buf: &mut [u8], value: &str) {
    let encoded = encode_udf_dchars(value);
    let cap = buf.len() - 1;
    let len = encoded.len().min(cap);
    buf[..len].copy_from_slice(&encoded[..len]);
    for b in &mut buf[len..cap] {
        *b = 0;
    }
    buf[cap] = len as u8;
}

fn read_dstring(buf: &[u8]) -> Result<String> {
    let len = usize::from(buf[buf.len() - 1]);
    if len >= buf.len() {
        return Err(Error::invalid_iso("UDF dstring length overflows its field"));
    }
    decode_udf_dchars(&buf[..len])
}

/// Writes a 12-byte UDF timestamp (local time, zero offset).
fn write_timestamp(buf: &mut [u8], stamp: &RecordTimestamp) {
    // type 1 (local time) in the top nibble, offset 0
    buf[0..2].copy_from_slice(&0x1000u16.to_le_bytes());
    let year = 1900 + u16::from(stamp.years_since_1900);
    buf[2..4].copy_from_slice(&year.to_le_bytes());
    buf[4] = stamp.month;
    buf[5] = stamp.day;
    buf[6] = stamp.hour;
    buf[7] = stamp.minute;
    buf[8] = stamp.second;
    buf[9] = 0;
    buf[10] = 0;
    buf[11] = 0;
}

fn read_timestamp(buf: &[u8]) -> RecordTimestamp {
    let year = read_u16_le(&buf[2..4]);
    RecordTimestamp {
        years_since_1900: year.saturating_sub(1900).min(255) as u8,
        month: buf[4],
        day: buf[5],
        hour: buf[6],
        minute: buf[7],
        second: buf[8],
        gmt_offset: 0,
    }
}

fn block_of(body: Vec<u8>, identifier: TagIdentifier, location: u32) -> [u8; BLOCK_SIZE] {
    let wrapped = DescriptorTag::wrap(identifier, location, &body);
    let mut block = [0u8; BLOCK_SIZE];
    block[..wrapped.len()].copy_from_slice(&wrapped);
    block
}


/// Anchor volume descriptor pointer (part 3 § 10.2).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AnchorDescriptor {
    pub main_vds: ExtentAd,
    pub reserve_vds: ExtentAd,
}
impl AnchorDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        self.main_vds.write(&mut body[0..8]);
        self.reserve_vds.write(&mut body[8..16]);
        block_of(body, TagIdentifier::AnchorPointer, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::AnchorPointer {
            return Err(Error::invalid_iso(format!(
                "expected an anchor pointer, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 16, "anchor volume descriptor pointer")?;
        Ok(Self {
            main_vds: ExtentAd::read(&body[0..8]),
            reserve_vds: ExtentAd::read(&body[8..16]),
        })
    }
}

/// UDF primary volume descriptor (part 3 § 10.1).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UdfPrimaryDescriptor {
    pub vds_number: u32,
    pub volume_identifier: String,
    pub volume_set_identifier: String,
    pub recorded: RecordTimestamp,
}
impl UdfPrimaryDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        body[0..4].copy_from_slice(&self.vds_number.to_le_bytes());
        body[4..8].copy_from_slice(&1u32.to_le_bytes()); // pvd number
        write_dstring(&mut body[8..40], &self.volume_identifier);
        body[40..42].copy_from_slice(&1u16.to_le_bytes()); // sequence number
        body[42..44].copy_from_slice(&1u16.to_le_bytes()); // max sequence number
        body[44..46].copy_from_slice(&2u16.to_le_bytes()); // interchange level
        body[46..48].copy_from_slice(&2u16.to_le_bytes()); // max interchange level
        body[48..52].copy_from_slice(&1u32.to_le_bytes()); // character set list
        body[52..56].copy_from_slice(&1u32.to_le_bytes()); // max character set list
        write_dstring(&mut body[56..184], &self.volume_set_identifier);
        write_charspec(&mut body[184..248]);
        write_charspec(&mut body[248..312]);
        // volume abstract and copyright extents stay zero
        write_regid(&mut body[328..360], IMPLEMENTATION_ID, false);
        write_timestamp(&mut body[360..372], &self.recorded);
        write_regid(&mut body[372..404], IMPLEMENTATION_ID, false);
        // flags: volume set identification is common to the set
        body[472..474].copy_from_slice(&1u16.to_le_bytes());
        block_of(body, TagIdentifier::PrimaryVolume, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::PrimaryVolume {
            return Err(Error::invalid_iso(format!(
                "expected a UDF primary volume descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 404, "UDF primary volume descriptor")?;
        Ok(Self {
            vds_number: read_u32_le(&body[0..4]),
            volume_identifier: read_dstring(&body[8..40])?,
            volume_set_identifier: read_dstring(&body[56..184])?,
            recorded: read_timestamp(&body[360..372]),
        })
    }
}

/// Implementation use volume descriptor (UDF 2.2.7).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ImplementationUseDescriptor {
    pub vds_number: u32,
    pub logical_volume_identifier: String,
}
impl ImplementationUseDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        body[0..4].copy_from_slice(&self.vds_number.to_le_bytes());
        write_regid(&mut body[4..36], b"*UDF LV Info", true);
        // implementation use: LV information
        write_charspec(&mut body[36..100]);
        write_dstring(&mut body[100..228], &self.logical_volume_identifier);
        write_regid(&mut body[336..368], IMPLEMENTATION_ID, false);
        block_of(body, TagIdentifier::ImplementationUseVolume, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::ImplementationUseVolume {
            return Err(Error::invalid_iso(format!(
                "expected an implementation use descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 228, "implementation use volume descriptor")?;
        Ok(Self {
            vds_number: read_u32_le(&body[0..4]),
            logical_volume_identifier: read_dstring(&body[100..228])?,
        })
    }
}

/// Partition descriptor (part 3 § 10.5).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PartitionDescriptor {
    pub vds_number: u32,
    pub starting_location: u32,
    pub length: u32,
}
impl PartitionDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        body[0..4].copy_from_slice(&self.vds_number.to_le_bytes());
        body[4..6].copy_from_slice(&1u16.to_le_bytes()); // flags: allocated
        body[6..8].copy_from_slice(&0u16.to_le_bytes()); // partition number
        write_regid(&mut body[8..40], b"+NSR03", false);
        body[168..172].copy_from_slice(&1u32.to_le_bytes()); // access type: read only
        body[172..176].copy_from_slice(&self.starting_location.to_le_bytes());
        body[176..180].copy_from_slice(&self.length.to_le_bytes());
        write_regid(&mut body[180..212], IMPLEMENTATION_ID, false);
        block_of(body, TagIdentifier::Partition, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::Partition {
            return Err(Error::invalid_iso(format!(
                "expected a partition descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 180, "partition descriptor")?;
        Ok(Self {
            vds_number: read_u32_le(&body[0..4]),
            starting_location: read_u32_le(&body[172..176]),
            length: read_u32_le(&body[176..180]),
        })
    }
}

/// Logical volume descriptor (part 3 § 10.6) with a single type-1
/// partition map.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LogicalVolumeDescriptor {
    pub vds_number: u32,
    pub logical_volume_identifier: String,
    /// Location of the file set descriptor within the partition.
    pub fsd: LongAd,
    pub integrity_sequence: ExtentAd,
}
impl LogicalVolumeDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        body[0..4].copy_from_slice(&self.vds_number.to_le_bytes());
        write_charspec(&mut body[4..68]);
        write_dstring(&mut body[68..196], &self.logical_volume_identifier);
        body[196..200].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        write_regid(&mut body[200..232], DOMAIN_ID, true);
        self.fsd.write(&mut body[232..248]);
        body[248..252].copy_from_slice(&6u32.to_le_bytes()); // map table length
        body[252..256].copy_from_slice(&1u32.to_le_bytes()); // one partition map
        write_regid(&mut body[256..288], IMPLEMENTATION_ID, false);
        self.integrity_sequence.write(&mut body[416..424]);
        // type 1 partition map: volume sequence 1, partition 0
        body[424] = 1;
        body[425] = 6;
        body[426..428].copy_from_slice(&1u16.to_le_bytes());
        body[428..430].copy_from_slice(&0u16.to_le_bytes());
        block_of(body, TagIdentifier::LogicalVolume, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::LogicalVolume {
            return Err(Error::invalid_iso(format!(
                "expected a logical volume descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 430, "logical volume descriptor")?;
        if read_u32_le(&body[196..200]) != BLOCK_SIZE as u32 {
            return Err(Error::invalid_iso(
                "UDF logical block size other than 2048 is not supported",
            ));
        }
        Ok(Self {
            vds_number: read_u32_le(&body[0..4]),
            logical_volume_identifier: read_dstring(&body[68..196])?,
            fsd: LongAd::read(&body[232..248]),
            integrity_sequence: ExtentAd::read(&body[416..424]),
        })
    }
}

/// Unallocated space descriptor (part 3 § 10.8); a bridge volume records
/// no free space.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnallocatedSpaceDescriptor {
    pub vds_number: u32,
}
impl UnallocatedSpaceDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 8];
        body[0..4].copy_from_slice(&self.vds_number.to_le_bytes());
        block_of(body, TagIdentifier::UnallocatedSpace, location)
    }
}

/// Terminating descriptor (part 3 § 10.9).
pub fn terminating_block(location: u32) -> [u8; BLOCK_SIZE] {
    block_of(vec![0u8; 496], TagIdentifier::Terminating, location)
}

/// Logical volume integrity descriptor (part 3 § 10.10), recorded closed.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IntegrityDescriptor {
    pub recorded: RecordTimestamp,
    pub next_unique_id: u64,
    pub free_space: u32,
    pub partition_size: u32,
    pub file_count: u32,
    pub directory_count: u32,
}
impl IntegrityDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 118];
        write_timestamp(&mut body[0..12], &self.recorded);
        body[12..16].copy_from_slice(&1u32.to_le_bytes()); // integrity type: close
        // next integrity extent stays zero
        body[24..32].copy_from_slice(&self.next_unique_id.to_le_bytes());
        body[56..60].copy_from_slice(&1u32.to_le_bytes()); // number of partitions
        body[60..64].copy_from_slice(&46u32.to_le_bytes()); // implementation use length
        body[64..68].copy_from_slice(&self.free_space.to_le_bytes());
        body[68..72].copy_from_slice(&self.partition_size.to_le_bytes());
        write_regid(&mut body[72..104], IMPLEMENTATION_ID, false);
        body[104..108].copy_from_slice(&self.file_count.to_le_bytes());
        body[108..112].copy_from_slice(&self.directory_count.to_le_bytes());
        body[112..114].copy_from_slice(&UDF_REVISION.to_le_bytes());
        body[114..116].copy_from_slice(&UDF_REVISION.to_le_bytes());
        body[116..118].copy_from_slice(&UDF_REVISION.to_le_bytes());
        block_of(body, TagIdentifier::LogicalVolumeIntegrity, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::LogicalVolumeIntegrity {
            return Err(Error::invalid_iso(format!(
                "expected an integrity descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 112, "logical volume integrity descriptor")?;
        Ok(Self {
            recorded: read_timestamp(&body[0..12]),
            next_unique_id: read_u64_le(&body[24..32]),
            free_space: read_u32_le(&body[64..68]),
            partition_size: read_u32_le(&body[68..72]),
            file_count: read_u32_le(&body[104..108]),
            directory_count: read_u32_le(&body[108..112]),
        })
    }
}

/// File set descriptor (part 4 § 14.1).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileSetDescriptor {
    pub recorded: RecordTimestamp,
    pub logical_volume_identifier: String,
    pub file_set_identifier: String,
    /// ICB of the root directory file entry, partition-relative.
    pub root_icb: LongAd,
}
impl FileSetDescriptor {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let mut body = vec![0u8; 496];
        write_timestamp(&mut body[0..12], &self.recorded);
        body[12..14].copy_from_slice(&3u16.to_le_bytes()); // interchange level
        body[14..16].copy_from_slice(&3u16.to_le_bytes()); // max interchange level
        body[16..20].copy_from_slice(&1u32.to_le_bytes()); // character set list
        body[20..24].copy_from_slice(&1u32.to_le_bytes()); // max character set list
        write_charspec(&mut body[32..96]);
        write_dstring(&mut body[96..224], &self.logical_volume_identifier);
        write_charspec(&mut body[224..288]);
        write_dstring(&mut body[288..320], &self.file_set_identifier);
        // copyright and abstract identifiers stay zero
        self.root_icb.write(&mut body[384..400]);
        write_regid(&mut body[400..432], DOMAIN_ID, true);
        block_of(body, TagIdentifier::FileSet, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::FileSet {
            return Err(Error::invalid_iso(format!(
                "expected a file set descriptor, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 432, "file set descriptor")?;
        Ok(Self {
            recorded: read_timestamp(&body[0..12]),
            logical_volume_identifier: read_dstring(&body[96..224])?,
            file_set_identifier: read_dstring(&body[288..320])?,
            root_icb: LongAd::read(&body[384..400]),
        })
    }
}

/// ICB file types this crate reads and writes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum UdfFileType {
    Directory,
    Regular,
    Symlink,
}
impl UdfFileType {
    fn to_byte(self) -> u8 {
        match self {
            Self::Directory => 4,
            Self::Regular => 5,
            Self::Symlink => 12,
        }
    }

    fn from_byte(value: u8) -> Result<Self> {
        match value {
            4 => Ok(Self::Directory),
            5 => Ok(Self::Regular),
            12 => Ok(Self::Symlink),
            other => Err(Error::invalid_iso(format!(
                "UDF ICB file type {} is not supported", other,
            ))),
        }
    }
}

/// A file entry (part 4 § 14.9) using strategy 4 and short allocation
/// descriptors.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileEntry {
    pub file_type: UdfFileType,
    pub link_count: u16,
    pub information_length: u64,
    pub recorded: RecordTimestamp,
    pub unique_id: u64,
    /// Data extents, partition-relative.
    pub extents: Vec<ShortAd>,
}
impl FileEntry {
    pub fn to_block(&self, location: u32) -> [u8; BLOCK_SIZE] {
        let alloc_len = self.extents.len() * 8;
        let mut body = vec![0u8; 160 + alloc_len];
        // icb tag
        body[4..6].copy_from_slice(&4u16.to_le_bytes()); // strategy 4
        body[8..10].copy_from_slice(&1u16.to_le_bytes()); // max entries
        body[11] = self.file_type.to_byte();
        // icb flags 0: short allocation descriptors
        body[18..20].copy_from_slice(&0u16.to_le_bytes());
        body[20..24].copy_from_slice(&u32::MAX.to_le_bytes()); // uid: none
        body[24..28].copy_from_slice(&u32::MAX.to_le_bytes()); // gid: none
        let permissions: u32 = match self.file_type {
            UdfFileType::Directory => 0x14A5, // r-x for all, in UDF bit order
            _ => 0x1084,
        };
        body[28..32].copy_from_slice(&permissions.to_le_bytes());
        body[32..34].copy_from_slice(&self.link_count.to_le_bytes());
        body[40..48].copy_from_slice(&self.information_length.to_le_bytes());
        let blocks_recorded = self.extents.iter()
            .map(|e| u64::from(e.length).div_ceil(BLOCK_SIZE as u64))
            .sum::<u64>();
        body[48..56].copy_from_slice(&blocks_recorded.to_le_bytes());
        write_timestamp(&mut body[56..68], &self.recorded);
        write_timestamp(&mut body[68..80], &self.recorded);
        write_timestamp(&mut body[80..92], &self.recorded);
        body[92..96].copy_from_slice(&1u32.to_le_bytes()); // checkpoint
        write_regid(&mut body[112..144], IMPLEMENTATION_ID, false);
        body[144..152].copy_from_slice(&self.unique_id.to_le_bytes());
        body[156..160].copy_from_slice(&(alloc_len as u32).to_le_bytes());
        for (i, extent) in self.extents.iter().enumerate() {
            let at = 160 + i * 8;
            body[at..at+4].copy_from_slice(&extent.length.to_le_bytes());
            body[at+4..at+8].copy_from_slice(&extent.position.to_le_bytes());
        }
        block_of(body, TagIdentifier::File, location)
    }

    pub fn parse(block: &[u8]) -> Result<Self> {
        let (tag, body) = DescriptorTag::unwrap(block)?;
        if tag.identifier != TagIdentifier::File {
            return Err(Error::invalid_iso(format!(
                "expected a file entry, found tag {:?}", tag.identifier,
            )));
        }
        need(body, 160, "file entry")?;
        let alloc_type = read_u16_le(&body[18..20]) & 0x0007;
        if alloc_type != 0 {
            return Err(Error::invalid_iso(format!(
                "file entry allocation descriptor type {} is not supported", alloc_type,
            )));
        }
        let alloc_len = read_u32_le(&body[156..160]) as usize;
        need(body, 160 + alloc_len, "file entry allocation descriptors")?;
        let mut extents = Vec::with_capacity(alloc_len / 8);
        for chunk in body[160..160+alloc_len].chunks_exact(8) {
            let length = read_u32_le(&chunk[0..4]);
            if length == 0 {
                break;
            }
            extents.push(ShortAd {
                // top two bits of the length are the extent type
                length: length & 0x3FFF_FFFF,
                position: read_u32_le(&chunk[4..8]),
            });
        }
        Ok(Self {
            file_type: UdfFileType::from_byte(body[11])?,
            link_count: read_u16_le(&body[32..34]),
            information_length: read_u64_le(&body[40..48]),
            recorded: read_timestamp(&body[56..68]),
            unique_id: read_u64_le(&body[144..152]),
            extents,
        })
    }
}

/// A file identifier descriptor (part 4 § 14.4).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileIdentifier {
    pub name: String,
    pub is_directory: bool,
    pub is_parent: bool,
    pub hidden: bool,
    /// ICB of the named object, partition-relative.
    pub icb: LongAd,
}
impl FileIdentifier {
    /// Encodes the descriptor; the tag location is the block the FID area
    /// starts in, per ECMA-167's rule that FIDs inherit their extent's
    /// address.
    pub fn to_bytes(&self, location: u32) -> Vec<u8> {
        let fi = if self.is_parent {
            Vec::new()
        } else {
            encode_udf_dchars(&self.name)
        };
        let mut characteristics = 0u8;
        if self.hidden {
            characteristics |= 0x01;
        }
        if self.is_directory {
            characteristics |= 0x02;
        }
        if self.is_parent {
            characteristics |= 0x08;
        }

        let raw_len = 38 + fi.len();
        let padded_len = raw_len.div_ceil(4) * 4;
        let mut body = vec![0u8; padded_len - DescriptorTag::LEN];
        body[0..2].copy_from_slice(&1u16.to_le_bytes()); // file version number
        body[2] = characteristics;
        body[3] = fi.len() as u8;
        self.icb.write(&mut body[4..20]);
        // implementation use length stays zero
        body[22..22+fi.len()].copy_from_slice(&fi);
        DescriptorTag::wrap(TagIdentifier::FileIdentifier, location, &body)
    }

    pub fn encoded_len(&self) -> usize {
        let fi_len = if self.is_parent {
            0
        } else {
            encode_udf_dchars(&self.name).len()
        };
        (38 + fi_len).div_ceil(4) * 4
    }

    /// Decodes one descriptor starting at `buf[*pos]`, advancing the
    /// cursor.
    pub fn parse(buf: &[u8], pos: &mut usize) -> Result<Self> {
        let at = *pos;
        need(&buf[at..], 38, "file identifier descriptor")?;
        let (tag, _) = DescriptorTag::unwrap(&buf[at..])?;
        if tag.identifier != TagIdentifier::FileIdentifier {
            return Err(Error::invalid_iso(format!(
                "expected a file identifier descriptor, found tag {:?}", tag.identifier,
            )));
        }
        let body = &buf[at + DescriptorTag::LEN..];
        let characteristics = body[2];
        let fi_len = usize::from(body[3]);
        let impl_len = usize::from(read_u16_le(&body[20..22]));
        let raw_len = 38 + impl_len + fi_len;
        let padded_len = raw_len.div_ceil(4) * 4;
        need(&buf[at..], padded_len, "file identifier descriptor")?;

        let fi = &body[22 + impl_len..22 + impl_len + fi_len];
        *pos = at + padded_len;
        Ok(Self {
            name: decode_udf_dchars(fi)?,
            is_directory: characteristics & 0x02 != 0,
            is_parent: characteristics & 0x08 != 0,
            hidden: characteristics & 0x01 != 0,
            icb: LongAd::read(&body[4..20]),
        })
    }
}
