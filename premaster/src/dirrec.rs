//! Directory records.
//!
//! See ECMA-119 § 9.1. A record is at least 34 bytes: a 33-byte fixed
//! header, the identifier, a pad byte when the identifier length is even,
//! and an optional system use area (where SUSP and XA live). Records are
//! always an even number of bytes and never straddle a logical block
//! boundary.

use bitflags::bitflags;

use crate::datetime::RecordTimestamp;
use crate::endian::{
    EndianPair, need, read_both_u16, read_both_u32, write_both_u16, write_both_u32,
};
use crate::error::{Error, Result};


/// Identifier of the "." entry of a directory.
pub const IDENT_DOT: &[u8] = &[0x00];

/// Identifier of the ".." entry of a directory.
pub const IDENT_DOTDOT: &[u8] = &[0x01];

/// The System Use Sharing Protocol caps a record at this length so the
/// record length byte never overflows.
pub const MAX_RECORD_LEN: usize = 254;

/// Length of the CD-ROM XA system use extension.
pub const XA_RECORD_LEN: usize = 14;


bitflags! {
    /// File flags of a directory record (ECMA-119 § 9.1.6).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct FileFlags : u8 {
        /// The entry should not be shown to the user.
        const HIDDEN = 0x01;
        /// The entry is a directory.
        const DIRECTORY = 0x02;
        /// The entry is an associated file.
        const ASSOCIATED = 0x04;
        /// The file has record format information in its extended attributes.
        const RECORD = 0x08;
        /// The file has owner/group protection in its extended attributes.
        const PROTECTION = 0x10;
        /// This extent is not the final one of the file.
        const MULTI_EXTENT = 0x80;
    }
}

/// An in-memory directory record.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DirectoryRecord {
    pub xattr_len: u8,
    pub extent: EndianPair<u32>,
    pub data_len: EndianPair<u32>,
    pub recorded: RecordTimestamp,
    pub flags: FileFlags,
    pub file_unit_size: u8,
    pub interleave_gap: u8,
    pub seqnum: EndianPair<u16>,
    pub identifier: Vec<u8>,
    /// Everything after the identifier pad byte: SUSP records, the XA
    /// extension, or nothing.
    pub system_use: Vec<u8>,
}
impl DirectoryRecord {
    pub fn new(identifier: &[u8], extent: u32, data_len: u32, flags: FileFlags,
               recorded: RecordTimestamp, seqnum: u16) -> Self {
        Self {
            xattr_len: 0,
            extent: EndianPair::of(extent),
            data_len: EndianPair::of(data_len),
            recorded,
            flags,
            file_unit_size: 0,
            interleave_gap: 0,
            seqnum: EndianPair::of(seqnum),
            identifier: identifier.to_vec(),
            system_use: Vec::new(),
        }
    }

    /// The encoded length of a record with this identifier and system use.
    pub fn encoded_len_for(identifier_len: usize, system_use_len: usize) -> usize {
        let mut len = 33 + identifier_len;
        if identifier_len % 2 == 0 {
            len += 1;
        }
        len += system_use_len;
        // records are always even in length
        len + len % 2
    }

    pub fn encoded_len(&self) -> usize {
        Self::encoded_len_for(self.identifier.len(), self.system_use.len())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut buf = vec![0u8; len];
        buf[0] = len as u8;
        buf[1] = self.xattr_len;
        write_both_u32(&mut buf[2..10], self.extent.get());
        write_both_u32(&mut buf[10..18], self.data_len.get());
        buf[18..25].copy_from_slice(&self.recorded.to_bytes());
        buf[25] = self.flags.bits();
        buf[26] = self.file_unit_size;
        buf[27] = self.interleave_gap;
        write_both_u16(&mut buf[28..32], self.seqnum.get());
        buf[32] = self.identifier.len() as u8;
        buf[33..33 + self.identifier.len()].copy_from_slice(&self.identifier);
        let mut pos = 33 + self.identifier.len();
        if self.identifier.len() % 2 == 0 {
            buf[pos] = 0x00;
            pos += 1;
        }
        buf[pos..pos + self.system_use.len()].copy_from_slice(&self.system_use);
        buf
    }

    /// Decodes one record starting at `buf[*pos]`, advancing the cursor.
    ///
    /// The caller has already read the length byte and established that it
    /// is non-zero; `length` is that byte.
    pub fn parse(buf: &[u8], pos: &mut usize, length: u8) -> Result<Self> {
        let start = *pos;
        if length < 34 {
            return Err(Error::invalid_iso(format!(
                "directory record length {} is shorter than the 34-byte minimum", length,
            )));
        }
        need(&buf[start..], length as usize, "directory record")?;
        let rec = &buf[start..start + length as usize];

        let ident_len = rec[32] as usize;
        if 33 + ident_len > rec.len() {
            return Err(Error::invalid_iso(format!(
                "directory record identifier length {} overflows the record", ident_len,
            )));
        }

        let mut system_use_at = 33 + ident_len;
        if ident_len % 2 == 0 {
            // skip the pad byte
            system_use_at += 1;
        }
        let system_use = if system_use_at < rec.len() {
            rec[system_use_at..].to_vec()
        } else {
            Vec::new()
        };

        let mut recorded_buf = [0u8; 7];
        recorded_buf.copy_from_slice(&rec[18..25]);

        *pos = start + length as usize;
        Ok(Self {
            xattr_len: rec[1],
            extent: read_both_u32(&rec[2..10]),
            data_len: read_both_u32(&rec[10..18]),
            recorded: RecordTimestamp::parse(&recorded_buf)?,
            flags: FileFlags::from_bits_retain(rec[25]),
            file_unit_size: rec[26],
            interleave_gap: rec[27],
            seqnum: read_both_u16(&rec[28..32]),
            identifier: rec[33..33 + ident_len].to_vec(),
            system_use,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(FileFlags::DIRECTORY)
    }

    pub fn is_dot(&self) -> bool {
        self.identifier == IDENT_DOT
    }

    pub fn is_dotdot(&self) -> bool {
        self.identifier == IDENT_DOTDOT
    }
}

/// The 14-byte CD-ROM XA system use extension.
///
/// Appended after any SUSP data when the image is flagged XA at creation.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct XaRecord {
    pub group_id: u16,
    pub user_id: u16,
    pub attributes: u16,
    pub file_number: u8,
}
impl XaRecord {
    pub fn to_bytes(&self) -> [u8; XA_RECORD_LEN] {
        let mut buf = [0u8; XA_RECORD_LEN];
        buf[0..2].copy_from_slice(&self.group_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.user_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.attributes.to_be_bytes());
        buf[6] = b'X';
        buf[7] = b'A';
        buf[8] = self.file_number;
        buf
    }

    /// Recognises an XA record at the tail of a system use area.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < XA_RECORD_LEN || buf[6] != b'X' || buf[7] != b'A' {
            return None;
        }
        Some(Self {
            group_id: u16::from_be_bytes(buf[0..2].try_into().unwrap()),
            user_id: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
            attributes: u16::from_be_bytes(buf[4..6].try_into().unwrap()),
            file_number: buf[8],
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> RecordTimestamp {
        RecordTimestamp {
            years_since_1900: 119,
            month: 7,
            day: 21,
            hour: 1,
            minute: 2,
            second: 3,
            gmt_offset: 0,
        }
    }

    #[test]
    fn test_lengths() {
        // "." is 34 bytes, FOO.;1 is 40, BOOT.CAT;1 is 44
        assert_eq!(DirectoryRecord::encoded_len_for(1, 0), 34);
        assert_eq!(DirectoryRecord::encoded_len_for(6, 0), 40);
        assert_eq!(DirectoryRecord::encoded_len_for(10, 0), 44);
        // DIR1 has no pad byte of its own but the total is padded to even
        assert_eq!(DirectoryRecord::encoded_len_for(4, 0), 38);
        assert_eq!(DirectoryRecord::encoded_len_for(4, 76), 114);
        assert_eq!(DirectoryRecord::encoded_len_for(6, 75), 116);
    }

    #[test]
    fn test_round_trip() {
        let rec = DirectoryRecord::new(b"FOO.;1", 24, 4, FileFlags::empty(), stamp(), 1);
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(bytes[0], 40);
        assert_eq!(bytes[32], 6);

        let mut pos = 0;
        let reread = DirectoryRecord::parse(&bytes, &mut pos, bytes[0]).unwrap();
        assert_eq!(pos, 40);
        assert_eq!(reread, rec);
    }

    #[test]
    fn test_dot_round_trip() {
        let rec = DirectoryRecord::new(IDENT_DOT, 23, 2048, FileFlags::DIRECTORY, stamp(), 1);
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), 34);
        let mut pos = 0;
        let reread = DirectoryRecord::parse(&bytes, &mut pos, 34).unwrap();
        assert!(reread.is_dot());
        assert!(reread.is_directory());
    }

    #[test]
    fn test_system_use_round_trip() {
        let mut rec = DirectoryRecord::new(b"DIR1", 30, 2048, FileFlags::DIRECTORY, stamp(), 1);
        rec.system_use = vec![0xAA; 20];
        let bytes = rec.to_bytes();
        let mut pos = 0;
        let reread = DirectoryRecord::parse(&bytes, &mut pos, bytes[0]).unwrap();
        assert_eq!(reread.system_use, rec.system_use);
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let rec = DirectoryRecord::new(b"FOO.;1", 24, 4, FileFlags::empty(), stamp(), 1);
        let bytes = rec.to_bytes();
        let mut pos = 0;
        assert!(DirectoryRecord::parse(&bytes[..20], &mut pos, 40).is_err());
    }

    #[test]
    fn test_xa_record() {
        let xa = XaRecord::default();
        let bytes = xa.to_bytes();
        assert_eq!(&bytes[6..8], b"XA");
        assert_eq!(XaRecord::parse(&bytes), Some(xa));
        assert_eq!(XaRecord::parse(&[0u8; 14]), None);
    }
}
