//! Path tables.
//!
//! The path table (ECMA-119 § 9.4) is a flat index of every directory on
//! the volume, recorded twice: once with little-endian numbers and once
//! big-endian. Records are ordered by directory depth, then by the number
//! of the parent directory, then by identifier.

use std::cmp::Ordering;

use crate::endian::{need, read_u16_le, read_u32_le};
use crate::error::{Error, Result};


/// One path table record.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PathTableRecord {
    /// Directory identifier; the root records the single byte 0x00.
    pub identifier: Vec<u8>,
    pub xattr_len: u8,
    /// First logical block of the directory extent.
    pub extent: u32,
    /// One-based number of the parent directory's own record.
    pub parent_number: u16,
}
impl PathTableRecord {
    pub fn root(extent: u32) -> Self {
        Self {
            identifier: vec![0x00],
            xattr_len: 0,
            extent,
            parent_number: 1,
        }
    }

    /// The encoded length: 8 fixed bytes, the identifier, and a pad byte
    /// when the identifier length is odd.
    pub fn encoded_len(&self) -> usize {
        8 + self.identifier.len() + self.identifier.len() % 2
    }

    pub fn to_bytes(&self, little_endian: bool) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        buf[0] = self.identifier.len() as u8;
        buf[1] = self.xattr_len;
        if little_endian {
            buf[2..6].copy_from_slice(&self.extent.to_le_bytes());
            buf[6..8].copy_from_slice(&self.parent_number.to_le_bytes());
        } else {
            buf[2..6].copy_from_slice(&self.extent.to_be_bytes());
            buf[6..8].copy_from_slice(&self.parent_number.to_be_bytes());
        }
        buf[8..8 + self.identifier.len()].copy_from_slice(&self.identifier);
        buf
    }

    /// Decodes one record starting at `buf[*pos]`, advancing the cursor.
    pub fn parse(buf: &[u8], pos: &mut usize, little_endian: bool) -> Result<Self> {
        let start = *pos;
        need(&buf[start..], 8, "path table record")?;
        let ident_len = buf[start] as usize;
        if ident_len == 0 {
            return Err(Error::invalid_iso("path table record with empty identifier"));
        }
        let total = 8 + ident_len + ident_len % 2;
        need(&buf[start..], total, "path table record")?;

        let (extent, parent_number) = if little_endian {
            (read_u32_le(&buf[start+2..start+6]), read_u16_le(&buf[start+6..start+8]))
        } else {
            (
                u32::from_be_bytes(buf[start+2..start+6].try_into().unwrap()),
                u16::from_be_bytes(buf[start+6..start+8].try_into().unwrap()),
            )
        };

        *pos = start + total;
        Ok(Self {
            identifier: buf[start+8..start+8+ident_len].to_vec(),
            xattr_len: buf[start+1],
            extent,
            parent_number,
        })
    }
}

/// Parses a whole table of `size` bytes.
pub fn parse_table(buf: &[u8], size: usize, little_endian: bool) -> Result<Vec<PathTableRecord>> {
    need(buf, size, "path table")?;
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < size {
        records.push(PathTableRecord::parse(&buf[..size], &mut pos, little_endian)?);
    }
    Ok(records)
}

/// Encodes a whole table.
pub fn encode_table(records: &[PathTableRecord], little_endian: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        out.extend_from_slice(&record.to_bytes(little_endian));
    }
    out
}

/// The § 9.4 record order: depth, then parent number, then identifier.
///
/// Depth is implicit in the construction (parents always precede children),
/// so a stable sort by parent number and identifier over a breadth-first
/// record list realises the full ordering.
pub fn compare_records(a: &(u8, PathTableRecord), b: &(u8, PathTableRecord)) -> Ordering {
    let (depth_a, rec_a) = a;
    let (depth_b, rec_b) = b;
    depth_a.cmp(depth_b)
        .then_with(|| rec_a.parent_number.cmp(&rec_b.parent_number))
        .then_with(|| rec_a.identifier.cmp(&rec_b.identifier))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_record_len() {
        assert_eq!(PathTableRecord::root(23).encoded_len(), 10);
    }

    #[test]
    fn test_round_trip_both_endians() {
        let rec = PathTableRecord {
            identifier: b"DIR1".to_vec(),
            xattr_len: 0,
            extent: 24,
            parent_number: 1,
        };
        assert_eq!(rec.encoded_len(), 12);

        for little in [true, false] {
            let bytes = rec.to_bytes(little);
            let mut pos = 0;
            let reread = PathTableRecord::parse(&bytes, &mut pos, little).unwrap();
            assert_eq!(reread, rec);
            assert_eq!(pos, bytes.len());
        }
    }

    #[test]
    fn test_odd_identifier_is_padded() {
        let rec = PathTableRecord {
            identifier: b"ODD".to_vec(),
            xattr_len: 0,
            extent: 30,
            parent_number: 2,
        };
        let bytes = rec.to_bytes(true);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[11], 0);
    }

    #[test]
    fn test_table_round_trip() {
        let records = vec![
            PathTableRecord::root(23),
            PathTableRecord {
                identifier: b"AA".to_vec(),
                xattr_len: 0,
                extent: 24,
                parent_number: 1,
            },
            PathTableRecord {
                identifier: b"BB".to_vec(),
                xattr_len: 0,
                extent: 25,
                parent_number: 1,
            },
        ];
        let le = encode_table(&records, true);
        assert_eq!(le.len(), 30);
        let reread = parse_table(&le, le.len(), true).unwrap();
        assert_eq!(reread, records);
    }

    #[test]
    fn test_ordering() {
        let make = |ident: &[u8], parent| (2u8, PathTableRecord {
            identifier: ident.to_vec(),
            xattr_len: 0,
            extent: 0,
            parent_number: parent,
        });
        let mut records = vec![make(b"ZZ", 2), make(b"AA", 3), make(b"MM", 2)];
        records.sort_by(compare_records);
        assert_eq!(records[0].1.identifier, b"MM");
        assert_eq!(records[1].1.identifier, b"ZZ");
        assert_eq!(records[2].1.identifier, b"AA");
    }
}
