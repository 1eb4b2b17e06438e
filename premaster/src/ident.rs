//! Identifier character sets and per-namespace name validation.
//!
//! ECMA-119 file identifiers are drawn from the "d-characters" (§ 7.4.1)
//! plus the two separators `.` and `;`; descriptor text fields use the wider
//! "a-characters". Joliet replaces both with UCS-2BE, and UDF stores names
//! as OSTA compressed unicode d-strings.

use std::fmt;

use crate::error::{Error, Result};


/// String of all characters allowed in the set of "d-characters".
///
/// See ECMA-119 § 7.4.1. Sorted, so membership is a binary search.
pub const D_CHARACTERS_SORTED: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// String of all characters allowed in the set of "a-characters".
///
/// See ECMA-119 § 7.4.1.
pub const A_CHARACTERS_SORTED: &str =
    " !\"%&'()*+,-./0123456789:;<=>?ABCDEFGHIJKLMNOPQRSTUVWXYZ_";

/// Characters Joliet forbids in identifiers regardless of level.
const JOLIET_FORBIDDEN: &[char] = &['*', '/', ':', ';', '?', '\\'];

/// The longest Rock Ridge name this crate will record, in bytes.
///
/// RRIP itself has no limit, but the Linux ISO driver refuses anything
/// longer, so nothing longer is worth writing.
pub const RR_MAX_NAME: usize = 248;

/// The longest UDF file identifier, in d-characters.
pub const UDF_MAX_NAME: usize = 255;


pub(crate) fn is_d_character(b: u8) -> bool {
    D_CHARACTERS_SORTED.as_bytes().binary_search(&b).is_ok()
}

pub(crate) fn is_a_character(b: u8) -> bool {
    A_CHARACTERS_SORTED.as_bytes().binary_search(&b).is_ok()
}

pub(crate) fn check_d_characters(value: &[u8], what: &str) -> Result<()> {
    for &b in value {
        if !is_d_character(b) {
            return Err(Error::invalid_input(format!(
                "{} contains {:#04X}, which is not a d-character", what, b,
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_a_characters(value: &[u8], what: &str) -> Result<()> {
    for &b in value {
        if !is_a_character(b) {
            return Err(Error::invalid_input(format!(
                "{} contains {:#04X}, which is not an a-character", what, b,
            )));
        }
    }
    Ok(())
}

/// Validates an ISO9660 file identifier against an interchange level.
///
/// Levels 1 and 2 demand 8.3 names, level 3 allows up to 30 characters of
/// name-plus-extension, and level 4 (ISO9660:1999) lifts the d-character and
/// version restrictions entirely. Below level 4 the identifier must contain
/// exactly one `.` and one `;` followed by a version from 1 to 32767.
pub fn validate_file_identifier(ident: &[u8], level: u8) -> Result<()> {
    if ident.is_empty() {
        return Err(Error::invalid_input("empty file identifier"));
    }
    if level == 4 {
        // ISO9660:1999 § 7.5.1: anything but NUL and '/', up to 207 bytes.
        if ident.len() > 207 {
            return Err(Error::invalid_input(format!(
                "file identifier {} is longer than 207 bytes", Escaped(ident),
            )));
        }
        for &b in ident {
            if b == 0x00 || b == b'/' {
                return Err(Error::invalid_input(format!(
                    "file identifier {} contains {:#04X}", Escaped(ident), b,
                )));
            }
        }
        return Ok(());
    }

    let dot_count = ident.iter().filter(|&&b| b == b'.').count();
    if dot_count != 1 {
        return Err(Error::invalid_input(format!(
            "file identifier {} must contain exactly one '.'", Escaped(ident),
        )));
    }
    let semi_pos = match ident.iter().position(|&b| b == b';') {
        Some(p) => p,
        None => {
            return Err(Error::invalid_input(format!(
                "file identifier {} has no ';' version separator", Escaped(ident),
            )));
        },
    };
    let version = &ident[semi_pos+1..];
    if version.is_empty() || version.len() > 5
        || !version.iter().all(|b| b.is_ascii_digit())
    {
        return Err(Error::invalid_input(format!(
            "file identifier {} has a malformed version number", Escaped(ident),
        )));
    }
    let version_num: u32 = std::str::from_utf8(version).unwrap().parse().unwrap();
    if version_num < 1 || version_num > 32767 {
        return Err(Error::invalid_input(format!(
            "file identifier {} version must be between 1 and 32767", Escaped(ident),
        )));
    }

    let dot_pos = ident.iter().position(|&b| b == b'.').unwrap();
    if dot_pos > semi_pos {
        return Err(Error::invalid_input(format!(
            "file identifier {} has '.' after ';'", Escaped(ident),
        )));
    }
    let name = &ident[..dot_pos];
    let extension = &ident[dot_pos+1..semi_pos];
    check_d_characters(name, "file name")?;
    check_d_characters(extension, "file extension")?;
    if name.is_empty() && extension.is_empty() {
        return Err(Error::invalid_input(
            "file identifier needs a name or an extension",
        ));
    }

    match level {
        1 | 2 => {
            if name.len() > 8 || extension.len() > 3 {
                return Err(Error::invalid_input(format!(
                    "file identifier {} does not fit 8.3 at interchange level {}",
                    Escaped(ident), level,
                )));
            }
        },
        3 => {
            if name.len() + extension.len() > 30 {
                return Err(Error::invalid_input(format!(
                    "file identifier {} is longer than 30 characters", Escaped(ident),
                )));
            }
        },
        other => {
            return Err(Error::invalid_input(format!(
                "invalid interchange level {}", other,
            )));
        },
    }
    Ok(())
}

/// Validates an ISO9660 directory identifier against an interchange level.
pub fn validate_directory_identifier(ident: &[u8], level: u8) -> Result<()> {
    if ident.is_empty() {
        return Err(Error::invalid_input("empty directory identifier"));
    }
    if level == 4 {
        if ident.len() > 207 {
            return Err(Error::invalid_input(format!(
                "directory identifier {} is longer than 207 bytes", Escaped(ident),
            )));
        }
        for &b in ident {
            if b == 0x00 || b == b'/' {
                return Err(Error::invalid_input(format!(
                    "directory identifier {} contains {:#04X}", Escaped(ident), b,
                )));
            }
        }
        return Ok(());
    }
    let max = match level {
        1 | 2 => 8,
        3 => 31,
        other => {
            return Err(Error::invalid_input(format!(
                "invalid interchange level {}", other,
            )));
        },
    };
    if ident.len() > max {
        return Err(Error::invalid_input(format!(
            "directory identifier {} is longer than {} characters at interchange level {}",
            Escaped(ident), max, level,
        )));
    }
    check_d_characters(ident, "directory identifier")
}

/// Encodes a Joliet identifier as UCS-2BE, enforcing the 64-unit limit.
pub fn encode_joliet_identifier(name: &str) -> Result<Vec<u8>> {
    if name.is_empty() {
        return Err(Error::invalid_input("empty Joliet identifier"));
    }
    let mut units = 0usize;
    let mut out = Vec::with_capacity(name.len() * 2);
    for ch in name.chars() {
        if JOLIET_FORBIDDEN.contains(&ch) {
            return Err(Error::invalid_input(format!(
                "Joliet identifier '{}' contains forbidden character '{}'", name, ch,
            )));
        }
        let mut buf = [0u16; 2];
        for unit in ch.encode_utf16(&mut buf) {
            out.extend_from_slice(&unit.to_be_bytes());
            units += 1;
        }
    }
    if units > 64 {
        return Err(Error::invalid_input(format!(
            "Joliet identifier '{}' is longer than 64 UCS-2 units", name,
        )));
    }
    Ok(out)
}

/// Decodes a UCS-2BE identifier back into a string.
pub fn decode_joliet_identifier(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::invalid_iso(format!(
            "UCS-2 identifier {} has odd length", Escaped(bytes),
        )));
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes(pair.try_into().unwrap()))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| Error::invalid_iso(format!(
            "UCS-2 identifier {} is not valid UTF-16", Escaped(bytes),
        )))
}

/// Validates a Rock Ridge alternate name.
pub fn validate_rr_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("empty Rock Ridge name"));
    }
    if name.len() > RR_MAX_NAME {
        return Err(Error::invalid_input(format!(
            "Rock Ridge name '{}' is longer than {} bytes", name, RR_MAX_NAME,
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::invalid_input(format!(
            "Rock Ridge name '{}' contains '/' or NUL", name,
        )));
    }
    Ok(())
}

/// Validates a UDF file identifier.
pub fn validate_udf_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("empty UDF identifier"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::invalid_input(format!(
            "UDF identifier '{}' contains '/' or NUL", name,
        )));
    }
    if name.chars().count() > UDF_MAX_NAME {
        return Err(Error::invalid_input(format!(
            "UDF identifier '{}' is longer than {} characters", name, UDF_MAX_NAME,
        )));
    }
    Ok(())
}

/// Encodes a string as OSTA compressed unicode (UDF 2.1.1).
///
/// Compression id 8 is used when every code point fits one byte, id 16
/// otherwise. The empty string encodes to the empty d-string.
pub fn encode_udf_dchars(name: &str) -> Vec<u8> {
    if name.is_empty() {
        return Vec::new();
    }
    let narrow = name.chars().all(|c| (c as u32) < 0x100);
    let mut out = Vec::with_capacity(name.len() + 1);
    if narrow {
        out.push(8);
        for c in name.chars() {
            out.push(c as u32 as u8);
        }
    } else {
        out.push(16);
        for unit in name.encode_utf16() {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
    out
}

/// Decodes OSTA compressed unicode into a string.
pub fn decode_udf_dchars(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    match bytes[0] {
        8 => Ok(bytes[1..].iter().map(|&b| char::from(b)).collect()),
        16 => decode_joliet_identifier(&bytes[1..])
            .map_err(|_| Error::invalid_iso(format!(
                "UDF identifier {} is not valid 16-bit OSTA unicode", Escaped(bytes),
            ))),
        other => Err(Error::invalid_iso(format!(
            "UDF identifier {} has unknown compression id {}", Escaped(bytes), other,
        ))),
    }
}

/// An escaped rendering of an identifier for error messages.
///
/// Printable ASCII passes through; everything else is shown as `\xNN` so
/// stray UCS-2 or control bytes never hit the terminal raw.
pub(crate) struct Escaped<'a>(pub &'a [u8]);
impl<'a> fmt::Display for Escaped<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for &b in self.0 {
            match b {
                0x00 => write!(f, "\\0")?,
                0x22 => write!(f, "\\\"")?,
                0x5C => write!(f, "\\\\")?,
                0x20..=0x7E => write!(f, "{}", char::from(b))?,
                other => write!(f, "\\x{:02X}", other)?,
            }
        }
        write!(f, "\"")
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level1_names() {
        assert!(validate_file_identifier(b"FOO.;1", 1).is_ok());
        assert!(validate_file_identifier(b"FOO.BAR;1", 1).is_ok());
        assert!(validate_file_identifier(b"FOO.BARB;1", 1).is_err());
        assert!(validate_file_identifier(b"TOOLONGNM.BAR;1", 1).is_err());
        assert!(validate_file_identifier(b"foo.;1", 1).is_err());
        assert!(validate_file_identifier(b"FOO;1", 1).is_err());
        assert!(validate_file_identifier(b"FOO.", 1).is_err());
        assert!(validate_file_identifier(b"FOO.;0", 1).is_err());
        assert!(validate_file_identifier(b"FOO.;32768", 1).is_err());
        assert!(validate_file_identifier(b"FOO.;32767", 1).is_ok());
        assert!(validate_file_identifier(b".;1", 1).is_err());
    }

    #[test]
    fn test_level3_names() {
        assert!(validate_file_identifier(b"AVERYLONGFILENAMEINDEED.TXT;1", 3).is_ok());
        assert!(validate_file_identifier(b"AVERYVERYLONGFILENAMEINDEED.TXT;1", 3).is_err());
    }

    #[test]
    fn test_level4_names() {
        assert!(validate_file_identifier(b"lowercase and spaces", 4).is_ok());
        assert!(validate_file_identifier(b"has/slash", 4).is_err());
    }

    #[test]
    fn test_directory_names() {
        assert!(validate_directory_identifier(b"DIR1", 1).is_ok());
        assert!(validate_directory_identifier(b"DIRECTORY1", 1).is_err());
        assert!(validate_directory_identifier(b"DIRECTORY1", 3).is_ok());
        assert!(validate_directory_identifier(b"DIR.1", 1).is_err());
    }

    #[test]
    fn test_joliet_encoding() {
        assert_eq!(encode_joliet_identifier("ab").unwrap(), vec![0x00, b'a', 0x00, b'b']);
        assert!(encode_joliet_identifier("a:b").is_err());
        assert!(encode_joliet_identifier(&"x".repeat(65)).is_err());
        assert_eq!(
            decode_joliet_identifier(&encode_joliet_identifier("snowman\u{2603}").unwrap()).unwrap(),
            "snowman\u{2603}",
        );
    }

    #[test]
    fn test_udf_dchars() {
        let narrow = encode_udf_dchars("boot.img");
        assert_eq!(narrow[0], 8);
        assert_eq!(decode_udf_dchars(&narrow).unwrap(), "boot.img");

        let wide = encode_udf_dchars("sch\u{2603}n");
        assert_eq!(wide[0], 16);
        assert_eq!(decode_udf_dchars(&wide).unwrap(), "sch\u{2603}n");
    }

    #[test]
    fn test_escaped_display() {
        assert_eq!(format!("{}", Escaped(b"FOO.;1")), "b\"FOO.;1\"");
        assert_eq!(format!("{}", Escaped(&[0x00, 0x41])), "b\"\\0A\"");
    }
}
