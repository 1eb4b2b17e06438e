//! System Use Sharing Protocol and Rock Ridge records.
//!
//! SUSP 1.12 frames the system use area of a directory record into small
//! tagged records; the Rock Ridge Interchange Protocol (IEEE P1282) layers
//! POSIX names, modes, timestamps, symlinks and deep-directory relocation
//! on top. Fields that do not fit the 254-byte record cap spill into a
//! continuation area addressed by a CE record.

use bitflags::bitflags;

use crate::datetime::RecordTimestamp;
use crate::endian::{read_u32_le, write_both_u32};
use crate::error::{Error, Result};
use crate::ident::Escaped;


/// The two Rock Ridge revisions found in the wild.
///
/// 1.09 writes an `RR` presence record and 36-byte `PX` records under the
/// `RRIP_1991A` extension identifier; 1.12 drops `RR`, grows `PX` to 44
/// bytes and identifies itself as `IEEE_P1282`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RockRidgeVersion {
    V1_09,
    V1_12,
}
impl RockRidgeVersion {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1.09" => Some(Self::V1_09),
            "1.12" => Some(Self::V1_12),
            _ => None,
        }
    }

    fn px_len(self) -> usize {
        match self {
            Self::V1_09 => 36,
            Self::V1_12 => 44,
        }
    }
}

bitflags! {
    /// Which records are present, as carried by the 1.09 `RR` record.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct RrPresence : u8 {
        const PX = 0x01;
        const PN = 0x02;
        const SL = 0x04;
        const NM = 0x08;
        const CL = 0x10;
        const PL = 0x20;
        const RE = 0x40;
        const TF = 0x80;
    }
}

bitflags! {
    /// Timestamp selector of a `TF` record.
    ///
    /// The set bits name which stamps follow, in this bit order. Bit 7
    /// selects the 17-byte long form; this crate always writes the 7-byte
    /// form.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct TfFlags : u8 {
        const CREATION = 0x01;
        const MODIFY = 0x02;
        const ACCESS = 0x04;
        const ATTRIBUTES = 0x08;
        const BACKUP = 0x10;
        const EXPIRATION = 0x20;
        const EFFECTIVE = 0x40;
        const LONG_FORM = 0x80;
    }
}

bitflags! {
    /// Flags of an `NM` record or an `SL` component.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    pub struct NameFlags : u8 {
        const CONTINUE = 0x01;
        const CURRENT = 0x02;
        const PARENT = 0x04;
        const ROOT = 0x08;
    }
}

/// One component of a symbolic link target.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlComponent {
    Name(String),
    Current,
    Parent,
    Root,
}
impl SlComponent {
    /// Splits a target string on `/` into components.
    pub fn split_target(target: &str) -> Vec<Self> {
        let mut components = Vec::new();
        if target.starts_with('/') {
            components.push(Self::Root);
        }
        for piece in target.split('/') {
            match piece {
                "" => {},
                "." => components.push(Self::Current),
                ".." => components.push(Self::Parent),
                name => components.push(Self::Name(name.to_owned())),
            }
        }
        components
    }

    /// Rejoins components into the target string.
    pub fn join_target(components: &[Self]) -> String {
        let mut out = String::new();
        for (i, component) in components.iter().enumerate() {
            match component {
                Self::Root => {
                    out.push('/');
                    continue;
                },
                Self::Current => out.push('.'),
                Self::Parent => out.push_str(".."),
                Self::Name(name) => out.push_str(name),
            }
            if i + 1 < components.len() {
                if !(i == 0 && matches!(components[0], Self::Root)) {
                    out.push('/');
                }
            }
        }
        out
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Name(name) => 2 + name.len(),
            _ => 2,
        }
    }
}

/// A decoded SUSP record.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SuspRecord {
    Sp { skip: u8 },
    Ce { block: u32, offset: u32, length: u32 },
    Er { ext_id: Vec<u8>, ext_des: Vec<u8>, ext_src: Vec<u8>, ext_ver: u8 },
    Es { sequence: u8 },
    Px { mode: u32, nlink: u32, uid: u32, gid: u32, serial: Option<u32> },
    Pn { dev_high: u32, dev_low: u32 },
    Sl { flags: NameFlags, components: Vec<(NameFlags, SlComponent)> },
    Nm { flags: NameFlags, name: Vec<u8> },
    Cl { child_extent: u32 },
    Pl { parent_extent: u32 },
    Re,
    Tf { flags: TfFlags, stamps: Vec<RecordTimestamp> },
    Sf { virtual_size: u64, table_depth: u8 },
    Rr { presence: RrPresence },
    /// A record this crate does not interpret, kept for diagnostics.
    Unknown { signature: [u8; 2], data: Vec<u8> },
}
impl SuspRecord {
    fn signature(&self) -> [u8; 2] {
        match self {
            Self::Sp { .. } => *b"SP",
            Self::Ce { .. } => *b"CE",
            Self::Er { .. } => *b"ER",
            Self::Es { .. } => *b"ES",
            Self::Px { .. } => *b"PX",
            Self::Pn { .. } => *b"PN",
            Self::Sl { .. } => *b"SL",
            Self::Nm { .. } => *b"NM",
            Self::Cl { .. } => *b"CL",
            Self::Pl { .. } => *b"PL",
            Self::Re => *b"RE",
            Self::Tf { .. } => *b"TF",
            Self::Sf { .. } => *b"SF",
            Self::Rr { .. } => *b"RR",
            Self::Unknown { signature, .. } => *signature,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Sp { .. } => 7,
            Self::Ce { .. } => 28,
            Self::Er { ext_id, ext_des, ext_src, .. }
                => 8 + ext_id.len() + ext_des.len() + ext_src.len(),
            Self::Es { .. } => 5,
            Self::Px { serial, .. } => if serial.is_some() { 44 } else { 36 },
            Self::Pn { .. } => 20,
            Self::Sl { components, .. }
                => 5 + components.iter().map(|(_, c)| c.encoded_len()).sum::<usize>(),
            Self::Nm { name, .. } => 5 + name.len(),
            Self::Cl { .. } | Self::Pl { .. } => 12,
            Self::Re => 4,
            Self::Tf { stamps, .. } => 5 + stamps.len() * 7,
            Self::Sf { .. } => 21,
            Self::Rr { .. } => 5,
            Self::Unknown { data, .. } => 4 + data.len(),
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let sig = self.signature();
        out.push(sig[0]);
        out.push(sig[1]);
        out.push(self.encoded_len() as u8);
        out.push(1); // SUSP record version
        match self {
            Self::Sp { skip } => {
                out.push(0xBE);
                out.push(0xEF);
                out.push(*skip);
            },
            Self::Ce { block, offset, length } => {
                let mut buf = [0u8; 24];
                write_both_u32(&mut buf[0..8], *block);
                write_both_u32(&mut buf[8..16], *offset);
                write_both_u32(&mut buf[16..24], *length);
                out.extend_from_slice(&buf);
            },
            Self::Er { ext_id, ext_des, ext_src, ext_ver } => {
                out.push(ext_id.len() as u8);
                out.push(ext_des.len() as u8);
                out.push(ext_src.len() as u8);
                out.push(*ext_ver);
                out.extend_from_slice(ext_id);
                out.extend_from_slice(ext_des);
                out.extend_from_slice(ext_src);
            },
            Self::Es { sequence } => out.push(*sequence),
            Self::Px { mode, nlink, uid, gid, serial } => {
                let mut buf = [0u8; 8];
                for value in [mode, nlink, uid, gid] {
                    write_both_u32(&mut buf, *value);
                    out.extend_from_slice(&buf);
                }
                if let Some(serial) = serial {
                    write_both_u32(&mut buf, *serial);
                    out.extend_from_slice(&buf);
                }
            },
            Self::Pn { dev_high, dev_low } => {
                let mut buf = [0u8; 8];
                write_both_u32(&mut buf, *dev_high);
                out.extend_from_slice(&buf);
                write_both_u32(&mut buf, *dev_low);
                out.extend_from_slice(&buf);
            },
            Self::Sl { flags, components } => {
                out.push(flags.bits());
                for (comp_flags, component) in components {
                    let mut flag_byte = *comp_flags;
                    let body: &[u8] = match component {
                        SlComponent::Current => {
                            flag_byte |= NameFlags::CURRENT;
                            &[]
                        },
                        SlComponent::Parent => {
                            flag_byte |= NameFlags::PARENT;
                            &[]
                        },
                        SlComponent::Root => {
                            flag_byte |= NameFlags::ROOT;
                            &[]
                        },
                        SlComponent::Name(name) => name.as_bytes(),
                    };
                    out.push(flag_byte.bits());
                    out.push(body.len() as u8);
                    out.extend_from_slice(body);
                }
            },
            Self::Nm { flags, name } => {
                out.push(flags.bits());
                out.extend_from_slice(name);
            },
            Self::Cl { child_extent } => {
                let mut buf = [0u8; 8];
                write_both_u32(&mut buf, *child_extent);
                out.extend_from_slice(&buf);
            },
            Self::Pl { parent_extent } => {
                let mut buf = [0u8; 8];
                write_both_u32(&mut buf, *parent_extent);
                out.extend_from_slice(&buf);
            },
            Self::Re => {},
            Self::Tf { flags, stamps } => {
                out.push(flags.bits());
                for stamp in stamps {
                    out.extend_from_slice(&stamp.to_bytes());
                }
            },
            Self::Sf { virtual_size, table_depth } => {
                let mut buf = [0u8; 8];
                write_both_u32(&mut buf, (*virtual_size >> 32) as u32);
                out.extend_from_slice(&buf);
                write_both_u32(&mut buf, *virtual_size as u32);
                out.extend_from_slice(&buf);
                out.push(*table_depth);
            },
            Self::Rr { presence } => out.push(presence.bits()),
            Self::Unknown { data, .. } => out.extend_from_slice(data),
        }
    }

    fn decode(signature: [u8; 2], body: &[u8]) -> Result<Self> {
        let short = |what: &str| Error::invalid_iso(format!("truncated {} record", what));
        let rec = match &signature {
            b"SP" => {
                if body.len() < 3 {
                    return Err(short("SP"));
                }
                if body[0] != 0xBE || body[1] != 0xEF {
                    return Err(Error::invalid_iso(format!(
                        "SP record check bytes are {:#04X} {:#04X}", body[0], body[1],
                    )));
                }
                Self::Sp { skip: body[2] }
            },
            b"CE" => {
                if body.len() < 24 {
                    return Err(short("CE"));
                }
                Self::Ce {
                    block: read_u32_le(&body[0..4]),
                    offset: read_u32_le(&body[8..12]),
                    length: read_u32_le(&body[16..20]),
                }
            },
            b"ER" => {
                if body.len() < 4 {
                    return Err(short("ER"));
                }
                let len_id = body[0] as usize;
                let len_des = body[1] as usize;
                let len_src = body[2] as usize;
                if body.len() < 4 + len_id + len_des + len_src {
                    return Err(short("ER"));
                }
                Self::Er {
                    ext_id: body[4..4+len_id].to_vec(),
                    ext_des: body[4+len_id..4+len_id+len_des].to_vec(),
                    ext_src: body[4+len_id+len_des..4+len_id+len_des+len_src].to_vec(),
                    ext_ver: body[3],
                }
            },
            b"ES" => {
                if body.is_empty() {
                    return Err(short("ES"));
                }
                Self::Es { sequence: body[0] }
            },
            b"PX" => {
                if body.len() < 32 {
                    return Err(short("PX"));
                }
                Self::Px {
                    mode: read_u32_le(&body[0..4]),
                    nlink: read_u32_le(&body[8..12]),
                    uid: read_u32_le(&body[16..20]),
                    gid: read_u32_le(&body[24..28]),
                    serial: if body.len() >= 40 {
                        Some(read_u32_le(&body[32..36]))
                    } else {
                        None
                    },
                }
            },
            b"PN" => {
                if body.len() < 16 {
                    return Err(short("PN"));
                }
                Self::Pn {
                    dev_high: read_u32_le(&body[0..4]),
                    dev_low: read_u32_le(&body[8..12]),
                }
            },
            b"SL" => {
                if body.is_empty() {
                    return Err(short("SL"));
                }
                let flags = NameFlags::from_bits_retain(body[0]);
                let mut components = Vec::new();
                let mut pos = 1;
                while pos + 2 <= body.len() {
                    let comp_flags = NameFlags::from_bits_retain(body[pos]);
                    let comp_len = body[pos+1] as usize;
                    if pos + 2 + comp_len > body.len() {
                        return Err(short("SL component"));
                    }
                    let component = if comp_flags.contains(NameFlags::CURRENT) {
                        SlComponent::Current
                    } else if comp_flags.contains(NameFlags::PARENT) {
                        SlComponent::Parent
                    } else if comp_flags.contains(NameFlags::ROOT) {
                        SlComponent::Root
                    } else {
                        let name = String::from_utf8_lossy(&body[pos+2..pos+2+comp_len]);
                        SlComponent::Name(name.into_owned())
                    };
                    components.push((comp_flags & NameFlags::CONTINUE, component));
                    pos += 2 + comp_len;
                }
                Self::Sl { flags, components }
            },
            b"NM" => {
                if body.is_empty() {
                    return Err(short("NM"));
                }
                Self::Nm {
                    flags: NameFlags::from_bits_retain(body[0]),
                    name: body[1..].to_vec(),
                }
            },
            b"CL" => {
                if body.len() < 8 {
                    return Err(short("CL"));
                }
                Self::Cl { child_extent: read_u32_le(&body[0..4]) }
            },
            b"PL" => {
                if body.len() < 8 {
                    return Err(short("PL"));
                }
                Self::Pl { parent_extent: read_u32_le(&body[0..4]) }
            },
            b"RE" => Self::Re,
            b"TF" => {
                if body.is_empty() {
                    return Err(short("TF"));
                }
                let flags = TfFlags::from_bits_retain(body[0]);
                if flags.contains(TfFlags::LONG_FORM) {
                    return Err(Error::invalid_iso(
                        "long-form TF timestamps are not supported",
                    ));
                }
                let count = (flags.bits() & 0x7F).count_ones() as usize;
                if body.len() < 1 + count * 7 {
                    return Err(short("TF"));
                }
                let mut stamps = Vec::with_capacity(count);
                for i in 0..count {
                    let mut stamp = [0u8; 7];
                    stamp.copy_from_slice(&body[1 + i*7..1 + (i+1)*7]);
                    stamps.push(RecordTimestamp::parse(&stamp)?);
                }
                Self::Tf { flags, stamps }
            },
            b"SF" => {
                if body.len() < 17 {
                    return Err(short("SF"));
                }
                let high = read_u32_le(&body[0..4]);
                let low = read_u32_le(&body[8..12]);
                Self::Sf {
                    virtual_size: (u64::from(high) << 32) | u64::from(low),
                    table_depth: body[16],
                }
            },
            b"RR" => {
                if body.is_empty() {
                    return Err(short("RR"));
                }
                Self::Rr { presence: RrPresence::from_bits_retain(body[0]) }
            },
            _ => Self::Unknown { signature, data: body.to_vec() },
        };
        Ok(rec)
    }
}

/// Decodes a system use area into its records.
///
/// Trailing zero padding ends the walk. Records with an impossible length
/// byte are a structural error; unknown signatures are preserved verbatim.
pub fn parse_system_use(area: &[u8]) -> Result<Vec<SuspRecord>> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos + 4 <= area.len() {
        if area[pos] == 0 {
            break;
        }
        let signature = [area[pos], area[pos+1]];
        let length = area[pos+2] as usize;
        if length < 4 || pos + length > area.len() {
            return Err(Error::invalid_iso(format!(
                "SUSP record {} has impossible length {}", Escaped(&signature), length,
            )));
        }
        records.push(SuspRecord::decode(signature, &area[pos+4..pos+length])?);
        pos += length;
    }
    Ok(records)
}

/// The Rock Ridge annotation carried by one ISO9660 facet.
///
/// This is the in-memory aggregate the codecs above serialise; the extent
/// numbers referenced by CL/PL are supplied at encode time because only
/// the planner knows them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RockRidge {
    pub version: RockRidgeVersion,
    /// POSIX name (NM); absent on '.', '..' and relocation placeholders
    /// that inherit their name from the relocated directory.
    pub name: Option<String>,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub serial: u32,
    pub tf_flags: TfFlags,
    pub stamps: Vec<RecordTimestamp>,
    pub symlink: Option<Vec<SlComponent>>,
    /// This record is the '.' of the root directory and carries SP plus
    /// the ER extension identification in the continuation area.
    pub first_dot: bool,
    /// This record is a relocation placeholder (CL).
    pub child_link: bool,
    /// This record is the '..' of a relocated directory (PL).
    pub parent_link: bool,
    /// This record is a relocated directory (RE).
    pub relocated: bool,
}
impl RockRidge {
    pub fn for_directory(version: RockRidgeVersion, name: Option<String>, nlink: u32,
                         stamp: RecordTimestamp) -> Self {
        Self::new(version, name, 0o40555, nlink, stamp)
    }

    pub fn for_file(version: RockRidgeVersion, name: Option<String>, nlink: u32,
                    mode: u32, stamp: RecordTimestamp) -> Self {
        Self::new(version, name, mode, nlink, stamp)
    }

    pub fn for_symlink(version: RockRidgeVersion, name: String,
                       components: Vec<SlComponent>, stamp: RecordTimestamp) -> Self {
        let mut rr = Self::new(version, Some(name), 0o120555, 1, stamp);
        rr.symlink = Some(components);
        rr
    }

    fn new(version: RockRidgeVersion, name: Option<String>, mode: u32, nlink: u32,
           stamp: RecordTimestamp) -> Self {
        Self {
            version,
            name,
            mode,
            nlink,
            uid: 0,
            gid: 0,
            serial: 0,
            tf_flags: TfFlags::MODIFY | TfFlags::ACCESS | TfFlags::ATTRIBUTES,
            stamps: vec![stamp; 3],
            symlink: None,
            first_dot: false,
            child_link: false,
            parent_link: false,
            relocated: false,
        }
    }

    fn presence(&self) -> RrPresence {
        let mut presence = RrPresence::PX;
        if !self.stamps.is_empty() {
            presence |= RrPresence::TF;
        }
        if self.name.is_some() {
            presence |= RrPresence::NM;
        }
        if self.symlink.is_some() {
            presence |= RrPresence::SL;
        }
        if self.child_link {
            presence |= RrPresence::CL;
        }
        if self.parent_link {
            presence |= RrPresence::PL;
        }
        if self.relocated {
            presence |= RrPresence::RE;
        }
        presence
    }

    fn er_record(version: RockRidgeVersion) -> SuspRecord {
        match version {
            RockRidgeVersion::V1_09 => SuspRecord::Er {
                ext_id: b"RRIP_1991A".to_vec(),
                ext_des: b"THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS".to_vec(),
                ext_src: b"PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  SEE PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR FOR CONTACT INFORMATION.".to_vec(),
                ext_ver: 1,
            },
            RockRidgeVersion::V1_12 => SuspRecord::Er {
                ext_id: b"IEEE_P1282".to_vec(),
                ext_des: b"THE IEEE P1282 PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS.".to_vec(),
                ext_src: b"PLEASE CONTACT THE IEEE STANDARDS DEPARTMENT, PISCATAWAY, NJ, USA FOR THE P1282 SPECIFICATION.".to_vec(),
                ext_ver: 1,
            },
        }
    }

    /// The record sequence, in canonical order, without CE bookkeeping.
    fn records(&self, links: &RelocationExtents) -> Vec<SuspRecord> {
        let mut records = Vec::new();
        if self.first_dot {
            records.push(SuspRecord::Sp { skip: 0 });
        }
        if self.version == RockRidgeVersion::V1_09 {
            records.push(SuspRecord::Rr { presence: self.presence() });
        }
        if let Some(name) = &self.name {
            records.push(SuspRecord::Nm {
                flags: NameFlags::empty(),
                name: name.as_bytes().to_vec(),
            });
        }
        records.push(SuspRecord::Px {
            mode: self.mode,
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            serial: match self.version {
                RockRidgeVersion::V1_09 => None,
                RockRidgeVersion::V1_12 => Some(self.serial),
            },
        });
        if let Some(components) = &self.symlink {
            records.push(SuspRecord::Sl {
                flags: NameFlags::empty(),
                components: components
                    .iter()
                    .map(|c| (NameFlags::empty(), c.clone()))
                    .collect(),
            });
        }
        if self.child_link {
            records.push(SuspRecord::Cl { child_extent: links.child_extent });
        }
        if self.parent_link {
            records.push(SuspRecord::Pl { parent_extent: links.parent_extent });
        }
        if self.relocated {
            records.push(SuspRecord::Re);
        }
        if !self.stamps.is_empty() {
            records.push(SuspRecord::Tf {
                flags: self.tf_flags,
                stamps: self.stamps.clone(),
            });
        }
        records
    }

    /// Serialises the annotation into an inline area and a continuation
    /// spill, honoring the record cap.
    ///
    /// `base_len` is the encoded directory record length without any system
    /// use (33 + identifier + pad); `xa_len` is reserved after the SUSP
    /// data. The CE record, when one is emitted, carries placeholder
    /// block/offset values that [`patch_ce`] rewrites once the planner has
    /// placed the continuation area.
    pub fn build(&self, base_len: usize, xa_len: usize,
                 links: &RelocationExtents) -> Result<BuiltSusp> {
        let capacity = crate::dirrec::MAX_RECORD_LEN
            .checked_sub(base_len + xa_len)
            .ok_or_else(|| Error::internal("directory record base exceeds the SUSP cap"))?;

        let records = self.records(links);
        let er = self.first_dot.then(|| Self::er_record(self.version));

        let inline_budget = records.iter().map(SuspRecord::encoded_len).sum::<usize>();
        let needs_ce = er.is_some()
            || inline_budget > capacity;

        let mut inline = Vec::new();
        let mut spill = Vec::new();
        let mut ce_at = None;

        if !needs_ce {
            for record in &records {
                record.encode_into(&mut inline);
            }
        } else {
            let inline_cap = capacity
                .checked_sub(28)
                .ok_or_else(|| Error::invalid_input(
                    "identifier leaves no room for Rock Ridge data",
                ))?;
            let mut spilling = false;
            for record in records {
                let len = record.encoded_len();
                if !spilling && inline.len() + len <= inline_cap {
                    record.encode_into(&mut inline);
                    continue;
                }
                if !spilling {
                    spilling = true;
                    // try to split a name-bearing record across the boundary
                    let room = inline_cap - inline.len();
                    match record {
                        SuspRecord::Nm { flags, name } if room > 5 => {
                            let head = room - 5;
                            SuspRecord::Nm {
                                flags: flags | NameFlags::CONTINUE,
                                name: name[..head].to_vec(),
                            }.encode_into(&mut inline);
                            SuspRecord::Nm {
                                flags,
                                name: name[head..].to_vec(),
                            }.encode_into(&mut spill);
                            continue;
                        },
                        SuspRecord::Sl { flags, components } if room > 5 => {
                            let mut head = Vec::new();
                            let mut used = 5;
                            let mut rest = components.into_iter().peekable();
                            while let Some((_, c)) = rest.peek() {
                                if used + c.encoded_len() > room {
                                    break;
                                }
                                let (f, c) = rest.next().unwrap();
                                used += c.encoded_len();
                                head.push((f, c));
                            }
                            let tail: Vec<_> = rest.collect();
                            if !head.is_empty() && !tail.is_empty() {
                                SuspRecord::Sl {
                                    flags: flags | NameFlags::CONTINUE,
                                    components: head,
                                }.encode_into(&mut inline);
                                SuspRecord::Sl { flags, components: tail }
                                    .encode_into(&mut spill);
                            } else {
                                SuspRecord::Sl {
                                    flags,
                                    components: head.into_iter().chain(tail).collect(),
                                }.encode_into(&mut spill);
                            }
                            continue;
                        },
                        other => other.encode_into(&mut spill),
                    }
                } else {
                    record.encode_into(&mut spill);
                }
            }
            if let Some(er) = er {
                er.encode_into(&mut spill);
            }
            ce_at = Some(inline.len());
            SuspRecord::Ce { block: 0, offset: 0, length: spill.len() as u32 }
                .encode_into(&mut inline);
        }

        Ok(BuiltSusp { inline, ce_at, spill })
    }
}

/// Extent numbers a CL or PL record must reference, known only after
/// planning.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RelocationExtents {
    pub child_extent: u32,
    pub parent_extent: u32,
}

/// The output of [`RockRidge::build`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BuiltSusp {
    /// Bytes for the directory record's system use area.
    pub inline: Vec<u8>,
    /// Offset of the CE record inside `inline`, when one was emitted.
    pub ce_at: Option<usize>,
    /// Bytes destined for the continuation area.
    pub spill: Vec<u8>,
}
impl BuiltSusp {
    /// Rewrites the CE record with the placed continuation location.
    pub fn patch_ce(inline: &mut [u8], ce_at: usize, block: u32, offset: u32) {
        write_both_u32(&mut inline[ce_at+4..ce_at+12], block);
        write_both_u32(&mut inline[ce_at+12..ce_at+20], offset);
    }
}

/// Reassembles a facet-level [`RockRidge`] from decoded records.
///
/// Out-of-order input is tolerated and normalised; duplicate NM/SL
/// continuation records are concatenated in order of appearance.
pub fn assemble(records: &[SuspRecord], version: RockRidgeVersion) -> Result<Option<RockRidge>> {
    let mut rr = RockRidge {
        version,
        name: None,
        mode: 0,
        nlink: 0,
        uid: 0,
        gid: 0,
        serial: 0,
        tf_flags: TfFlags::empty(),
        stamps: Vec::new(),
        symlink: None,
        first_dot: false,
        child_link: false,
        parent_link: false,
        relocated: false,
    };
    let mut saw_any = false;
    let mut name_bytes: Vec<u8> = Vec::new();
    let mut saw_name = false;

    for record in records {
        match record {
            SuspRecord::Sp { .. } => rr.first_dot = true,
            SuspRecord::Px { mode, nlink, uid, gid, serial } => {
                saw_any = true;
                rr.mode = *mode;
                rr.nlink = *nlink;
                rr.uid = *uid;
                rr.gid = *gid;
                rr.serial = serial.unwrap_or(0);
                if serial.is_some() {
                    rr.version = RockRidgeVersion::V1_12;
                }
            },
            SuspRecord::Nm { flags, name } => {
                saw_any = true;
                if flags.contains(NameFlags::CURRENT) || flags.contains(NameFlags::PARENT) {
                    continue;
                }
                saw_name = true;
                name_bytes.extend_from_slice(name);
            },
            SuspRecord::Sl { components, .. } => {
                saw_any = true;
                let target = rr.symlink.get_or_insert_with(Vec::new);
                for (_, component) in components {
                    target.push(component.clone());
                }
            },
            SuspRecord::Tf { flags, stamps } => {
                saw_any = true;
                rr.tf_flags = *flags;
                rr.stamps = stamps.clone();
            },
            SuspRecord::Cl { .. } => {
                saw_any = true;
                rr.child_link = true;
            },
            SuspRecord::Pl { .. } => {
                saw_any = true;
                rr.parent_link = true;
            },
            SuspRecord::Re => {
                saw_any = true;
                rr.relocated = true;
            },
            SuspRecord::Rr { .. } => {
                saw_any = true;
                rr.version = RockRidgeVersion::V1_09;
            },
            SuspRecord::Er { ext_id, .. } => {
                if ext_id == b"RRIP_1991A" {
                    rr.version = RockRidgeVersion::V1_09;
                } else if ext_id == b"IEEE_P1282" {
                    rr.version = RockRidgeVersion::V1_12;
                }
            },
            SuspRecord::Ce { .. } | SuspRecord::Es { .. } | SuspRecord::Pn { .. }
            | SuspRecord::Sf { .. } | SuspRecord::Unknown { .. } => {},
        }
    }

    if !saw_any {
        return Ok(None);
    }
    if saw_name {
        let name = String::from_utf8(name_bytes)
            .map_err(|_| Error::invalid_iso("Rock Ridge NM chain is not valid UTF-8"))?;
        rr.name = Some(name);
    }
    Ok(Some(rr))
}
