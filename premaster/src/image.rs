//! The authoring surface.
//!
//! A [`DiscImage`] holds one logical tree projected into the enabled
//! namespaces, an optional source stream for lazily-read content, and the
//! memoised extent plan. Every mutation validates its preconditions
//! completely before touching the tree, so a failed call leaves the
//! instance exactly as it found it.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::datetime::{RecordTimestamp, VolumeTimestamp};
use crate::eltorito::{BootMedia, ISOLINUX_SIGNATURE, PlatformId, check_hdemul_image};
use crate::error::{Error, Result};
use crate::ident::{
    check_a_characters, check_d_characters, encode_joliet_identifier,
    validate_directory_identifier, validate_file_identifier, validate_rr_name,
    validate_udf_name,
};
use crate::isohybrid::IsohybridMbr;
use crate::plan::{self, Plan};
use crate::susp::{RockRidge, RockRidgeVersion, SlComponent};
use crate::tree::{Arena, ContentSource, FacetId, Namespace, NodeId, NodeKind};
use crate::vd::BLOCK_SIZE;
use crate::writer;


/// The source stream bound; any seekable reader works.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// UDF revisions the bridge writer can produce.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UdfRevision {
    V2_60,
}
impl UdfRevision {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "2.60" => Some(Self::V2_60),
            _ => None,
        }
    }
}

/// Creation-time configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscOptions {
    /// ECMA-119 interchange level, 1 through 4.
    pub interchange_level: u8,
    /// Joliet level (1, 2 or 3), or `None` to skip the supplementary tree.
    pub joliet: Option<u8>,
    pub rock_ridge: Option<RockRidgeVersion>,
    pub udf: Option<UdfRevision>,
    /// Record CD-ROM XA extensions.
    pub xa: bool,
    /// System identifier, up to 32 a-characters.
    pub system_identifier: String,
    /// Volume identifier, up to 32 d-characters.
    pub volume_identifier: String,
    /// Volume set identifier, up to 128 d-characters.
    pub volume_set_identifier: String,
    /// Application use area, up to 512 bytes (141 with XA).
    pub application_use: Vec<u8>,
    pub set_size: u16,
    pub seqnum: u16,
    /// Re-plan after every mutation instead of before the next write.
    pub always_consistent: bool,
}
impl Default for DiscOptions {
    fn default() -> Self {
        Self {
            interchange_level: 1,
            joliet: None,
            rock_ridge: None,
            udf: None,
            xa: false,
            system_identifier: String::new(),
            volume_identifier: String::new(),
            volume_set_identifier: String::new(),
            application_use: Vec::new(),
            set_size: 1,
            seqnum: 1,
            always_consistent: false,
        }
    }
}

/// A path in one specific namespace.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PathRef<'p> {
    Iso(&'p str),
    Joliet(&'p str),
    RockRidge(&'p str),
    Udf(&'p str),
}

/// Per-namespace names for an object being added.
///
/// `rr` is the POSIX name recorded in the Rock Ridge overlay of the ISO
/// facet, not a separate path.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Location<'p> {
    pub iso: Option<&'p str>,
    pub joliet: Option<&'p str>,
    pub rr: Option<&'p str>,
    pub udf: Option<&'p str>,
}
impl<'p> Location<'p> {
    pub fn iso(path: &'p str) -> Self {
        Self {
            iso: Some(path),
            ..Self::default()
        }
    }

    pub fn with_joliet(mut self, path: &'p str) -> Self {
        self.joliet = Some(path);
        self
    }

    pub fn with_rr(mut self, name: &'p str) -> Self {
        self.rr = Some(name);
        self
    }

    pub fn with_udf(mut self, path: &'p str) -> Self {
        self.udf = Some(path);
        self
    }

    fn is_empty(&self) -> bool {
        self.iso.is_none() && self.joliet.is_none() && self.udf.is_none()
    }
}

/// The source of a new hard link.
#[derive(Clone, Copy, Debug)]
pub enum LinkSource<'p> {
    Path(PathRef<'p>),
    /// Link the El Torito boot catalog back into a tree.
    BootCatalog,
}

/// Boot media emulation requested for an El Torito entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Emulation {
    NoEmulation,
    Floppy,
    HardDisk,
}
impl Emulation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nobootemul" => Some(Self::NoEmulation),
            "floppy" => Some(Self::Floppy),
            "hdemul" => Some(Self::HardDisk),
            _ => None,
        }
    }
}

/// Parameters of [`DiscImage::add_eltorito`].
#[derive(Clone, Copy, Debug)]
pub struct ElToritoOptions<'p> {
    /// ISO path of an already-added boot file.
    pub boot_path: &'p str,
    /// Names under which the boot catalog appears; `None` after the first
    /// entry, which created it.
    pub catalog: Option<Location<'p>>,
    pub media: Emulation,
    /// Count of 512-byte virtual sectors to load; defaulted per media
    /// when `None`.
    pub load_size: Option<u16>,
    pub load_segment: u16,
    pub system_type: u8,
    /// Patch the isolinux boot info table into the file on write.
    pub boot_info_table: bool,
    pub bootable: bool,
    pub platform_id: PlatformId,
}
impl<'p> ElToritoOptions<'p> {
    pub fn new(boot_path: &'p str, catalog: Location<'p>) -> Self {
        Self {
            boot_path,
            catalog: Some(catalog),
            media: Emulation::NoEmulation,
            load_size: None,
            load_segment: 0,
            system_type: 0,
            boot_info_table: false,
            bootable: true,
            platform_id: PlatformId::X86,
        }
    }
}

/// A read-only view of one directory record.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    pub name: String,
    pub is_dir: bool,
    pub length: u64,
    pub extent: u32,
    pub hidden: bool,
    pub rr_name: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) facet: FacetId,
}

/// Identifier fields of one side of the volume descriptor set.
#[derive(Clone, Debug)]
pub(crate) struct SideMeta {
    pub system_identifier: [u8; 32],
    pub volume_identifier: [u8; 32],
    pub volume_set_identifier: [u8; 128],
    pub publisher_identifier: [u8; 128],
    pub data_preparer_identifier: [u8; 128],
    pub application_identifier: [u8; 128],
    pub copyright_file_identifier: [u8; 37],
    pub abstract_file_identifier: [u8; 37],
    pub bibliographic_file_identifier: [u8; 37],
    pub app_use: [u8; 512],
}
impl SideMeta {
    fn blank() -> Self {
        Self {
            system_identifier: [b' '; 32],
            volume_identifier: [b' '; 32],
            volume_set_identifier: [b' '; 128],
            publisher_identifier: [b' '; 128],
            data_preparer_identifier: [b' '; 128],
            application_identifier: [b' '; 128],
            copyright_file_identifier: [b' '; 37],
            abstract_file_identifier: [b' '; 37],
            bibliographic_file_identifier: [b' '; 37],
            app_use: [0u8; 512],
        }
    }

    /// A blank side with every text field in UCS-2BE, for the Joliet
    /// descriptor.
    fn blank_ucs2() -> Self {
        fn spaces<const SIZE: usize>() -> [u8; SIZE] {
            let mut buf = [0u8; SIZE];
            let mut at = 0;
            while at + 1 < SIZE {
                buf[at] = 0x00;
                buf[at + 1] = b' ';
                at += 2;
            }
            buf
        }
        Self {
            system_identifier: spaces(),
            volume_identifier: spaces(),
            volume_set_identifier: spaces(),
            publisher_identifier: spaces(),
            data_preparer_identifier: spaces(),
            application_identifier: spaces(),
            copyright_file_identifier: spaces(),
            abstract_file_identifier: spaces(),
            bibliographic_file_identifier: spaces(),
            app_use: [0u8; 512],
        }
    }
}

/// Everything the volume descriptors carry beyond layout numbers.
#[derive(Clone, Debug)]
pub(crate) struct VolumeMeta {
    pub primary: SideMeta,
    pub joliet: Option<SideMeta>,
    pub creation: VolumeTimestamp,
    pub modification: VolumeTimestamp,
    pub expiration: VolumeTimestamp,
    pub effective: VolumeTimestamp,
    pub set_size: u16,
    pub seqnum: u16,
    pub num_pvds: u32,
    pub stamp: RecordTimestamp,
}

/// One El Torito boot entry as authored.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ElToritoEntry {
    pub node: NodeId,
    pub bootable: bool,
    pub media: BootMedia,
    pub load_size: u16,
    pub load_segment: u16,
    pub system_type: u8,
    pub boot_info_table: bool,
    /// `None` marks the initial entry; sections carry their platform.
    pub platform_id: Option<PlatformId>,
}

#[derive(Clone, Debug)]
pub(crate) struct ElTorito {
    pub catalog_node: NodeId,
    pub platform_id: PlatformId,
    pub entries: Vec<ElToritoEntry>,
}

/// An optical-disc filesystem image being authored or edited.
pub struct DiscImage<'src> {
    pub(crate) opts: DiscOptions,
    pub(crate) volume: VolumeMeta,
    pub(crate) arena: Arena,
    pub(crate) eltorito: Option<ElTorito>,
    pub(crate) isohybrid: Option<IsohybridMbr>,
    pub(crate) system_area: Option<Vec<u8>>,
    pub(crate) source: Option<Box<dyn ReadSeek + 'src>>,
    pub(crate) plan: Option<Plan>,
    pub(crate) stamp: RecordTimestamp,
}

fn pad_text<const SIZE: usize>(value: &str) -> [u8; SIZE] {
    let mut buf = [b' '; SIZE];
    let bytes = value.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf
}

fn ucs2_field<const SIZE: usize>(value: &str) -> Result<[u8; SIZE]> {
    let encoded = encode_joliet_identifier(value).unwrap_or_default();
    if encoded.len() > SIZE {
        return Err(Error::invalid_input(format!(
            "'{}' does not fit a {}-byte UCS-2 field", value, SIZE,
        )));
    }
    let mut out = [0u8; SIZE];
    let mut at = 0;
    while at + 1 < SIZE {
        out[at] = 0x00;
        out[at + 1] = b' ';
        at += 2;
    }
    out[..encoded.len()].copy_from_slice(&encoded);
    Ok(out)
}

impl<'src> DiscImage<'src> {
    /// Creates a fresh, empty image.
    pub fn new(opts: DiscOptions) -> Result<DiscImage<'static>> {
        if !(1..=4).contains(&opts.interchange_level) {
            return Err(Error::invalid_input(format!(
                "invalid interchange level {}", opts.interchange_level,
            )));
        }
        if let Some(level) = opts.joliet {
            if !(1..=3).contains(&level) {
                return Err(Error::invalid_input(format!(
                    "invalid Joliet level {}", level,
                )));
            }
        }
        if opts.system_identifier.len() > 32 {
            return Err(Error::invalid_input("system identifier is longer than 32 characters"));
        }
        check_a_characters(opts.system_identifier.as_bytes(), "system identifier")?;
        if opts.volume_identifier.len() > 32 {
            return Err(Error::invalid_input("volume identifier is longer than 32 characters"));
        }
        check_d_characters(opts.volume_identifier.as_bytes(), "volume identifier")?;
        if opts.volume_set_identifier.len() > 128 {
            return Err(Error::invalid_input(
                "volume set identifier is longer than 128 characters",
            ));
        }
        check_d_characters(opts.volume_set_identifier.as_bytes(), "volume set identifier")?;
        let app_use_cap = if opts.xa { 141 } else { 512 };
        if opts.application_use.len() > app_use_cap {
            return Err(Error::invalid_input(format!(
                "application use area is longer than {} bytes", app_use_cap,
            )));
        }
        if opts.set_size == 0 || opts.seqnum == 0 || opts.seqnum > opts.set_size {
            return Err(Error::invalid_input(format!(
                "sequence number {} does not fit a set of {}", opts.seqnum, opts.set_size,
            )));
        }

        let stamp = RecordTimestamp::now();
        let mut primary = SideMeta::blank();
        primary.system_identifier = pad_text(&opts.system_identifier);
        primary.volume_identifier = pad_text(&opts.volume_identifier);
        primary.volume_set_identifier = pad_text(&opts.volume_set_identifier);
        primary.app_use[..opts.application_use.len()]
            .copy_from_slice(&opts.application_use);
        if opts.xa {
            primary.app_use[141..149].copy_from_slice(b"CD-XA001");
        }

        let joliet = match opts.joliet {
            Some(_) => {
                let mut side = SideMeta::blank_ucs2();
                side.volume_identifier = ucs2_field(&opts.volume_identifier)?;
                side.volume_set_identifier = ucs2_field(&opts.volume_set_identifier)?;
                side.app_use[..opts.application_use.len()]
                    .copy_from_slice(&opts.application_use);
                Some(side)
            },
            None => None,
        };

        let now = VolumeTimestamp::now();
        let volume = VolumeMeta {
            primary,
            joliet,
            creation: now,
            modification: now,
            expiration: VolumeTimestamp::unspecified(),
            effective: VolumeTimestamp::unspecified(),
            set_size: opts.set_size,
            seqnum: opts.seqnum,
            num_pvds: 1,
            stamp,
        };

        let mut arena = Arena::default();
        arena.new_root(Namespace::Iso, stamp);
        if opts.joliet.is_some() {
            arena.new_root(Namespace::Joliet, stamp);
        }
        if opts.udf.is_some() {
            arena.new_root(Namespace::Udf, stamp);
        }

        let mut image = DiscImage {
            opts,
            volume,
            arena,
            eltorito: None,
            isohybrid: None,
            system_area: None,
            source: None,
            plan: None,
            stamp,
        };
        image.touched()?;
        Ok(image)
    }

    /// Reconstructs an image from a byte stream.
    pub fn open<R: ReadSeek + 'src>(source: R) -> Result<Self> {
        crate::parser::open(Box::new(source))
    }

    /// Releases the source stream.
    pub fn close(self) {}

    fn rock_ridge(&self) -> Result<RockRidgeVersion> {
        self.opts.rock_ridge.ok_or_else(|| {
            Error::invalid_input("Rock Ridge is not enabled on this image")
        })
    }

    fn namespace_enabled(&self, ns: Namespace) -> Result<()> {
        let enabled = match ns {
            Namespace::Iso => true,
            Namespace::Joliet => self.opts.joliet.is_some(),
            Namespace::Udf => self.opts.udf.is_some(),
        };
        if !enabled {
            return Err(Error::invalid_input(format!(
                "the {} namespace is not enabled on this image", ns.describe(),
            )));
        }
        Ok(())
    }

    fn resolve(&self, path: PathRef<'_>) -> Result<FacetId> {
        match path {
            PathRef::Iso(p) => self.arena.resolve(Namespace::Iso, p),
            PathRef::Joliet(p) => {
                self.namespace_enabled(Namespace::Joliet)?;
                self.arena.resolve(Namespace::Joliet, p)
            },
            PathRef::Udf(p) => {
                self.namespace_enabled(Namespace::Udf)?;
                self.arena.resolve(Namespace::Udf, p)
            },
            PathRef::RockRidge(p) => {
                self.rock_ridge()?;
                self.arena.resolve_rr(p)
            },
        }
    }

    /// Invalidate the plan after a mutation; in always-consistent mode,
    /// re-plan immediately.
    fn touched(&mut self) -> Result<()> {
        self.plan = None;
        if self.opts.always_consistent {
            self.ensure_planned()?;
        }
        Ok(())
    }

    fn ensure_planned(&mut self) -> Result<()> {
        if self.plan.is_none() {
            self.plan = Some(plan::plan(
                &mut self.arena,
                &self.opts,
                &self.volume,
                self.eltorito.as_ref(),
                self.isohybrid.as_ref(),
            )?);
        }
        Ok(())
    }

    /// Validates the per-namespace names of a new object and resolves its
    /// parent directories, without touching the tree.
    fn prepare_add(&self, location: &Location<'_>, directory: bool)
        -> Result<Vec<(Namespace, FacetId, Vec<u8>)>>
    {
        if location.is_empty() {
            return Err(Error::invalid_input(
                "at least one namespace path must be supplied",
            ));
        }
        if location.rr.is_some() {
            self.rock_ridge()?;
            if location.iso.is_none() {
                return Err(Error::invalid_input(
                    "a Rock Ridge name requires an ISO9660 path",
                ));
            }
        }
        if self.opts.rock_ridge.is_some() && location.iso.is_some() && location.rr.is_none() {
            return Err(Error::invalid_input(
                "a Rock Ridge image requires a Rock Ridge name for every ISO9660 entry",
            ));
        }
        if let Some(name) = location.rr {
            validate_rr_name(name)?;
        }

        let mut placements = Vec::new();
        if let Some(path) = location.iso {
            let (parent, ident) = self.arena.resolve_parent(Namespace::Iso, path)?;
            if directory {
                validate_directory_identifier(&ident, self.opts.interchange_level)?;
                let depth = self.arena.depth(parent) + 1;
                if self.opts.interchange_level < 4 && depth > 8
                    && self.opts.rock_ridge.is_none()
                {
                    return Err(Error::invalid_input(format!(
                        "'{}' exceeds the eight-level directory limit", path,
                    )));
                }
                if self.opts.interchange_level == 4 && path.len() > 255 {
                    return Err(Error::invalid_input(format!(
                        "'{}' exceeds the 255-byte path limit", path,
                    )));
                }
            } else {
                validate_file_identifier(&ident, self.opts.interchange_level)?;
            }
            if self.arena.child_by_ident(parent, &ident).is_some() {
                return Err(Error::invalid_input(format!(
                    "ISO9660 path '{}' already exists", path,
                )));
            }
            placements.push((Namespace::Iso, parent, ident));
        }
        if let Some(path) = location.joliet {
            self.namespace_enabled(Namespace::Joliet)?;
            let (parent, ident) = self.arena.resolve_parent(Namespace::Joliet, path)?;
            if self.arena.child_by_ident(parent, &ident).is_some() {
                return Err(Error::invalid_input(format!(
                    "Joliet path '{}' already exists", path,
                )));
            }
            placements.push((Namespace::Joliet, parent, ident));
        }
        if let Some(path) = location.udf {
            self.namespace_enabled(Namespace::Udf)?;
            let (parent, ident) = self.arena.resolve_parent(Namespace::Udf, path)?;
            validate_udf_name(&String::from_utf8_lossy(&ident))?;
            if self.arena.child_by_ident(parent, &ident).is_some() {
                return Err(Error::invalid_input(format!(
                    "UDF path '{}' already exists", path,
                )));
            }
            placements.push((Namespace::Udf, parent, ident));
        }
        Ok(placements)
    }

    fn attach_all(&mut self, node: NodeId, placements: Vec<(Namespace, FacetId, Vec<u8>)>,
                  rr: Option<RockRidge>) {
        for (ns, parent, ident) in placements {
            let facet = self.arena.attach_facet(node, ns, ident, Some(parent), self.stamp);
            if ns == Namespace::Iso {
                self.arena.facets[facet].rr = rr.clone();
            }
        }
    }

    /// Adds a file from an owned buffer.
    pub fn add_file(&mut self, content: Vec<u8>, location: &Location<'_>,
                    file_mode: Option<u32>) -> Result<()> {
        if file_mode.is_some() {
            self.rock_ridge()?;
        }
        let placements = self.prepare_add(location, false)?;
        let size = content.len() as u64;
        let rr = match (self.opts.rock_ridge, location.rr) {
            (Some(version), Some(name)) => Some(RockRidge::for_file(
                version,
                Some(name.to_owned()),
                1,
                file_mode.unwrap_or(0o100444),
                self.stamp,
            )),
            _ => None,
        };
        let node = self.arena.new_node(NodeKind::File {
            source: ContentSource::Buffer(content),
            size,
        });
        self.attach_all(node, placements, rr);
        debug!(size, "file added");
        self.touched()
    }

    /// Adds a file by reading `size` bytes from a stream now.
    pub fn add_fp<R: Read>(&mut self, mut reader: R, size: u64, location: &Location<'_>,
                           file_mode: Option<u32>) -> Result<()> {
        let mut content = vec![0u8; size as usize];
        reader.read_exact(&mut content)?;
        self.add_file(content, location, file_mode)
    }

    /// Adds a directory to every namespace named in `location`.
    pub fn add_directory(&mut self, location: &Location<'_>, hidden: bool) -> Result<()> {
        let mut placements = self.prepare_add(location, true)?;
        let rr = match (self.opts.rock_ridge, location.rr) {
            (Some(version), Some(name)) => Some(RockRidge::for_directory(
                version, Some(name.to_owned()), 2, self.stamp,
            )),
            _ => None,
        };

        // Rock Ridge deep-directory relocation: beyond depth eight the
        // physical directory moves under RR_MOVED and a placeholder with a
        // child link stays at the logical spot.
        let mut relocation = None;
        if let Some(at) = placements.iter().position(|(ns, parent, _)| {
            *ns == Namespace::Iso
                && self.opts.interchange_level < 4
                && self.arena.depth(*parent) + 1 > 8
        }) {
            let version = self.rock_ridge()?;
            let (_, logical_parent, ident) = placements.remove(at);
            // two relocated directories cannot share a name inside the
            // RR_MOVED bucket
            let existing_moved = self.arena.iso_root
                .and_then(|root| self.arena.child_by_ident(root, b"RR_MOVED"));
            if let Some(moved) = existing_moved {
                if self.arena.child_by_ident(moved, &ident).is_some() {
                    return Err(Error::invalid_input(format!(
                        "a relocated directory named {} already exists",
                        crate::ident::Escaped(&ident),
                    )));
                }
            }
            relocation = Some((version, logical_parent, ident));
        }

        let node = self.arena.new_node(NodeKind::Directory);
        for (ns, parent, ident) in &placements {
            let facet = self.arena.attach_facet(
                node, *ns, ident.clone(), Some(*parent), self.stamp,
            );
            if *ns == Namespace::Iso {
                self.arena.facets[facet].rr = rr.clone();
            }
            self.arena.facets[facet].hidden = hidden;
        }

        if let Some((version, logical_parent, ident)) = relocation {
            let moved_root = self.ensure_rr_moved(version)?;
            let real = self.arena.attach_facet(
                node, Namespace::Iso, ident.clone(), Some(moved_root), self.stamp,
            );
            let mut real_rr = rr.clone().unwrap_or_else(|| {
                RockRidge::for_directory(version, None, 2, self.stamp)
            });
            real_rr.relocated = true;
            self.arena.facets[real].rr = Some(real_rr);
            self.arena.facets[real].reloc_original_parent = Some(logical_parent);
            self.arena.facets[real].hidden = hidden;

            let holder = self.arena.attach_facet(
                node, Namespace::Iso, ident, Some(logical_parent), self.stamp,
            );
            let mut holder_rr = rr.unwrap_or_else(|| {
                RockRidge::for_directory(version, None, 2, self.stamp)
            });
            holder_rr.child_link = true;
            holder_rr.symlink = None;
            self.arena.facets[holder].rr = Some(holder_rr);
            self.arena.facets[holder].reloc_target = Some(real);
        }

        self.touched()
    }

    fn ensure_rr_moved(&mut self, version: RockRidgeVersion) -> Result<FacetId> {
        let root = self.arena.iso_root
            .ok_or_else(|| Error::internal("image has no ISO9660 root"))?;
        if let Some(existing) = self.arena.child_by_ident(root, b"RR_MOVED") {
            return Ok(existing);
        }
        let node = self.arena.new_node(NodeKind::Directory);
        let facet = self.arena.attach_facet(
            node, Namespace::Iso, b"RR_MOVED".to_vec(), Some(root), self.stamp,
        );
        self.arena.facets[facet].rr = Some(RockRidge::for_directory(
            version, Some("rr_moved".to_owned()), 2, self.stamp,
        ));
        Ok(facet)
    }

    /// Adds a symbolic link, visible through Rock Ridge (and optionally
    /// Joliet).
    pub fn add_symlink(&mut self, iso_path: &str, rr_name: &str, target: &str,
                       joliet_path: Option<&str>) -> Result<()> {
        let version = self.rock_ridge()?;
        validate_rr_name(rr_name)?;
        if target.is_empty() {
            return Err(Error::invalid_input("symlink target is empty"));
        }
        let location = Location {
            iso: Some(iso_path),
            joliet: joliet_path,
            rr: Some(rr_name),
            udf: None,
        };
        let placements = self.prepare_add(&location, false)?;
        let components = SlComponent::split_target(target);
        let rr = RockRidge::for_symlink(
            version, rr_name.to_owned(), components.clone(), self.stamp,
        );
        let node = self.arena.new_node(NodeKind::Symlink { target: components });
        self.attach_all(node, placements, Some(rr));
        self.touched()
    }

    /// Attaches another name to an existing node.
    pub fn add_hard_link(&mut self, source: LinkSource<'_>, location: &Location<'_>) -> Result<()> {
        let node = match source {
            LinkSource::Path(path) => {
                let facet = self.resolve(path)?;
                let node = self.arena.facets[facet].node;
                if self.arena.nodes[node].is_directory() {
                    return Err(Error::invalid_input(
                        "directories cannot be hard linked",
                    ));
                }
                node
            },
            LinkSource::BootCatalog => {
                self.eltorito.as_ref()
                    .map(|et| et.catalog_node)
                    .ok_or_else(|| Error::invalid_input(
                        "no El Torito boot catalog to link",
                    ))?
            },
        };
        let count = (location.iso.is_some() as u8)
            + (location.joliet.is_some() as u8)
            + (location.udf.is_some() as u8);
        if count != 1 {
            return Err(Error::invalid_input(
                "a hard link names exactly one new path",
            ));
        }
        let placements = self.prepare_add(location, false)?;
        let rr = match (self.opts.rock_ridge, location.rr) {
            (Some(version), Some(name)) => Some(RockRidge::for_file(
                version, Some(name.to_owned()), 1, 0o100444, self.stamp,
            )),
            _ => None,
        };
        self.attach_all(node, placements, rr);
        self.touched()
    }

    /// Removes one name; the node goes away with its last name.
    pub fn rm_hard_link(&mut self, path: PathRef<'_>) -> Result<()> {
        let facet = self.resolve(path)?;
        let node = self.arena.facets[facet].node;
        if self.arena.nodes[node].is_directory() {
            return Err(Error::invalid_input(
                "directories are removed with rm_directory, not rm_hard_link",
            ));
        }
        if self.arena.nodes[node].facets.len() == 1 {
            self.check_not_boot_referenced(node)?;
        }
        self.arena.remove_facet(facet);
        self.touched()
    }

    /// Removes a file from every namespace and releases its content.
    pub fn rm_file(&mut self, path: PathRef<'_>) -> Result<()> {
        let facet = self.resolve(path)?;
        let node = self.arena.facets[facet].node;
        match self.arena.nodes[node].kind {
            NodeKind::Directory => {
                return Err(Error::invalid_input(
                    "directories are removed with rm_directory",
                ));
            },
            NodeKind::BootCatalog => {
                return Err(Error::invalid_input(
                    "the boot catalog is removed with rm_eltorito",
                ));
            },
            _ => {},
        }
        self.check_not_boot_referenced(node)?;
        for facet in self.arena.nodes[node].facets.clone() {
            self.arena.remove_facet(facet);
        }
        self.touched()
    }

    fn check_not_boot_referenced(&self, node: NodeId) -> Result<()> {
        if let Some(et) = &self.eltorito {
            if et.entries.iter().any(|e| e.node == node) {
                return Err(Error::invalid_input(
                    "the file is referenced by the El Torito boot catalog; \
                     remove the boot entry first",
                ));
            }
        }
        Ok(())
    }

    /// Removes an empty directory facet from every namespace in which it
    /// was named.
    pub fn rm_directory(&mut self, location: &Location<'_>) -> Result<()> {
        if location.is_empty() {
            return Err(Error::invalid_input(
                "at least one namespace path must be supplied",
            ));
        }
        let mut to_remove = Vec::new();
        for path in [
            location.iso.map(PathRef::Iso),
            location.joliet.map(PathRef::Joliet),
            location.udf.map(PathRef::Udf),
        ].into_iter().flatten() {
            let facet = self.resolve(path)?;
            if self.arena.facets[facet].parent.is_none() {
                return Err(Error::invalid_input("the root directory cannot be removed"));
            }
            let target = self.arena.facets[facet].reloc_target.unwrap_or(facet);
            if !self.arena.node_of(target).is_directory() {
                return Err(Error::invalid_input(format!(
                    "'{}' is not a directory", self.arena.full_path(facet),
                )));
            }
            if !self.arena.facets[target].children.is_empty() {
                return Err(Error::invalid_input(format!(
                    "directory '{}' is not empty", self.arena.full_path(facet),
                )));
            }
            to_remove.push(facet);
            if target != facet {
                to_remove.push(target);
            }
            // a relocated directory takes its logical placeholder with it
            for (holder, f) in self.arena.facets.iter().enumerate() {
                if f.alive && f.reloc_target == Some(target) {
                    to_remove.push(holder);
                }
            }
        }
        to_remove.sort_unstable();
        to_remove.dedup();
        for facet in to_remove {
            self.arena.remove_facet(facet);
        }
        self.touched()
    }

    /// Registers an El Torito boot entry, creating the catalog on the
    /// first call.
    pub fn add_eltorito(&mut self, eltorito: &ElToritoOptions<'_>) -> Result<()> {
        let boot_facet = self.arena.resolve(Namespace::Iso, eltorito.boot_path)?;
        let boot_node = self.arena.facets[boot_facet].node;
        let size = match self.arena.nodes[boot_node].kind {
            NodeKind::File { size, .. } => size,
            _ => {
                return Err(Error::invalid_input(format!(
                    "'{}' is not a file", eltorito.boot_path,
                )));
            },
        };

        let media = match eltorito.media {
            Emulation::NoEmulation => BootMedia::NoEmulation,
            Emulation::Floppy => BootMedia::floppy_for_size(size)?,
            Emulation::HardDisk => {
                let content = self.read_node(boot_node)?;
                check_hdemul_image(&content)?;
                BootMedia::HardDisk
            },
        };
        let load_size = eltorito.load_size.unwrap_or(match media {
            BootMedia::NoEmulation => 4,
            _ => 1,
        });

        // the initial entry deduplicates by content: a section entry whose
        // bytes match it shares the existing extent
        let mut entry_node = boot_node;
        let initial_node = self.eltorito.as_ref().map(|et| et.entries[0].node);
        if let Some(initial) = initial_node {
            if initial != boot_node
                && self.read_node(boot_node)? == self.read_node(initial)?
            {
                entry_node = initial;
            }
        }

        let entry = ElToritoEntry {
            node: entry_node,
            bootable: eltorito.bootable,
            media,
            load_size,
            load_segment: eltorito.load_segment,
            system_type: eltorito.system_type,
            boot_info_table: eltorito.boot_info_table,
            platform_id: None,
        };

        match &mut self.eltorito {
            Some(existing) => {
                existing.check_catalog_room()?;
                let mut entry = entry;
                entry.platform_id = Some(eltorito.platform_id);
                existing.entries.push(entry);
            },
            None => {
                let catalog = eltorito.catalog.ok_or_else(|| Error::invalid_input(
                    "the first El Torito entry must name the boot catalog",
                ))?;
                let placements = self.prepare_add(&catalog, false)?;
                let rr = match (self.opts.rock_ridge, catalog.rr) {
                    (Some(version), Some(name)) => Some(RockRidge::for_file(
                        version, Some(name.to_owned()), 1, 0o100444, self.stamp,
                    )),
                    _ => None,
                };
                let catalog_node = self.arena.new_node(NodeKind::BootCatalog);
                self.arena.nodes[catalog_node].pinned = true;
                self.attach_all(catalog_node, placements, rr);
                self.eltorito = Some(ElTorito {
                    catalog_node,
                    platform_id: eltorito.platform_id,
                    entries: vec![entry],
                });
            },
        }
        self.touched()
    }

    /// Drops the boot catalog and every boot entry; boot files stay.
    pub fn rm_eltorito(&mut self) -> Result<()> {
        let et = self.eltorito.take().ok_or_else(|| {
            Error::invalid_input("the image has no El Torito boot catalog")
        })?;
        if self.isohybrid.is_some() {
            self.eltorito = Some(et);
            return Err(Error::invalid_input(
                "remove the isohybrid prelude before the boot catalog",
            ));
        }
        self.arena.nodes[et.catalog_node].pinned = false;
        for facet in self.arena.nodes[et.catalog_node].facets.clone() {
            self.arena.remove_facet(facet);
        }
        self.touched()
    }

    /// Installs the isohybrid MBR prelude.
    pub fn add_isohybrid(&mut self, mac: bool) -> Result<()> {
        let et = self.eltorito.as_ref().ok_or_else(|| Error::invalid_input(
            "isohybrid requires an El Torito boot entry",
        ))?;
        let initial = et.entries.first()
            .ok_or_else(|| Error::internal("El Torito state without entries"))?;
        if initial.load_size != 4 {
            return Err(Error::invalid_input(format!(
                "isohybrid requires a boot load size of 4, found {}", initial.load_size,
            )));
        }
        let initial_node = initial.node;
        let has_efi_or_mac_entry = et.entries.iter().any(|e| {
            e.platform_id == Some(PlatformId::Efi) || e.platform_id == Some(PlatformId::Mac)
        });
        let content = self.read_node(initial_node)?;
        if content.len() < 0x44 || content[0x40..0x44] != ISOLINUX_SIGNATURE {
            return Err(Error::invalid_input(
                "the boot file does not carry the isolinux signature at offset 0x40",
            ));
        }
        if mac && !has_efi_or_mac_entry {
            return Err(Error::invalid_input(
                "a Mac isohybrid requires an EFI or Mac boot entry",
            ));
        }
        self.isohybrid = Some(IsohybridMbr {
            mac,
            mbr_id: 0,
            part_slot: 0,
        });
        self.touched()
    }

    pub fn rm_isohybrid(&mut self) -> Result<()> {
        if self.isohybrid.take().is_none() {
            return Err(Error::invalid_input("the image has no isohybrid prelude"));
        }
        self.touched()
    }

    /// Sets the hidden flag on the named facet.
    pub fn set_hidden(&mut self, path: PathRef<'_>) -> Result<()> {
        let facet = self.resolve(path)?;
        self.arena.facets[facet].hidden = true;
        self.touched()
    }

    pub fn clear_hidden(&mut self, path: PathRef<'_>) -> Result<()> {
        let facet = self.resolve(path)?;
        self.arena.facets[facet].hidden = false;
        self.touched()
    }

    /// Appends a second Primary Volume Descriptor, kept byte-identical to
    /// the first.
    pub fn duplicate_pvd(&mut self) -> Result<()> {
        self.volume.num_pvds += 1;
        self.touched()
    }

    /// Runs the planner now instead of at the next write.
    pub fn force_consistency(&mut self) -> Result<()> {
        self.plan = None;
        self.ensure_planned()
    }

    /// Reads a file's content by path.
    pub fn get_file(&mut self, path: PathRef<'_>) -> Result<Vec<u8>> {
        let facet = self.resolve(path)?;
        let node = self.arena.facets[facet].node;
        match self.arena.nodes[node].kind {
            NodeKind::File { .. } => self.read_node(node),
            NodeKind::BootCatalog => {
                self.ensure_planned()?;
                let catalog = self.plan.as_ref()
                    .and_then(|plan| plan.catalog.as_ref())
                    .ok_or_else(|| Error::internal("boot catalog node without a catalog plan"))?;
                Ok(catalog.to_block().to_vec())
            },
            _ => Err(Error::invalid_input(format!(
                "'{}' has no readable file content", self.arena.full_path(facet),
            ))),
        }
    }

    /// The record view of one path.
    pub fn get_record(&mut self, path: PathRef<'_>) -> Result<Record> {
        self.ensure_planned()?;
        let facet = self.resolve(path)?;
        Ok(self.record_view(facet))
    }

    /// The records of a directory, in on-disc order, without '.' or '..'.
    pub fn list_children(&mut self, path: PathRef<'_>) -> Result<Vec<Record>> {
        self.ensure_planned()?;
        let facet = self.resolve(path)?;
        let dir = self.arena.facets[facet].reloc_target.unwrap_or(facet);
        if !self.arena.node_of(dir).is_directory() {
            return Err(Error::invalid_input(format!(
                "'{}' is not a directory", self.arena.full_path(facet),
            )));
        }
        Ok(self.arena.facets[dir]
            .children
            .iter()
            .map(|&c| self.record_view(c))
            .collect())
    }

    /// The absolute path of a record in its own namespace.
    pub fn full_path(&self, record: &Record) -> String {
        self.arena.full_path(record.facet)
    }

    fn record_view(&self, facet: FacetId) -> Record {
        let f = &self.arena.facets[facet];
        let node = self.arena.node_of(facet);
        Record {
            name: self.arena.display_name(facet),
            is_dir: f.reloc_target.is_none() && node.is_directory(),
            length: node.content_len(),
            extent: f.extent,
            hidden: f.hidden,
            rr_name: f.rr.as_ref().and_then(|rr| rr.name.clone()),
            facet,
        }
    }

    fn read_node(&mut self, node: NodeId) -> Result<Vec<u8>> {
        match &self.arena.nodes[node].kind {
            NodeKind::File { source: ContentSource::Buffer(bytes), .. } => Ok(bytes.clone()),
            NodeKind::File { source: ContentSource::Stream { offset }, size } => {
                let (offset, size) = (*offset, *size);
                let source = self.source.as_mut().ok_or_else(|| Error::internal(
                    "stream-backed content without a source stream",
                ))?;
                source.seek(SeekFrom::Start(offset))?;
                let mut bytes = vec![0u8; size as usize];
                source.read_exact(&mut bytes)?;
                Ok(bytes)
            },
            _ => Err(Error::internal("node has no readable content")),
        }
    }

    /// Plans if needed, then emits the image.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        self.ensure_planned()?;
        let DiscImage {
            opts, volume, arena, isohybrid, system_area, source, plan, eltorito: _, stamp: _,
        } = self;
        let plan: &Plan = plan.as_ref().unwrap();
        writer::write_image(
            sink,
            plan,
            arena,
            opts,
            volume,
            isohybrid.as_ref(),
            system_area.as_deref(),
            |node| match &arena.nodes[node].kind {
                NodeKind::File { source: ContentSource::Buffer(bytes), .. } => Ok(bytes.clone()),
                NodeKind::File { source: ContentSource::Stream { offset }, size } => {
                    let reader = source.as_mut().ok_or_else(|| Error::internal(
                        "stream-backed content without a source stream",
                    ))?;
                    reader.seek(SeekFrom::Start(*offset))?;
                    let mut bytes = vec![0u8; *size as usize];
                    reader.read_exact(&mut bytes)?;
                    Ok(bytes)
                },
                _ => Err(Error::internal("node has no streamable content")),
            },
        )
    }

    /// The planned total image size in bytes.
    pub fn image_size(&mut self) -> Result<u64> {
        self.ensure_planned()?;
        Ok(self.plan.as_ref().unwrap().image_bytes)
    }
}

impl ElTorito {
    fn check_catalog_room(&self) -> Result<()> {
        // validation entry, initial entry, then a header per section entry
        let used = 2 + 2 * self.entries.len();
        if (used + 2) * 32 > BLOCK_SIZE {
            return Err(Error::invalid_input("El Torito boot catalog is full"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DiscImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscImage")
            .field("opts", &self.opts)
            .field("nodes", &self.arena.nodes.len())
            .field("planned", &self.plan.is_some())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_options() {
        assert!(DiscImage::new(DiscOptions {
            interchange_level: 5,
            ..DiscOptions::default()
        }).is_err());
        assert!(DiscImage::new(DiscOptions {
            joliet: Some(4),
            ..DiscOptions::default()
        }).is_err());
        assert!(DiscImage::new(DiscOptions {
            volume_identifier: "lower".to_owned(),
            ..DiscOptions::default()
        }).is_err());
        assert!(DiscImage::new(DiscOptions {
            seqnum: 2,
            ..DiscOptions::default()
        }).is_err());
        assert!(DiscImage::new(DiscOptions {
            xa: true,
            application_use: vec![0u8; 142],
            ..DiscOptions::default()
        }).is_err());
        assert!(DiscImage::new(DiscOptions::default()).is_ok());
    }

    #[test]
    fn test_namespace_gating() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        let err = iso.add_file(
            b"x".to_vec(),
            &Location::iso("/A.;1").with_joliet("/a"),
            None,
        );
        assert!(matches!(err, Err(Error::InvalidInput(_))));
        // the failed call must not have left a facet behind
        assert!(iso.get_record(PathRef::Iso("/A.;1")).is_err());

        let err = iso.add_file(b"x".to_vec(), &Location::iso("/A.;1").with_rr("a"), None);
        assert!(matches!(err, Err(Error::InvalidInput(_))));

        let err = iso.add_file(b"x".to_vec(), &Location::iso("/A.;1"), Some(0o444));
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_file(b"x".to_vec(), &Location::iso("/A.;1"), None).unwrap();
        assert!(iso.add_file(b"y".to_vec(), &Location::iso("/A.;1"), None).is_err());
        iso.add_directory(&Location::iso("/DIR1"), false).unwrap();
        assert!(iso.add_directory(&Location::iso("/DIR1"), false).is_err());
    }

    #[test]
    fn test_rm_directory_requires_empty() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_directory(&Location::iso("/DIR1"), false).unwrap();
        iso.add_file(b"x".to_vec(), &Location::iso("/DIR1/A.;1"), None).unwrap();
        assert!(iso.rm_directory(&Location::iso("/DIR1")).is_err());
        iso.rm_file(PathRef::Iso("/DIR1/A.;1")).unwrap();
        iso.rm_directory(&Location::iso("/DIR1")).unwrap();
        assert!(iso.get_record(PathRef::Iso("/DIR1")).is_err());
    }

    #[test]
    fn test_root_is_not_removable() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        assert!(iso.rm_directory(&Location::iso("/")).is_err());
    }

    #[test]
    fn test_hard_links_share_content() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_file(b"shared".to_vec(), &Location::iso("/A.;1"), None).unwrap();
        iso.add_hard_link(
            LinkSource::Path(PathRef::Iso("/A.;1")),
            &Location::iso("/B.;1"),
        ).unwrap();
        assert_eq!(iso.get_file(PathRef::Iso("/B.;1")).unwrap(), b"shared");

        iso.rm_hard_link(PathRef::Iso("/A.;1")).unwrap();
        assert_eq!(iso.get_file(PathRef::Iso("/B.;1")).unwrap(), b"shared");
        assert!(iso.get_file(PathRef::Iso("/A.;1")).is_err());
    }

    #[test]
    fn test_deep_directories_require_rock_ridge() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        let mut path = String::new();
        for depth in 1..=7 {
            path.push_str(&format!("/D{}", depth));
            iso.add_directory(&Location::iso(&path), false).unwrap();
        }
        path.push_str("/D8");
        assert!(iso.add_directory(&Location::iso(&path), false).is_err());
    }

    #[test]
    fn test_deep_directory_relocates_with_rock_ridge() {
        let mut iso = DiscImage::new(DiscOptions {
            rock_ridge: Some(RockRidgeVersion::V1_09),
            ..DiscOptions::default()
        }).unwrap();
        let mut path = String::new();
        for depth in 1..=8 {
            path.push_str(&format!("/D{}", depth));
            let rr = format!("d{}", depth);
            iso.add_directory(&Location::iso(&path).with_rr(&rr), false).unwrap();
        }
        // the physical home of D8 is under RR_MOVED
        assert!(iso.get_record(PathRef::Iso("/RR_MOVED/D8")).is_ok());
        // the logical Rock Ridge path still resolves
        assert!(iso.get_record(PathRef::RockRidge("/d1/d2/d3/d4/d5/d6/d7/d8")).is_ok());
    }

    #[test]
    fn test_eltorito_protects_boot_file() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_file(b"boot\n".to_vec(), &Location::iso("/BOOT.;1"), None).unwrap();
        iso.add_eltorito(&ElToritoOptions::new(
            "/BOOT.;1", Location::iso("/BOOT.CAT;1"),
        )).unwrap();
        assert!(iso.rm_file(PathRef::Iso("/BOOT.;1")).is_err());
        iso.rm_eltorito().unwrap();
        iso.rm_file(PathRef::Iso("/BOOT.;1")).unwrap();
    }

    #[test]
    fn test_isohybrid_validates_signature() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        let mut boot = vec![0u8; 2048];
        iso.add_file(boot.clone(), &Location::iso("/ISOLINUX.BIN;1"), None).unwrap();
        iso.add_eltorito(&ElToritoOptions {
            load_size: Some(4),
            ..ElToritoOptions::new("/ISOLINUX.BIN;1", Location::iso("/BOOT.CAT;1"))
        }).unwrap();
        assert!(iso.add_isohybrid(false).is_err());

        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        boot[0x40..0x44].copy_from_slice(&ISOLINUX_SIGNATURE);
        iso.add_file(boot, &Location::iso("/ISOLINUX.BIN;1"), None).unwrap();
        iso.add_eltorito(&ElToritoOptions {
            load_size: Some(4),
            ..ElToritoOptions::new("/ISOLINUX.BIN;1", Location::iso("/BOOT.CAT;1"))
        }).unwrap();
        iso.add_isohybrid(false).unwrap();
        assert_eq!(iso.image_size().unwrap(), 1_048_576);
    }

    #[test]
    fn test_hidden_flag_round_trip_in_tree() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_file(b"x".to_vec(), &Location::iso("/A.;1"), None).unwrap();
        iso.set_hidden(PathRef::Iso("/A.;1")).unwrap();
        assert!(iso.get_record(PathRef::Iso("/A.;1")).unwrap().hidden);
        iso.clear_hidden(PathRef::Iso("/A.;1")).unwrap();
        assert!(!iso.get_record(PathRef::Iso("/A.;1")).unwrap().hidden);
    }

    #[test]
    fn test_floppy_media_validation() {
        let mut iso = DiscImage::new(DiscOptions::default()).unwrap();
        iso.add_file(vec![0u8; 1000], &Location::iso("/FLOPPY.;1"), None).unwrap();
        let err = iso.add_eltorito(&ElToritoOptions {
            media: Emulation::Floppy,
            ..ElToritoOptions::new("/FLOPPY.;1", Location::iso("/BOOT.CAT;1"))
        });
        assert!(err.is_err());

        iso.add_file(vec![0u8; 1440 * 1024], &Location::iso("/OK.;1"), None).unwrap();
        iso.add_eltorito(&ElToritoOptions {
            media: Emulation::Floppy,
            ..ElToritoOptions::new("/OK.;1", Location::iso("/BOOT.CAT;1"))
        }).unwrap();
    }
}
