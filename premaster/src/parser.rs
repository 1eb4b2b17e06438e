//! Reconstructing an image from its bytes.
//!
//! The opener reads the volume descriptor set from block 16, walks every
//! reachable directory tree, reassembles Rock Ridge annotations (chasing
//! CE records into their continuation areas), loads the El Torito catalog
//! and the UDF bridge structures, and leaves the instance in a state that
//! writes back the same bytes it read, provided the image came from this
//! crate.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::dirrec::{DirectoryRecord, FileFlags, XA_RECORD_LEN, XaRecord};
use crate::eltorito::BootCatalog;
use crate::error::{Error, Result};
use crate::image::{
    DiscImage, DiscOptions, ElTorito, ElToritoEntry, ReadSeek, SideMeta, UdfRevision,
    VolumeMeta,
};
use crate::isohybrid::IsohybridMbr;
use crate::ptable;
use crate::susp::{self, RockRidgeVersion, SuspRecord};
use crate::tree::{Arena, ContentSource, FacetId, Namespace, NodeId, NodeKind};
use crate::udf;
use crate::vd::{
    BLOCK_SIZE, BootRecordDescriptor, DescriptorType, VolumeDescriptor,
    VolumeDescriptorKind, classify,
};


struct Reader<'src> {
    source: Box<dyn ReadSeek + 'src>,
}
impl<'src> Reader<'src> {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.source.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_block(&mut self, lba: u32) -> Result<Vec<u8>> {
        self.read_at(u64::from(lba) * BLOCK_SIZE as u64, BLOCK_SIZE)
    }
}

/// Everything gathered from the descriptor set.
struct Descriptors {
    pvds: Vec<(Vec<u8>, VolumeDescriptor)>,
    svd: Option<VolumeDescriptor>,
    enhanced: bool,
    boot_record: Option<BootRecordDescriptor>,
    terminator_lba: u32,
}

fn read_descriptors(reader: &mut Reader<'_>) -> Result<Descriptors> {
    let mut pvds = Vec::new();
    let mut svd = None;
    let mut enhanced = false;
    let mut boot_record = None;

    let mut lba = 16u32;
    loop {
        let block = reader.read_block(lba)?;
        match classify(&block)? {
            DescriptorType::Primary => {
                let vd = VolumeDescriptor::parse(&block, DescriptorType::Primary)?;
                pvds.push((block, vd));
            },
            DescriptorType::SupplementaryOrEnhanced => {
                let vd = VolumeDescriptor::parse(&block, DescriptorType::SupplementaryOrEnhanced)?;
                match vd.kind {
                    VolumeDescriptorKind::Enhanced => enhanced = true,
                    _ => svd = Some(vd),
                }
            },
            DescriptorType::BootRecord => {
                boot_record = Some(BootRecordDescriptor::parse(&block)?);
            },
            DescriptorType::SetTerminator => {
                return Ok(Descriptors {
                    pvds,
                    svd,
                    enhanced,
                    boot_record,
                    terminator_lba: lba,
                });
            },
            other => {
                debug!(lba, ?other, "skipping unrecognised volume descriptor");
            },
        }
        lba += 1;
        if lba > 16 + 64 {
            return Err(Error::invalid_iso(
                "no volume descriptor set terminator within 64 blocks",
            ));
        }
    }
}

fn side_meta_from(vd: &VolumeDescriptor) -> SideMeta {
    SideMeta {
        system_identifier: vd.system_identifier,
        volume_identifier: vd.volume_identifier,
        volume_set_identifier: vd.volume_set_identifier,
        publisher_identifier: vd.publisher_identifier,
        data_preparer_identifier: vd.data_preparer_identifier,
        application_identifier: vd.application_identifier,
        copyright_file_identifier: vd.copyright_file_identifier,
        abstract_file_identifier: vd.abstract_file_identifier,
        bibliographic_file_identifier: vd.bibliographic_file_identifier,
        app_use: vd.app_use,
    }
}

/// The Rock Ridge details of one parsed record.
struct ParsedRr {
    rr: Option<crate::susp::RockRidge>,
    child_link_extent: Option<u32>,
}

/// Parses a record's system use area, following CE chains.
///
/// When the volume is flagged XA, the 14-byte XA extension sits after any
/// SUSP data and is stripped before decoding.
fn parse_rr(reader: &mut Reader<'_>, record: &DirectoryRecord,
            version: &mut Option<RockRidgeVersion>, xa: bool) -> Result<ParsedRr> {
    let mut area = record.system_use.clone();
    if xa && area.len() >= XA_RECORD_LEN {
        let tail = area.len() - XA_RECORD_LEN;
        if XaRecord::parse(&area[tail..]).is_some() {
            area.truncate(tail);
        }
    }
    if area.is_empty() {
        return Ok(ParsedRr {
            rr: None,
            child_link_extent: None,
        });
    }

    let mut records = susp::parse_system_use(&area)?;
    // chase continuation areas; a chain longer than the record count
    // means a cycle
    let mut hops = 0;
    loop {
        let ce = records.iter().find_map(|r| match r {
            SuspRecord::Ce { block, offset, length } => Some((*block, *offset, *length)),
            _ => None,
        });
        let Some((block, offset, length)) = ce else {
            break;
        };
        records.retain(|r| !matches!(r, SuspRecord::Ce { .. }));
        let spill = reader.read_at(
            u64::from(block) * BLOCK_SIZE as u64 + u64::from(offset),
            length as usize,
        )?;
        records.extend(susp::parse_system_use(&spill)?);
        hops += 1;
        if hops > 32 {
            return Err(Error::invalid_iso("Rock Ridge CE chain does not terminate"));
        }
    }

    for r in &records {
        match r {
            SuspRecord::Er { ext_id, .. } => {
                if ext_id == b"RRIP_1991A" {
                    *version = Some(RockRidgeVersion::V1_09);
                } else if ext_id == b"IEEE_P1282" {
                    *version = Some(RockRidgeVersion::V1_12);
                }
            },
            SuspRecord::Rr { .. } if version.is_none() => {
                *version = Some(RockRidgeVersion::V1_09);
            },
            SuspRecord::Px { serial: Some(_), .. } if version.is_none() => {
                *version = Some(RockRidgeVersion::V1_12);
            },
            _ => {},
        }
    }

    let child_link_extent = records.iter().find_map(|r| match r {
        SuspRecord::Cl { child_extent } => Some(*child_extent),
        _ => None,
    });
    let rr = susp::assemble(&records, version.unwrap_or(RockRidgeVersion::V1_09))?;
    Ok(ParsedRr {
        rr,
        child_link_extent,
    })
}

/// One parsed directory walk.
struct WalkOutcome {
    /// (placeholder facet, child link extent)
    pending_relocations: Vec<(FacetId, u32)>,
    /// directory facets by extent
    dirs_by_extent: HashMap<u32, FacetId>,
    /// the lowest interchange level the observed identifiers fit
    level_needed: u8,
}

/// Walks one namespace's directory tree into the arena.
#[allow(clippy::too_many_arguments)]
fn walk_directories(
    reader: &mut Reader<'_>,
    arena: &mut Arena,
    ns: Namespace,
    root_extent: u32,
    root_len: u32,
    files_by_extent: &mut HashMap<(u32, u64), NodeId>,
    rr_version: &mut Option<RockRidgeVersion>,
    xa: bool,
) -> Result<WalkOutcome> {
    let root = arena.new_root(ns, Default::default());
    arena.facets[root].extent = root_extent;

    let mut outcome = WalkOutcome {
        pending_relocations: Vec::new(),
        dirs_by_extent: HashMap::new(),
        level_needed: 1,
    };
    outcome.dirs_by_extent.insert(root_extent, root);

    let mut stack = vec![(root, root_extent, root_len)];
    let mut visited = HashSet::new();
    visited.insert(root_extent);

    while let Some((dir, extent, len)) = stack.pop() {
        let bytes = reader.read_at(
            u64::from(extent) * BLOCK_SIZE as u64,
            len as usize,
        )?;
        let mut pos = 0;
        while pos < bytes.len() {
            let length = bytes[pos];
            if length == 0 {
                // an empty length byte means the rest of the logical
                // block is unused padding
                pos = (pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
                continue;
            }
            let record = DirectoryRecord::parse(&bytes, &mut pos, length)?;

            let parsed = if ns == Namespace::Iso {
                parse_rr(reader, &record, rr_version, xa)?
            } else {
                ParsedRr {
                    rr: None,
                    child_link_extent: None,
                }
            };

            if record.is_dot() {
                arena.facets[dir].stamp = record.recorded;
                continue;
            }
            if record.is_dotdot() {
                continue;
            }
            if ns == Namespace::Iso {
                let fits_level1 = if record.is_directory() {
                    crate::ident::validate_directory_identifier(&record.identifier, 1).is_ok()
                } else {
                    crate::ident::validate_file_identifier(&record.identifier, 1).is_ok()
                };
                if !fits_level1 {
                    outcome.level_needed = outcome.level_needed.max(3);
                }
            }

            let extent = record.extent.get();
            let data_len = record.data_len.get();
            let is_symlink = parsed.rr.as_ref().is_some_and(|rr| rr.symlink.is_some());
            let is_placeholder = parsed.child_link_extent.is_some();

            let facet = if record.is_directory() && !is_placeholder {
                if !visited.insert(extent) {
                    return Err(Error::invalid_iso(format!(
                        "directory extent {} appears twice in the tree", extent,
                    )));
                }
                let node = arena.new_node(NodeKind::Directory);
                let facet = arena.attach_facet(
                    node, ns, record.identifier.clone(), Some(dir), record.recorded,
                );
                outcome.dirs_by_extent.insert(extent, facet);
                stack.push((facet, extent, data_len));
                facet
            } else if is_symlink {
                let target = parsed.rr.as_ref()
                    .and_then(|rr| rr.symlink.clone())
                    .unwrap_or_default();
                let node = arena.new_node(NodeKind::Symlink { target });
                arena.attach_facet(
                    node, ns, record.identifier.clone(), Some(dir), record.recorded,
                )
            } else if is_placeholder {
                // resolved to its directory after the walk
                let node = arena.new_node(NodeKind::Directory);
                arena.attach_facet(
                    node, ns, record.identifier.clone(), Some(dir), record.recorded,
                )
            } else {
                let node = *files_by_extent
                    .entry((extent, u64::from(data_len)))
                    .or_insert_with(|| arena.new_node(NodeKind::File {
                        source: ContentSource::Stream {
                            offset: u64::from(extent) * BLOCK_SIZE as u64,
                        },
                        size: u64::from(data_len),
                    }));
                arena.attach_facet(
                    node, ns, record.identifier.clone(), Some(dir), record.recorded,
                )
            };

            arena.facets[facet].extent = extent;
            arena.facets[facet].hidden = record.flags.contains(FileFlags::HIDDEN);
            if let Some(rr) = parsed.rr {
                arena.facets[facet].rr = Some(rr);
            }
            if let Some(child_extent) = parsed.child_link_extent {
                outcome.pending_relocations.push((facet, child_extent));
            }
        }
    }
    Ok(outcome)
}

/// Wires relocation placeholders to the directories they stand in for.
fn resolve_relocations(arena: &mut Arena, outcome: &WalkOutcome) -> Result<()> {
    for &(placeholder, child_extent) in &outcome.pending_relocations {
        let target = *outcome.dirs_by_extent.get(&child_extent).ok_or_else(|| {
            Error::invalid_iso(format!(
                "relocation child link points at extent {}, which is no directory",
                child_extent,
            ))
        })?;
        // the placeholder's provisional node is dropped in favor of the
        // real directory's node
        let old_node = arena.facets[placeholder].node;
        let real_node = arena.facets[target].node;
        arena.nodes[old_node].facets.retain(|&f| f != placeholder);
        arena.facets[placeholder].node = real_node;
        arena.nodes[real_node].facets.push(placeholder);
        arena.facets[placeholder].reloc_target = Some(target);
        let logical_parent = arena.facets[placeholder].parent;
        arena.facets[target].reloc_original_parent = logical_parent;
    }
    Ok(())
}

/// Cross-checks a path table against the walked tree.
fn check_path_table(reader: &mut Reader<'_>, vd: &VolumeDescriptor,
                    outcome: &WalkOutcome) -> Result<()> {
    let size = vd.path_table_size.get() as usize;
    let le = reader.read_at(
        u64::from(vd.le_path_table_location) * BLOCK_SIZE as u64,
        size,
    )?;
    let records = ptable::parse_table(&le, size, true)?;
    if records.is_empty() {
        return Err(Error::invalid_iso("path table has no root record"));
    }
    for record in records.iter().skip(1) {
        if !outcome.dirs_by_extent.contains_key(&record.extent) {
            return Err(Error::invalid_iso(format!(
                "path table names directory extent {} that the tree does not reach",
                record.extent,
            )));
        }
    }
    Ok(())
}

/// Rebinds the facets of the catalog file to a pinned boot catalog node.
fn adopt_catalog(arena: &mut Arena, files_by_extent: &HashMap<(u32, u64), NodeId>,
                 catalog_extent: u32) -> Result<NodeId> {
    let catalog_node = arena.new_node(NodeKind::BootCatalog);
    arena.nodes[catalog_node].pinned = true;
    let file_node = files_by_extent
        .iter()
        .find(|((extent, _), _)| *extent == catalog_extent)
        .map(|(_, &node)| node);
    if let Some(file_node) = file_node {
        for facet in arena.nodes[file_node].facets.clone() {
            arena.facets[facet].node = catalog_node;
            arena.nodes[catalog_node].facets.push(facet);
        }
        arena.nodes[file_node].facets.clear();
    }
    Ok(catalog_node)
}

fn parse_eltorito(reader: &mut Reader<'_>, arena: &mut Arena,
                  files_by_extent: &HashMap<(u32, u64), NodeId>,
                  br: &BootRecordDescriptor) -> Result<ElTorito> {
    let block = reader.read_block(br.catalog_extent)?;
    let catalog = BootCatalog::parse(&block)?;
    let catalog_node = adopt_catalog(arena, files_by_extent, br.catalog_extent)?;

    let mut entries = Vec::new();
    let entry_of = |boot: &crate::eltorito::BootEntry, platform| -> Result<ElToritoEntry> {
        let node = files_by_extent
            .iter()
            .find(|((extent, _), _)| *extent == boot.load_rba)
            .map(|(_, &node)| node)
            .ok_or_else(|| Error::invalid_iso(format!(
                "boot entry points at extent {}, which is not a file", boot.load_rba,
            )))?;
        Ok(ElToritoEntry {
            node,
            bootable: boot.bootable,
            media: boot.media,
            load_size: boot.sector_count,
            load_segment: boot.load_segment,
            system_type: boot.system_type,
            boot_info_table: false,
            platform_id: platform,
        })
    };
    entries.push(entry_of(&catalog.initial, None)?);
    for section in &catalog.sections {
        for boot in &section.entries {
            entries.push(entry_of(boot, Some(section.platform_id))?);
        }
    }
    Ok(ElTorito {
        catalog_node,
        platform_id: catalog.validation.platform_id,
        entries,
    })
}

/// Finds and parses the UDF bridge structures, if any.
fn parse_udf(reader: &mut Reader<'_>, arena: &mut Arena,
             files_by_extent: &mut HashMap<(u32, u64), NodeId>,
             space_size: u32, after_terminator: u32) -> Result<Option<UdfRevision>> {
    let block = reader.read_block(after_terminator)?;
    if udf::classify_recognition(&block) != Some(*b"BEA01") {
        return Ok(None);
    }
    debug!("UDF volume recognition sequence found");

    let anchor = [udf::ANCHOR_LOCATION, space_size.saturating_sub(256), space_size - 1]
        .into_iter()
        .find_map(|lba| {
            let block = reader.read_block(lba).ok()?;
            udf::AnchorDescriptor::parse(&block).ok()
        })
        .ok_or_else(|| Error::invalid_iso("no UDF anchor volume descriptor pointer"))?;

    // scan the main sequence for the partition and logical volume
    let mut partition_start = None;
    let mut fsd_ad = None;
    let vds_blocks = anchor.main_vds.length / BLOCK_SIZE as u32;
    for i in 0..vds_blocks {
        let block = reader.read_block(anchor.main_vds.location + i)?;
        match udf::DescriptorTag::peek_identifier(&block) {
            Some(udf::TagIdentifier::Partition) => {
                let pd = udf::PartitionDescriptor::parse(&block)?;
                partition_start = Some(pd.starting_location);
            },
            Some(udf::TagIdentifier::LogicalVolume) => {
                let lvd = udf::LogicalVolumeDescriptor::parse(&block)?;
                fsd_ad = Some(lvd.fsd);
            },
            Some(udf::TagIdentifier::Terminating) | None => break,
            _ => {},
        }
    }
    let partition = partition_start
        .ok_or_else(|| Error::invalid_iso("UDF descriptor sequence has no partition"))?;
    let fsd_ad = fsd_ad
        .ok_or_else(|| Error::invalid_iso("UDF descriptor sequence has no logical volume"))?;

    let fsd_block = reader.read_block(partition + fsd_ad.block)?;
    let fsd = udf::FileSetDescriptor::parse(&fsd_block)?;

    let root = arena.new_root(Namespace::Udf, Default::default());
    let mut stack = vec![(root, fsd.root_icb.block)];
    let mut visited = HashSet::new();
    while let Some((dir, fe_block)) = stack.pop() {
        if !visited.insert(fe_block) {
            return Err(Error::invalid_iso("UDF directory graph loops"));
        }
        let fe_bytes = reader.read_block(partition + fe_block)?;
        let fe = udf::FileEntry::parse(&fe_bytes)?;
        arena.facets[dir].stamp = fe.recorded;
        arena.facets[dir].extent = partition + fe_block;
        let Some(area_extent) = fe.extents.first() else {
            continue;
        };
        let area = reader.read_at(
            u64::from(partition + area_extent.position) * BLOCK_SIZE as u64,
            area_extent.length as usize,
        )?;
        let mut pos = 0;
        while pos < area.len() {
            let fid = udf::FileIdentifier::parse(&area, &mut pos)?;
            if fid.is_parent {
                continue;
            }
            if fid.is_directory {
                let node = arena.new_node(NodeKind::Directory);
                let facet = arena.attach_facet(
                    node, Namespace::Udf, fid.name.as_bytes().to_vec(), Some(dir),
                    Default::default(),
                );
                arena.facets[facet].hidden = fid.hidden;
                stack.push((facet, fid.icb.block));
            } else {
                let child_fe_bytes = reader.read_block(partition + fid.icb.block)?;
                let child_fe = udf::FileEntry::parse(&child_fe_bytes)?;
                let (extent, size) = match child_fe.extents.first() {
                    Some(ad) => (partition + ad.position, child_fe.information_length),
                    None => (0, 0),
                };
                let node = *files_by_extent
                    .entry((extent, size))
                    .or_insert_with(|| arena.new_node(NodeKind::File {
                        source: ContentSource::Stream {
                            offset: u64::from(extent) * BLOCK_SIZE as u64,
                        },
                        size,
                    }));
                let facet = arena.attach_facet(
                    node, Namespace::Udf, fid.name.as_bytes().to_vec(), Some(dir),
                    child_fe.recorded,
                );
                arena.facets[facet].hidden = fid.hidden;
                arena.facets[facet].extent = extent;
            }
        }
    }

    Ok(Some(UdfRevision::V2_60))
}

/// Reconstructs a [`DiscImage`] from a byte stream.
pub(crate) fn open<'src>(source: Box<dyn ReadSeek + 'src>) -> Result<DiscImage<'src>> {
    let mut reader = Reader { source };

    let system_area = reader.read_at(0, 16 * BLOCK_SIZE)?;
    let isohybrid = IsohybridMbr::parse(&system_area[..512])?;

    let descriptors = read_descriptors(&mut reader)?;
    let Some((first_pvd_block, pvd)) = descriptors.pvds.first() else {
        return Err(Error::invalid_iso("image has no primary volume descriptor"));
    };
    for (other_block, _) in descriptors.pvds.iter().skip(1) {
        if other_block != first_pvd_block {
            return Err(Error::invalid_iso(
                "duplicate primary volume descriptors differ",
            ));
        }
    }
    if pvd.logical_block_size.get() != BLOCK_SIZE as u16 {
        return Err(Error::invalid_iso(format!(
            "logical block size {} is not supported", pvd.logical_block_size.get(),
        )));
    }
    let space_size = pvd.space_size.get();

    let mut arena = Arena::default();
    let mut files_by_extent = HashMap::new();
    let mut rr_version = None;
    // the XA marker in the application use area announces the per-record
    // XA suffixes
    let xa = &pvd.app_use[141..149] == b"CD-XA001";

    let iso_walk = walk_directories(
        &mut reader,
        &mut arena,
        Namespace::Iso,
        pvd.root_directory_record.extent.get(),
        pvd.root_directory_record.data_len.get(),
        &mut files_by_extent,
        &mut rr_version,
        xa,
    )?;
    resolve_relocations(&mut arena, &iso_walk)?;
    check_path_table(&mut reader, pvd, &iso_walk)?;

    let mut joliet_level = None;
    if let Some(svd) = &descriptors.svd {
        if let VolumeDescriptorKind::Supplementary(level) = svd.kind {
            joliet_level = Some(level);
        }
        let mut no_rr = None;
        let joliet_walk = walk_directories(
            &mut reader,
            &mut arena,
            Namespace::Joliet,
            svd.root_directory_record.extent.get(),
            svd.root_directory_record.data_len.get(),
            &mut files_by_extent,
            &mut no_rr,
            false,
        )?;
        check_path_table(&mut reader, svd, &joliet_walk)?;
    }

    let eltorito = match &descriptors.boot_record {
        Some(br) => Some(parse_eltorito(&mut reader, &mut arena, &files_by_extent, br)?),
        None => None,
    };

    let udf = parse_udf(
        &mut reader,
        &mut arena,
        &mut files_by_extent,
        space_size,
        descriptors.terminator_lba + 1,
    )?;

    let interchange_level = if descriptors.enhanced {
        4
    } else {
        iso_walk.level_needed
    };

    let stamp = arena.iso_root
        .map(|root| arena.facets[root].stamp)
        .unwrap_or_default();
    let volume = VolumeMeta {
        primary: side_meta_from(pvd),
        joliet: descriptors.svd.as_ref().map(side_meta_from),
        creation: pvd.creation_timestamp,
        modification: pvd.modification_timestamp,
        expiration: pvd.expiration_timestamp,
        effective: pvd.effective_timestamp,
        set_size: pvd.set_size.get(),
        seqnum: pvd.seqnum.get(),
        num_pvds: descriptors.pvds.len() as u32,
        stamp,
    };
    let opts = DiscOptions {
        interchange_level,
        joliet: joliet_level,
        rock_ridge: rr_version,
        udf,
        xa,
        system_identifier: String::from_utf8_lossy(&pvd.system_identifier)
            .trim_end()
            .to_owned(),
        volume_identifier: String::from_utf8_lossy(&pvd.volume_identifier)
            .trim_end()
            .to_owned(),
        volume_set_identifier: String::from_utf8_lossy(&pvd.volume_set_identifier)
            .trim_end()
            .to_owned(),
        application_use: Vec::new(),
        set_size: pvd.set_size.get(),
        seqnum: pvd.seqnum.get(),
        always_consistent: false,
    };

    let keep_system_area = system_area.iter().any(|&b| b != 0);
    debug!(
        space_size,
        joliet = joliet_level.is_some(),
        rock_ridge = rr_version.is_some(),
        udf = udf.is_some(),
        eltorito = eltorito.is_some(),
        "image opened",
    );

    Ok(DiscImage {
        opts,
        volume,
        arena,
        eltorito,
        isohybrid,
        system_area: keep_system_area.then_some(system_area),
        source: Some(reader.source),
        plan: None,
        stamp,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tracing_test::traced_test;

    #[test]
    fn test_open_rejects_garbage() {
        let junk = vec![0u8; 20 * BLOCK_SIZE];
        assert!(matches!(
            DiscImage::open(Cursor::new(junk)),
            Err(Error::InvalidIso(_)),
        ));
    }

    #[test]
    fn test_open_rejects_short_stream() {
        assert!(matches!(
            DiscImage::open(Cursor::new(vec![0u8; 512])),
            Err(Error::Io(_)),
        ));
    }

    #[traced_test]
    #[test]
    fn test_open_logs_summary() {
        let mut image = DiscImage::new(crate::DiscOptions::default()).unwrap();
        let mut bytes = Vec::new();
        image.write(&mut bytes).unwrap();

        DiscImage::open(Cursor::new(bytes)).unwrap();
        assert!(logs_contain("image opened"));
    }
}
