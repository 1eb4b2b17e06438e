//! The extent planner.
//!
//! From the tree state the planner assigns a logical block to every
//! addressable object, in the one order the writer streams: system area,
//! volume descriptor set, path tables, directory extents (ISO then
//! Joliet, breadth-first), Rock Ridge continuation areas, the El Torito
//! catalog and boot files, file content, and the UDF structures. The
//! planner is a pure function of the tree plus configuration; two equal
//! states produce identical plans, which is what makes lazy and
//! always-consistent modes byte-for-byte interchangeable.

use tracing::debug;

use crate::dirrec::{
    DirectoryRecord, FileFlags, IDENT_DOT, IDENT_DOTDOT, XA_RECORD_LEN, XaRecord,
};
use crate::eltorito::{BootCatalog, BootEntry, BootSection, ValidationEntry};
use crate::error::{Error, Result};
use crate::image::{DiscOptions, ElTorito, VolumeMeta};
use crate::isohybrid::IsohybridMbr;
use crate::ptable::PathTableRecord;
use crate::susp::{BuiltSusp, RelocationExtents, RockRidge};
use crate::tree::{Arena, FacetId, Namespace, NodeId, NodeKind};
use crate::udf;
use crate::vd::BLOCK_SIZE;


/// Sizing and placement of one path table pair.
#[derive(Clone, Debug, Default)]
pub(crate) struct PtablePlan {
    pub size: u32,
    pub le_lba: u32,
    pub be_lba: u32,
    /// Blocks allocated to each of the two tables; genisoimage quantises
    /// path tables to 4096-byte units and readers expect that layout.
    pub blocks_each: u32,
    pub records: Vec<PathTableRecord>,
}

/// A fully laid out directory extent.
#[derive(Clone, Debug)]
pub(crate) struct DirPlan {
    pub facet: FacetId,
    pub lba: u32,
    pub blocks: u32,
    /// The extent bytes, padded to whole blocks, CE and relocation
    /// records already patched.
    pub bytes: Vec<u8>,
}

/// A content extent to stream from its node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ContentPlan {
    pub node: NodeId,
    pub lba: u32,
    pub blocks: u32,
    pub boot_info_table: bool,
}

/// The planned state the writer consumes.
#[derive(Clone, Debug, Default)]
pub(crate) struct Plan {
    pub space_size: u32,
    pub pvd_lbas: Vec<u32>,
    pub boot_record_lba: Option<u32>,
    pub svd_lba: Option<u32>,
    pub evd_lba: Option<u32>,
    pub terminator_lba: u32,
    pub iso_ptbl: PtablePlan,
    pub joliet_ptbl: Option<PtablePlan>,
    pub iso_dirs: Vec<DirPlan>,
    pub joliet_dirs: Vec<DirPlan>,
    pub ce_lba: u32,
    pub ce_bytes: Vec<u8>,
    pub catalog_lba: Option<u32>,
    pub catalog: Option<BootCatalog>,
    pub contents: Vec<ContentPlan>,
    /// Pre-encoded UDF metadata blocks (recognition sequence, descriptor
    /// sequences, anchors, file structures), by block number.
    pub udf_blocks: Vec<(u32, Vec<u8>)>,
    pub image_bytes: u64,
}

fn blocks_for(bytes: u64) -> u32 {
    (bytes.div_ceil(BLOCK_SIZE as u64)) as u32
}

/// One directory's record layout before extents are known.
struct DirShape {
    facet: FacetId,
    /// (child facet or None for dot/dotdot, record length, built SUSP)
    entries: Vec<(Option<FacetId>, usize, Option<BuiltSusp>)>,
    blocks: u32,
}

/// Computes a record's SUSP annotation, if Rock Ridge applies.
fn facet_susp(arena: &Arena, facet: FacetId,
              base_len: usize, xa_len: usize) -> Result<Option<BuiltSusp>> {
    let Some(rr) = &arena.facets[facet].rr else {
        return Ok(None);
    };
    // a directory's link count follows its current subdirectories, so it
    // is recomputed here rather than trusted from the annotation
    let built = if arena.facets[facet].reloc_target.is_none()
        && arena.node_of(facet).is_directory()
    {
        let mut rr = rr.clone();
        rr.nlink = arena.dir_nlink(facet);
        rr.build(base_len, xa_len, &RelocationExtents::default())?
    } else {
        // CL/PL extents are patched after placement
        rr.build(base_len, xa_len, &RelocationExtents::default())?
    };
    Ok(Some(built))
}

/// The synthetic '.'/'..' annotation of a directory, derived from the
/// directory's own overlay so authored and reopened images agree.
fn dot_susp(arena: &Arena, opts: &DiscOptions, dir: FacetId, dotdot: bool,
            xa_len: usize) -> Result<Option<BuiltSusp>> {
    let Some(version) = opts.rock_ridge else {
        return Ok(None);
    };
    let facet = &arena.facets[dir];
    let nlink = if dotdot {
        arena.dir_nlink(facet.parent.unwrap_or(dir))
    } else {
        arena.dir_nlink(dir)
    };
    let mut rr = RockRidge::for_directory(version, None, nlink, facet.stamp);
    if let Some(own) = &facet.rr {
        rr.uid = own.uid;
        rr.gid = own.gid;
    }
    if !dotdot && facet.parent.is_none() {
        rr.first_dot = true;
    }
    if dotdot && facet.reloc_original_parent.is_some() {
        rr.parent_link = true;
    }
    let base_len = DirectoryRecord::encoded_len_for(1, 0);
    Ok(Some(rr.build(base_len, xa_len, &RelocationExtents::default())?))
}

/// Packs record lengths into blocks with the no-straddling rule and
/// returns the per-record offsets plus the block count.
fn pack_records(lengths: &[usize]) -> (Vec<usize>, u32) {
    let mut offsets = Vec::with_capacity(lengths.len());
    let mut at = 0usize;
    for &len in lengths {
        if at % BLOCK_SIZE + len > BLOCK_SIZE {
            at = (at / BLOCK_SIZE + 1) * BLOCK_SIZE;
        }
        offsets.push(at);
        at += len;
    }
    let blocks = (at.div_ceil(BLOCK_SIZE)).max(1) as u32;
    (offsets, blocks)
}

fn shape_directory(arena: &Arena, opts: &DiscOptions, ns: Namespace,
                   dir: FacetId) -> Result<DirShape> {
    let xa_len = if opts.xa && ns == Namespace::Iso { XA_RECORD_LEN } else { 0 };
    let mut entries = Vec::new();

    for dotdot in [false, true] {
        let susp = if ns == Namespace::Iso {
            dot_susp(arena, opts, dir, dotdot, xa_len)?
        } else {
            None
        };
        let susp_len = susp.as_ref().map_or(0, |b| b.inline.len());
        let len = DirectoryRecord::encoded_len_for(1, susp_len + xa_len);
        entries.push((None, len, susp));
    }

    for &child in &arena.facets[dir].children {
        let ident_len = arena.facets[child].ident.len();
        // the record base without the final evening pad: fixed header,
        // identifier, and the pad byte even-length identifiers get
        let base = 33 + ident_len + (1 - ident_len % 2);
        let susp = if ns == Namespace::Iso {
            facet_susp(arena, child, base, xa_len)?
        } else {
            None
        };
        let susp_len = susp.as_ref().map_or(0, |b| b.inline.len());
        let len = DirectoryRecord::encoded_len_for(ident_len, susp_len + xa_len);
        entries.push((Some(child), len, susp));
    }

    let lengths: Vec<usize> = entries.iter().map(|(_, len, _)| *len).collect();
    let (_, blocks) = pack_records(&lengths);
    Ok(DirShape {
        facet: dir,
        entries,
        blocks,
    })
}

/// Builds the path table records for a namespace over already-placed
/// directories.
fn path_table_records(arena: &Arena, dirs: &[FacetId]) -> Vec<PathTableRecord> {
    let mut records = Vec::with_capacity(dirs.len());
    for (index, &dir) in dirs.iter().enumerate() {
        if index == 0 {
            records.push(PathTableRecord::root(arena.facets[dir].extent));
            continue;
        }
        let parent = arena.facets[dir].parent.unwrap();
        let parent_number = dirs.iter().position(|&d| d == parent).unwrap() as u16 + 1;
        records.push(PathTableRecord {
            identifier: arena.facets[dir].ident.clone(),
            xattr_len: 0,
            extent: arena.facets[dir].extent,
            parent_number,
        });
    }
    records
}

fn path_table_size(arena: &Arena, dirs: &[FacetId]) -> u32 {
    let mut size = 10u32;
    for &dir in dirs.iter().skip(1) {
        let len = arena.facets[dir].ident.len() as u32;
        size += 8 + len + len % 2;
    }
    size
}

/// Quantised block allocation of one path table.
fn ptable_blocks(size: u32) -> u32 {
    2 * size.div_ceil(2 * BLOCK_SIZE as u32)
}

/// Record flags of a child facet.
fn child_flags(arena: &Arena, child: FacetId) -> FileFlags {
    let mut flags = FileFlags::empty();
    if arena.facets[child].reloc_target.is_none() && arena.node_of(child).is_directory() {
        flags |= FileFlags::DIRECTORY;
    }
    if arena.facets[child].hidden {
        flags |= FileFlags::HIDDEN;
    }
    flags
}

pub(crate) fn plan(
    arena: &mut Arena,
    opts: &DiscOptions,
    volume: &VolumeMeta,
    eltorito: Option<&ElTorito>,
    isohybrid: Option<&IsohybridMbr>,
) -> Result<Plan> {
    let mut out = Plan::default();

    // 1. the volume descriptor set, from block 16
    let mut cursor: u32 = 16;
    for _ in 0..volume.num_pvds {
        out.pvd_lbas.push(cursor);
        cursor += 1;
    }
    if eltorito.is_some() {
        out.boot_record_lba = Some(cursor);
        cursor += 1;
    }
    if opts.joliet.is_some() {
        out.svd_lba = Some(cursor);
        cursor += 1;
    }
    if opts.interchange_level == 4 {
        out.evd_lba = Some(cursor);
        cursor += 1;
    }
    out.terminator_lba = cursor;
    cursor += 1;

    let mut vrs_lba = None;
    if opts.udf.is_some() {
        vrs_lba = Some(cursor);
        cursor += 3;
        if cursor > 32 {
            return Err(Error::internal(
                "volume descriptor set runs into the UDF descriptor area",
            ));
        }
        // fixed UDF regions: main VDS at 32, reserve at 48, integrity at 64
        cursor = 66;
    } else {
        // one unused block follows the descriptor set
        cursor += 1;
    }

    // 2. directory shapes (record lengths only; extents come later)
    let iso_dirs = arena.dirs_breadth_first(Namespace::Iso);
    let mut iso_shapes = Vec::with_capacity(iso_dirs.len());
    for &dir in &iso_dirs {
        iso_shapes.push(shape_directory(arena, opts, Namespace::Iso, dir)?);
    }
    let joliet_dirs = if opts.joliet.is_some() {
        arena.dirs_breadth_first(Namespace::Joliet)
    } else {
        Vec::new()
    };
    let mut joliet_shapes = Vec::with_capacity(joliet_dirs.len());
    for &dir in &joliet_dirs {
        joliet_shapes.push(shape_directory(arena, opts, Namespace::Joliet, dir)?);
    }

    // 3. path tables
    let iso_ptbl_size = path_table_size(arena, &iso_dirs);
    let iso_ptbl_blocks = ptable_blocks(iso_ptbl_size);
    out.iso_ptbl.size = iso_ptbl_size;
    out.iso_ptbl.blocks_each = iso_ptbl_blocks;
    out.iso_ptbl.le_lba = cursor;
    cursor += iso_ptbl_blocks;
    out.iso_ptbl.be_lba = cursor;
    cursor += iso_ptbl_blocks;

    if opts.joliet.is_some() {
        let size = path_table_size(arena, &joliet_dirs);
        let blocks = ptable_blocks(size);
        let le_lba = cursor;
        cursor += blocks;
        let be_lba = cursor;
        cursor += blocks;
        out.joliet_ptbl = Some(PtablePlan {
            size,
            le_lba,
            be_lba,
            blocks_each: blocks,
            records: Vec::new(),
        });
    }

    // 4. directory extents, ISO breadth-first then Joliet
    for shape in &iso_shapes {
        arena.facets[shape.facet].extent = cursor;
        cursor += shape.blocks;
    }
    for shape in &joliet_shapes {
        arena.facets[shape.facet].extent = cursor;
        cursor += shape.blocks;
    }

    // 5. the Rock Ridge continuation area: spills in directory order,
    // none crossing a block boundary
    let mut ce_rel: Vec<Vec<usize>> = Vec::new();
    let mut ce_total = 0usize;
    for shape in &iso_shapes {
        let mut rels = Vec::new();
        for (_, _, susp) in &shape.entries {
            let rel = match susp {
                Some(built) if !built.spill.is_empty() => {
                    if ce_total % BLOCK_SIZE + built.spill.len() > BLOCK_SIZE {
                        ce_total = (ce_total / BLOCK_SIZE + 1) * BLOCK_SIZE;
                    }
                    let rel = ce_total;
                    ce_total += built.spill.len();
                    rel
                },
                _ => usize::MAX,
            };
            rels.push(rel);
        }
        ce_rel.push(rels);
    }
    out.ce_lba = cursor;
    let ce_blocks = blocks_for(ce_total as u64);
    cursor += ce_blocks;

    // 6. El Torito: catalog block, then the boot files; with UDF enabled
    // both move into the partition area instead
    let mut assigned: Vec<Option<ContentPlan>> = vec![None; arena.nodes.len()];
    let mut catalog_lba = None;
    if let Some(et) = eltorito {
        if opts.udf.is_none() {
            catalog_lba = Some(cursor);
            for facet in arena.nodes[et.catalog_node].facets.clone() {
                arena.facets[facet].extent = cursor;
            }
            cursor += 1;
            for entry in &et.entries {
                if assigned[entry.node].is_none() {
                    let size = arena.nodes[entry.node].content_len();
                    let plan = ContentPlan {
                        node: entry.node,
                        lba: cursor,
                        blocks: blocks_for(size),
                        boot_info_table: entry.boot_info_table,
                    };
                    assigned[entry.node] = Some(plan);
                    cursor += plan.blocks;
                }
            }
        }
    }

    // 7. UDF file structures and anchors occupy fixed ground from 256
    let mut udf_layout = None;
    if opts.udf.is_some() {
        if cursor > udf::ANCHOR_LOCATION {
            return Err(Error::invalid_input(
                "too much ISO9660 metadata to fit the UDF bridge layout",
            ));
        }
        cursor = udf::PARTITION_START;
        // file set descriptor and its terminator
        cursor += 2;
        let udf_dirs = arena.dirs_breadth_first(Namespace::Udf);
        // one file entry block per directory, then its identifier area
        let mut dir_fe = Vec::new();
        for &dir in &udf_dirs {
            let fe_lba = cursor;
            cursor += 1;
            let fid_len = udf_dir_area_len(arena, dir);
            let fid_lba = cursor;
            let fid_blocks = blocks_for(fid_len as u64).max(1);
            cursor += fid_blocks;
            dir_fe.push((dir, fe_lba, fid_lba, fid_len));
        }
        // one file entry block per file node reachable from the UDF tree
        let mut file_fe = Vec::new();
        for &dir in &udf_dirs {
            for &child in &arena.facets[dir].children {
                let node = arena.facets[child].node;
                if !arena.nodes[node].is_directory()
                    && !file_fe.iter().any(|&(n, _)| n == node)
                {
                    file_fe.push((node, cursor));
                    cursor += 1;
                }
            }
        }
        udf_layout = Some((udf_dirs, dir_fe, file_fe));
    }

    // 8. remaining file content, in path-table order of the owning
    // directory, children in record order, one extent per node
    let walk_content = |arena: &mut Arena, dirs: &[FacetId],
                        assigned: &mut Vec<Option<ContentPlan>>,
                        cursor: &mut u32, mut catalog_lba: Option<u32>| {
        for &dir in dirs {
            for &child in &arena.facets[dir].children.clone() {
                let node = arena.facets[child].node;
                match &arena.nodes[node].kind {
                    NodeKind::File { size, .. } => {
                        if assigned[node].is_none() {
                            let plan = ContentPlan {
                                node,
                                lba: *cursor,
                                blocks: blocks_for(*size),
                                boot_info_table: false,
                            };
                            assigned[node] = Some(plan);
                            *cursor += plan.blocks;
                        }
                        arena.facets[child].extent = assigned[node].unwrap().lba;
                    },
                    // symlinks record the would-be next extent with no
                    // data behind it, matching genisoimage
                    NodeKind::Symlink { .. } => {
                        arena.facets[child].extent = *cursor;
                    },
                    NodeKind::BootCatalog => {
                        if catalog_lba.is_none() {
                            catalog_lba = Some(*cursor);
                            *cursor += 1;
                        }
                        arena.facets[child].extent = catalog_lba.unwrap();
                    },
                    _ => {},
                }
            }
        }
        catalog_lba
    };
    catalog_lba = walk_content(arena, &iso_dirs, &mut assigned, &mut cursor, catalog_lba);
    catalog_lba = walk_content(arena, &joliet_dirs, &mut assigned, &mut cursor, catalog_lba);
    if let Some((udf_dirs, _, _)) = &udf_layout {
        catalog_lba = walk_content(arena, udf_dirs, &mut assigned, &mut cursor, catalog_lba);
    }
    // a catalog hidden from every tree still needs its block
    if eltorito.is_some() && catalog_lba.is_none() {
        catalog_lba = Some(cursor);
        cursor += 1;
    }
    out.catalog_lba = catalog_lba;
    // boot files keep their in-place patch request regardless of where
    // the walk placed them
    if let Some(et) = eltorito {
        for entry in &et.entries {
            if entry.boot_info_table {
                if let Some(plan) = assigned[entry.node].as_mut() {
                    plan.boot_info_table = true;
                }
            }
        }
    }
    // facets of nodes placed before the walk (boot files) still need
    // their extents set
    for maybe_plan in &assigned {
        if let Some(plan) = maybe_plan {
            for facet in arena.nodes[plan.node].facets.clone() {
                arena.facets[facet].extent = plan.lba;
            }
            out.contents.push(*plan);
        }
    }
    out.contents.sort_by_key(|p| p.lba);

    // 9. close the volume
    if opts.udf.is_some() {
        // the trailing anchor occupies the final block
        cursor += 1;
    }
    out.space_size = cursor;
    debug!(space_size = out.space_size, "extent plan settled");

    // 10. encode path tables, directories, the CE area and the catalog
    out.iso_ptbl.records = path_table_records(arena, &iso_dirs);
    if let Some(ptbl) = &mut out.joliet_ptbl {
        ptbl.records = path_table_records(arena, &joliet_dirs);
    }

    out.ce_bytes = vec![0u8; (ce_blocks as usize) * BLOCK_SIZE];
    out.iso_dirs = encode_dirs(arena, opts, &iso_shapes, Namespace::Iso,
                               &ce_rel, out.ce_lba, &mut out.ce_bytes)?;
    out.joliet_dirs = encode_dirs(arena, opts, &joliet_shapes, Namespace::Joliet,
                                  &[], out.ce_lba, &mut out.ce_bytes)?;

    if let Some(et) = eltorito {
        out.catalog = Some(build_catalog(arena, et));
    }

    // 11. encode the UDF metadata
    if let Some((udf_dirs, dir_fe, file_fe)) = udf_layout {
        encode_udf(arena, volume, &mut out, vrs_lba.unwrap(),
                   &udf_dirs, &dir_fe, &file_fe, &assigned, catalog_lba)?;
    }

    out.image_bytes = u64::from(out.space_size) * BLOCK_SIZE as u64;
    if isohybrid.is_some() {
        out.image_bytes = IsohybridMbr::padded_size(out.image_bytes);
    }
    Ok(out)
}

/// Encodes every directory extent of a namespace.
fn encode_dirs(arena: &Arena, opts: &DiscOptions, shapes: &[DirShape], ns: Namespace,
               ce_rel: &[Vec<usize>], ce_lba: u32, ce_bytes: &mut [u8]) -> Result<Vec<DirPlan>> {
    let xa = (opts.xa && ns == Namespace::Iso).then(XaRecord::default);
    let mut plans = Vec::with_capacity(shapes.len());
    for (dir_index, shape) in shapes.iter().enumerate() {
        let dir = shape.facet;
        let dir_facet = &arena.facets[dir];
        let lengths: Vec<usize> = shape.entries.iter().map(|(_, len, _)| *len).collect();
        let (offsets, blocks) = pack_records(&lengths);
        let mut bytes = vec![0u8; blocks as usize * BLOCK_SIZE];

        for (entry_index, (child, len, susp)) in shape.entries.iter().enumerate() {
            let mut record = match (entry_index, child) {
                (0, _) => DirectoryRecord::new(
                    IDENT_DOT,
                    dir_facet.extent,
                    blocks * BLOCK_SIZE as u32,
                    FileFlags::DIRECTORY,
                    dir_facet.stamp,
                    1,
                ),
                (1, _) => {
                    let parent = dir_facet.parent.unwrap_or(dir);
                    let parent_blocks = shapes
                        .iter()
                        .find(|s| s.facet == parent)
                        .map_or(blocks, |s| s.blocks);
                    DirectoryRecord::new(
                        IDENT_DOTDOT,
                        arena.facets[parent].extent,
                        parent_blocks * BLOCK_SIZE as u32,
                        FileFlags::DIRECTORY,
                        dir_facet.stamp,
                        1,
                    )
                },
                (_, Some(child)) => {
                    let child_facet = &arena.facets[*child];
                    let node = arena.node_of(*child);
                    let (extent, data_len) = if child_facet.reloc_target.is_some() {
                        // relocation placeholder: a zero-length file record
                        (0, 0)
                    } else if node.is_directory() {
                        let child_blocks = shapes
                            .iter()
                            .find(|s| s.facet == *child)
                            .map(|s| s.blocks)
                            .ok_or_else(|| Error::internal(
                                "child directory missing from its namespace shapes",
                            ))?;
                        (child_facet.extent, child_blocks * BLOCK_SIZE as u32)
                    } else {
                        (child_facet.extent, node.content_len() as u32)
                    };
                    DirectoryRecord::new(
                        &child_facet.ident,
                        extent,
                        data_len,
                        child_flags(arena, *child),
                        child_facet.stamp,
                        1,
                    )
                },
                (_, None) => {
                    return Err(Error::internal("directory entry without a facet"));
                },
            };

            if let Some(built) = susp {
                let mut inline = built.inline.clone();
                patch_relocations(arena, &mut inline, entry_index, *child, dir)?;
                if let Some(ce_at) = built.ce_at {
                    let rel = ce_rel[dir_index][entry_index];
                    let block = ce_lba + (rel / BLOCK_SIZE) as u32;
                    let offset = (rel % BLOCK_SIZE) as u32;
                    BuiltSusp::patch_ce(&mut inline, ce_at, block, offset);
                    ce_bytes[rel..rel + built.spill.len()]
                        .copy_from_slice(&built.spill);
                }
                record.system_use = inline;
            }
            if let Some(xa) = &xa {
                record.system_use.extend_from_slice(&xa.to_bytes());
            }

            let encoded = record.to_bytes();
            if encoded.len() != *len {
                return Err(Error::internal(format!(
                    "planned record length {} disagrees with encoding {}", len, encoded.len(),
                )));
            }
            let at = offsets[entry_index];
            bytes[at..at + encoded.len()].copy_from_slice(&encoded);
        }

        plans.push(DirPlan {
            facet: dir,
            lba: dir_facet.extent,
            blocks,
            bytes,
        });
    }
    Ok(plans)
}

/// Rewrites CL/PL extents now that every directory is placed.
fn patch_relocations(arena: &Arena, inline: &mut [u8], entry_index: usize,
                     child: Option<FacetId>, dir: FacetId) -> Result<()> {
    use crate::susp::{SuspRecord, parse_system_use};

    let (needs_cl, needs_pl) = match child {
        Some(child) => (arena.facets[child].reloc_target.is_some(), false),
        None => (false, entry_index == 1
            && arena.facets[dir].reloc_original_parent.is_some()),
    };
    if !needs_cl && !needs_pl {
        return Ok(());
    }

    // locate the CL/PL record bytes and rewrite their both-endian extent
    let mut pos = 0;
    let records = parse_system_use(inline)?;
    for record in records {
        let len = record.encoded_len();
        match record {
            SuspRecord::Cl { .. } if needs_cl => {
                let target = arena.facets[child.unwrap()].reloc_target.unwrap();
                crate::endian::write_both_u32(
                    &mut inline[pos+4..pos+12], arena.facets[target].extent,
                );
            },
            SuspRecord::Pl { .. } if needs_pl => {
                let logical = arena.facets[dir].reloc_original_parent.unwrap();
                crate::endian::write_both_u32(
                    &mut inline[pos+4..pos+12], arena.facets[logical].extent,
                );
            },
            _ => {},
        }
        pos += len;
    }
    Ok(())
}

fn build_catalog(arena: &Arena, et: &ElTorito) -> BootCatalog {
    let mut catalog = BootCatalog::new(et.platform_id);
    catalog.validation = ValidationEntry {
        platform_id: et.platform_id,
        id_string: [0u8; 24],
    };
    for entry in &et.entries {
        let boot = BootEntry {
            bootable: entry.bootable,
            media: entry.media,
            load_segment: entry.load_segment,
            system_type: entry.system_type,
            sector_count: entry.load_size,
            load_rba: arena.nodes[entry.node].facets.first()
                .map_or(0, |&f| arena.facets[f].extent),
            selection_criteria: [0u8; 19],
        };
        match entry.platform_id {
            None => catalog.initial = boot,
            Some(platform_id) => catalog.sections.push(BootSection {
                platform_id,
                id_string: [0u8; 28],
                entries: vec![boot],
            }),
        }
    }
    catalog
}

/// Length of a UDF directory's file identifier area.
fn udf_dir_area_len(arena: &Arena, dir: FacetId) -> usize {
    // the parent FID is 40 bytes
    let mut len = 40;
    for &child in &arena.facets[dir].children {
        let fid = udf::FileIdentifier {
            name: arena.display_name(child),
            is_directory: arena.node_of(child).is_directory(),
            is_parent: false,
            hidden: arena.facets[child].hidden,
            icb: udf::LongAd::default(),
        };
        len += fid.encoded_len();
    }
    len
}

#[allow(clippy::too_many_arguments)]
fn encode_udf(arena: &Arena, volume: &VolumeMeta, out: &mut Plan, vrs_lba: u32,
              udf_dirs: &[FacetId], dir_fe: &[(FacetId, u32, u32, usize)],
              file_fe: &[(NodeId, u32)], assigned: &[Option<ContentPlan>],
              catalog_lba: Option<u32>) -> Result<()> {
    let partition = udf::PARTITION_START;
    let rel = |abs: u32| abs - partition;
    let vol_ident = String::from_utf8_lossy(&volume.primary.volume_identifier)
        .trim_end()
        .to_owned();
    let set_ident = String::from_utf8_lossy(&volume.primary.volume_set_identifier)
        .trim_end()
        .chars()
        .take(30)
        .collect::<String>();
    let stamp = volume.stamp;

    for (i, kind) in [b"BEA01", b"NSR03", b"TEA01"].iter().enumerate() {
        out.udf_blocks.push((vrs_lba + i as u32, udf::recognition_block(kind).to_vec()));
    }

    // the two descriptor sequences carry identical content
    for (start, serial_base) in [(32u32, 0u32), (48, 0)] {
        let pvd = udf::UdfPrimaryDescriptor {
            vds_number: serial_base,
            volume_identifier: vol_ident.clone(),
            volume_set_identifier: set_ident.clone(),
            recorded: stamp,
        };
        out.udf_blocks.push((start, pvd.to_block(start).to_vec()));
        let iuvd = udf::ImplementationUseDescriptor {
            vds_number: serial_base + 1,
            logical_volume_identifier: vol_ident.clone(),
        };
        out.udf_blocks.push((start + 1, iuvd.to_block(start + 1).to_vec()));
        let pd = udf::PartitionDescriptor {
            vds_number: serial_base + 2,
            starting_location: partition,
            length: out.space_size - partition,
        };
        out.udf_blocks.push((start + 2, pd.to_block(start + 2).to_vec()));
        let lvd = udf::LogicalVolumeDescriptor {
            vds_number: serial_base + 3,
            logical_volume_identifier: vol_ident.clone(),
            fsd: udf::LongAd { length: BLOCK_SIZE as u32, block: 0, partition: 0 },
            integrity_sequence: udf::ExtentAd {
                length: 2 * BLOCK_SIZE as u32,
                location: 64,
            },
        };
        out.udf_blocks.push((start + 3, lvd.to_block(start + 3).to_vec()));
        let usd = udf::UnallocatedSpaceDescriptor { vds_number: serial_base + 4 };
        out.udf_blocks.push((start + 4, usd.to_block(start + 4).to_vec()));
        out.udf_blocks.push((start + 5, udf::terminating_block(start + 5).to_vec()));
    }

    let file_count = file_fe.len() as u32;
    let dir_count = udf_dirs.len() as u32;
    let lvid = udf::IntegrityDescriptor {
        recorded: stamp,
        next_unique_id: 16 + u64::from(file_count) + u64::from(dir_count),
        free_space: 0,
        partition_size: out.space_size - partition,
        file_count,
        directory_count: dir_count,
    };
    out.udf_blocks.push((64, lvid.to_block(64).to_vec()));
    out.udf_blocks.push((65, udf::terminating_block(65).to_vec()));

    let root_fe_lba = dir_fe.first()
        .map(|&(_, fe, _, _)| fe)
        .ok_or_else(|| Error::internal("UDF tree has no root"))?;
    let fsd = udf::FileSetDescriptor {
        recorded: stamp,
        logical_volume_identifier: vol_ident.clone(),
        file_set_identifier: vol_ident.clone(),
        root_icb: udf::LongAd {
            length: BLOCK_SIZE as u32,
            block: rel(root_fe_lba),
            partition: 0,
        },
    };
    out.udf_blocks.push((partition, fsd.to_block(rel(partition)).to_vec()));
    out.udf_blocks.push((partition + 1, udf::terminating_block(rel(partition + 1)).to_vec()));

    // unique ids: the root is 0, everything else counts up from 16
    let mut unique = 16u64;
    let mut unique_of_node = vec![0u64; arena.nodes.len()];
    let mut unique_of_dir = vec![0u64; arena.facets.len()];
    for (index, &(dir, _, _, _)) in dir_fe.iter().enumerate() {
        if index > 0 {
            unique_of_dir[dir] = unique;
            unique += 1;
        }
    }
    for &(node, _) in file_fe {
        unique_of_node[node] = unique;
        unique += 1;
    }

    let fe_of_dir = |dir: FacetId| dir_fe.iter().find(|&&(d, _, _, _)| d == dir);
    let fe_of_node = |node: NodeId| file_fe.iter().find(|&&(n, _)| n == node);

    for &(dir, fe_lba, fid_lba, fid_len) in dir_fe {
        // identifier area first, so the file entry can reference it
        let mut area = Vec::with_capacity(fid_len);
        let parent_dir = arena.facets[dir].parent
            .map(|p| fe_of_dir(p).unwrap())
            .unwrap_or_else(|| fe_of_dir(dir).unwrap());
        let parent_fid = udf::FileIdentifier {
            name: String::new(),
            is_directory: true,
            is_parent: true,
            hidden: false,
            icb: udf::LongAd {
                length: BLOCK_SIZE as u32,
                block: rel(parent_dir.1),
                partition: 0,
            },
        };
        area.extend_from_slice(&parent_fid.to_bytes(rel(fid_lba)));
        for &child in &arena.facets[dir].children {
            let node = arena.facets[child].node;
            let icb_block = if arena.nodes[node].is_directory() {
                fe_of_dir(child).map(|&(_, fe, _, _)| fe)
            } else {
                fe_of_node(node).map(|&(_, fe)| fe)
            };
            let icb_block = icb_block.ok_or_else(|| Error::internal(
                "UDF child without a planned file entry",
            ))?;
            let fid = udf::FileIdentifier {
                name: arena.display_name(child),
                is_directory: arena.nodes[node].is_directory(),
                is_parent: false,
                hidden: arena.facets[child].hidden,
                icb: udf::LongAd {
                    length: BLOCK_SIZE as u32,
                    block: rel(icb_block),
                    partition: 0,
                },
            };
            area.extend_from_slice(&fid.to_bytes(rel(fid_lba)));
        }
        if area.len() != fid_len {
            return Err(Error::internal(format!(
                "UDF directory area length {} disagrees with plan {}", area.len(), fid_len,
            )));
        }

        let fe = udf::FileEntry {
            file_type: udf::UdfFileType::Directory,
            link_count: arena.dir_nlink(dir) as u16,
            information_length: fid_len as u64,
            recorded: arena.facets[dir].stamp,
            unique_id: unique_of_dir[dir],
            extents: vec![udf::ShortAd {
                length: fid_len as u32,
                position: rel(fid_lba),
            }],
        };
        out.udf_blocks.push((fe_lba, fe.to_block(rel(fe_lba)).to_vec()));
        let blocks = blocks_for(fid_len as u64).max(1) as usize;
        let mut padded = area;
        padded.resize(blocks * BLOCK_SIZE, 0);
        out.udf_blocks.push((fid_lba, padded));
    }

    for &(node, fe_lba) in file_fe {
        let size = arena.nodes[node].content_len();
        let extents = if matches!(arena.nodes[node].kind, NodeKind::BootCatalog) {
            let lba = catalog_lba.ok_or_else(|| Error::internal(
                "UDF boot catalog facet without a catalog block",
            ))?;
            vec![udf::ShortAd {
                length: size as u32,
                position: rel(lba),
            }]
        } else {
            match assigned[node] {
                Some(plan) if size > 0 => vec![udf::ShortAd {
                    length: size as u32,
                    position: rel(plan.lba),
                }],
                _ => Vec::new(),
            }
        };
        let link_count = arena.node_facets_in(node, Namespace::Udf).len() as u16;
        let fe = udf::FileEntry {
            file_type: udf::UdfFileType::Regular,
            link_count: link_count.max(1),
            information_length: size,
            recorded: arena.nodes[node].facets.first()
                .map_or(stamp, |&f| arena.facets[f].stamp),
            unique_id: unique_of_node[node],
            extents,
        };
        out.udf_blocks.push((fe_lba, fe.to_block(rel(fe_lba)).to_vec()));
    }

    // anchors at 256 and at the final block
    let anchor = udf::AnchorDescriptor {
        main_vds: udf::ExtentAd { length: 16 * BLOCK_SIZE as u32, location: 32 },
        reserve_vds: udf::ExtentAd { length: 16 * BLOCK_SIZE as u32, location: 48 },
    };
    out.udf_blocks.push((udf::ANCHOR_LOCATION, anchor.to_block(udf::ANCHOR_LOCATION).to_vec()));
    let last = out.space_size - 1;
    out.udf_blocks.push((last, anchor.to_block(last).to_vec()));
    Ok(())
}
