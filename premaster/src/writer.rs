//! Streaming the planned state to a sink.
//!
//! The writer never seeks: every object the planner placed is turned into
//! an (offset, bytes) chunk, the chunks are laid end to end with zero fill
//! across any gaps, and the result goes to the sink in one pass. Overlap
//! between chunks means the planner broke an invariant and is reported,
//! not papered over.

use std::io::Write;

use tracing::debug;

use crate::dirrec::{DirectoryRecord, FileFlags, IDENT_DOT};
use crate::eltorito::BootInfoTable;
use crate::endian::EndianPair;
use crate::error::{Error, Result};
use crate::image::{DiscOptions, VolumeMeta};
use crate::isohybrid::IsohybridMbr;
use crate::plan::{DirPlan, Plan};
use crate::ptable;
use crate::tree::{Arena, NodeId};
use crate::vd::{
    BLOCK_SIZE, BootRecordDescriptor, VolumeDescriptor, VolumeDescriptorKind,
    VolumeFlags, terminator_block,
};


/// Builds the 34-byte root directory record a volume descriptor embeds.
fn root_record(arena: &Arena, plan_dirs: &[DirPlan]) -> Result<DirectoryRecord> {
    let root = plan_dirs.first()
        .ok_or_else(|| Error::internal("plan has no root directory"))?;
    Ok(DirectoryRecord::new(
        IDENT_DOT,
        root.lba,
        root.blocks * BLOCK_SIZE as u32,
        FileFlags::DIRECTORY,
        arena.facets[root.facet].stamp,
        1,
    ))
}

fn volume_descriptor(kind: VolumeDescriptorKind, plan: &Plan, arena: &Arena,
                     volume: &VolumeMeta) -> Result<VolumeDescriptor> {
    let (ptbl, root, meta) = match kind {
        VolumeDescriptorKind::Supplementary(_) => (
            plan.joliet_ptbl.as_ref()
                .ok_or_else(|| Error::internal("Joliet descriptor without a Joliet plan"))?,
            root_record(arena, &plan.joliet_dirs)?,
            volume.joliet.as_ref()
                .ok_or_else(|| Error::internal("Joliet descriptor without Joliet metadata"))?,
        ),
        _ => (&plan.iso_ptbl, root_record(arena, &plan.iso_dirs)?, &volume.primary),
    };
    Ok(VolumeDescriptor {
        kind,
        flags: VolumeFlags::empty(),
        system_identifier: meta.system_identifier,
        volume_identifier: meta.volume_identifier,
        space_size: EndianPair::of(plan.space_size),
        escape_sequences: match kind {
            VolumeDescriptorKind::Supplementary(level)
                => VolumeDescriptor::joliet_escape_sequences(level),
            _ => [0u8; 32],
        },
        set_size: EndianPair::of(volume.set_size),
        seqnum: EndianPair::of(volume.seqnum),
        logical_block_size: EndianPair::of(BLOCK_SIZE as u16),
        path_table_size: EndianPair::of(ptbl.size),
        le_path_table_location: ptbl.le_lba,
        le_path_table_backup_location: 0,
        be_path_table_location: ptbl.be_lba,
        be_path_table_backup_location: 0,
        root_directory_record: root,
        volume_set_identifier: meta.volume_set_identifier,
        publisher_identifier: meta.publisher_identifier,
        data_preparer_identifier: meta.data_preparer_identifier,
        application_identifier: meta.application_identifier,
        copyright_file_identifier: meta.copyright_file_identifier,
        abstract_file_identifier: meta.abstract_file_identifier,
        bibliographic_file_identifier: meta.bibliographic_file_identifier,
        creation_timestamp: volume.creation,
        modification_timestamp: volume.modification,
        expiration_timestamp: volume.expiration,
        effective_timestamp: volume.effective,
        app_use: meta.app_use,
    })
}

/// Emits the planned image.
///
/// `read_content` materialises a node's bytes; the writer applies the boot
/// info table patch on the copy it is handed, never on the caller's data.
pub(crate) fn write_image<W: Write>(
    sink: &mut W,
    plan: &Plan,
    arena: &Arena,
    opts: &DiscOptions,
    volume: &VolumeMeta,
    isohybrid: Option<&IsohybridMbr>,
    system_area: Option<&[u8]>,
    mut read_content: impl FnMut(NodeId) -> Result<Vec<u8>>,
) -> Result<()> {
    let mut chunks: Vec<(u64, Vec<u8>)> = Vec::new();
    let block_at = |lba: u32| u64::from(lba) * BLOCK_SIZE as u64;

    // system area, with the isohybrid prelude layered over block 0
    if system_area.is_some() || isohybrid.is_some() {
        let mut buf = vec![0u8; 16 * BLOCK_SIZE];
        if let Some(area) = system_area {
            let len = area.len().min(buf.len());
            buf[..len].copy_from_slice(&area[..len]);
        }
        if let Some(mbr) = isohybrid {
            buf[..512].copy_from_slice(&mbr.to_bytes(block_at(plan.space_size)));
        }
        chunks.push((0, buf));
    }

    // the volume descriptor set
    let pvd = volume_descriptor(VolumeDescriptorKind::Primary, plan, arena, volume)?;
    for &lba in &plan.pvd_lbas {
        chunks.push((block_at(lba), pvd.to_block().to_vec()));
    }
    if let Some(lba) = plan.boot_record_lba {
        let catalog_extent = plan.catalog_lba
            .ok_or_else(|| Error::internal("boot record planned without a catalog"))?;
        let br = BootRecordDescriptor { catalog_extent };
        chunks.push((block_at(lba), br.to_block().to_vec()));
    }
    if let Some(lba) = plan.svd_lba {
        let level = opts.joliet
            .ok_or_else(|| Error::internal("Joliet descriptor planned without Joliet"))?;
        let svd = volume_descriptor(
            VolumeDescriptorKind::Supplementary(level), plan, arena, volume,
        )?;
        chunks.push((block_at(lba), svd.to_block().to_vec()));
    }
    if let Some(lba) = plan.evd_lba {
        let evd = volume_descriptor(VolumeDescriptorKind::Enhanced, plan, arena, volume)?;
        chunks.push((block_at(lba), evd.to_block().to_vec()));
    }
    chunks.push((block_at(plan.terminator_lba), terminator_block().to_vec()));

    // path tables
    for (ptbl, present) in [
        (Some(&plan.iso_ptbl), true),
        (plan.joliet_ptbl.as_ref(), plan.joliet_ptbl.is_some()),
    ] {
        if !present {
            continue;
        }
        let ptbl = ptbl.unwrap();
        chunks.push((block_at(ptbl.le_lba), ptable::encode_table(&ptbl.records, true)));
        chunks.push((block_at(ptbl.be_lba), ptable::encode_table(&ptbl.records, false)));
    }

    // directory extents
    for dir in plan.iso_dirs.iter().chain(&plan.joliet_dirs) {
        chunks.push((block_at(dir.lba), dir.bytes.clone()));
    }

    // Rock Ridge continuation areas
    if !plan.ce_bytes.is_empty() {
        chunks.push((block_at(plan.ce_lba), plan.ce_bytes.clone()));
    }

    // El Torito catalog
    if let (Some(lba), Some(catalog)) = (plan.catalog_lba, &plan.catalog) {
        chunks.push((block_at(lba), catalog.to_block().to_vec()));
    }

    // UDF metadata
    for (lba, bytes) in &plan.udf_blocks {
        chunks.push((block_at(*lba), bytes.clone()));
    }

    // file content
    for content in &plan.contents {
        if content.blocks == 0 {
            continue;
        }
        let mut bytes = read_content(content.node)?;
        if content.boot_info_table {
            let table = BootInfoTable::for_contents(&bytes, content.lba);
            table.patch_into(&mut bytes)?;
        }
        chunks.push((block_at(content.lba), bytes));
    }

    // stream everything, zeroing the gaps the planner left
    chunks.sort_by_key(|(offset, _)| *offset);
    let mut cursor = 0u64;
    for (offset, bytes) in chunks {
        if offset < cursor {
            return Err(Error::internal(format!(
                "planned chunks overlap at byte {} (cursor already at {})", offset, cursor,
            )));
        }
        zero_fill(sink, offset - cursor)?;
        sink.write_all(&bytes)?;
        cursor = offset + bytes.len() as u64;
    }
    if cursor > plan.image_bytes {
        return Err(Error::internal(format!(
            "wrote {} bytes into a {}-byte plan", cursor, plan.image_bytes,
        )));
    }
    zero_fill(sink, plan.image_bytes - cursor)?;
    debug!(bytes = plan.image_bytes, "image emitted");
    Ok(())
}

fn zero_fill<W: Write>(sink: &mut W, mut remaining: u64) -> Result<()> {
    let zeros = [0u8; BLOCK_SIZE];
    while remaining > 0 {
        let step = remaining.min(BLOCK_SIZE as u64) as usize;
        sink.write_all(&zeros[..step])?;
        remaining -= step as u64;
    }
    Ok(())
}
