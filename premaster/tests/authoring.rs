//! Authoring scenarios checked against the exact on-disc layout
//! genisoimage-compatible tools produce for the same input.

use premaster::{
    DiscImage, DiscOptions, ElToritoOptions, Location, PathRef, RockRidgeVersion,
    UdfRevision,
};

const BLOCK: usize = 2048;

fn write_to_vec(image: &mut DiscImage<'_>) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write(&mut bytes).unwrap();
    bytes
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(bytes[at..at + 2].try_into().unwrap())
}

fn le32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap())
}

/// Field offsets within the PVD at block 16.
fn check_pvd(bytes: &[u8], space_size: u32, ptbl_size: u32, ptbl_le: u32, ptbl_be: u32) {
    let pvd = &bytes[16 * BLOCK..17 * BLOCK];
    assert_eq!(pvd[0], 1);
    assert_eq!(&pvd[1..6], b"CD001");
    assert_eq!(pvd[6], 1);
    assert_eq!(le32(pvd, 80), space_size);
    assert_eq!(le16(pvd, 120), 1); // set size
    assert_eq!(le16(pvd, 124), 1); // sequence number
    assert_eq!(le16(pvd, 128), 2048); // logical block size
    assert_eq!(le32(pvd, 132), ptbl_size);
    assert_eq!(le32(pvd, 140), ptbl_le);
    assert_eq!(le32(pvd, 144), 0); // optional LE table
    assert_eq!(be32(pvd, 148), ptbl_be);
    assert_eq!(be32(pvd, 152), 0); // optional BE table
    assert_eq!(pvd[881], 1); // file structure version
}

fn root_extent(bytes: &[u8]) -> u32 {
    le32(&bytes[16 * BLOCK..], 156 + 2)
}

#[test]
fn test_empty_image_layout() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 49_152);
    check_pvd(&bytes, 24, 10, 19, 21);
    // terminator directly after the PVD
    assert_eq!(bytes[17 * BLOCK], 0xFF);
    assert_eq!(&bytes[17 * BLOCK + 1..17 * BLOCK + 6], b"CD001");
    // root directory at 23 with only '.' and '..'
    assert_eq!(root_extent(&bytes), 23);
    let root = &bytes[23 * BLOCK..24 * BLOCK];
    assert_eq!(root[0], 34);
    assert_eq!(root[32], 1);
    assert_eq!(root[33], 0x00);
    assert_eq!(root[34], 34);
    assert_eq!(root[34 + 33], 0x01);
    assert_eq!(root[68], 0);
    // the path tables hold exactly the root record
    let ptbl = &bytes[19 * BLOCK..19 * BLOCK + 10];
    assert_eq!(ptbl[0], 1);
    assert_eq!(le32(ptbl, 2), 23);
    assert_eq!(le16(ptbl, 6), 1);
}

#[test]
fn test_one_file_layout() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 51_200);
    check_pvd(&bytes, 25, 10, 19, 21);
    assert_eq!(root_extent(&bytes), 23);

    // the third root record is the file, 40 bytes long, at extent 24
    let record = &bytes[23 * BLOCK + 68..23 * BLOCK + 68 + 40];
    assert_eq!(record[0], 40);
    assert_eq!(record[32], 6);
    assert_eq!(&record[33..39], b"FOO.;1");
    assert_eq!(le32(record, 2), 24);
    assert_eq!(le32(record, 10), 4);
    assert_eq!(record[25], 0); // file flags

    assert_eq!(&bytes[24 * BLOCK..24 * BLOCK + 4], b"foo\n");
    assert_eq!(image.get_file(PathRef::Iso("/FOO.;1")).unwrap(), b"foo\n");
}

#[test]
fn test_two_files_sort_and_pack() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    image.add_file(b"bar\n".to_vec(), &Location::iso("/BAR.;1"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 53_248);
    check_pvd(&bytes, 26, 10, 19, 21);
    // BAR sorts first and gets the first content extent
    let bar = &bytes[23 * BLOCK + 68..];
    assert_eq!(&bar[33..39], b"BAR.;1");
    assert_eq!(le32(bar, 2), 24);
    let foo = &bytes[23 * BLOCK + 68 + 40..];
    assert_eq!(&foo[33..39], b"FOO.;1");
    assert_eq!(le32(foo, 2), 25);
}

#[test]
fn test_dirs_overflowing_the_path_table_extent() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    for i in 1..=295 {
        let path = format!("/DIR{}", i);
        image.add_directory(&Location::iso(&path), false).unwrap();
    }
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 671_744);
    // 4122 bytes of path table span three blocks, so each copy is
    // allocated two 2-block units
    check_pvd(&bytes, 328, 4122, 19, 23);
    assert_eq!(root_extent(&bytes), 27);
    // the root directory occupies six blocks
    assert_eq!(le32(&bytes[16 * BLOCK..], 156 + 10), 6 * 2048);

    // the first path table records: root, then DIR1 (sorted order)
    let ptbl = &bytes[19 * BLOCK..];
    assert_eq!(ptbl[0], 1);
    assert_eq!(le32(ptbl, 2), 27);
    assert_eq!(ptbl[10], 4);
    assert_eq!(&ptbl[18..22], b"DIR1");
}

#[test]
fn test_rock_ridge_symlink() {
    let mut image = DiscImage::new(DiscOptions {
        rock_ridge: Some(RockRidgeVersion::V1_09),
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(
        b"foo\n".to_vec(),
        &Location::iso("/FOO.;1").with_rr("foo"),
        None,
    ).unwrap();
    image.add_symlink("/SYM.;1", "sym", "foo", None).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 53_248);
    check_pvd(&bytes, 26, 10, 19, 21);
    assert_eq!(root_extent(&bytes), 23);

    let root = &bytes[23 * BLOCK..24 * BLOCK];
    // '.' of the root carries SP/RR/PX/TF plus the CE pointing at the ER
    assert_eq!(root[0], 136);
    assert_eq!(root[136], 102);
    // the file record
    let foo = &root[238..];
    assert_eq!(foo[0], 116);
    assert_eq!(&foo[33..39], b"FOO.;1");
    assert_eq!(le32(foo, 2), 25);
    // the symlink record: 126 bytes, phantom extent one past the end
    let sym = &root[354..];
    assert_eq!(sym[0], 126);
    assert_eq!(&sym[33..39], b"SYM.;1");
    assert_eq!(le32(sym, 2), 26);
    assert_eq!(le32(sym, 10), 0);

    // its SL record holds the single component "foo"
    let records = premaster::susp::parse_system_use(&sym[40..126]).unwrap();
    let sl = records.iter().find_map(|r| match r {
        premaster::susp::SuspRecord::Sl { components, .. } => Some(components.clone()),
        _ => None,
    }).unwrap();
    assert_eq!(sl.len(), 1);
    assert!(matches!(&sl[0].1, premaster::susp::SlComponent::Name(n) if n == "foo"));

    // the ER record landed in the continuation block
    assert_eq!(&bytes[24 * BLOCK..24 * BLOCK + 2], b"ER");
    assert_eq!(bytes[24 * BLOCK + 2], 237);
    assert_eq!(&bytes[24 * BLOCK + 8..24 * BLOCK + 18], b"RRIP_1991A");

    // symlinks are not readable as file content
    assert!(image.get_file(PathRef::RockRidge("/sym")).is_err());
    assert_eq!(image.get_file(PathRef::RockRidge("/foo")).unwrap(), b"foo\n");
}

#[test]
fn test_eltorito_layout() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"boot\n".to_vec(), &Location::iso("/BOOT.;1"), None).unwrap();
    image.add_eltorito(&ElToritoOptions::new(
        "/BOOT.;1", Location::iso("/BOOT.CAT;1"),
    )).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 55_296);
    check_pvd(&bytes, 27, 10, 20, 22);

    // boot record at 17 names the catalog extent
    let br = &bytes[17 * BLOCK..18 * BLOCK];
    assert_eq!(br[0], 0);
    assert_eq!(&br[7..30], b"EL TORITO SPECIFICATION");
    assert_eq!(le32(br, 71), 25);
    assert_eq!(bytes[18 * BLOCK], 0xFF);

    // the validation entry sums to zero and the initial entry loads the
    // boot file at 26 for 4 virtual sectors
    let catalog = &bytes[25 * BLOCK..26 * BLOCK];
    assert_eq!(catalog[0], 0x01);
    assert_eq!(catalog[30], 0x55);
    assert_eq!(catalog[31], 0xAA);
    let sum = catalog[..32]
        .chunks(2)
        .fold(0u16, |acc, pair| acc.wrapping_add(le16(pair, 0)));
    assert_eq!(sum, 0);
    assert_eq!(catalog[32], 0x88);
    assert_eq!(le16(catalog, 38), 4);
    assert_eq!(le32(catalog, 40), 26);
    assert_eq!(&bytes[26 * BLOCK..26 * BLOCK + 5], b"boot\n");
}

#[test]
fn test_joliet_rr_eltorito_layout() {
    let mut image = DiscImage::new(DiscOptions {
        joliet: Some(3),
        rock_ridge: Some(RockRidgeVersion::V1_09),
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(
        b"boot\n".to_vec(),
        &Location::iso("/BOOT.;1").with_rr("boot").with_joliet("/boot"),
        None,
    ).unwrap();
    image.add_eltorito(&ElToritoOptions::new(
        "/BOOT.;1",
        Location::iso("/BOOT.CAT;1").with_rr("boot.cat").with_joliet("/boot.cat"),
    )).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 69_632);
    check_pvd(&bytes, 34, 10, 21, 23);

    // descriptor order: PVD, boot record, SVD, terminator
    assert_eq!(bytes[17 * BLOCK], 0);
    assert_eq!(bytes[18 * BLOCK], 2);
    assert_eq!(&bytes[18 * BLOCK + 88..18 * BLOCK + 91], b"%/E");
    assert_eq!(bytes[19 * BLOCK], 0xFF);

    // catalog at 32, boot file at 33
    assert_eq!(le32(&bytes[17 * BLOCK..], 71), 32);
    assert_eq!(&bytes[33 * BLOCK..33 * BLOCK + 5], b"boot\n");

    // the ISO root at 29 lists BOOT.;1 (116) and BOOT.CAT;1 (124)
    assert_eq!(root_extent(&bytes), 29);
    let root = &bytes[29 * BLOCK..30 * BLOCK];
    assert_eq!(root[0], 136);
    let boot = &root[238..];
    assert_eq!(boot[0], 116);
    assert_eq!(boot[32], 7);
    assert_eq!(&boot[33..40], b"BOOT.;1");
    let cat = &root[354..];
    assert_eq!(cat[0], 124);
    assert_eq!(cat[32], 10);
    assert_eq!(&cat[33..43], b"BOOT.CAT;1");
    assert_eq!(le32(cat, 2), 32);

    // all three namespace views list both names
    let iso_names: Vec<String> = image
        .list_children(PathRef::Iso("/"))
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(iso_names, vec!["BOOT.;1", "BOOT.CAT;1"]);
    let joliet_names: Vec<String> = image
        .list_children(PathRef::Joliet("/"))
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(joliet_names, vec!["boot", "boot.cat"]);
    let rr_names: Vec<Option<String>> = image
        .list_children(PathRef::Iso("/"))
        .unwrap()
        .into_iter()
        .map(|r| r.rr_name)
        .collect();
    assert_eq!(rr_names, vec![Some("boot".to_owned()), Some("boot.cat".to_owned())]);
}

#[test]
fn test_isohybrid_layout() {
    let mut boot = vec![0u8; 2048];
    boot[0x40..0x44].copy_from_slice(&[0xFB, 0xC0, 0x78, 0x70]);

    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(boot, &Location::iso("/ISOLINUX.BIN;1"), None).unwrap();
    image.add_eltorito(&ElToritoOptions {
        load_size: Some(4),
        ..ElToritoOptions::new("/ISOLINUX.BIN;1", Location::iso("/BOOT.CAT;1"))
    }).unwrap();
    image.add_isohybrid(false).unwrap();
    let bytes = write_to_vec(&mut image);

    // padded to one 64-head, 32-sector cylinder
    assert_eq!(bytes.len(), 1_048_576);
    assert_eq!(bytes[510], 0x55);
    assert_eq!(bytes[511], 0xAA);
    // a single active partition aliasing the whole image
    assert_eq!(bytes[446], 0x80);
    assert_eq!(bytes[446 + 4], 0x17);
    assert_eq!(le32(&bytes, 446 + 12), 2048);
    // start CHS 0/0/1
    assert_eq!(&bytes[447..450], &[0, 1, 0]);
}

#[test]
fn test_boot_info_table_patch() {
    let mut boot = vec![0u8; 4096];
    for (i, b) in boot.iter_mut().enumerate() {
        *b = i as u8;
    }
    let expected_csum = {
        let mut sum = 0u32;
        let mut at = 64;
        while at < 4096 {
            sum = sum.wrapping_add(le32(&boot, at));
            at += 4;
        }
        sum
    };

    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(boot.clone(), &Location::iso("/BOOT.;1"), None).unwrap();
    image.add_eltorito(&ElToritoOptions {
        boot_info_table: true,
        ..ElToritoOptions::new("/BOOT.;1", Location::iso("/BOOT.CAT;1"))
    }).unwrap();
    let bytes = write_to_vec(&mut image);

    let file_at = 26 * BLOCK;
    assert_eq!(le32(&bytes, file_at + 8), 16); // PVD extent
    assert_eq!(le32(&bytes, file_at + 12), 26); // boot file extent
    assert_eq!(le32(&bytes, file_at + 16), 4096); // boot file length
    assert_eq!(le32(&bytes, file_at + 20), expected_csum);
    // bytes before and after the table are untouched
    assert_eq!(&bytes[file_at..file_at + 8], &boot[..8]);
    assert_eq!(&bytes[file_at + 64..file_at + 80], &boot[64..80]);
    // the in-memory content was not modified
    assert_eq!(image.get_file(PathRef::Iso("/BOOT.;1")).unwrap(), boot);
}

#[test]
fn test_joliet_empty_layout() {
    let mut image = DiscImage::new(DiscOptions {
        joliet: Some(3),
        ..DiscOptions::default()
    }).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 61_440);
    check_pvd(&bytes, 30, 10, 20, 22);
    // SVD at 17, terminator at 18
    assert_eq!(bytes[17 * BLOCK], 2);
    assert_eq!(bytes[18 * BLOCK], 0xFF);
    // Joliet path tables at 24/26, Joliet root at 29
    let svd = &bytes[17 * BLOCK..18 * BLOCK];
    assert_eq!(le32(svd, 132), 10);
    assert_eq!(le32(svd, 140), 24);
    assert_eq!(be32(svd, 148), 26);
    assert_eq!(le32(svd, 156 + 2), 29);
    assert_eq!(root_extent(&bytes), 28);
}

#[test]
fn test_level4_enhanced_descriptor() {
    let mut image = DiscImage::new(DiscOptions {
        interchange_level: 4,
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(b"x".to_vec(), &Location::iso("/lower case name"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 53_248);
    // enhanced descriptor at 17: type 2, version 2, file structure 2
    let evd = &bytes[17 * BLOCK..18 * BLOCK];
    assert_eq!(evd[0], 2);
    assert_eq!(evd[6], 2);
    assert_eq!(evd[881], 2);
    assert_eq!(bytes[18 * BLOCK], 0xFF);
}

#[test]
fn test_xa_records() {
    let mut image = DiscImage::new(DiscOptions {
        xa: true,
        ..DiscOptions::default()
    }).unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 49_152);
    // each record grows by the 14-byte XA suffix
    let root = &bytes[23 * BLOCK..];
    assert_eq!(root[0], 48);
    assert_eq!(&root[34 + 6..34 + 8], b"XA");
    // the PVD advertises XA in the application use area
    assert_eq!(&bytes[16 * BLOCK + 883 + 141..16 * BLOCK + 883 + 149], b"CD-XA001");
}

#[test]
fn test_udf_bridge_layout() {
    let mut image = DiscImage::new(DiscOptions {
        udf: Some(UdfRevision::V2_60),
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(
        b"data\n".to_vec(),
        &Location::iso("/DATA.;1").with_udf("/data.txt"),
        None,
    ).unwrap();
    let bytes = write_to_vec(&mut image);

    // volume recognition sequence after the terminator
    assert_eq!(&bytes[18 * BLOCK + 1..18 * BLOCK + 6], b"BEA01");
    assert_eq!(&bytes[19 * BLOCK + 1..19 * BLOCK + 6], b"NSR03");
    assert_eq!(&bytes[20 * BLOCK + 1..20 * BLOCK + 6], b"TEA01");

    // anchors at 256 and at the last block
    let anchor = premaster::udf::AnchorDescriptor::parse(&bytes[256 * BLOCK..]).unwrap();
    assert_eq!(anchor.main_vds.location, 32);
    assert_eq!(anchor.reserve_vds.location, 48);
    let space = le32(&bytes, 16 * BLOCK + 80) as usize;
    assert_eq!(bytes.len(), space * BLOCK);
    let tail = premaster::udf::AnchorDescriptor::parse(&bytes[(space - 1) * BLOCK..]).unwrap();
    assert_eq!(tail, anchor);

    // the file set descriptor opens the partition
    let fsd = premaster::udf::FileSetDescriptor::parse(&bytes[257 * BLOCK..]).unwrap();
    assert_eq!(fsd.root_icb.block, 2);

    // both namespaces read the same content
    assert_eq!(image.get_file(PathRef::Iso("/DATA.;1")).unwrap(), b"data\n");
    assert_eq!(image.get_file(PathRef::Udf("/data.txt")).unwrap(), b"data\n");
}

#[test]
fn test_duplicate_pvd() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.duplicate_pvd().unwrap();
    let bytes = write_to_vec(&mut image);

    assert_eq!(bytes.len(), 51_200);
    assert_eq!(bytes[16 * BLOCK], 1);
    assert_eq!(bytes[17 * BLOCK], 1);
    // the two copies are byte-identical
    assert_eq!(bytes[16 * BLOCK..17 * BLOCK], bytes[17 * BLOCK..18 * BLOCK]);
    assert_eq!(bytes[18 * BLOCK], 0xFF);
}

#[test]
fn test_hidden_flag_on_disc() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"x".to_vec(), &Location::iso("/A.;1"), None).unwrap();
    image.set_hidden(PathRef::Iso("/A.;1")).unwrap();
    let bytes = write_to_vec(&mut image);

    let record = &bytes[23 * BLOCK + 68..];
    assert_eq!(record[25] & 0x01, 0x01);
}

#[test]
fn test_deep_directory_relocation_on_disc() {
    let mut image = DiscImage::new(DiscOptions {
        rock_ridge: Some(RockRidgeVersion::V1_09),
        ..DiscOptions::default()
    }).unwrap();
    let mut path = String::new();
    for depth in 1..=8 {
        path.push_str(&format!("/D{}", depth));
        let rr = format!("d{}", depth);
        image.add_directory(&Location::iso(&path).with_rr(&rr), false).unwrap();
    }
    let bytes = write_to_vec(&mut image);

    // the reopened image resolves the logical Rock Ridge path
    let mut reopened = DiscImage::open(std::io::Cursor::new(bytes)).unwrap();
    let record = reopened
        .get_record(PathRef::RockRidge("/d1/d2/d3/d4/d5/d6/d7/d8"))
        .unwrap();
    assert!(record.is_dir);
    // and the physical home is under RR_MOVED
    assert!(reopened.get_record(PathRef::Iso("/RR_MOVED/D8")).is_ok());
    assert!(reopened.get_record(PathRef::Iso("/D1/D2/D3/D4/D5/D6/D7/D8")).is_ok());
}
