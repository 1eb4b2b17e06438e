//! Write → open → write fidelity.
//!
//! Images produced by this crate must reopen into a state that writes the
//! identical bytes, and writing twice without mutations must be a no-op.

use std::io::Cursor;

use premaster::{
    DiscImage, DiscOptions, ElToritoOptions, Error, LinkSource, Location, PathRef,
    RockRidgeVersion, UdfRevision,
};

fn write_to_vec(image: &mut DiscImage<'_>) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write(&mut bytes).unwrap();
    bytes
}

fn assert_reopen_identical(bytes: Vec<u8>) -> DiscImage<'static> {
    let mut reopened = DiscImage::open(Cursor::new(bytes.clone())).unwrap();
    let rewritten = write_to_vec(&mut reopened);
    assert_eq!(rewritten.len(), bytes.len());
    // compare block by block so a failure names the first bad extent
    for (block, (ours, theirs)) in rewritten.chunks(2048).zip(bytes.chunks(2048)).enumerate() {
        assert_eq!(ours, theirs, "block {} differs after reopen", block);
    }
    reopened
}

#[test]
fn test_write_is_idempotent() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    let first = write_to_vec(&mut image);
    let second = write_to_vec(&mut image);
    assert_eq!(first, second);
}

#[test]
fn test_lazy_and_always_consistent_agree() {
    let build = |always_consistent: bool| {
        let mut image = DiscImage::new(DiscOptions {
            always_consistent,
            ..DiscOptions::default()
        }).unwrap();
        image.add_directory(&Location::iso("/DIR1"), false).unwrap();
        image.add_file(b"foo\n".to_vec(), &Location::iso("/DIR1/FOO.;1"), None).unwrap();
        image.add_file(b"bar\n".to_vec(), &Location::iso("/BAR.;1"), None).unwrap();
        image.rm_file(PathRef::Iso("/BAR.;1")).unwrap();
        write_to_vec(&mut image)
    };
    assert_eq!(build(false), build(true));
}

#[test]
fn test_reopen_empty_image() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    let bytes = write_to_vec(&mut image);
    let mut reopened = assert_reopen_identical(bytes);
    assert!(reopened.list_children(PathRef::Iso("/")).unwrap().is_empty());
    assert!(matches!(
        reopened.get_file(PathRef::Iso("/FOO.;1")),
        Err(Error::InvalidInput(_)),
    ));
}

#[test]
fn test_reopen_one_file() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = assert_reopen_identical(bytes);
    let children = reopened.list_children(PathRef::Iso("/")).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "FOO.;1");
    assert_eq!(children[0].extent, 24);
    assert_eq!(children[0].length, 4);
    assert!(!children[0].is_dir);
    assert_eq!(reopened.get_file(PathRef::Iso("/FOO.;1")).unwrap(), b"foo\n");
    assert_eq!(reopened.full_path(&children[0]), "/FOO.;1");
}

#[test]
fn test_reopen_nested_directories() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_directory(&Location::iso("/DIR1"), false).unwrap();
    image.add_directory(&Location::iso("/DIR1/SUBDIR1"), false).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/DIR1/SUBDIR1/FOO.;1"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(
        reopened.get_file(PathRef::Iso("/DIR1/SUBDIR1/FOO.;1")).unwrap(),
        b"foo\n",
    );
    let record = reopened.get_record(PathRef::Iso("/DIR1/SUBDIR1")).unwrap();
    assert!(record.is_dir);
}

#[test]
fn test_reopen_joliet_rr_eltorito() {
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

    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(reopened.get_file(PathRef::Joliet("/boot")).unwrap(), b"boot\n");
    assert_eq!(reopened.get_file(PathRef::RockRidge("/boot")).unwrap(), b"boot\n");
    let record = reopened.get_record(PathRef::Iso("/BOOT.CAT;1")).unwrap();
    assert_eq!(record.extent, 32);
    assert_eq!(record.rr_name.as_deref(), Some("boot.cat"));
    // the catalog cannot be read as file content and the boot file is
    // protected from removal
    assert!(reopened.rm_file(PathRef::Iso("/BOOT.;1")).is_err());
}

#[test]
fn test_reopen_rock_ridge_symlink() {
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

    let mut reopened = assert_reopen_identical(bytes);
    assert!(reopened.get_file(PathRef::RockRidge("/sym")).is_err());
    let record = reopened.get_record(PathRef::RockRidge("/sym")).unwrap();
    assert_eq!(record.rr_name.as_deref(), Some("sym"));
    assert_eq!(record.length, 0);
}

#[test]
fn test_reopen_rock_ridge_1_12() {
    let mut image = DiscImage::new(DiscOptions {
        rock_ridge: Some(RockRidgeVersion::V1_12),
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(
        b"foo\n".to_vec(),
        &Location::iso("/FOO.;1").with_rr("foo"),
        None,
    ).unwrap();
    let bytes = write_to_vec(&mut image);
    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(reopened.get_file(PathRef::RockRidge("/foo")).unwrap(), b"foo\n");
}

#[test]
fn test_reopen_udf_bridge() {
    let mut image = DiscImage::new(DiscOptions {
        udf: Some(UdfRevision::V2_60),
        ..DiscOptions::default()
    }).unwrap();
    image.add_directory(
        &Location::iso("/DIR1").with_udf("/subdir"),
        false,
    ).unwrap();
    image.add_file(
        b"data\n".to_vec(),
        &Location::iso("/DIR1/DATA.;1").with_udf("/subdir/data.txt"),
        None,
    ).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(
        reopened.get_file(PathRef::Udf("/subdir/data.txt")).unwrap(),
        b"data\n",
    );
    assert_eq!(reopened.get_file(PathRef::Iso("/DIR1/DATA.;1")).unwrap(), b"data\n");
}

#[test]
fn test_reopen_isohybrid() {
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
    assert_eq!(bytes.len(), 1_048_576);
    assert_reopen_identical(bytes);
}

#[test]
fn test_reopen_duplicate_pvd() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.duplicate_pvd().unwrap();
    let bytes = write_to_vec(&mut image);
    assert_reopen_identical(bytes);
}

#[test]
fn test_differing_duplicate_pvds_are_rejected() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.duplicate_pvd().unwrap();
    let mut bytes = write_to_vec(&mut image);
    // corrupt the copy's volume identifier
    bytes[17 * 2048 + 41] = b'X';
    assert!(matches!(
        DiscImage::open(Cursor::new(bytes)),
        Err(Error::InvalidIso(_)),
    ));
}

#[test]
fn test_reopen_hidden_and_hard_links() {
    let mut image = DiscImage::new(DiscOptions {
        joliet: Some(3),
        ..DiscOptions::default()
    }).unwrap();
    image.add_file(b"shared".to_vec(), &Location::iso("/A.;1"), None).unwrap();
    image.add_hard_link(
        LinkSource::Path(PathRef::Iso("/A.;1")),
        &Location { joliet: Some("/a"), ..Location::default() },
    ).unwrap();
    image.set_hidden(PathRef::Iso("/A.;1")).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = assert_reopen_identical(bytes);
    let record = reopened.get_record(PathRef::Iso("/A.;1")).unwrap();
    assert!(record.hidden);
    let joliet = reopened.get_record(PathRef::Joliet("/a")).unwrap();
    assert!(!joliet.hidden);
    assert_eq!(record.extent, joliet.extent);
    assert_eq!(reopened.get_file(PathRef::Joliet("/a")).unwrap(), b"shared");
}

#[test]
fn test_reopen_many_directories() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    for i in 1..=295 {
        let path = format!("/DIR{}", i);
        image.add_directory(&Location::iso(&path), false).unwrap();
    }
    let bytes = write_to_vec(&mut image);
    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(reopened.list_children(PathRef::Iso("/")).unwrap().len(), 295);
}

#[test]
fn test_mutate_after_open() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = DiscImage::open(Cursor::new(bytes)).unwrap();
    reopened.add_file(b"bar\n".to_vec(), &Location::iso("/BAR.;1"), None).unwrap();
    let bytes = write_to_vec(&mut reopened);

    let mut third = DiscImage::open(Cursor::new(bytes)).unwrap();
    assert_eq!(third.get_file(PathRef::Iso("/FOO.;1")).unwrap(), b"foo\n");
    assert_eq!(third.get_file(PathRef::Iso("/BAR.;1")).unwrap(), b"bar\n");
}

#[test]
fn test_rename_via_hard_link() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"payload".to_vec(), &Location::iso("/OLD.;1"), None).unwrap();
    image.add_hard_link(
        LinkSource::Path(PathRef::Iso("/OLD.;1")),
        &Location::iso("/NEW.;1"),
    ).unwrap();
    image.rm_hard_link(PathRef::Iso("/OLD.;1")).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = assert_reopen_identical(bytes);
    assert_eq!(reopened.get_file(PathRef::Iso("/NEW.;1")).unwrap(), b"payload");
    assert!(reopened.get_file(PathRef::Iso("/OLD.;1")).is_err());
}

#[test]
fn test_catalog_hard_link_dance() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"boot\n".to_vec(), &Location::iso("/BOOT.;1"), None).unwrap();
    image.add_eltorito(&ElToritoOptions::new(
        "/BOOT.;1", Location::iso("/BOOT.CAT;1"),
    )).unwrap();
    // hide the catalog from the tree, then link it back elsewhere
    image.rm_hard_link(PathRef::Iso("/BOOT.CAT;1")).unwrap();
    image.add_hard_link(LinkSource::BootCatalog, &Location::iso("/CAT.;1")).unwrap();
    let bytes = write_to_vec(&mut image);

    let mut reopened = DiscImage::open(Cursor::new(bytes)).unwrap();
    assert!(reopened.get_record(PathRef::Iso("/BOOT.CAT;1")).is_err());
    assert!(reopened.get_record(PathRef::Iso("/CAT.;1")).is_ok());
}

#[test]
fn test_failed_mutation_leaves_bytes_unchanged() {
    let mut image = DiscImage::new(DiscOptions::default()).unwrap();
    image.add_file(b"foo\n".to_vec(), &Location::iso("/FOO.;1"), None).unwrap();
    let before = write_to_vec(&mut image);

    assert!(image.add_file(b"dup".to_vec(), &Location::iso("/FOO.;1"), None).is_err());
    assert!(image.add_directory(&Location::iso("/no/such/parent/D"), false).is_err());
    assert!(image.rm_directory(&Location::iso("/FOO.;1")).is_err());

    let after = write_to_vec(&mut image);
    assert_eq!(before, after);
}
