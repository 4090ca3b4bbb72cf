use super::ascii_catalog;
use crate::batch::*;
use crate::*;
use std::fs;

#[test]
fn test_interval_selects_both_directions() {
    assert_eq!(parse_interval("2-4").unwrap().collect::<Vec<_>>(), vec![2, 3, 4]);
    assert_eq!(parse_interval("4-2").unwrap().collect::<Vec<_>>(), vec![2, 3, 4]);
}

#[test]
fn test_interval_skips_missing_archives() {
    let og = tempfile::tempdir().unwrap();
    fs::write(og.path().join("E2.BIN"), [0u8]).unwrap();
    fs::write(og.path().join("E4.BIN"), [0u8]).unwrap();
    fs::create_dir(og.path().join("E3")).unwrap();

    let archives = archives_in_interval(og.path(), parse_interval("4-2").unwrap());
    assert_eq!(archives, vec![og.path().join("E2.BIN"), og.path().join("E4.BIN")]);
    let dirs = dirs_in_interval(og.path(), 1..=3);
    assert_eq!(dirs, vec![og.path().join("E3")]);
}

#[test]
fn test_decode_empty_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = select_inputs(dir.path(), SCRIPT_EXTENSION).unwrap_err();
    assert!(matches!(err, FlowError::EmptyBatch(ref path) if path == dir.path()));
}

#[test]
fn test_decode_then_encode_on_disk() {
    let catalog = ascii_catalog();
    let dir = tempfile::tempdir().unwrap();
    let evs = dir.path().join("E1_000.EVS");

    // entry 0xC00: ret
    let mut original = vec![0u8; 0xC00];
    original[0x60..0x64].copy_from_slice(&0xC00u32.to_le_bytes());
    original.extend([0xFF, 0x21, 0x00, 0x00]);
    original.resize(0x1000, 0);
    fs::write(&evs, &original).unwrap();

    let files = select_inputs(dir.path(), SCRIPT_EXTENSION).unwrap();
    let report = run_batch(&files, |path| decode_file(path, &catalog, Region::Jp)).unwrap();
    assert_eq!(report.processed, 1);

    let dec = fs::read_to_string(dir.path().join("E1_000.DEC")).unwrap();
    assert!(dec.ends_with("section\t.code\n\tret\n"));
    assert_eq!(fs::read_to_string(dir.path().join("E1_000.TXT")).unwrap(), "");

    fs::write(dir.path().join("E1_000.DEC"), dec.replace("\tret\n", "\twait\t0x0001\n\tret\n")).unwrap();
    let files = select_inputs(dir.path(), DEC_EXTENSION).unwrap();
    let report = run_batch(&files, |path| encode_file(path, &catalog, Region::Jp)).unwrap();
    assert!(report.is_success());

    let rebuilt = fs::read(&evs).unwrap();
    assert_eq!(rebuilt.len(), 0x1000);
    assert_eq!(hex::encode(&rebuilt[0xC00..0xC08]), "ff4d0100ff210000");
}

#[test]
fn test_bad_source_does_not_touch_the_script() {
    let catalog = ascii_catalog();
    let dir = tempfile::tempdir().unwrap();
    let evs = dir.path().join("E1_001.EVS");
    let mut original = vec![0u8; 0x800];
    original[0x60..0x64].copy_from_slice(&0x700u32.to_le_bytes());
    fs::write(&evs, &original).unwrap();
    fs::write(dir.path().join("E1_001.DEC"), "section\t.code\n\tjump\tLABEL_3\n").unwrap();

    let report = run_batch(&[evs.clone()], |path| encode_file(path, &catalog, Region::Jp)).unwrap();
    assert_eq!(report.failed, vec![evs.clone()]);
    assert_eq!(fs::read(&evs).unwrap(), original);
}

#[test]
fn test_po_files_next_to_txt() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("E1_000.TXT");
    fs::write(&txt, "\"Hi\"\n").unwrap();
    let converter = PoConverter::new().unwrap();

    let po = txt_to_po_file(&txt, &converter, Region::Us).unwrap();
    assert_eq!(po, dir.path().join("E1_000.PO"));
    let po_text = fs::read_to_string(&po).unwrap();
    fs::write(&po, po_text.replace("msgstr \"\"\n\n", "msgstr \"Hey\"\n\n")).unwrap();

    po_to_txt_file(&po, &converter).unwrap();
    assert_eq!(fs::read_to_string(&txt).unwrap(), "\"Hey\"");
}
