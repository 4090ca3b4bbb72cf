use crate::archive::{extract, pack, read_sub_file_table};
use crate::*;

#[test]
fn test_three_sub_files_start_after_one_sector() {
    let files = vec![vec![0xA0u8; 0x800], vec![0xB0u8; 0x1000], vec![0xC0u8; 0x800]];
    let packed = pack(&files, false).unwrap();

    let bounds: Vec<(u32, u32)> = packed.table.iter().map(|e| (e.start, e.end)).collect();
    assert_eq!(bounds, vec![(0x800, 0x1000), (0x1000, 0x2000), (0x2000, 0x2800)]);
    assert_eq!(
        hex::encode(&packed.bytes[..24]),
        "000800000010000000100000002000000020000000280000"
    );
    assert_eq!(packed.bytes.len(), 0x2800);
}

#[test]
fn test_packed_entries_are_contiguous() {
    let files: Vec<Vec<u8>> = (1..=5u8).map(|n| vec![n; n as usize * 0x200]).collect();
    let packed = pack(&files, true).unwrap();

    for pair in packed.table.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert!(packed.table.iter().all(|e| e.start < e.end));
    assert_eq!(packed.bytes.len() % 0x800, 0);

    let table = read_sub_file_table(&packed.bytes).unwrap();
    let sub_files = extract(&packed.bytes, &table);
    for (sub_file, original) in sub_files.iter().zip(&files) {
        assert_eq!(sub_file.bytes, original.as_slice());
    }
}

#[test]
fn test_table_is_serializable() {
    let entry = SubFileAddress::new(0x800, 0x1000);
    let json = serde_json::to_string(&entry).unwrap();
    assert_eq!(json, r#"{"start":2048,"end":4096}"#);
    assert_eq!(entry.size(), 0x800);
}
