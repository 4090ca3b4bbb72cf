//! The `Ex.BIN` container: a table of (start, end) pairs followed by the
//! sub-files it points at, plus the copy of that table kept in the launcher.

use crate::cursor::{align_up, ByteCursor, ByteWriter, SECTOR_SIZE};
use crate::types::{FlowError, Region, SubFileAddress};

pub const US_LAUNCHER_TABLE: u64 = 0x1ED678;
pub const JP_LAUNCHER_TABLE: u64 = 0x1EAA38;
/// Each further archive's table sits this much lower in the launcher.
pub const LAUNCHER_TABLE_STRIDE: u64 = 0x1000;

/// Reads pairs until the read position reaches the first sub-file's start
/// (the end of the header) or a pair with a zero field shows up.
pub fn read_sub_file_table(archive: &[u8]) -> Result<Vec<SubFileAddress>, FlowError> {
    let mut cursor = ByteCursor::new(archive);
    let first = read_pair(&mut cursor)?;
    if first.start == 0 || first.end == 0 || first.end < first.start {
        return Err(FlowError::MalformedHeader(format!(
            "first entry is {:#x}..{:#x}",
            first.start, first.end
        )));
    }

    let header_end = first.start;
    let mut table = vec![first];
    while cursor.position() < header_end {
        let entry = read_pair(&mut cursor)?;
        if entry.start == 0 || entry.end == 0 {
            break;
        }
        table.push(entry);
    }

    log::debug!("archive table has {} entries", table.len());
    Ok(table)
}

fn read_pair(cursor: &mut ByteCursor<'_>) -> Result<SubFileAddress, FlowError> {
    let start = cursor.read_u32_le()?;
    let end = cursor.read_u32_le()?;
    Ok(SubFileAddress::new(start, end))
}

#[derive(Debug, Clone, Copy)]
pub struct SubFile<'a> {
    pub index: usize,
    pub bytes: &'a [u8],
}

/// Slices every sub-file out of the archive. Entries that do not fit are
/// logged and skipped.
pub fn extract<'a>(archive: &'a [u8], table: &[SubFileAddress]) -> Vec<SubFile<'a>> {
    table
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            match archive.get(entry.start as usize..entry.end as usize) {
                Some(bytes) => Some(SubFile { index, bytes }),
                None => {
                    log::warn!(
                        "sub-file {} ({:#x}..{:#x}) lies outside the {:#x} byte archive, skipped",
                        index,
                        entry.start,
                        entry.end,
                        archive.len()
                    );
                    None
                }
            }
        })
        .collect()
}

/// Places sub-files of the given sizes back to back after a header rounded
/// up to a whole sector.
pub fn layout(sizes: impl IntoIterator<Item = u32>) -> Vec<SubFileAddress> {
    let sizes: Vec<u32> = sizes.into_iter().collect();
    let mut start = align_up(sizes.len() as u32 * 8, SECTOR_SIZE);
    sizes
        .into_iter()
        .map(|size| {
            let entry = SubFileAddress::new(start, start + size);
            start = entry.end;
            entry
        })
        .collect()
}

/// Writes the pairs, then zero-fills up to the next sector boundary.
pub fn write_table(writer: &mut ByteWriter, table: &[SubFileAddress]) -> Result<(), FlowError> {
    for entry in table {
        writer.write_u32_le(entry.start)?;
        writer.write_u32_le(entry.end)?;
    }
    writer.pad_to(SECTOR_SIZE)
}

pub struct PackedArchive {
    pub bytes: Vec<u8>,
    pub table: Vec<SubFileAddress>,
}

pub fn pack<B: AsRef<[u8]>>(sub_files: &[B], pad_tail: bool) -> Result<PackedArchive, FlowError> {
    let table = layout(sub_files.iter().map(|f| f.as_ref().len() as u32));

    let mut writer = ByteWriter::new();
    write_table(&mut writer, &table)?;
    for sub_file in sub_files {
        writer.write_bytes(sub_file.as_ref())?;
    }
    if pad_tail {
        writer.pad_to(SECTOR_SIZE)?;
    }

    Ok(PackedArchive {
        bytes: writer.into_inner(),
        table,
    })
}

pub fn launcher_table_offset(region: Region, archive_index: u32) -> Option<u64> {
    let base = match region {
        Region::Us => US_LAUNCHER_TABLE,
        Region::Jp => JP_LAUNCHER_TABLE,
    };
    base.checked_sub(LAUNCHER_TABLE_STRIDE * archive_index as u64)
}

/// Overwrites the launcher's copy of archive `archive_index`'s table.
/// Nothing is written unless the whole padded table fits.
pub fn patch_launcher(
    launcher: &mut [u8],
    region: Region,
    archive_index: u32,
    table: &[SubFileAddress],
) -> Result<(), FlowError> {
    let size = launcher.len() as u64;
    let len = table.len() * 8;
    let offset = launcher_table_offset(region, archive_index)
        .ok_or(FlowError::LauncherOutOfRange { offset: 0, len, size })?;

    let end = align_up(offset as u32 + len as u32, SECTOR_SIZE) as u64;
    if end > size {
        return Err(FlowError::LauncherOutOfRange { offset, len, size });
    }

    let mut writer = ByteWriter::new();
    for entry in table {
        writer.write_u32_le(entry.start)?;
        writer.write_u32_le(entry.end)?;
    }
    let mut patch = writer.into_inner();
    patch.resize((end - offset) as usize, 0);

    launcher[offset as usize..end as usize].copy_from_slice(&patch);
    log::info!(
        "patched {} launcher entries at {:#x}",
        table.len(),
        offset
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_three_files() {
        let files = vec![vec![1u8; 0x800], vec![2u8; 0x1000], vec![3u8; 0x800]];
        let packed = pack(&files, false).unwrap();

        assert_eq!(
            packed.table,
            vec![
                SubFileAddress::new(0x800, 0x1000),
                SubFileAddress::new(0x1000, 0x2000),
                SubFileAddress::new(0x2000, 0x2800),
            ]
        );
        assert_eq!(packed.bytes.len(), 0x2800);
        assert_eq!(hex::encode(&packed.bytes[..8]), "0008000000100000");
        assert!(packed.bytes[0x18..0x800].iter().all(|b| *b == 0));
        assert_eq!(packed.bytes[0x1000], 2);

        let table = read_sub_file_table(&packed.bytes).unwrap();
        assert_eq!(table, packed.table);
        let extracted = extract(&packed.bytes, &table);
        assert_eq!(extracted.len(), 3);
        assert_eq!(extracted[1].bytes, files[1].as_slice());
    }

    #[test]
    fn test_table_stops_at_zero_entry() {
        let mut archive = vec![0u8; 0x1000];
        archive[..8].copy_from_slice(&[0x00, 0x08, 0, 0, 0x10, 0x08, 0, 0]);
        let table = read_sub_file_table(&archive).unwrap();
        assert_eq!(table, vec![SubFileAddress::new(0x800, 0x810)]);
    }

    #[test]
    fn test_degenerate_first_entry() {
        let archive = vec![0u8; 0x800];
        assert!(matches!(
            read_sub_file_table(&archive),
            Err(FlowError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_extract_skips_out_of_range() {
        let table = [SubFileAddress::new(0x800, 0x900), SubFileAddress::new(0x900, 0x2000)];
        let archive = vec![0u8; 0x1000];
        let extracted = extract(&archive, &table);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].index, 0);
    }

    #[test]
    fn test_launcher_patch() {
        let table = [SubFileAddress::new(0x800, 0x1000)];
        let offset = launcher_table_offset(Region::Us, 1).unwrap();
        assert_eq!(offset, 0x1EC678);

        let mut launcher = vec![0xAAu8; 0x1ED000];
        patch_launcher(&mut launcher, Region::Us, 1, &table).unwrap();
        let at = offset as usize;
        assert_eq!(hex::encode(&launcher[at..at + 8]), "0008000000100000");
        assert!(launcher[at + 8..0x1EC800].iter().all(|b| *b == 0));
        assert_eq!(launcher[0x1EC800], 0xAA);

        let mut short = vec![0xAAu8; 0x1EC700];
        let err = patch_launcher(&mut short, Region::Us, 1, &table).unwrap_err();
        assert!(matches!(err, FlowError::LauncherOutOfRange { .. }));
        assert!(short.iter().all(|b| *b == 0xAA));
    }
}
