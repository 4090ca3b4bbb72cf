use super::ascii_catalog;
use crate::header::{HeaderLayout, SpotTable, TalkTable, NO_ADDRESS};
use crate::*;

const CODE_START: u32 = 0xC00;
const LOOP_TARGET: u32 = 0xC18;

fn put(data: &mut [u8], offset: u32, value: u32) {
    let at = offset as usize;
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Header, eight instructions, then "Hi" (loaded by `ld_text`) and, where
/// the region keeps a text table, "Bye" and the table.
fn flow_file(region: Region) -> Vec<u8> {
    let layout = HeaderLayout::new(region);
    let mut data = vec![0u8; CODE_START as usize];
    data[0x02..0x06].copy_from_slice(&[0x03, 0x00, 0x07, 0x00]);
    put(&mut data, layout.entry_pointer(), CODE_START);

    let slot = layout.character_slot(TalkTable::Primary, 0).unwrap();
    put(&mut data, slot.first, LOOP_TARGET);
    put(&mut data, slot.second, NO_ADDRESS);

    let (count, entries) = layout.spot_pointers(SpotTable::Positions);
    put(&mut data, count, 0xBD8);
    put(&mut data, entries, 0xBE0);
    put(&mut data, 0xBD8, 1);
    data[0xBE0..0xBE4].copy_from_slice(&[10, 20, 0x34, 0x12]);
    put(&mut data, 0xBE4, LOOP_TARGET);

    let (count, entries) = layout.spot_pointers(SpotTable::Interactables);
    put(&mut data, count, 0xBF0);
    put(&mut data, entries, 0xBF8);

    let code = "ff4d1e00\
                ff550000200c0000\
                ff220000180c0000\
                ff210000\
                ff4d0500\
                ff210000";
    data.extend(hex::decode(code).unwrap());

    // 0xC20
    data.extend(hex::decode("01480169ff01").unwrap());
    if region.has_text_table() {
        data.resize(0xC28, 0);
        data.extend(hex::decode("014201790165ff01").unwrap());
        put(&mut data, 0x34, 0xC30);
        data.extend(hex::decode("02000000200c0000280c0000").unwrap());
    }
    data.resize(0x1000, 0);
    data
}

/// A US file that also fills a secondary talk slot and an interactable,
/// and carries a label-taking unknown command and a raw opcode.
fn flow_file_with_extras() -> Vec<u8> {
    let layout = HeaderLayout::new(Region::Us);
    let mut data = vec![0u8; CODE_START as usize];
    put(&mut data, layout.entry_pointer(), CODE_START);

    let slot = layout.character_slot(TalkTable::Primary, 0).unwrap();
    put(&mut data, slot.first, LOOP_TARGET);
    put(&mut data, slot.second, NO_ADDRESS);
    let slot = layout.character_slot(TalkTable::Secondary, 0).unwrap();
    put(&mut data, slot.first, NO_ADDRESS);
    put(&mut data, slot.second, 0xC24);

    let (count, entries) = layout.spot_pointers(SpotTable::Positions);
    put(&mut data, count, 0xBD8);
    put(&mut data, entries, 0xBE0);

    let (count, entries) = layout.spot_pointers(SpotTable::Interactables);
    put(&mut data, count, 0xBF0);
    put(&mut data, entries, 0xBF8);
    put(&mut data, 0xBF0, 1);
    data[0xBF8..0xBFC].copy_from_slice(&[5, 6, 0x01, 0x00]);
    put(&mut data, 0xBFC, 0xC24);

    let code = "ff2f0200180c0000\
                ff3d0102aabbccdd\
                ff4d0a00\
                ff210000\
                ff4d0500\
                ff210000\
                ff4b0000\
                ff210000";
    data.extend(hex::decode(code).unwrap());

    // "Hi" at 0xC28, the table right after it
    data.extend(hex::decode("01480169ff01").unwrap());
    put(&mut data, 0x34, 0xC2E);
    data.extend(hex::decode("01000000280c0000").unwrap());
    data.resize(0x1000, 0);
    data
}

#[test]
fn test_header_tables_and_unknown_opcodes_round_trip() {
    let catalog = ascii_catalog();
    let original = flow_file_with_extras();

    let disassembly = Disassembler::new(&catalog, Region::Us)
        .disassemble(&original)
        .unwrap();
    assert!(disassembly
        .dec
        .contains("section\t.talk2\n\t00\t\t_,LABEL_1\n\n"));
    assert!(disassembly
        .dec
        .contains("section\t.interactables\n\t005\t006\tLABEL_1\n\n"));
    assert!(disassembly.dec.contains("\tunk_cmd_2F\t"));
    assert!(disassembly.dec.contains("\tunknown|FF3d0102,aabbccdd\n"));
    assert!(disassembly.dec.contains("\nLABEL_1:\n\tret\n"));

    let txt = disassembly.txt().unwrap();
    assert_eq!(txt, "\"Hi\"\n");

    let rebuilt = Assembler::new(&catalog, Region::Us)
        .assemble(&original, &disassembly.dec, Some(&txt))
        .unwrap();
    assert_eq!(hex::encode(&rebuilt), hex::encode(&original));
}

#[test]
fn test_us_file_round_trip() {
    let catalog = ascii_catalog();
    let original = flow_file(Region::Us);

    let disassembly = Disassembler::new(&catalog, Region::Us)
        .disassemble(&original)
        .unwrap();
    assert!(disassembly.dec.starts_with(
        "addr\t0x00000c00\n\n\
         section\t.bgm\n\t0x03\n\t0x07\n\n\
         section\t.talk\n\t00\t\tLABEL_0,_\n\n\
         section\t.talk2\n\n\
         section\t.positions\n\t010\t020\tLABEL_0\n\n\
         section\t.interactables\n\n\
         section\t.code\n"
    ));
    assert!(disassembly
        .dec
        .contains("\tjump\tLABEL_0\n\tret\n\nLABEL_0:\n\twait\t0x0005"));

    let txt = disassembly.txt().unwrap();
    assert_eq!(txt, "\"Hi\"\n\"Bye\"\n");

    let rebuilt = Assembler::new(&catalog, Region::Us)
        .assemble(&original, &disassembly.dec, Some(&txt))
        .unwrap();
    assert_eq!(hex::encode(&rebuilt), hex::encode(&original));
}

#[test]
fn test_jp_file_round_trip() {
    let catalog = ascii_catalog();
    let original = flow_file(Region::Jp);

    let disassembly = Disassembler::new(&catalog, Region::Jp)
        .disassemble(&original)
        .unwrap();
    let txt = disassembly.txt().unwrap();
    assert_eq!(txt, "\"Hi\"\n");
    assert!(disassembly.texts.get(0).unwrap().orphan);

    let rebuilt = Assembler::new(&catalog, Region::Jp)
        .assemble(&original, &disassembly.dec, Some(&txt))
        .unwrap();
    assert_eq!(rebuilt, original);
}

#[test]
fn test_longer_string_moves_the_text_table() {
    let catalog = ascii_catalog();
    let original = flow_file(Region::Us);
    let disassembly = Disassembler::new(&catalog, Region::Us)
        .disassemble(&original)
        .unwrap();

    let rebuilt = Assembler::new(&catalog, Region::Us)
        .assemble(&original, &disassembly.dec, Some("\"Hello there\"\n\"Bye\"\n"))
        .unwrap();
    assert_eq!(rebuilt.len() % 0x800, 0);
    // strings at 0xC20 and 0xC38, table right after the second
    assert_eq!(hex::encode(&rebuilt[0x34..0x38]), "400c0000");
    assert_eq!(hex::encode(&rebuilt[0xC40..0xC4C]), "02000000200c0000380c0000");

    let again = Disassembler::new(&catalog, Region::Us)
        .disassemble(&rebuilt)
        .unwrap();
    assert_eq!(again.txt().unwrap(), "\"Hello there\"\n\"Bye\"\n");
    assert_eq!(again.dec.replace("Hello there", "Hi"), disassembly.dec);
}

#[test]
fn test_backward_jump_is_labelled() {
    let catalog = ascii_catalog();
    let mut data = vec![0u8; 0x800];
    put(&mut data, 0x60, 0x100);
    data[0x40..0x44].copy_from_slice(&[0xFF, 0x21, 0x00, 0x00]);
    data[0x100..0x108].copy_from_slice(&[0xFF, 0x22, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00]);

    let disassembly = Disassembler::new(&catalog, Region::Jp)
        .disassemble(&data)
        .unwrap();
    assert!(disassembly
        .dec
        .ends_with("section\t.code\n\tjump\tLABEL_0\n\nLABEL_0:\n\tret\n"));
}

#[test]
fn test_undefined_label_fails_assembly() {
    let catalog = ascii_catalog();
    let original = flow_file(Region::Us);
    let disassembly = Disassembler::new(&catalog, Region::Us)
        .disassemble(&original)
        .unwrap();
    let dec = disassembly.dec.replace("\tjump\tLABEL_0", "\tjump\tLABEL_7");

    let err = Assembler::new(&catalog, Region::Us)
        .assemble(&original, &dec, disassembly.txt().as_deref())
        .unwrap_err();
    assert!(matches!(err, FlowError::DanglingReferences(ref names) if names == "LABEL_7"));
    assert!(err.is_malformed_input());
}

#[test]
fn test_file_without_code_is_empty() {
    let catalog = ascii_catalog();
    let mut data = vec![0u8; 0x800];
    put(&mut data, 0x64, NO_ADDRESS);

    let disassembly = Disassembler::new(&catalog, Region::Us)
        .disassemble(&data)
        .unwrap();
    assert_eq!(disassembly.dec, "EMPTY");
    assert_eq!(disassembly.txt(), None);

    let rebuilt = Assembler::new(&catalog, Region::Us)
        .assemble(&data, &disassembly.dec, None)
        .unwrap();
    assert_eq!(rebuilt, data);
}
