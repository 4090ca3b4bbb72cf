use std::collections::HashMap;

/// Every flow instruction starts with this byte, followed by the opcode.
pub const COMMAND_PREFIX: u8 = 0xFF;
/// `FF 1B` opens a character name in text data, never an instruction.
pub const TEXT_NAME_MARKER: u8 = 0x1B;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u8);

impl Opcode {
    pub const NOTHING: Opcode = Opcode(0x00);
    pub const RET: Opcode = Opcode(0x21);
    pub const JUMP: Opcode = Opcode(0x22);
    pub const JUMP_IF: Opcode = Opcode(0x26);
    pub const BATTLE: Opcode = Opcode(0x28);
    pub const LD_WORLD_MAP: Opcode = Opcode(0x29);
    pub const OPEN_SHOP_MENU: Opcode = Opcode(0x2A);
    pub const LD_FILE: Opcode = Opcode(0x2B);
    pub const LD_3D_MAP: Opcode = Opcode(0x2C);
    pub const PLAY_MV: Opcode = Opcode(0x2D);
    pub const GIVE_ITEM: Opcode = Opcode(0x3C);
    pub const MONEY_CHECK: Opcode = Opcode(0x3E);
    pub const MONEY_TRANSFER: Opcode = Opcode(0x3F);
    pub const OPEN_SAVE_MENU: Opcode = Opcode(0x4B);
    pub const WAIT: Opcode = Opcode(0x4D);
    pub const PLAYER_OPTION: Opcode = Opcode(0x54);
    pub const LD_TEXT: Opcode = Opcode(0x55);
    pub const OPEN_DIALOG: Opcode = Opcode(0x60);
    pub const CLOSE_DIALOG: Opcode = Opcode(0x61);
    pub const POSE: Opcode = Opcode(0x64);
    pub const FX: Opcode = Opcode(0x65);
    pub const CLR_CHAR: Opcode = Opcode(0x66);
    pub const LD_PORTRAIT: Opcode = Opcode(0x67);
    pub const CLOSE_PORTRAIT: Opcode = Opcode(0x68);
    pub const EMOTE: Opcode = Opcode(0x69);
    pub const SCREEN_FX: Opcode = Opcode(0x6C);
    pub const PLAN_CHAR_MOV: Opcode = Opcode(0x6E);
    pub const FADE_CHAR: Opcode = Opcode(0x76);
    pub const FOLLOW_CHAR: Opcode = Opcode(0x78);
    pub const CLR_EMOTE: Opcode = Opcode(0x7A);
    pub const DO_PLANNED_MOVES: Opcode = Opcode(0x7B);
    pub const TP_CHAR: Opcode = Opcode(0x7C);
    pub const PLAY_SONG: Opcode = Opcode(0x80);
    pub const PLAY_SFX: Opcode = Opcode(0x81);
}

/// How an opcode's operands are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// Decoded into a dedicated variant.
    Known,
    /// A 16-bit parameter followed by a code address; meaning unknown.
    LabelledUnknown,
    /// Kept as raw bytes: the 16-bit field plus this many big-endian words.
    Raw { words: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub shape: OperandShape,
}

const fn known(byte: u8, mnemonic: &'static str) -> OpcodeInfo {
    OpcodeInfo {
        opcode: Opcode(byte),
        mnemonic,
        shape: OperandShape::Known,
    }
}

const fn labelled(byte: u8, mnemonic: &'static str) -> OpcodeInfo {
    OpcodeInfo {
        opcode: Opcode(byte),
        mnemonic,
        shape: OperandShape::LabelledUnknown,
    }
}

const fn raw(byte: u8, mnemonic: &'static str, words: u8) -> OpcodeInfo {
    OpcodeInfo {
        opcode: Opcode(byte),
        mnemonic,
        shape: OperandShape::Raw { words },
    }
}

pub const OPCODES: &[OpcodeInfo] = &[
    raw(0x00, "nothing", 0),
    known(0x21, "ret"),
    known(0x22, "jump"),
    raw(0x24, "unknown_24", 0),
    raw(0x25, "unknown_25", 0),
    known(0x26, "jump_if"),
    raw(0x27, "unknown_27", 0),
    known(0x28, "battle"),
    known(0x29, "ld_world_map"),
    known(0x2A, "open_shop_menu"),
    known(0x2B, "ld_file"),
    known(0x2C, "ld_3d_map"),
    known(0x2D, "play_MV"),
    labelled(0x2F, "unk_cmd_2F"),
    labelled(0x30, "unk_cmd_30"),
    raw(0x31, "unknown_31", 0),
    raw(0x32, "unknown_32", 0),
    raw(0x39, "unknown_39", 0),
    labelled(0x3A, "unk_cmd_3A"),
    labelled(0x3B, "unk_cmd_3B"),
    known(0x3C, "give_item"),
    raw(0x3D, "unknown_3D", 1),
    known(0x3E, "money_check"),
    known(0x3F, "money_transfer"),
    labelled(0x44, "unk_cmd_44"),
    labelled(0x45, "unk_cmd_45"),
    labelled(0x47, "unk_cmd_47"),
    known(0x4B, "open_save_menu"),
    raw(0x4C, "unknown_4C", 0),
    known(0x4D, "wait"),
    raw(0x4F, "unknown_4F", 0),
    raw(0x52, "unknown_52", 0),
    raw(0x53, "unknown_53", 0),
    known(0x54, "player_option"),
    known(0x55, "ld_text"),
    raw(0x56, "unknown_56", 0),
    raw(0x57, "unknown_57", 0),
    labelled(0x58, "unk_cmd_58"),
    labelled(0x59, "unk_cmd_59"),
    labelled(0x5A, "unk_cmd_5A"),
    known(0x60, "open_dialog"),
    known(0x61, "close_dialog"),
    known(0x64, "pose"),
    known(0x65, "fx"),
    known(0x66, "clr_char"),
    known(0x67, "ld_portrait"),
    known(0x68, "close_portrait"),
    known(0x69, "emote"),
    known(0x6C, "screen_fx"),
    raw(0x6D, "unknown_6D", 0),
    known(0x6E, "plan_char_mov"),
    raw(0x73, "unknown_73", 0),
    raw(0x74, "unknown_74", 0),
    known(0x76, "fade_char"),
    raw(0x77, "unknown_77", 0),
    known(0x78, "follow_char"),
    raw(0x79, "unknown_79", 1),
    known(0x7A, "clr_emote"),
    known(0x7B, "do_planned_moves"),
    known(0x7C, "tp_char"),
    known(0x80, "play_song"),
    known(0x81, "play_sfx"),
    labelled(0x87, "unk_cmd_87"),
    raw(0x88, "unknown_88", 0),
    raw(0x89, "unknown_89", 0),
    raw(0x8A, "unknown_8A", 0),
];

pub fn opcode_map() -> HashMap<&'static str, Opcode> {
    OPCODES.iter().map(|info| (info.mnemonic, info.opcode)).collect()
}

pub fn mnemonic_of(opcode: Opcode) -> Option<&'static str> {
    OPCODES
        .iter()
        .find(|info| info.opcode == opcode)
        .map(|info| info.mnemonic)
}

pub fn opcode_info_map() -> HashMap<u8, &'static OpcodeInfo> {
    OPCODES.iter().map(|info| (info.opcode.0, info)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_is_consistent() {
        let by_byte = opcode_info_map();
        let by_name = opcode_map();
        assert_eq!(by_byte.len(), OPCODES.len());
        assert_eq!(by_name.len(), OPCODES.len());
        assert_eq!(by_name["jump"], Opcode::JUMP);
        assert_eq!(by_byte[&0x3D].shape, OperandShape::Raw { words: 1 });
        assert_eq!(by_byte[&0x87].shape, OperandShape::LabelledUnknown);
        assert!(!by_byte.contains_key(&TEXT_NAME_MARKER));
    }
}
