mod archive_layout;
mod batch_files;
mod flow_round_trip;

use crate::*;

/// Every printable ASCII character at `0x0100 + byte`.
pub(crate) fn ascii_catalog() -> InstructionCatalog {
    let mut characters = CharacterTable::new();
    for byte in 0x20u8..0x7F {
        characters.insert(0x0100 + byte as u16, &(byte as char).to_string());
    }
    InstructionCatalog::new(characters)
}
