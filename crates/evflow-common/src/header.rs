//! Fixed offsets inside a flow-script sub-file header.

use crate::types::Region;

/// Marks an unused address slot.
pub const NO_ADDRESS: u32 = 0xFFFF_FFFF;

pub const SONGS_OFFSET: u32 = 0x02;
const TEXT_TABLE_POINTER: u32 = 0x34;
const POSITIONS_POINTER: u32 = 0x38;
const INTERACTABLES_POINTER: u32 = 0x48;
const ENTRY_POINTER: u32 = 0x64;

/// Layout of one array of character records.
#[derive(Debug, Clone, Copy)]
struct CharacterRecords {
    base: u32,
    count: usize,
    stride: u32,
    first_address: u32,
    second_address: u32,
}

const PRIMARY_CHARACTERS: CharacterRecords = CharacterRecords {
    base: 0x1F4,
    count: 64,
    stride: 0x24,
    first_address: 0x04,
    second_address: 0x14,
};

const SECONDARY_CHARACTERS: CharacterRecords = CharacterRecords {
    base: 0xAF4,
    count: 8,
    stride: 0x1C,
    first_address: 0x04,
    second_address: 0x10,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkTable {
    Primary,
    Secondary,
}

impl TalkTable {
    pub fn section(self) -> &'static str {
        match self {
            TalkTable::Primary => ".talk",
            TalkTable::Secondary => ".talk2",
        }
    }

    fn records(self) -> CharacterRecords {
        match self {
            TalkTable::Primary => PRIMARY_CHARACTERS,
            TalkTable::Secondary => SECONDARY_CHARACTERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotTable {
    Positions,
    Interactables,
}

impl SpotTable {
    pub fn section(self) -> &'static str {
        match self {
            SpotTable::Positions => ".positions",
            SpotTable::Interactables => ".interactables",
        }
    }
}

/// `.DEC` sections, in the order they appear in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Bgm,
    Talk,
    Talk2,
    Positions,
    Interactables,
    Code,
}

impl Section {
    pub const ORDER: [Section; 6] = [
        Section::Bgm,
        Section::Talk,
        Section::Talk2,
        Section::Positions,
        Section::Interactables,
        Section::Code,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Bgm => ".bgm",
            Section::Talk => TalkTable::Primary.section(),
            Section::Talk2 => TalkTable::Secondary.section(),
            Section::Positions => SpotTable::Positions.section(),
            Section::Interactables => SpotTable::Interactables.section(),
            Section::Code => ".code",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|section| section.name() == name)
    }
}

/// Absolute offsets of the two event addresses of one character record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterSlot {
    pub index: usize,
    pub first: u32,
    pub second: u32,
}

/// Bytes per position/interactable entry: x, y, u16 unknown, u32 address.
pub const SPOT_ENTRY_SIZE: u32 = 8;
pub const SPOT_ADDRESS_OFFSET: u32 = 4;

#[derive(Debug, Clone, Copy)]
pub struct HeaderLayout {
    region: Region,
}

impl HeaderLayout {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    fn shifted(&self, offset: u32) -> u32 {
        match self.region {
            Region::Us => offset,
            Region::Jp => offset - 4,
        }
    }

    pub fn text_table_pointer(&self) -> Option<u32> {
        self.region.has_text_table().then_some(TEXT_TABLE_POINTER)
    }

    pub fn entry_pointer(&self) -> u32 {
        self.shifted(ENTRY_POINTER)
    }

    /// Offsets of the pointer to the entry count and the pointer to the entries.
    pub fn spot_pointers(&self, table: SpotTable) -> (u32, u32) {
        let base = match table {
            SpotTable::Positions => POSITIONS_POINTER,
            SpotTable::Interactables => INTERACTABLES_POINTER,
        };
        let base = self.shifted(base);
        (base, base + 4)
    }

    pub fn character_slots(&self, table: TalkTable) -> impl Iterator<Item = CharacterSlot> {
        let records = table.records();
        let base = self.shifted(records.base);
        (0..records.count).map(move |index| {
            let record = base + index as u32 * records.stride;
            CharacterSlot {
                index,
                first: record + records.first_address,
                second: record + records.second_address,
            }
        })
    }

    pub fn character_slot(&self, table: TalkTable, index: usize) -> Option<CharacterSlot> {
        self.character_slots(table).nth(index)
    }
}

pub fn is_address(value: u32) -> bool {
    value != 0 && value != NO_ADDRESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jp_layout_is_shifted() {
        let us = HeaderLayout::new(Region::Us);
        let jp = HeaderLayout::new(Region::Jp);
        assert_eq!(us.entry_pointer(), 0x64);
        assert_eq!(jp.entry_pointer(), 0x60);
        assert_eq!(jp.spot_pointers(SpotTable::Interactables), (0x44, 0x48));
        assert_eq!(jp.text_table_pointer(), None);

        let last = us.character_slot(TalkTable::Primary, 63).unwrap();
        assert_eq!(last.first, 0x1F4 + 63 * 0x24 + 4);
        let first = jp.character_slot(TalkTable::Secondary, 0).unwrap();
        assert_eq!((first.first, first.second), (0xAF4, 0xB00));
        assert!(us.character_slot(TalkTable::Secondary, 8).is_none());
    }

    #[test]
    fn test_section_names() {
        assert_eq!(Section::from_name(".talk2"), Some(Section::Talk2));
        assert_eq!(Section::from_name(".text"), None);
        assert!(Section::Bgm < Section::Code);
    }
}
