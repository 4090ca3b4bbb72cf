//! Sub-file bytes to `.DEC` source plus the string list.

use crate::catalog::InstructionCatalog;
use crate::cursor::ByteCursor;
use crate::header::{
    is_address, HeaderLayout, Section, SpotTable, TalkTable, NO_ADDRESS, SONGS_OFFSET,
};
use crate::instruction::{Instruction, SourceInstruction};
use crate::opcodes::{COMMAND_PREFIX, TEXT_NAME_MARKER};
use crate::text::TextTable;
use crate::text_codec::TextCodec;
use crate::types::{FlowError, Label, Region};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

pub const EMPTY_SOURCE: &str = "EMPTY";
pub const ADDR_DIRECTIVE: &str = "addr";
pub const SECTION_DIRECTIVE: &str = "section";
pub const LABEL_PREFIX: &str = "LABEL_";
/// Stands in for a missing address in `.talk` and spot lines.
pub const NO_LABEL: &str = "_";

/// Labels in order of first reference; one per address.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    by_address: HashMap<u32, usize>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the label at `address`, creating `LABEL_<n>` on first use.
    pub fn name_for(&mut self, address: u32) -> String {
        if let Some(&index) = self.by_address.get(&address) {
            return self.labels[index].name.clone();
        }

        let name = format!("{}{}", LABEL_PREFIX, self.labels.len());
        self.by_address.insert(address, self.labels.len());
        self.labels.push(Label {
            name: name.clone(),
            address,
            resolved: false,
        });
        name
    }

    pub fn get(&self, address: u32) -> Option<&Label> {
        self.by_address.get(&address).map(|&index| &self.labels[index])
    }

    pub fn mark_resolved(&mut self, address: u32) {
        if let Some(&index) = self.by_address.get(&address) {
            self.labels[index].resolved = true;
        }
    }

    /// Addresses of labels no walk has decoded yet, in reference order.
    pub fn unresolved(&self) -> Vec<u32> {
        self.labels
            .iter()
            .filter(|label| !label.resolved)
            .map(|label| label.address)
            .collect()
    }

    pub fn lowest_address(&self) -> Option<u32> {
        self.labels.iter().map(|label| label.address).min()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }
}

/// Instructions decoded by one walk, in address order.
type Segment = Vec<(u32, SourceInstruction)>;

/// State of one disassembly pass over one sub-file.
pub struct DisassemblyContext<'a> {
    data: &'a [u8],
    catalog: &'a InstructionCatalog,
    layout: HeaderLayout,
    codec: TextCodec<'a>,
    labels: LabelTable,
    texts: TextTable,
    decoded: HashSet<u32>,
    segments: Vec<Segment>,
}

impl<'a> DisassemblyContext<'a> {
    pub fn new(data: &'a [u8], catalog: &'a InstructionCatalog, region: Region) -> Self {
        Self {
            data,
            catalog,
            layout: HeaderLayout::new(region),
            codec: TextCodec::new(catalog.characters()),
            labels: LabelTable::new(),
            texts: TextTable::new(),
            decoded: HashSet::new(),
            segments: Vec::new(),
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn texts(&self) -> &TextTable {
        &self.texts
    }

    /// Loads the file's own text table, if the region has one.
    pub fn load_text_table(&mut self) -> Result<(), FlowError> {
        if let Some(pointer) = self.layout.text_table_pointer() {
            let address = ByteCursor::new(self.data).u32_le_at(pointer)?;
            self.texts = TextTable::read(self.data, address, &self.codec)?;
        }
        Ok(())
    }

    /// Renders every header section, creating labels for the addresses found.
    pub fn render_header(&mut self) -> Result<String, FlowError> {
        let mut out = String::new();

        let mut cursor = ByteCursor::at(self.data, SONGS_OFFSET);
        let first = cursor.read_u16_le()?;
        let second = cursor.read_u16_le()?;
        section_line(&mut out, Section::Bgm);
        let _ = write!(out, "\t{:#04x}\n\t{:#04x}\n\n", first, second);

        section_line(&mut out, Section::Talk);
        self.render_talk(&mut out, TalkTable::Primary)?;
        section_line(&mut out, Section::Talk2);
        self.render_talk(&mut out, TalkTable::Secondary)?;
        section_line(&mut out, Section::Positions);
        self.render_spots(&mut out, SpotTable::Positions)?;
        section_line(&mut out, Section::Interactables);
        self.render_spots(&mut out, SpotTable::Interactables)?;

        Ok(out)
    }

    fn render_talk(&mut self, out: &mut String, table: TalkTable) -> Result<(), FlowError> {
        let cursor = ByteCursor::new(self.data);
        for slot in self.layout.character_slots(table) {
            let first = cursor.u32_le_at(slot.first)?;
            let second = cursor.u32_le_at(slot.second)?;
            if !is_address(first) && !is_address(second) {
                continue;
            }

            let first = self.label_or_placeholder(first);
            let second = self.label_or_placeholder(second);
            let _ = writeln!(out, "\t{:02}\t\t{},{}", slot.index, first, second);
        }
        out.push('\n');
        Ok(())
    }

    fn render_spots(&mut self, out: &mut String, table: SpotTable) -> Result<(), FlowError> {
        let (count_pointer, entries_pointer) = self.layout.spot_pointers(table);
        let mut cursor = ByteCursor::new(self.data);
        let count_address = cursor.u32_le_at(count_pointer)?;
        let count = cursor.u32_le_at(count_address)?;

        if count > 0 {
            cursor.seek(cursor.u32_le_at(entries_pointer)?);
            for _ in 0..count {
                let x = cursor.read_u8()?;
                let y = cursor.read_u8()?;
                let _unknown = cursor.read_u16_le()?;
                let address = cursor.read_u32_le()?;
                let target = self.label_or_placeholder(address);
                let _ = writeln!(out, "\t{:03}\t{:03}\t{}", x, y, target);
            }
        }
        out.push('\n');
        log::debug!("{} lists {} entries", table.section(), count);
        Ok(())
    }

    fn label_or_placeholder(&mut self, address: u32) -> String {
        if is_address(address) {
            self.labels.name_for(address)
        } else {
            NO_LABEL.to_string()
        }
    }

    /// The main walk from `entry`, then a walk from every label the walks
    /// so far have not reached, until none are left.
    pub fn decode_code(&mut self, entry: u32) -> Result<(), FlowError> {
        self.walk(entry, false)?;

        let mut pending = self.unreached_labels();
        while !pending.is_empty() {
            for &address in &pending {
                if !self.decoded.contains(&address) {
                    self.walk(address, true)?;
                }
            }

            let remaining = self.unreached_labels();
            if remaining.iter().all(|address| pending.contains(address))
                && remaining.len() == pending.len()
            {
                let names: Vec<String> = remaining
                    .iter()
                    .filter_map(|&address| self.labels.get(address))
                    .map(|label| format!("{} ({:#x})", label.name, label.address))
                    .collect();
                return Err(FlowError::StuckLabels(names.join(", ")));
            }
            pending = remaining;
        }
        Ok(())
    }

    /// Labels whose address no walk has decoded. A label created after its
    /// instruction was decoded counts as reached.
    fn unreached_labels(&mut self) -> Vec<u32> {
        for address in self.labels.unresolved() {
            if self.decoded.contains(&address) {
                self.labels.mark_resolved(address);
            }
        }
        self.labels.unresolved()
    }

    /// Decodes instructions from `start`. Padding is skipped; a byte other
    /// than `FF` or a text name marker ends the walk. The main walk also
    /// stops at the first listed string, a label walk at `ret`.
    fn walk(&mut self, start: u32, from_label: bool) -> Result<(), FlowError> {
        let text_limit = if from_label {
            None
        } else {
            self.texts.first_table_address()
        };
        let mut cursor = ByteCursor::at(self.data, start);
        let mut segment = Segment::new();

        loop {
            while cursor.peek_u8() == Some(0) {
                cursor.read_u8()?;
            }
            let address = cursor.position();

            if text_limit.is_some_and(|limit| address >= limit) {
                break;
            }
            if self.decoded.contains(&address) {
                log::warn!(
                    "code from {:#x} runs into already decoded code at {:#x}",
                    start,
                    address
                );
                break;
            }
            if cursor.peek_u8() != Some(COMMAND_PREFIX) {
                break;
            }

            cursor.read_u8()?;
            let byte = cursor.read_u8()?;
            if byte == TEXT_NAME_MARKER {
                break;
            }

            let info = self.catalog.opcode(byte).ok_or_else(|| {
                FlowError::malformed(
                    Section::Code.name(),
                    format!("unknown opcode {:#04x} at {:#x}", byte, address),
                )
            })?;
            let instruction = Instruction::decode(info, &mut cursor)?;
            let instruction = self.bind(instruction)?;
            let ends_walk = from_label && instruction.is_ret();

            self.decoded.insert(address);
            self.labels.mark_resolved(address);
            segment.push((address, instruction));

            if ends_walk {
                break;
            }
        }

        log::debug!(
            "walk from {:#x} decoded {} instructions",
            start,
            segment.len()
        );
        self.segments.push(segment);
        Ok(())
    }

    /// Swaps code addresses for label names and string addresses for ids.
    fn bind(&mut self, instruction: Instruction) -> Result<SourceInstruction, FlowError> {
        let data = self.data;
        let codec = &self.codec;
        let labels = &mut self.labels;
        let texts = &mut self.texts;

        instruction.map_refs(
            |address| Ok(labels.name_for(address)),
            |address| {
                let index = texts.resolve(data, address, codec)?;
                u16::try_from(index)
                    .map_err(|_| FlowError::malformed(".TXT", "more strings than ids"))
            },
        )
    }

    /// Decoded code, each label line right before its instruction.
    pub fn render_code(&self) -> String {
        let mut code = String::new();
        for (address, instruction) in self.segments.iter().flatten() {
            if let Some(label) = self.labels.get(*address) {
                let _ = write!(code, "\n{}:\n", label.name);
            }
            code.push_str(&instruction.render(&self.texts));
        }
        code
    }

    /// Start of every walk that lies past the first string. The assembler
    /// writes all code ahead of the strings, so these move.
    pub fn code_past_strings(&self) -> Vec<u32> {
        let Some(first_string) = self.texts.entries().iter().map(|entry| entry.address).min() else {
            return Vec::new();
        };
        self.segments
            .iter()
            .filter_map(|segment| segment.first().map(|(address, _)| *address))
            .filter(|&address| address > first_string)
            .collect()
    }

    pub fn into_texts(self) -> TextTable {
        self.texts
    }
}

fn section_line(out: &mut String, section: Section) {
    let _ = writeln!(out, "{}\t{}", SECTION_DIRECTIVE, section.name());
}

/// Output of one disassembly.
#[derive(Debug, Clone)]
pub struct Disassembly {
    pub dec: String,
    pub texts: TextTable,
    /// No entry point and no labels: the file carries no code.
    pub empty: bool,
}

impl Disassembly {
    /// Contents of the `.TXT` file, if one should be written.
    pub fn txt(&self) -> Option<String> {
        (!self.empty).then(|| self.texts.render_txt())
    }
}

pub struct Disassembler<'a> {
    catalog: &'a InstructionCatalog,
    region: Region,
}

impl<'a> Disassembler<'a> {
    pub fn new(catalog: &'a InstructionCatalog, region: Region) -> Self {
        Self { catalog, region }
    }

    pub fn disassemble(&self, data: &[u8]) -> Result<Disassembly, FlowError> {
        let mut context = DisassemblyContext::new(data, self.catalog, self.region);
        context.load_text_table()?;
        let header = context.render_header()?;

        let entry = ByteCursor::new(data).u32_le_at(context.layout.entry_pointer())?;
        let entry = if entry != NO_ADDRESS {
            entry
        } else {
            match context.labels().lowest_address() {
                Some(lowest) => lowest,
                None => {
                    log::info!("no entry point and no labels");
                    return Ok(Disassembly {
                        dec: EMPTY_SOURCE.to_string(),
                        texts: context.into_texts(),
                        empty: true,
                    });
                }
            }
        };

        context.decode_code(entry)?;
        for address in context.code_past_strings() {
            log::warn!(
                "code at {:#x} follows the strings and moves ahead of them on assembly",
                address
            );
        }

        let mut dec = String::new();
        let _ = write!(dec, "{}\t{:#010x}\n\n", ADDR_DIRECTIVE, entry);
        dec.push_str(&header);
        section_line(&mut dec, Section::Code);
        dec.push_str(&context.render_code());

        log::debug!(
            "{} labels, {} strings",
            context.labels().len(),
            context.texts().len()
        );
        Ok(Disassembly {
            dec,
            texts: context.into_texts(),
            empty: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CharacterTable;

    fn catalog() -> InstructionCatalog {
        InstructionCatalog::new(CharacterTable::new())
    }

    #[test]
    fn test_backward_jump_gets_label_line() {
        let mut data = vec![0u8; 0x110];
        data[0x40..0x44].copy_from_slice(&[0xFF, 0x21, 0x00, 0x00]);
        data[0x100..0x108].copy_from_slice(&[0xFF, 0x22, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00]);

        let catalog = catalog();
        let mut context = DisassemblyContext::new(&data, &catalog, Region::Jp);
        context.decode_code(0x100).unwrap();

        assert_eq!(
            context.render_code(),
            "\tjump\tLABEL_0\n\nLABEL_0:\n\tret\n"
        );
        assert!(context.labels().get(0x40).unwrap().resolved);
    }

    #[test]
    fn test_loop_label_lands_inside_main_walk() {
        let mut data = vec![0u8; 0x20];
        // wait; jump back to the wait; ret
        data[0x00..0x04].copy_from_slice(&[0xFF, 0x4D, 0x1E, 0x00]);
        data[0x04..0x0C].copy_from_slice(&[0xFF, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        data[0x0C..0x10].copy_from_slice(&[0xFF, 0x21, 0x00, 0x00]);

        let catalog = catalog();
        let mut context = DisassemblyContext::new(&data, &catalog, Region::Jp);
        context.decode_code(0).unwrap();

        assert_eq!(
            context.render_code(),
            "\nLABEL_0:\n\twait\t0x001e\t// ticks\n\tjump\tLABEL_0\n\tret\n"
        );
    }

    #[test]
    fn test_walk_stops_at_text_name_marker() {
        let data = [0xFF, 0x21, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x1B, 0x01, 0x41];
        let catalog = catalog();
        let mut context = DisassemblyContext::new(&data, &catalog, Region::Jp);
        context.decode_code(0).unwrap();
        assert_eq!(context.render_code(), "\tret\n");
    }

    #[test]
    fn test_unreachable_label_is_an_error() {
        let mut data = vec![0u8; 0x20];
        // jump into a string
        data[0x00..0x08].copy_from_slice(&[0xFF, 0x22, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00]);
        data[0x10..0x14].copy_from_slice(&[0x01, 0x41, 0xFF, 0x01]);

        let catalog = catalog();
        let mut context = DisassemblyContext::new(&data, &catalog, Region::Jp);
        let err = context.decode_code(0).unwrap_err();
        assert!(matches!(err, FlowError::StuckLabels(ref names) if names.contains("LABEL_0")));
    }

    #[test]
    fn test_code_after_strings_is_reported() {
        let mut data = vec![0u8; 0x30];
        // ld_text 0x10; jump over the string
        data[0x00..0x08].copy_from_slice(&[0xFF, 0x55, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00]);
        data[0x08..0x10].copy_from_slice(&[0xFF, 0x22, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00]);
        data[0x10..0x14].copy_from_slice(&[0x01, 0x41, 0xFF, 0x01]);
        data[0x20..0x24].copy_from_slice(&[0xFF, 0x21, 0x00, 0x00]);

        let catalog = catalog();
        let mut context = DisassemblyContext::new(&data, &catalog, Region::Jp);
        context.decode_code(0).unwrap();
        assert_eq!(context.code_past_strings(), vec![0x20]);
    }

    #[test]
    fn test_label_numbering_follows_first_reference() {
        let mut labels = LabelTable::new();
        assert_eq!(labels.name_for(0x900), "LABEL_0");
        assert_eq!(labels.name_for(0x100), "LABEL_1");
        assert_eq!(labels.name_for(0x900), "LABEL_0");
        assert_eq!(labels.lowest_address(), Some(0x100));
        labels.mark_resolved(0x900);
        assert_eq!(labels.unresolved(), vec![0x100]);
    }
}
