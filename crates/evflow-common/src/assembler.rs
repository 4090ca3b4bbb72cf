//! `.DEC` source and `.TXT` strings back to sub-file bytes.
//!
//! The first pass parses the whole source; the second writes bytes in order
//! and back-patches every label and string address once it is known.

use crate::catalog::InstructionCatalog;
use crate::cursor::{ByteCursor, ByteWriter, CODE_ALIGNMENT, SECTOR_SIZE};
use crate::disassembler::{ADDR_DIRECTIVE, EMPTY_SOURCE, NO_LABEL, SECTION_DIRECTIVE};
use crate::header::{
    HeaderLayout, Section, SpotTable, TalkTable, NO_ADDRESS, SONGS_OFFSET, SPOT_ADDRESS_OFFSET,
    SPOT_ENTRY_SIZE,
};
use crate::instruction::SourceInstruction;
use crate::text::parse_txt;
use crate::text_codec::TextCodec;
use crate::types::{FlowError, PendingReference, Region, Symbol};
use std::collections::{BTreeMap, HashMap};

const COMMENT: &str = "//";
const SONG_SLOTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkLine {
    pub slot: usize,
    pub first: Option<String>,
    pub second: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotLine {
    pub x: u8,
    pub y: u8,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLine {
    Label(String),
    Instruction(SourceInstruction),
}

/// A parsed `.DEC` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecSource {
    pub entry: Option<u32>,
    pub songs: Vec<u16>,
    pub talk: Vec<TalkLine>,
    pub talk2: Vec<TalkLine>,
    pub positions: Vec<SpotLine>,
    pub interactables: Vec<SpotLine>,
    pub code: Vec<CodeLine>,
}

impl DecSource {
    /// `None` for a file that only says `EMPTY`.
    pub fn parse(source: &str, catalog: &InstructionCatalog) -> Result<Option<Self>, FlowError> {
        let mut parsed = DecSource::default();
        let mut section: Option<Section> = None;
        let mut seen_anything = false;

        for (index, raw) in source.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if line == EMPTY_SOURCE && !seen_anything {
                return Ok(None);
            }
            seen_anything = true;

            let section_name = section.map(Section::name).unwrap_or("header");
            let at_line = |err: FlowError| {
                FlowError::malformed(section_name, format!("line {}: {}", index + 1, err))
            };
            let mut tokens = line.split_whitespace();
            let keyword = tokens.next().unwrap_or_default();

            if keyword == SECTION_DIRECTIVE {
                let name = tokens.next().unwrap_or_default();
                let next = Section::from_name(name)
                    .ok_or_else(|| at_line(FlowError::UnknownMnemonic(format!("section {}", name))))?;
                if section.is_some_and(|current| next <= current) {
                    return Err(at_line(FlowError::malformed(
                        name,
                        "section out of order or repeated",
                    )));
                }
                section = Some(next);
                continue;
            }

            match section {
                None if keyword == ADDR_DIRECTIVE => {
                    let value = tokens.next().unwrap_or_default();
                    parsed.entry = Some(
                        parse_hex(value)
                            .ok_or_else(|| at_line(FlowError::malformed(ADDR_DIRECTIVE, value)))?,
                    );
                }
                None => {
                    return Err(at_line(FlowError::malformed(
                        "header",
                        "expected a section header",
                    )))
                }
                Some(Section::Bgm) => {
                    let song = parse_hex(keyword)
                        .and_then(|value| u16::try_from(value).ok())
                        .ok_or_else(|| at_line(FlowError::malformed(".bgm", keyword)))?;
                    if parsed.songs.len() == SONG_SLOTS {
                        return Err(at_line(FlowError::malformed(".bgm", "more than two songs")));
                    }
                    parsed.songs.push(song);
                }
                Some(Section::Talk) => parsed.talk.push(parse_talk_line(line).map_err(at_line)?),
                Some(Section::Talk2) => parsed.talk2.push(parse_talk_line(line).map_err(at_line)?),
                Some(Section::Positions) => {
                    parsed.positions.push(parse_spot_line(line).map_err(at_line)?)
                }
                Some(Section::Interactables) => {
                    parsed.interactables.push(parse_spot_line(line).map_err(at_line)?)
                }
                Some(Section::Code) => {
                    let code_line = match line.strip_suffix(':') {
                        Some(label) if !label.contains(char::is_whitespace) => {
                            CodeLine::Label(label.to_string())
                        }
                        _ => CodeLine::Instruction(
                            SourceInstruction::parse(line, catalog).map_err(at_line)?,
                        ),
                    };
                    parsed.code.push(code_line);
                }
            }
        }

        if section != Some(Section::Code) {
            return Err(FlowError::malformed(Section::Code.name(), "section is missing"));
        }
        Ok(Some(parsed))
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT) {
        Some(index) => &line[..index],
        None => line,
    }
}

fn parse_hex(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))?;
    u32::from_str_radix(digits, 16).ok()
}

fn optional_label(token: &str) -> Option<String> {
    (token != NO_LABEL).then(|| token.to_string())
}

/// `NN LABEL_a,LABEL_b`, either side may be `_`.
fn parse_talk_line(line: &str) -> Result<TalkLine, FlowError> {
    let bad = || FlowError::malformed("talk", format!("expected `<slot> <label>,<label>`, got {:?}", line));
    let mut tokens = line.split_whitespace();
    let slot = tokens.next().and_then(|t| t.parse().ok()).ok_or_else(bad)?;
    let (first, second) = tokens.next().and_then(|t| t.split_once(',')).ok_or_else(bad)?;
    if tokens.next().is_some() {
        return Err(bad());
    }

    Ok(TalkLine {
        slot,
        first: optional_label(first),
        second: optional_label(second),
    })
}

/// `x y LABEL` with decimal coordinates.
fn parse_spot_line(line: &str) -> Result<SpotLine, FlowError> {
    let bad = || FlowError::malformed("spot", format!("expected `<x> <y> <label>`, got {:?}", line));
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [x, y, target] = tokens.as_slice() else {
        return Err(bad());
    };

    Ok(SpotLine {
        x: x.parse().map_err(|_| bad())?,
        y: y.parse().map_err(|_| bad())?,
        target: optional_label(target),
    })
}

/// Symbol uses waiting for an address, and the addresses already known.
#[derive(Debug, Default)]
pub struct PendingReferences {
    pending: BTreeMap<Symbol, Vec<u32>>,
    defined: HashMap<Symbol, u32>,
}

impl PendingReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a use. Already defined symbols are patched right away.
    pub fn add(&mut self, writer: &mut ByteWriter, reference: PendingReference) -> Result<(), FlowError> {
        match self.defined.get(&reference.symbol) {
            Some(&address) => writer.patch_u32_le(reference.patch_offset, address),
            None => {
                self.pending
                    .entry(reference.symbol)
                    .or_default()
                    .push(reference.patch_offset);
                Ok(())
            }
        }
    }

    /// Fixes `symbol` at `address` and patches every use seen so far.
    /// Returns how many uses were patched.
    pub fn define(&mut self, writer: &mut ByteWriter, symbol: Symbol, address: u32) -> Result<usize, FlowError> {
        if self.defined.contains_key(&symbol) {
            return Err(FlowError::DuplicateLabel(symbol.to_string()));
        }

        let offsets = self.pending.remove(&symbol).unwrap_or_default();
        for &offset in &offsets {
            writer.patch_u32_le(offset, address)?;
        }
        self.defined.insert(symbol, address);
        Ok(offsets.len())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn finish(self) -> Result<(), FlowError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = self.pending.keys().map(Symbol::to_string).collect();
        Err(FlowError::DanglingReferences(names.join(", ")))
    }
}

/// State of one assembly pass over one sub-file.
pub struct AssemblyContext {
    writer: ByteWriter,
    layout: HeaderLayout,
    references: PendingReferences,
}

impl AssemblyContext {
    /// Starts from the original bytes that precede the code.
    pub fn new(prefix: Vec<u8>, layout: HeaderLayout) -> Self {
        Self {
            writer: ByteWriter::from_bytes(prefix),
            layout,
            references: PendingReferences::new(),
        }
    }

    fn reference(&mut self, symbol: Symbol, patch_offset: u32) -> Result<(), FlowError> {
        self.references.add(
            &mut self.writer,
            PendingReference {
                symbol,
                patch_offset,
            },
        )
    }

    fn check_in_header(&self, section: Section, offset: u32, size: u32) -> Result<(), FlowError> {
        if offset + size > self.writer.len() {
            return Err(FlowError::malformed(
                section.name(),
                format!("field at {:#x} lies past the code start {:#x}", offset, self.writer.len()),
            ));
        }
        Ok(())
    }

    pub fn write_songs(&mut self, songs: &[u16]) -> Result<(), FlowError> {
        for (index, &song) in songs.iter().enumerate() {
            let offset = SONGS_OFFSET + index as u32 * 2;
            self.check_in_header(Section::Bgm, offset, 2)?;
            self.writer.patch_u16_le(offset, song)?;
        }
        Ok(())
    }

    /// Points each listed character slot at its labels. Slots not listed
    /// keep the original addresses.
    pub fn write_talk(&mut self, table: TalkTable, lines: &[TalkLine]) -> Result<(), FlowError> {
        let section = match table {
            TalkTable::Primary => Section::Talk,
            TalkTable::Secondary => Section::Talk2,
        };

        for line in lines {
            let slot = self.layout.character_slot(table, line.slot).ok_or_else(|| {
                FlowError::malformed(section.name(), format!("no character slot {}", line.slot))
            })?;
            for (label, offset) in [(&line.first, slot.first), (&line.second, slot.second)] {
                if let Some(label) = label {
                    self.check_in_header(section, offset, 4)?;
                    self.reference(Symbol::Label(label.clone()), offset)?;
                }
            }
        }
        Ok(())
    }

    /// Rewrites the coordinates and targets of a position or interactable
    /// table. The source must list exactly as many entries as the file.
    pub fn write_spots(&mut self, table: SpotTable, lines: &[SpotLine]) -> Result<(), FlowError> {
        let section = match table {
            SpotTable::Positions => Section::Positions,
            SpotTable::Interactables => Section::Interactables,
        };
        let (count_pointer, entries_pointer) = self.layout.spot_pointers(table);
        let (count, entries) = {
            let cursor = ByteCursor::new(self.writer.as_slice());
            let count = cursor.u32_le_at(cursor.u32_le_at(count_pointer)?)?;
            (count, cursor.u32_le_at(entries_pointer)?)
        };

        if lines.len() != count as usize {
            return Err(FlowError::malformed(
                section.name(),
                format!("{} entries in the source, {} in the file", lines.len(), count),
            ));
        }

        for (index, line) in lines.iter().enumerate() {
            let offset = entries + index as u32 * SPOT_ENTRY_SIZE;
            self.check_in_header(section, offset, SPOT_ENTRY_SIZE)?;
            self.writer
                .patch_u16_le(offset, u16::from_le_bytes([line.x, line.y]))?;
            if let Some(label) = &line.target {
                self.reference(Symbol::Label(label.clone()), offset + SPOT_ADDRESS_OFFSET)?;
            }
        }
        Ok(())
    }

    pub fn write_code(&mut self, code: &[CodeLine]) -> Result<(), FlowError> {
        for line in code {
            match line {
                CodeLine::Label(name) => {
                    self.writer.pad_to(CODE_ALIGNMENT)?;
                    let address = self.writer.position();
                    self.references
                        .define(&mut self.writer, Symbol::Label(name.clone()), address)?;
                }
                CodeLine::Instruction(instruction) => {
                    for reference in instruction.encode(&mut self.writer)? {
                        self.references.add(&mut self.writer, reference)?;
                    }
                    if instruction.is_ret() {
                        self.writer.pad_to(CODE_ALIGNMENT)?;
                    }
                }
            }
        }
        log::debug!("code ends at {:#x}", self.writer.position());
        Ok(())
    }

    /// Writes each string at the next 8-byte boundary, string id = line
    /// order, then the text table where the region has one.
    pub fn write_texts(&mut self, strings: &[&str], codec: &TextCodec<'_>) -> Result<(), FlowError> {
        let mut pointers = Vec::with_capacity(strings.len());

        for (index, text) in strings.iter().enumerate() {
            let id = u16::try_from(index)
                .map_err(|_| FlowError::malformed(".TXT", "more strings than ids"))?;
            self.writer.pad_to(CODE_ALIGNMENT)?;
            let address = self.writer.position();
            if self.references.define(&mut self.writer, Symbol::Text(id), address)? == 0 {
                log::debug!("string {} is never loaded", id);
            }

            let bytes = codec
                .encode(text)
                .map_err(|err| FlowError::malformed(".TXT", format!("string {}: {}", id, err)))?;
            self.writer.write_bytes(&bytes)?;
            pointers.push(address);
        }

        if let Some(pointer) = self.layout.text_table_pointer() {
            let table = self.writer.position();
            self.writer.patch_u32_le(pointer, table)?;
            self.writer.write_u32_le(pointers.len() as u32)?;
            for address in pointers {
                self.writer.write_u32_le(address)?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>, FlowError> {
        self.writer.pad_to(SECTOR_SIZE)?;
        self.references.finish()?;
        Ok(self.writer.into_inner())
    }
}

pub struct Assembler<'a> {
    catalog: &'a InstructionCatalog,
    region: Region,
}

impl<'a> Assembler<'a> {
    pub fn new(catalog: &'a InstructionCatalog, region: Region) -> Self {
        Self { catalog, region }
    }

    /// Rebuilds a sub-file from `original`, its `.DEC` source and its
    /// strings. An `EMPTY` source gives back the original bytes.
    pub fn assemble(&self, original: &[u8], dec: &str, txt: Option<&str>) -> Result<Vec<u8>, FlowError> {
        let Some(source) = DecSource::parse(dec, self.catalog)? else {
            log::info!("{} source, keeping the original bytes", EMPTY_SOURCE);
            return Ok(original.to_vec());
        };
        let strings = match txt {
            Some(txt) => parse_txt(txt)?,
            None => Vec::new(),
        };

        let layout = HeaderLayout::new(self.region);
        let entry = ByteCursor::new(original).u32_le_at(layout.entry_pointer())?;
        let entry = match (entry, source.entry) {
            (NO_ADDRESS, Some(entry)) => entry,
            (NO_ADDRESS, None) => {
                return Err(FlowError::malformed(
                    ADDR_DIRECTIVE,
                    "the file has no entry point and the source no addr line",
                ))
            }
            (entry, _) => entry,
        };
        let prefix = original.get(..entry as usize).ok_or_else(|| {
            FlowError::malformed(
                ADDR_DIRECTIVE,
                format!("entry {:#x} is past the end of a {} byte file", entry, original.len()),
            )
        })?;

        let mut context = AssemblyContext::new(prefix.to_vec(), layout);
        context.write_songs(&source.songs)?;
        context.write_talk(TalkTable::Primary, &source.talk)?;
        context.write_talk(TalkTable::Secondary, &source.talk2)?;
        context.write_spots(SpotTable::Positions, &source.positions)?;
        context.write_spots(SpotTable::Interactables, &source.interactables)?;
        context.write_code(&source.code)?;
        context.write_texts(&strings, &TextCodec::new(self.catalog.characters()))?;

        let bytes = context.finish()?;
        log::debug!("assembled {} bytes from entry {:#x}", bytes.len(), entry);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CharacterTable;

    const HEADER_SIZE: usize = 0xC00;

    fn catalog() -> InstructionCatalog {
        let mut characters = CharacterTable::new();
        characters.insert(0x0141, "A");
        InstructionCatalog::new(characters)
    }

    /// JP header with the code at 0xC00 and empty spot tables.
    fn jp_original() -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0x60..0x64].copy_from_slice(&0xC00u32.to_le_bytes());
        data[0x34..0x38].copy_from_slice(&0xBD8u32.to_le_bytes());
        data[0x38..0x3C].copy_from_slice(&0xBE0u32.to_le_bytes());
        data[0x44..0x48].copy_from_slice(&0xBF0u32.to_le_bytes());
        data[0x48..0x4C].copy_from_slice(&0xBF8u32.to_le_bytes());
        data
    }

    fn source(code: &str) -> String {
        format!(
            "addr\t0x00000c00\n\n\
             section\t.bgm\n\t0x01\n\t0x02\n\n\
             section\t.talk\n\n\
             section\t.talk2\n\n\
             section\t.positions\n\n\
             section\t.interactables\n\n\
             section\t.code\n{}",
            code
        )
    }

    #[test]
    fn test_pending_references_patch_both_ways() {
        let mut writer = ByteWriter::from_bytes(vec![0u8; 16]);
        let mut refs = PendingReferences::new();
        let label = Symbol::Label("LABEL_0".to_string());

        refs.add(&mut writer, PendingReference { symbol: label.clone(), patch_offset: 0 })
            .unwrap();
        assert_eq!(refs.define(&mut writer, label.clone(), 0x1234).unwrap(), 1);
        refs.add(&mut writer, PendingReference { symbol: label.clone(), patch_offset: 8 })
            .unwrap();

        assert!(refs.is_empty());
        assert_eq!(hex::encode(writer.as_slice()), "34120000000000003412000000000000");
        assert!(matches!(
            refs.define(&mut writer, label, 0x10),
            Err(FlowError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_parse_source_sections() {
        let dec = source("\tret\n\nLABEL_0:\n\tjump\tLABEL_0\t// loops\n")
            .replace("section\t.talk\n", "section\t.talk\n\t03\t\tLABEL_0,_\n")
            .replace("section\t.positions\n", "section\t.positions\n\t010\t255\tLABEL_0\n");
        let parsed = DecSource::parse(&dec, &catalog()).unwrap().unwrap();

        assert_eq!(parsed.entry, Some(0xC00));
        assert_eq!(parsed.songs, vec![1, 2]);
        assert_eq!(
            parsed.talk,
            vec![TalkLine {
                slot: 3,
                first: Some("LABEL_0".to_string()),
                second: None
            }]
        );
        assert_eq!(parsed.positions[0], SpotLine { x: 10, y: 255, target: Some("LABEL_0".to_string()) });
        assert_eq!(parsed.code.len(), 3);
        assert_eq!(parsed.code[1], CodeLine::Label("LABEL_0".to_string()));
    }

    #[test]
    fn test_parse_source_rejects_bad_layout() {
        let catalog = catalog();
        assert_eq!(DecSource::parse("EMPTY", &catalog).unwrap(), None);
        assert!(DecSource::parse("section\t.code\nsection\t.bgm\n", &catalog).is_err());
        assert!(DecSource::parse("\tret\n", &catalog).is_err());
        assert!(DecSource::parse("section\t.bgm\n\t0x01\n", &catalog).is_err());

        let err = DecSource::parse(&source("\tteleport\t0x01\n"), &catalog).unwrap_err();
        assert!(err.to_string().contains("line 16"));
    }

    #[test]
    fn test_assemble_code_and_strings() {
        let catalog = catalog();
        let assembler = Assembler::new(&catalog, Region::Jp);
        let dec = source("\twait\t0x001e\n\tld_text\t0\n\tret\n\nLABEL_0:\n\tjump\tLABEL_0\n");

        let bytes = assembler.assemble(&jp_original(), &dec, Some("\"A\"\n")).unwrap();
        assert_eq!(bytes.len(), 0x1000);
        assert_eq!(hex::encode(&bytes[0x02..0x06]), "01000200");
        assert_eq!(
            hex::encode(&bytes[0xC00..0xC1C]),
            "ff4d1e00ff550000180c0000ff210000ff220000100c00000141ff01"
        );
        assert!(bytes[0xC1C..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_undefined_label_is_dangling() {
        let catalog = catalog();
        let assembler = Assembler::new(&catalog, Region::Jp);
        let err = assembler
            .assemble(&jp_original(), &source("\tjump\tLABEL_9\n"), None)
            .unwrap_err();
        assert!(matches!(err, FlowError::DanglingReferences(ref names) if names == "LABEL_9"));
    }

    #[test]
    fn test_empty_source_keeps_original() {
        let catalog = catalog();
        let assembler = Assembler::new(&catalog, Region::Jp);
        let original = jp_original();
        assert_eq!(assembler.assemble(&original, "EMPTY\n", None).unwrap(), original);
    }
}
