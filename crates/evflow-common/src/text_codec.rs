//! Dialogue strings: big-endian 16-bit codes ended by `FF01`, with control
//! codes written as `(*TAG*)` / `(*TAG,param*)` in text form.

use crate::catalog::{
    color_ansi, color_from_letter, color_letter, icon_pictograph, CharacterTable, TextControl,
    ANSI_RESET, ANSI_YELLOW, TEXT_END,
};
use crate::cursor::{ByteCursor, ByteWriter};
use crate::types::FlowError;
use std::fmt::Write as _;
use unicode_normalization::UnicodeNormalization;

const TAG_OPEN: &str = "(*";
const TAG_CLOSE: &str = "*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Every control code as a tag. Used for `.TXT` files and round-trips.
    SingleLine,
    /// Terminal preview: real line breaks, ANSI colors, icons as pictographs.
    MultiLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// Parameter of the last `SHOW_OPTIONS` in the string.
    pub options: Option<u16>,
    /// Offset just past the terminator.
    pub end: u32,
}

pub struct TextCodec<'a> {
    characters: &'a CharacterTable,
}

impl<'a> TextCodec<'a> {
    pub fn new(characters: &'a CharacterTable) -> Self {
        Self { characters }
    }

    pub fn decode(&self, data: &[u8], address: u32, mode: RenderMode) -> Result<DecodedText, FlowError> {
        let mut cursor = ByteCursor::at(data, address);
        let mut text = String::new();
        let mut options = None;
        let mut name_colored = false;

        loop {
            let code = cursor.read_u16_be()?;
            if code == TEXT_END {
                break;
            }

            let Some(control) = TextControl::from_code(code) else {
                match self.characters.glyph(code) {
                    Some(glyph) if self.spells(glyph, code) => text.push_str(glyph),
                    _ => {
                        let _ = write!(text, "{{{}}}", hex::encode_upper(code.to_be_bytes()));
                    }
                }
                continue;
            };

            let param = if control.has_parameter() {
                Some(cursor.read_u16_le()?)
            } else {
                None
            };
            if control == TextControl::ShowOptions {
                options = param;
            }

            match mode {
                RenderMode::SingleLine => push_tag(&mut text, control, param),
                RenderMode::MultiLine => match (control, param) {
                    (TextControl::LineBreak, _) => {
                        if name_colored {
                            text.push_str(ANSI_RESET);
                            name_colored = false;
                        }
                        text.push('\n');
                    }
                    (TextControl::Continue, _) => text.push_str("\n\n"),
                    (TextControl::CharacterName, _) => {
                        text.push_str(ANSI_YELLOW);
                        name_colored = true;
                    }
                    (TextControl::SetColor | TextControl::LegacySetColor, Some(color)) => {
                        text.push_str(color_ansi(color).unwrap_or(""));
                    }
                    (TextControl::PrintIcon, Some(icon)) => text.push_str(icon_pictograph(icon)),
                    _ => push_tag(&mut text, control, param),
                },
            }
        }

        Ok(DecodedText {
            text,
            options,
            end: cursor.position(),
        })
    }

    /// Inverse of single-line decoding. The terminator is always appended.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, FlowError> {
        let mut writer = ByteWriter::new();
        let mut rest = text;

        while !rest.is_empty() {
            if let Some(tag) = rest.strip_prefix(TAG_OPEN) {
                let close = tag
                    .find(TAG_CLOSE)
                    .ok_or_else(|| FlowError::MalformedTag(format!("unclosed tag in {:?}", rest)))?;
                self.encode_tag(&mut writer, &tag[..close])?;
                rest = &tag[close + TAG_CLOSE.len()..];
                continue;
            }

            if let Some(code) = parse_code_escape(rest) {
                writer.write_u16_be(code)?;
                rest = &rest[6..];
                continue;
            }

            let (code, consumed) = self.lookup_glyph(rest)?;
            writer.write_u16_be(code)?;
            rest = &rest[consumed..];
        }

        writer.write_u16_be(TEXT_END)?;
        Ok(writer.into_inner())
    }

    fn encode_tag(&self, writer: &mut ByteWriter, tag: &str) -> Result<(), FlowError> {
        let (name, param) = match tag.split_once(',') {
            Some((name, param)) => (name, Some(param)),
            None => (tag, None),
        };
        let control = TextControl::from_name(name)
            .ok_or_else(|| FlowError::MalformedTag(format!("unknown tag {:?}", tag)))?;

        writer.write_u16_be(control.code())?;
        match (control.has_parameter(), param) {
            (false, None) => Ok(()),
            (true, Some(param)) => {
                let value = parse_tag_param(control, param)
                    .ok_or_else(|| FlowError::MalformedTag(format!("bad parameter in {:?}", tag)))?;
                writer.write_u16_le(value)
            }
            (true, None) => Err(FlowError::MalformedTag(format!("{} needs a parameter", name))),
            (false, Some(_)) => Err(FlowError::MalformedTag(format!("{} takes no parameter", name))),
        }
    }

    /// Whether encoding `glyph` gives back exactly `code`. Codes sharing a
    /// glyph, or spelled by shorter glyphs, are written as `{XXXX}` instead.
    fn spells(&self, glyph: &str, code: u16) -> bool {
        matches!(self.lookup_glyph(glyph), Ok((found, len)) if found == code && len == glyph.len())
    }

    /// One character at a time; a longer glyph only where the first
    /// character has no code of its own, then the NFKC form of it.
    fn lookup_glyph(&self, rest: &str) -> Result<(u16, usize), FlowError> {
        let Some(first) = rest.chars().next() else {
            return Err(FlowError::UnmappedCharacter(String::new()));
        };
        let first_len = first.len_utf8();
        if let Some(code) = self.characters.code(&rest[..first_len]) {
            return Ok((code, first_len));
        }

        let max = self.characters.longest_glyph().max(1);
        let boundaries: Vec<usize> = rest
            .char_indices()
            .map(|(i, _)| i)
            .skip(2)
            .chain(std::iter::once(rest.len()))
            .take(max.saturating_sub(1))
            .collect();
        for &end in boundaries.iter().rev() {
            if let Some(code) = self.characters.code(&rest[..end]) {
                return Ok((code, end));
            }
        }

        let normalized: String = rest[..first_len].nfkc().collect();
        self.characters
            .code(&normalized)
            .map(|code| (code, first_len))
            .ok_or_else(|| FlowError::UnmappedCharacter(first.to_string()))
    }
}

fn push_tag(text: &mut String, control: TextControl, param: Option<u16>) {
    text.push_str(TAG_OPEN);
    text.push_str(control.name());
    if let Some(param) = param {
        text.push(',');
        match color_letter(param).filter(|_| control.takes_color()) {
            Some(letter) => text.push(letter),
            None => {
                let _ = write!(text, "{}", param);
            }
        }
    }
    text.push_str(TAG_CLOSE);
}

fn parse_tag_param(control: TextControl, param: &str) -> Option<u16> {
    if control.takes_color() {
        let mut chars = param.chars();
        if let (Some(letter), None) = (chars.next(), chars.next()) {
            if let Some(color) = color_from_letter(letter) {
                return Some(color);
            }
        }
    }
    param.parse().ok()
}

/// `{XXXX}`: a raw code with no glyph in the table.
fn parse_code_escape(rest: &str) -> Option<u16> {
    let body = rest.strip_prefix('{')?.get(..5)?;
    let digits = body.strip_suffix('}')?;
    let bytes = hex::decode(digits).ok()?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
