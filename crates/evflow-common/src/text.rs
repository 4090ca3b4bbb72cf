use crate::catalog::{ANSI_RESET, OPTIONS};
use crate::cursor::ByteCursor;
use crate::text_codec::{RenderMode, TextCodec};
use crate::types::{FlowError, TextEntry};
use std::fmt::Write as _;

/// Strings of one sub-file, in `.TXT` order: table entries first, then
/// strings only reached through `ld_text`, in the order they were found.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    entries: Vec<TextEntry>,
}

impl TextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the `(count, pointers...)` table at `table_address` and decodes
    /// every string it lists.
    pub fn read(data: &[u8], table_address: u32, codec: &TextCodec<'_>) -> Result<Self, FlowError> {
        let mut cursor = ByteCursor::at(data, table_address);
        let count = cursor.read_u32_le()?;
        let mut table = Self::new();

        for _ in 0..count {
            let address = cursor.read_u32_le()?;
            let decoded = codec.decode(data, address, RenderMode::SingleLine)?;
            table.entries.push(TextEntry {
                address,
                text: decoded.text,
                options: decoded.options,
                orphan: false,
            });
        }

        log::debug!("text table at {:#x} lists {} strings", table_address, count);
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TextEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TextEntry> {
        self.entries.get(index)
    }

    pub fn index_of(&self, address: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.address == address)
    }

    /// Address of the first listed string; code never runs past it.
    pub fn first_table_address(&self) -> Option<u32> {
        self.entries.iter().find(|e| !e.orphan).map(|e| e.address)
    }

    /// Index of the string at `address`. A table entry wins; otherwise the
    /// string is decoded from the file and appended as an orphan.
    pub fn resolve(
        &mut self,
        data: &[u8],
        address: u32,
        codec: &TextCodec<'_>,
    ) -> Result<usize, FlowError> {
        if let Some(index) = self.index_of(address) {
            return Ok(index);
        }

        let decoded = codec.decode(data, address, RenderMode::SingleLine)?;
        log::debug!("string at {:#x} is not in the text table", address);
        self.entries.push(TextEntry {
            address,
            text: decoded.text,
            options: decoded.options,
            orphan: true,
        });
        Ok(self.entries.len() - 1)
    }

    /// Every string decoded again for the terminal, one block per id.
    pub fn render_preview(&self, data: &[u8], codec: &TextCodec<'_>) -> Result<String, FlowError> {
        let mut out = String::new();
        for (id, entry) in self.entries.iter().enumerate() {
            let decoded = codec.decode(data, entry.address, RenderMode::MultiLine)?;
            let origin = if entry.orphan { " (ld_text only)" } else { "" };
            let _ = write!(
                out,
                "[{}] {:#x}{}\n{}{}\n\n",
                id, entry.address, origin, decoded.text, ANSI_RESET
            );
        }
        Ok(out)
    }

    pub fn render_txt(&self) -> String {
        self.entries
            .iter()
            .map(|entry| render_txt_line(&entry.text, entry.options) + "\n")
            .collect()
    }
}

pub fn render_txt_line(text: &str, options: Option<u16>) -> String {
    let mut line = format!("\"{}\"", text);
    if let Some(choices) = options.and_then(|o| OPTIONS.get(o as usize)) {
        line.push_str("\t// Shows options: |");
        for choice in *choices {
            line.push('"');
            line.push_str(choice);
            line.push_str("\"|");
        }
    }
    line
}

/// The quoted string of one `.TXT` line, without any trailing `//` remark.
pub fn parse_txt_line(line: &str) -> Result<&str, FlowError> {
    let line = line.trim_end_matches('\r').trim();
    let body = line
        .strip_prefix('"')
        .ok_or_else(|| FlowError::malformed(".TXT", format!("line does not start with a quote: {}", line)))?;

    body.char_indices()
        .filter(|(_, c)| *c == '"')
        .map(|(i, _)| i)
        .filter(|&i| {
            let after = body[i + 1..].trim_start();
            after.is_empty() || after.starts_with("//")
        })
        .last()
        .map(|close| &body[..close])
        .ok_or_else(|| FlowError::malformed(".TXT", format!("unterminated string: {}", line)))
}

/// Strings in id order. Blank lines carry no id.
pub fn parse_txt(source: &str) -> Result<Vec<&str>, FlowError> {
    source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_txt_line)
        .collect()
}
