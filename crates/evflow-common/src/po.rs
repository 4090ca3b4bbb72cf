//! `.TXT` strings to and from gettext `.PO` catalogs for translators.

use crate::text::parse_txt_line;
use crate::types::{FlowError, Region};
use regex::Regex;
use std::fmt::Write as _;

const SYSTEM_MESSAGE: &str = "System Message";
const NAME_TAG: &str = "(*CHARACTER_NAME*)";
const LINE_BREAK_TAG: &str = "(*LINE_BREAK*)";
const PO_LINE_BREAK: &str = "\\n";
/// `.TXT` tags and their `.PO` spelling.
const PO_TAGS: [(&str, &str); 2] = [
    ("(*AWAITING_INPUT*)", "(*INPUT*)\\n"),
    ("(*CONTINUE*)", "(*CLEAR*)"),
];

pub struct PoConverter {
    speaker: Regex,
    options_tail: Regex,
}

#[derive(Debug, Default)]
struct PoEntry {
    context: Option<String>,
    id: Option<String>,
    translation: Option<String>,
}

#[derive(Clone, Copy)]
enum PoField {
    Context,
    Id,
    Translation,
}

impl PoConverter {
    pub fn new() -> Result<Self, FlowError> {
        Ok(Self {
            speaker: Regex::new(r"\(\*CHARACTER_NAME\*\)(.*?)\(\*LINE_BREAK\*\)")?,
            options_tail: Regex::new(r"(\(\*SHOW_OPTIONS,[^*]*\*\)).*")?,
        })
    }

    /// One entry per non-blank line. A leading name line becomes the
    /// `msgctxt`; anything after a `SHOW_OPTIONS` tag is dropped.
    pub fn txt_to_po(&self, txt: &str, region: Region) -> Result<String, FlowError> {
        let language = match region {
            Region::Us => "en",
            Region::Jp => "ja",
        };
        let mut po = String::from("msgid \"\"\nmsgstr \"\"\n");
        let _ = write!(
            po,
            "\"Content-Type: text/plain; charset=UTF-8\\n\"\n\"Language: {}\\n\"\n\n",
            language
        );

        for line in txt.lines().filter(|line| !line.trim().is_empty()) {
            let text = parse_txt_line(line)?;
            let speaker = self
                .speaker
                .captures(text)
                .and_then(|captures| captures.get(1))
                .map(|name| name.as_str().trim().to_string());

            let body = self.speaker.replace(text, "");
            let body = self.options_tail.replace(&body, "${1}");
            let mut body = body.replace(LINE_BREAK_TAG, PO_LINE_BREAK);
            for (txt_tag, po_tag) in PO_TAGS {
                body = body.replace(txt_tag, po_tag);
            }

            let _ = write!(
                po,
                "msgctxt \"{}\"\nmsgid \"{}\"\nmsgstr \"\"\n\n",
                speaker.as_deref().unwrap_or(SYSTEM_MESSAGE),
                body.trim().replace('"', "\\\"")
            );
        }
        Ok(po)
    }

    /// Rebuilds `.TXT` lines, preferring `msgstr` over `msgid` when it is
    /// filled in.
    pub fn po_to_txt(&self, po: &str) -> Result<String, FlowError> {
        let mut lines = Vec::new();

        for entry in parse_entries(po)? {
            let source = entry.id.unwrap_or_default();
            if source.is_empty() {
                continue;
            }
            let text = match entry.translation {
                Some(translation) if !translation.is_empty() => translation,
                _ => source,
            };

            let mut text = text.replace("\\\"", "\"");
            for (txt_tag, po_tag) in PO_TAGS {
                text = text.replace(po_tag, txt_tag);
            }
            let text = text.replace(PO_LINE_BREAK, LINE_BREAK_TAG);
            if text.trim().is_empty() {
                continue;
            }

            match entry.context.filter(|context| context != SYSTEM_MESSAGE) {
                Some(speaker) => lines.push(format!("\"{}{}{}{}\"", NAME_TAG, speaker, LINE_BREAK_TAG, text)),
                None => lines.push(format!("\"{}\"", text)),
            }
        }
        Ok(lines.join("\n"))
    }
}

fn parse_entries(po: &str) -> Result<Vec<PoEntry>, FlowError> {
    let mut entries = Vec::new();
    let mut current = PoEntry::default();
    let mut field = None;

    for (index, raw) in po.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("msgctxt") {
            if current.id.is_some() {
                entries.push(std::mem::take(&mut current));
            }
            current.context = Some(unquote(rest, index)?);
            field = Some(PoField::Context);
        } else if let Some(rest) = line.strip_prefix("msgid") {
            if current.id.is_some() {
                entries.push(std::mem::take(&mut current));
            }
            current.id = Some(unquote(rest, index)?);
            field = Some(PoField::Id);
        } else if let Some(rest) = line.strip_prefix("msgstr") {
            current.translation = Some(unquote(rest, index)?);
            field = Some(PoField::Translation);
        } else if line.starts_with('"') {
            let more = unquote(line, index)?;
            let target = match field {
                Some(PoField::Context) => &mut current.context,
                Some(PoField::Id) => &mut current.id,
                Some(PoField::Translation) => &mut current.translation,
                None => return Err(po_error(index, "continuation line before any field")),
            };
            target.get_or_insert_with(String::new).push_str(&more);
        } else {
            return Err(po_error(index, "unrecognized line"));
        }
    }

    if current.id.is_some() {
        entries.push(current);
    }
    Ok(entries)
}

fn unquote(value: &str, index: usize) -> Result<String, FlowError> {
    value
        .trim()
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| po_error(index, "expected a quoted string"))
}

fn po_error(index: usize, message: &str) -> FlowError {
    FlowError::malformed(".PO", format!("line {}: {}", index + 1, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIALOGUE: &str = "\"(*CHARACTER_NAME*)Maki(*LINE_BREAK*)Hello!(*LINE_BREAK*)How are you?(*AWAITING_INPUT*)(*CONTINUE*)Bye\"";

    #[test]
    fn test_txt_to_po() {
        let converter = PoConverter::new().unwrap();
        let txt = format!(
            "{}\n\n\"Join us?(*SHOW_OPTIONS,0*)\"\t// Shows options: |\"Yes\"|\"No\"|\n\"Got it.\"\n",
            DIALOGUE
        );
        let po = converter.txt_to_po(&txt, Region::Jp).unwrap();

        assert!(po.starts_with("msgid \"\"\nmsgstr \"\"\n\"Content-Type: text/plain; charset=UTF-8\\n\"\n\"Language: ja\\n\"\n\n"));
        assert!(po.contains(
            "msgctxt \"Maki\"\nmsgid \"Hello!\\nHow are you?(*INPUT*)\\n(*CLEAR*)Bye\"\nmsgstr \"\"\n\n"
        ));
        assert!(po.contains("msgctxt \"System Message\"\nmsgid \"Join us?(*SHOW_OPTIONS,0*)\"\n"));
        assert_eq!(po.matches("msgctxt").count(), 3);
    }

    #[test]
    fn test_only_first_speaker_is_lifted() {
        let converter = PoConverter::new().unwrap();
        let txt = "\"(*CHARACTER_NAME*)Maki(*LINE_BREAK*)Hi(*CONTINUE*)(*CHARACTER_NAME*)Yu(*LINE_BREAK*)Yo\"";
        let po = converter.txt_to_po(txt, Region::Us).unwrap();
        assert!(po.contains(
            "msgctxt \"Maki\"\nmsgid \"Hi(*CLEAR*)(*CHARACTER_NAME*)Yu\\nYo\"\n"
        ));
    }

    #[test]
    fn test_po_round_trip() {
        let converter = PoConverter::new().unwrap();
        let txt = format!("{}\n\"Say \"cheese\"\"", DIALOGUE);
        let po = converter.txt_to_po(&txt, Region::Us).unwrap();
        assert!(po.contains("\"Language: en\\n\""));
        assert_eq!(converter.po_to_txt(&po).unwrap(), txt);
    }

    #[test]
    fn test_translation_wins_over_source() {
        let converter = PoConverter::new().unwrap();
        let po = "msgid \"\"\nmsgstr \"\"\n\"Language: en\\n\"\n\n\
                  msgctxt \"Maki\"\nmsgid \"Hello!\"\nmsgstr \"Hola!\"\n\n\
                  msgctxt \"System Message\"\nmsgid \"Saved\"\nmsgstr \"\"\n\"Guardado\"\n";
        assert_eq!(
            converter.po_to_txt(po).unwrap(),
            "\"(*CHARACTER_NAME*)Maki(*LINE_BREAK*)Hola!\"\n\"Guardado\""
        );
    }

    #[test]
    fn test_bad_po_line() {
        let converter = PoConverter::new().unwrap();
        let err = converter.po_to_txt("msgid \"a\"\nnonsense\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
