use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<FlowError>,
    },

    #[error("Malformed archive header: {0}")]
    MalformedHeader(String),

    #[error("Malformed {section}: {message}")]
    MalformedInput { section: String, message: String },

    #[error("Malformed text tag: {0}")]
    MalformedTag(String),

    #[error("No character code for {0:?}")]
    UnmappedCharacter(String),

    #[error("Unknown mnemonic: {0}")]
    UnknownMnemonic(String),

    #[error("Not an actual {name} instruction at {offset:#x}")]
    NotAnInstruction { name: &'static str, offset: u32 },

    #[error("Unexpected end of data at {0:#x}")]
    UnexpectedEof(u32),

    #[error("Unresolved references: {0}")]
    DanglingReferences(String),

    #[error("Labels not reachable by any code walk: {0}")]
    StuckLabels(String),

    #[error("Label defined twice: {0}")]
    DuplicateLabel(String),

    #[error("No matching files in {}", .0.display())]
    EmptyBatch(PathBuf),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Launcher table at {offset:#x} ({len} bytes) does not fit in a {size} byte launcher")]
    LauncherOutOfRange { offset: u64, len: usize, size: u64 },
}

impl FlowError {
    pub fn malformed(section: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::MalformedInput {
            section: section.into(),
            message: message.into(),
        }
    }

    /// Attaches the file being processed. An error that already names a
    /// file keeps that one.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            FlowError::File { .. } => self,
            other => FlowError::File {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Failures confined to one file's contents. A batch logs these and keeps going.
    pub fn is_malformed_input(&self) -> bool {
        match self {
            FlowError::File { source, .. } => source.is_malformed_input(),
            FlowError::Io(_)
            | FlowError::EmptyBatch(_)
            | FlowError::InvalidInterval(_)
            | FlowError::Json(_)
            | FlowError::Pattern(_)
            | FlowError::LauncherOutOfRange { .. } => false,
            _ => true,
        }
    }
}

/// Game build a file was extracted from. The JP build has no text table,
/// so every header field past it sits four bytes earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Us,
    Jp,
}

impl Region {
    pub fn from_jp_flag(jp: bool) -> Self {
        if jp {
            Region::Jp
        } else {
            Region::Us
        }
    }

    pub fn has_text_table(self) -> bool {
        self == Region::Us
    }
}

/// Byte range of one sub-file inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFileAddress {
    pub start: u32,
    pub end: u32,
}

impl SubFileAddress {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn size(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub address: u32,
    pub resolved: bool,
}

/// Something an operand can refer to before its address is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Label(String),
    Text(u16),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Label(name) => f.write_str(name),
            Symbol::Text(id) => write!(f, "text #{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReference {
    pub symbol: Symbol,
    pub patch_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub address: u32,
    pub text: String,
    /// Parameter of a `SHOW_OPTIONS` inside the string.
    pub options: Option<u16>,
    /// Reached through `ld_text` only, not listed in the file's text table.
    pub orphan: bool,
}
