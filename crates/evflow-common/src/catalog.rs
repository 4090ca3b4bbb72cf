//! Static lookup data: opcodes, text control codes, the glyph table and the
//! small vocabularies some operands are written with.

use crate::opcodes::{opcode_info_map, OpcodeInfo};
use crate::types::FlowError;
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_TABLE_PATH: &str = "table/p1p.tbl";

/// Ends every string.
pub const TEXT_END: u16 = 0xFF01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextControl {
    AwaitingInput,
    LineBreak,
    Continue,
    Wait,
    LegacySetColor,
    PlayerFirstName,
    PlayerNickname,
    ShowOptions,
    PlayerLastName,
    CoinNumber,
    SetColor,
    PrintIcon,
    PrintValue,
    CharacterName,
}

impl TextControl {
    pub const ALL: [TextControl; 14] = [
        TextControl::AwaitingInput,
        TextControl::LineBreak,
        TextControl::Continue,
        TextControl::Wait,
        TextControl::LegacySetColor,
        TextControl::PlayerFirstName,
        TextControl::PlayerNickname,
        TextControl::ShowOptions,
        TextControl::PlayerLastName,
        TextControl::CoinNumber,
        TextControl::SetColor,
        TextControl::PrintIcon,
        TextControl::PrintValue,
        TextControl::CharacterName,
    ];

    pub fn code(self) -> u16 {
        match self {
            TextControl::AwaitingInput => 0xFF02,
            TextControl::LineBreak => 0xFF03,
            TextControl::Continue => 0xFF04,
            TextControl::Wait => 0xFF05,
            TextControl::LegacySetColor => 0xFF06,
            TextControl::PlayerFirstName => 0xFF07,
            TextControl::PlayerNickname => 0xFF08,
            TextControl::ShowOptions => 0xFF0E,
            TextControl::PlayerLastName => 0xFF0F,
            TextControl::CoinNumber => 0xFF11,
            TextControl::SetColor => 0xFF18,
            TextControl::PrintIcon => 0xFF19,
            TextControl::PrintValue => 0xFF1A,
            TextControl::CharacterName => 0xFF1B,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TextControl::AwaitingInput => "AWAITING_INPUT",
            TextControl::LineBreak => "LINE_BREAK",
            TextControl::Continue => "CONTINUE",
            TextControl::Wait => "WAIT",
            TextControl::LegacySetColor => "LEGACY_SET_COLOR",
            TextControl::PlayerFirstName => "PLAYER_FIRST_NAME",
            TextControl::PlayerNickname => "PLAYER_NICKNAME",
            TextControl::ShowOptions => "SHOW_OPTIONS",
            TextControl::PlayerLastName => "PLAYER_LAST_NAME",
            TextControl::CoinNumber => "COIN_NUMBER",
            TextControl::SetColor => "SET_COLOR",
            TextControl::PrintIcon => "PRINT_ICON",
            TextControl::PrintValue => "PRINT_VALUE",
            TextControl::CharacterName => "CHARACTER_NAME",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|control| control.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|control| control.name() == name)
    }

    /// Followed by one little-endian 16-bit parameter.
    pub fn has_parameter(self) -> bool {
        matches!(
            self,
            TextControl::Wait
                | TextControl::LegacySetColor
                | TextControl::ShowOptions
                | TextControl::SetColor
                | TextControl::PrintIcon
                | TextControl::PrintValue
        )
    }

    pub fn takes_color(self) -> bool {
        matches!(self, TextControl::SetColor | TextControl::LegacySetColor)
    }
}

const COLORS: &[(u16, char)] = &[
    (0x0000, '_'),
    (0x0001, 'W'),
    (0x0002, 'B'),
    (0x0003, 'P'),
    (0x0004, 'G'),
    (0x0005, 'Y'),
    (0x0007, 'R'),
];

pub const ANSI_RESET: &str = "\u{1b}[0m";
pub const ANSI_BLUE: &str = "\u{1b}[34m";
pub const ANSI_PINK: &str = "\u{1b}[35m";
pub const ANSI_YELLOW: &str = "\u{1b}[33m";
pub const ANSI_RED: &str = "\u{1b}[31m";

pub fn color_letter(color: u16) -> Option<char> {
    COLORS.iter().find(|(c, _)| *c == color).map(|(_, l)| *l)
}

pub fn color_from_letter(letter: char) -> Option<u16> {
    COLORS.iter().find(|(_, l)| *l == letter).map(|(c, _)| *c)
}

pub fn color_ansi(color: u16) -> Option<&'static str> {
    match color {
        0x0000 => Some(ANSI_RESET),
        0x0002 => Some(ANSI_BLUE),
        0x0003 => Some(ANSI_PINK),
        0x0005 => Some(ANSI_YELLOW),
        0x0007 => Some(ANSI_RED),
        _ => None,
    }
}

pub fn icon_pictograph(icon: u16) -> &'static str {
    match icon {
        0 => "\u{1f9f4}",
        3 => "\u{1f511}",
        _ => "\u{2753}",
    }
}

pub const EMOTES: &[&str] = &["exclamation", "question", "heart", "awkward", "zzz"];

pub const POSES: &[&str] = &[
    "still", "idle", "walk", "pain", "fight", "crouched", "depressed", "victory", "dead",
    "collapse", "stand_up",
];

pub const EVENT_DIRECTIONS: &[&str] = &["NW", "SE", "SW", "NE"];

pub const PORTRAIT_ORIENTATIONS: &[&str] = &["left", "middle", "right"];

pub const PORTRAIT_CHARACTERS: &[&str] = &[
    "MC", "Maki", "Mark", "Nanjo", "Yukino", "Ayase", "Brown", "Elly", "Reiji", "Maki_sick",
    "Maki_happy", "Mai", "Aki", "Maki_masked", "Maki_masked_SQQ", "Setsuko", "MC_alt1", "Saeko",
    "Saeko_Ice", "Saeko_young", "Nurse", "Hanya", "Ooishi", "Yamaoka", "Yosuke", "Chisato",
    "Chisato_corruptv1", "Chisato_corruptv2", "Chisato_corruptv3", "MC_alt2", "Tsutomu", "Yuko",
    "Yuko_smug", "Toro", "MC_alt3", "Tadashi", "Tamaki", "Katsue_rich", "Katsue_poor", "Kandori",
    "Kandori_mask", "Takeda", "MC_alt4", "Nicholai", "Tomomi", "Tomomi_corrupt", "MC_alt5",
    "Kumi", "Michiko", "Yuriko", "MC_alt6", "MC_alt7", "Night_Queen", "Yin_Yang_clerk",
    "Rosa_clerk", "Weapon_clerk", "Armor_clerk", "Pharma_clerk", "MC_alt8", "Sweets_clerk",
    "Turunkhamen", "Club_coin_clerk", "Diner_clerk", "Doctor", "Igor", "Trish", "Khamenturun",
    "MC_alt9", "Master", "Club_yen_clurk", "glitch",
];

pub const MONEY_DIRECTIONS: &[&str] = &["ADD", "REMOVE"];

pub const SCREEN_EFFECTS: &[&str] = &[
    "stop current effect (only works for earthquake)",
    "fades out of black (quick)",
    "fades out of black (mid speed)",
    "fades out of black (slow)",
    "fades into black (quick)",
    "fades into black (mid speed)",
    "fades into black (slow)",
    "smaller screen shake (earthquake)",
    "medium screen shake (earthquake)",
    "bigger screen shake (earthquake)",
    "fades out of white (quick)",
    "fades out of white (mid speed)",
    "fades out of white (slow)",
    "fades into white (quick)",
    "fades into white (mid speed)",
    "fades into white (slow)",
    "screen flashes black (mid speed)",
    "screen flashes black (quick)",
];

pub const BATTLES: &[&str] = &[
    "first awakening",
    "Elly's awakening",
    "Maki's awakening",
    "Brown's awakening",
    "Ayase's awakening",
    "Takeda battle",
    "Reiji's awakening",
    "Reiji's awakening variation?",
    "Tesso battle",
    "Yog Sothoth Jr battle",
    "Harem Queen battle",
    "Harem Queen variation battle?",
    "Mr. Bear battle",
    "Saurva battle",
    "Hariti battle",
    "Kandori battle",
    "Pandora phase 1",
    "Akuma monster battle",
    "Akuma monster battle variation?",
    "Hypnos 1 battle",
    "Hypnos 2 battle",
    "Hypnos 3 battle",
    "Hypnos 4 battle",
    "Nemesis 1 battle",
    "Nemesis 2 battle",
    "Nemesis 3 battle",
    "Nemesis 4 battle",
    "Nemesis 5 battle",
    "Nemesis 6 battle",
    "Thanatos 1 battle",
    "Thanatos 2 battle",
    "Snow Queen mask battle",
    "Queen Asura battle",
    "bad ending last battle",
    "Pandora phase 2",
];

/// Choices shown by `SHOW_OPTIONS`, indexed by its parameter.
pub const OPTIONS: &[&[&str]] = &[
    &["Yes", "No"],
    &["Sure.", "No way."],
    &["Yeah,", "No, I don't"],
    &["Start game", "Check coins", "See explanations", "Stop playing"],
    &["No", "Yes"],
    &["Game rules", "Controls", "Winning hands", "Go back"],
    &["Game rules", "Controls", "Tips", "Go back"],
    &["Let them join", "Don't let them join"],
    &["Help her", "Don't help her"],
    &["Don't leave", "Leave"],
    &["Don't open it", "Open it"],
    &["Don't listen", "Listen"],
    &["Create Persona", "Take on Persona", "Talk", "Leave"],
    &["Stop hiding.", "Yes, it's safe here.", "That's true, but...", "I don't really know."],
    &["For myself.", "Just 'cause.", "For everyone's sake.", "That's how it went."],
    &["I don't really know.", "To find my reason."],
    &["Press the red button", "Press the blue button."],
    &["Heal us, please.", "Just dropping by."],
    &["Fight Hariti", "Lower your weapons"],
    &["Don't hide like that!", "Maybe you are..."],
    &["Stay here", "Go to 8F", "Go to 4F", "Go to 1F"],
    &["Manual Fusion", "Guided Fusion", "View cards", "Cancel"],
    &["The Queen's is better.", "Maki's is better."],
    &["Beginner tips", "Regular tips", "About Personas", "Advanced tips"],
    &["Start game", "Check cards", "See explanations", "Cancel"],
    &["Bet on Mark", "Bet on Brown"],
    &["That's the plan.", "Not really."],
    &["Yeah.", "That's"],
    &["Yeah, I do.", "No, no one."],
    &["A few.", "Not a one."],
    &["I like the old way.", "I like the new way."],
    &["Sure, put me down.", "Don't you dare."],
    &["Buy", "Sell", "Equip", "Cancel"],
    &["Trade for items", "Trade for incense", "Equip", "Cancel"],
    &["Normal", "Beginner", "Expert"],
    &["Yes, it was.", "On second thought..."],
];

pub fn shop_description(shop: u16) -> &'static str {
    match shop {
        0x01 => "Yin & Yang, Maki's world v1",
        0x02 => "Weapon shop, Aki's side v1",
        0x03 => "Weapon shop, Aki's side v2",
        0x04 => "Yin & Yang, Maki's world v2",
        0x06 => "Rosa, Mai's side v1",
        0x07 => "Armor shop, Aki's side v1",
        0x08 => "Armor shop, Aki's side v2",
        0x09 => "Rosa, Mai's side v2",
        0x0A => "Tadashi, Mai's side v1",
        0x0B => "Tadashi, Aki's side v1",
        0x0C => "Turunkhamen, Mai's side v1",
        0x0D => "Turunkhamen, Aki's side v1",
        0x0E => "Casino, money to coin",
        0x0F => "Casino, coin to item, Mai's side v1",
        0x10 => "Yin & Yang real world",
        0x11 => "Sennen",
        0x12 => "Tadashi",
        0x14 => "Casino, coin to item, Sun Mall v1?",
        0x16 => "Casino, coin to item, unknown",
        0x18 => "Casino, coin to item, Sun Mall v2?",
        0x1A => "Casino, coin to item, Joy Street",
        0x1C => "Casino, coin to item, Mai's side v2",
        0x1E => "Casino, coin to item, Aki's side v1",
        0x1F => "Khamenturun, Mai's side v1",
        0x20 => "Velvet Room, talk menu",
        0x21 => "Velvet Room, manual fusion menu",
        0x22 => "Velvet Room, guided fusion menu",
        0x23 => "Velvet Room, view cards menu",
        0x24 => "Velvet Room, leave",
        0x25 => "Casino, poker help menu",
        0x26 => "Casino, blackjack help menu",
        0x27 => "Casino, slot machine help menu",
        0x28 => "Casino, code breaker help menu",
        0x29 => "Casino, dice game help menu",
        0x31 => "Tadashi, Mai's side v2",
        0x32 => "Turunkhamen, Mai's side v2",
        _ => "unknown",
    }
}

pub fn sfx_description(sfx: u16) -> &'static str {
    match sfx {
        0x00 | 0x01 => "woosh",
        0x03 => "quick lightning",
        0x04 => "heal/reflect sound?",
        0x05 => "holy voice",
        0x08 => "something fell, a rock or similar",
        0x09 => "something falling intensely, like lightning",
        0x0A => "little noises followed by weird woosh",
        0x0B => "water flowing, a little bubbling",
        0x0C | 0x0D => "bird, followed by pecking",
        0x0E => "open door",
        0x0F => "unlock door",
        0x10 => "open gate",
        0x11 => "creaking",
        0x12 => "heavy gate opening",
        0x13 => "deep lightning, or something falling",
        0x14 => "deep lightning with metallic scraping",
        0x15 => "quick opening of metal door",
        0x16 => "weird woosh",
        0x17 => "quick woosh",
        0x18 => "machine hum",
        0x19 => "heavy machine moving",
        0x1A => "quiet unlock",
        0x1B => "ominous sound, like a debuff",
        0x1C => "page turn?",
        0x1D => "curtain pull?",
        0x1E => "glass shatter",
        0x1F => "ray gun",
        0x20 => "lightning 1",
        0x21 => "small crunch",
        0x22 => "ghostly sound, deep",
        0x23 => "mechanical door closing or elevator stopping",
        0x24 => "window slammed shut",
        0x25 => "light woosh, like page turning",
        0x26 => "open heavier door",
        0x27 => "heartbeat",
        0x28 => "punch",
        0x29 => "small ding",
        0x2A => "window break",
        0x2B => "cave ambience",
        0x2C => "Ice Queen music box",
        0x2D => "teleporter sound",
        0x2E => "holy healing sound",
        0x2F => "weird woosh, comes and goes",
        0x30 => "electronic woosh",
        0x31 => "deep sounding lightning?",
        0x32 => "big metal gate quick open",
        0x4D => "lightning 2",
        _ => "nothing",
    }
}

pub fn vocabulary_index(words: &[&str], word: &str) -> Option<usize> {
    words.iter().position(|w| *w == word)
}

/// Two-way map between 16-bit character codes and the glyphs they draw.
#[derive(Debug, Clone, Default)]
pub struct CharacterTable {
    glyphs: HashMap<u16, String>,
    codes: HashMap<String, u16>,
    longest_glyph: usize,
}

impl CharacterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let source = std::fs::read_to_string(path).map_err(|e| FlowError::from(e).in_file(path))?;
        Self::parse(&source).map_err(|e| e.in_file(path))
    }

    /// Parses `HEX=glyph` lines. `#` starts a comment, so the `=` and `#`
    /// glyphs (codes 0x41 and 0x54) are written with an empty right side.
    pub fn parse(source: &str) -> Result<Self, FlowError> {
        let mut table = Self::new();

        for (number, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim_end_matches('\r');
            if line.starts_with('#') {
                continue;
            }
            let line = match line.find('#') {
                Some(comment) => &line[..comment],
                None => line,
            };
            if line.is_empty() {
                continue;
            }

            let (code, glyph) = line.split_once('=').unwrap_or((line, ""));
            let code = u16::from_str_radix(code.trim(), 16).map_err(|_| {
                FlowError::malformed(
                    "character table",
                    format!("line {}: bad code {:?}", number + 1, code),
                )
            })?;

            let glyph = match glyph {
                "" if code == 0x41 => "=",
                "" if code == 0x54 => "#",
                "" => continue,
                g if g.trim().is_empty() => g,
                g => g.trim(),
            };
            table.insert(code, glyph);
        }

        log::debug!("loaded {} character codes", table.glyphs.len());
        Ok(table)
    }

    /// The first code registered for a glyph keeps it on the encode side.
    pub fn insert(&mut self, code: u16, glyph: &str) {
        self.codes.entry(glyph.to_string()).or_insert(code);
        self.longest_glyph = self.longest_glyph.max(glyph.chars().count());
        self.glyphs.insert(code, glyph.to_string());
    }

    pub fn glyph(&self, code: u16) -> Option<&str> {
        self.glyphs.get(&code).map(String::as_str)
    }

    pub fn code(&self, glyph: &str) -> Option<u16> {
        self.codes.get(glyph).copied()
    }

    /// Length in chars of the longest glyph.
    pub fn longest_glyph(&self) -> usize {
        self.longest_glyph
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Read-only tables shared by every pass over every file.
pub struct InstructionCatalog {
    opcodes: HashMap<u8, &'static OpcodeInfo>,
    mnemonics: HashMap<&'static str, &'static OpcodeInfo>,
    characters: CharacterTable,
}

impl InstructionCatalog {
    pub fn new(characters: CharacterTable) -> Self {
        let opcodes = opcode_info_map();
        let mnemonics = opcodes.values().map(|info| (info.mnemonic, *info)).collect();
        Self {
            opcodes,
            mnemonics,
            characters,
        }
    }

    pub fn load(table_path: &Path) -> Result<Self, FlowError> {
        Ok(Self::new(CharacterTable::load(table_path)?))
    }

    pub fn opcode(&self, byte: u8) -> Option<&'static OpcodeInfo> {
        self.opcodes.get(&byte).copied()
    }

    pub fn by_mnemonic(&self, mnemonic: &str) -> Option<&'static OpcodeInfo> {
        self.mnemonics.get(mnemonic).copied()
    }

    pub fn characters(&self) -> &CharacterTable {
        &self.characters
    }
}
