pub mod types;
pub mod cursor;
pub mod opcodes;
pub mod catalog;
pub mod header;
pub mod archive;
pub mod text_codec;
pub mod text;
pub mod instruction;
pub mod disassembler;
pub mod assembler;
pub mod po;
pub mod batch;

pub use types::*;
pub use catalog::{CharacterTable, InstructionCatalog};
pub use text_codec::{RenderMode, TextCodec};
pub use text::TextTable;
pub use instruction::Instruction;
pub use disassembler::{Disassembler, Disassembly};
pub use assembler::Assembler;
pub use po::PoConverter;
