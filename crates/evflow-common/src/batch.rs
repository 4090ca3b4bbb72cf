//! File-level operations and the loops that run them over directories.

use crate::archive::{extract, pack, patch_launcher, read_sub_file_table};
use crate::assembler::Assembler;
use crate::catalog::InstructionCatalog;
use crate::disassembler::Disassembler;
use crate::po::PoConverter;
use crate::text_codec::TextCodec;
use crate::types::{FlowError, Region, SubFileAddress};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const ARCHIVE_EXTENSION: &str = "BIN";
pub const SCRIPT_EXTENSION: &str = "EVS";
pub const DEC_EXTENSION: &str = "DEC";
pub const TXT_EXTENSION: &str = "TXT";
pub const PO_EXTENSION: &str = "PO";
pub const LAUNCHER_NAME: &str = "EBOOT.BIN";

/// `"2-4"`, `"4-2"` and `"3"` style selections of archive numbers.
pub fn parse_interval(input: &str) -> Result<RangeInclusive<u32>, FlowError> {
    let input = input.trim();
    let number = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| FlowError::InvalidInterval(input.to_string()))
    };

    match input.split_once('-') {
        Some((first, last)) => {
            let (first, last) = (number(first)?, number(last)?);
            Ok(first.min(last)..=first.max(last))
        }
        None => {
            let single = number(input)?;
            Ok(single..=single)
        }
    }
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Files in `dir` with the given extension, in name order.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, FlowError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| FlowError::from(e).in_file(dir))? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(FlowError::EmptyBatch(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// A directory expands to its matching files; anything else is taken as is.
pub fn select_inputs(path: &Path, extension: &str) -> Result<Vec<PathBuf>, FlowError> {
    if path.is_dir() {
        collect_files(path, extension)
    } else {
        Ok(vec![path.to_path_buf()])
    }
}

/// `<og_dir>/E<n>.BIN` for every number in the interval that exists.
pub fn archives_in_interval(og_dir: &Path, interval: RangeInclusive<u32>) -> Vec<PathBuf> {
    interval
        .map(|n| og_dir.join(format!("E{}.{}", n, ARCHIVE_EXTENSION)))
        .filter(|path| {
            let found = path.is_file();
            if !found {
                log::warn!("skipping {}: no such file", path.display());
            }
            found
        })
        .collect()
}

/// `<extracted_dir>/E<n>` for every number in the interval that exists.
pub fn dirs_in_interval(extracted_dir: &Path, interval: RangeInclusive<u32>) -> Vec<PathBuf> {
    interval
        .map(|n| extracted_dir.join(format!("E{}", n)))
        .filter(|path| {
            let found = path.is_dir();
            if !found {
                log::warn!("skipping {}: not a directory", path.display());
            }
            found
        })
        .collect()
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, FlowError> {
    std::fs::read(path).map_err(|e| FlowError::from(e).in_file(path))
}

fn read_text(path: &Path) -> Result<String, FlowError> {
    std::fs::read_to_string(path).map_err(|e| FlowError::from(e).in_file(path))
}

/// Writes `bytes` to a temporary file beside `path` and moves it over
/// `path`, so a failed write never leaves a partial file under that name.
pub fn replace_file(path: &Path, bytes: impl AsRef<[u8]>) -> Result<(), FlowError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| FlowError::from(e).in_file(dir))?;
    file.write_all(bytes.as_ref())?;
    file.persist(path)
        .map_err(|e| FlowError::from(e.error).in_file(path))?;
    Ok(())
}

/// `path` with `extension`, or its lowercase spelling if only that exists.
fn sibling(path: &Path, extension: &str) -> PathBuf {
    let upper = path.with_extension(extension);
    if upper.exists() {
        return upper;
    }
    let lower = path.with_extension(extension.to_ascii_lowercase());
    if lower.exists() {
        lower
    } else {
        upper
    }
}

/// The sub-file table of an archive, as written next to its extracted files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub archive: String,
    pub sub_files: Vec<SubFileAddress>,
}

impl ArchiveManifest {
    pub fn read(path: &Path) -> Result<Self, FlowError> {
        let bytes = read_bytes(path)?;
        let sub_files = read_sub_file_table(&bytes).map_err(|e| e.in_file(path))?;
        Ok(Self {
            archive: file_stem(path)?,
            sub_files,
        })
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn file_stem(path: &Path) -> Result<String, FlowError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| FlowError::malformed("path", format!("no file name in {}", path.display())))
}

fn file_name(path: &Path) -> Result<String, FlowError> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| FlowError::malformed("path", format!("no file name in {}", path.display())))
}

/// Splits `path` into `<out_root>/<base>/<base>_NNN.EVS` files plus a
/// `<base>.json` manifest. Returns the written sub-file paths.
pub fn extract_archive(path: &Path, out_root: &Path) -> Result<Vec<PathBuf>, FlowError> {
    if !has_extension(path, ARCHIVE_EXTENSION) {
        return Err(FlowError::malformed(
            "archive",
            format!("only .{} files are supported: {}", ARCHIVE_EXTENSION, path.display()),
        ));
    }

    let bytes = read_bytes(path)?;
    let table = read_sub_file_table(&bytes).map_err(|e| e.in_file(path))?;
    let base = file_stem(path)?;
    let dir = out_root.join(&base);
    std::fs::create_dir_all(&dir).map_err(|e| FlowError::from(e).in_file(&dir))?;

    let mut written = Vec::new();
    for sub_file in extract(&bytes, &table) {
        let target = dir.join(format!("{}_{:03}.{}", base, sub_file.index, SCRIPT_EXTENSION));
        replace_file(&target, sub_file.bytes)?;
        written.push(target);
    }

    let manifest = ArchiveManifest {
        archive: base.clone(),
        sub_files: table,
    };
    replace_file(&dir.join(format!("{}.json", base)), manifest.to_json()?)?;

    log::info!("extracted {} sub-files to {}", written.len(), dir.display());
    Ok(written)
}

/// Launcher table number of an archive named `E<n>`.
pub fn archive_index(name: &str) -> Option<u32> {
    let rest = name.strip_prefix('E').or_else(|| name.strip_prefix('e'))?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Packs the `.EVS` files of `dir` into `<out_dir>/<dir name>.BIN` and
/// updates the launcher in `out_dir`, copied from `launcher` the first time.
pub fn archive_dir(dir: &Path, out_dir: &Path, launcher: &Path, region: Region) -> Result<PathBuf, FlowError> {
    let name = file_name(dir)?;
    let index = archive_index(&name).ok_or_else(|| {
        FlowError::malformed("archive", format!("{} is not named E<number>", dir.display()))
    })?;

    let sub_files = collect_files(dir, SCRIPT_EXTENSION)?
        .iter()
        .map(|path| read_bytes(path))
        .collect::<Result<Vec<_>, _>>()?;
    let packed = pack(&sub_files, true)?;

    std::fs::create_dir_all(out_dir).map_err(|e| FlowError::from(e).in_file(out_dir))?;
    let launcher_out = out_dir.join(LAUNCHER_NAME);
    let launcher_in = if launcher_out.is_file() {
        launcher_out.as_path()
    } else {
        launcher
    };
    let mut launcher_bytes = read_bytes(launcher_in)?;
    patch_launcher(&mut launcher_bytes, region, index, &packed.table).map_err(|e| e.in_file(launcher_in))?;

    let target = out_dir.join(format!("{}.{}", name, ARCHIVE_EXTENSION));
    replace_file(&target, &packed.bytes)?;
    replace_file(&launcher_out, &launcher_bytes)?;

    log::info!(
        "packed {} sub-files into {} ({:#x} bytes)",
        packed.table.len(),
        target.display(),
        packed.bytes.len()
    );
    Ok(target)
}

/// Writes `.DEC` and, when the file has code, `.TXT` beside an `.EVS`.
pub fn decode_file(path: &Path, catalog: &InstructionCatalog, region: Region) -> Result<(), FlowError> {
    let data = read_bytes(path)?;
    let disassembly = Disassembler::new(catalog, region).disassemble(&data)?;

    replace_file(&path.with_extension(DEC_EXTENSION), &disassembly.dec)?;
    if let Some(txt) = disassembly.txt() {
        replace_file(&path.with_extension(TXT_EXTENSION), txt)?;
    }
    log::info!("decoded {}", path.display());
    Ok(())
}

/// Rebuilds an `.EVS` from itself and the `.DEC` and `.TXT` beside it.
/// `path` may name any of the three.
pub fn encode_file(path: &Path, catalog: &InstructionCatalog, region: Region) -> Result<(), FlowError> {
    let evs = sibling(path, SCRIPT_EXTENSION);
    let dec = sibling(path, DEC_EXTENSION);
    let txt = sibling(path, TXT_EXTENSION);

    let original = read_bytes(&evs)?;
    let source = read_text(&dec)?;
    let strings = if txt.is_file() {
        Some(read_text(&txt)?)
    } else {
        log::debug!("no {} beside {}", TXT_EXTENSION, dec.display());
        None
    };

    let bytes = Assembler::new(catalog, region)
        .assemble(&original, &source, strings.as_deref())
        .map_err(|e| e.in_file(&dec))?;
    replace_file(&evs, bytes)?;
    log::info!("encoded {}", evs.display());
    Ok(())
}

/// Multi-line rendering of every string in an `.EVS`.
pub fn preview_file(path: &Path, catalog: &InstructionCatalog, region: Region) -> Result<String, FlowError> {
    let data = read_bytes(path)?;
    let disassembly = Disassembler::new(catalog, region).disassemble(&data)?;
    let codec = TextCodec::new(catalog.characters());
    disassembly.texts.render_preview(&data, &codec)
}

pub fn txt_to_po_file(path: &Path, converter: &PoConverter, region: Region) -> Result<PathBuf, FlowError> {
    let po = converter.txt_to_po(&read_text(path)?, region)?;
    let target = path.with_extension(PO_EXTENSION);
    replace_file(&target, po)?;
    log::info!("wrote {}", target.display());
    Ok(target)
}

pub fn po_to_txt_file(path: &Path, converter: &PoConverter) -> Result<PathBuf, FlowError> {
    let txt = converter.po_to_txt(&read_text(path)?)?;
    let target = path.with_extension(TXT_EXTENSION);
    replace_file(&target, txt)?;
    log::info!("wrote {}", target.display());
    Ok(target)
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: Vec<PathBuf>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs `op` on each file in order. Malformed files are logged and
/// counted; any other failure stops the batch.
pub fn run_batch<F>(files: &[PathBuf], mut op: F) -> Result<BatchReport, FlowError>
where
    F: FnMut(&Path) -> Result<(), FlowError>,
{
    let mut report = BatchReport::default();
    for path in files {
        match op(path) {
            Ok(()) => report.processed += 1,
            Err(err) if err.is_malformed_input() => {
                log::error!("{}", err.in_file(path));
                report.failed.push(path.clone());
            }
            Err(err) => return Err(err.in_file(path)),
        }
    }

    if !report.failed.is_empty() {
        log::warn!(
            "{} of {} files failed",
            report.failed.len(),
            files.len()
        );
    }
    Ok(report)
}
