use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evflow_common::batch::{
    archives_in_interval, decode_file, extract_archive, parse_interval, preview_file, run_batch,
    select_inputs, txt_to_po_file, ArchiveManifest, BatchReport, SCRIPT_EXTENSION, TXT_EXTENSION,
};
use evflow_common::{InstructionCatalog, PoConverter, Region};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "evdisasm")]
#[command(about = "Event flow script extractor and disassembler", long_about = None)]
struct Args {
    /// Character table mapping codes to glyphs
    #[arg(long, global = true, default_value = "table/p1p.tbl")]
    table: PathBuf,

    /// Files come from the Japanese release (no text table)
    #[arg(long, global = true)]
    jp: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split Ex.BIN archives into .EVS sub-files
    Extract {
        /// An archive, or an interval like 0-4 picking OG_DIR/E<n>.BIN
        target: String,

        #[arg(long, default_value = "OG")]
        og_dir: PathBuf,

        #[arg(short, long, default_value = "extracted")]
        output: PathBuf,
    },
    /// Write .DEC and .TXT files for an .EVS file or a directory of them
    Decode { path: PathBuf },
    /// Convert a .TXT file, or every one in a directory, to .PO
    Txt2po { path: PathBuf },
    /// Print an archive's sub-file table as JSON
    Table { archive: PathBuf },
    /// Print every string of an .EVS file the way the game lays it out
    Preview { path: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let region = Region::from_jp_flag(args.jp);

    match &args.command {
        Command::Extract { target, og_dir, output } => {
            let archives = if Path::new(target).exists() {
                vec![PathBuf::from(target)]
            } else {
                let interval = parse_interval(target)
                    .with_context(|| format!("{} is neither a file nor an interval", target))?;
                archives_in_interval(og_dir, interval)
            };
            let report = run_batch(&archives, |path| extract_archive(path, output).map(|_| ()))?;
            finish(report)
        }
        Command::Decode { path } => {
            let catalog = load_catalog(&args.table)?;
            let files = select_inputs(path, SCRIPT_EXTENSION)?;
            let report = run_batch(&files, |file| decode_file(file, &catalog, region))?;
            finish(report)
        }
        Command::Txt2po { path } => {
            let converter = PoConverter::new()?;
            let files = select_inputs(path, TXT_EXTENSION)?;
            let report = run_batch(&files, |file| {
                txt_to_po_file(file, &converter, region).map(|_| ())
            })?;
            finish(report)
        }
        Command::Table { archive } => {
            let manifest = ArchiveManifest::read(archive)?;
            println!("{}", manifest.to_json()?);
            Ok(())
        }
        Command::Preview { path } => {
            let catalog = load_catalog(&args.table)?;
            let preview = preview_file(path, &catalog, region)
                .with_context(|| format!("previewing {}", path.display()))?;
            print!("{}", preview);
            Ok(())
        }
    }
}

fn load_catalog(table: &Path) -> Result<InstructionCatalog> {
    InstructionCatalog::load(table)
        .with_context(|| format!("loading character table {}", table.display()))
}

fn finish(report: BatchReport) -> Result<()> {
    log::info!("{} files processed", report.processed);
    if !report.is_success() {
        bail!("{} files failed", report.failed.len());
    }
    Ok(())
}
