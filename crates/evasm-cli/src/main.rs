use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evflow_common::batch::{
    archive_dir, dirs_in_interval, encode_file, parse_interval, po_to_txt_file, run_batch,
    select_inputs, BatchReport, DEC_EXTENSION, LAUNCHER_NAME, PO_EXTENSION,
};
use evflow_common::{InstructionCatalog, PoConverter, Region};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "evasm")]
#[command(about = "Event flow script assembler and archiver", long_about = None)]
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
    /// Rebuild .EVS files from their .DEC and .TXT files
    Encode {
        /// A .DEC or .EVS file, or a directory of .DEC files
        path: PathBuf,
    },
    /// Pack directories of .EVS files into Ex.BIN archives and patch the launcher
    Archive {
        /// A directory named E<n>, or an interval like 0-4 picking EXTRACTED_DIR/E<n>
        target: String,

        #[arg(long, default_value = "extracted")]
        extracted_dir: PathBuf,

        /// Original launcher, copied into the output directory on first use
        #[arg(long)]
        launcher: Option<PathBuf>,

        #[arg(long, default_value = "OG")]
        og_dir: PathBuf,

        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Convert a .PO file, or every one in a directory, back to .TXT
    Po2txt { path: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let region = Region::from_jp_flag(args.jp);

    match &args.command {
        Command::Encode { path } => {
            let catalog = load_catalog(&args.table)?;
            let files = select_inputs(path, DEC_EXTENSION)?;
            let report = run_batch(&files, |file| encode_file(file, &catalog, region))?;
            finish(report)
        }
        Command::Archive {
            target,
            extracted_dir,
            launcher,
            og_dir,
            output,
        } => {
            let dirs = if Path::new(target).is_dir() {
                vec![PathBuf::from(target)]
            } else {
                let interval = parse_interval(target)
                    .with_context(|| format!("{} is neither a directory nor an interval", target))?;
                dirs_in_interval(extracted_dir, interval)
            };
            let launcher = launcher
                .clone()
                .unwrap_or_else(|| og_dir.join(LAUNCHER_NAME));
            let report = run_batch(&dirs, |dir| {
                archive_dir(dir, output, &launcher, region).map(|_| ())
            })?;
            finish(report)
        }
        Command::Po2txt { path } => {
            let converter = PoConverter::new()?;
            let files = select_inputs(path, PO_EXTENSION)?;
            let report = run_batch(&files, |file| po_to_txt_file(file, &converter).map(|_| ()))?;
            finish(report)
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
