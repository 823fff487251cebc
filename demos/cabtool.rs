use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cabset::{CabinetSet, ExtractOptions, FileEntry, FolderIndex};
use clap::{Parser, Subcommand};

// ========================================================================= //

#[derive(Parser)]
#[command(name = "cabtool", version, about = "Reads sets of CAB files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Concatenates and prints files
    Cat {
        cab: PathBuf,
        files: Vec<String>,
    },
    /// Extracts every file of the set
    Extract {
        cab: PathBuf,
        /// Sets the output directory
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
        /// Verifies data block checksums
        #[arg(long)]
        verify: bool,
        /// Fails folders whose MSZIP blocks come up short
        #[arg(long)]
        strict: bool,
    },
    /// Lists files in the cabinet set
    Ls {
        cab: PathBuf,
        /// Lists in long format
        #[arg(short, long)]
        long: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Cat { cab, files } => {
            let set = open_set(&cab)?;
            let mut stdout = io::stdout().lock();
            for name in files {
                let data = set
                    .read_file(&name)
                    .with_context(|| format!("reading {}", name))?;
                stdout.write_all(&data)?;
            }
        }
        Command::Extract { cab, output, verify, strict } => {
            let set = open_set(&cab)?;
            if !set.is_complete() {
                log::warn!("Cabinet set is incomplete");
            }
            let options = ExtractOptions::new()
                .verify_checksums(verify)
                .allow_short_blocks(!strict);
            let report = set
                .extract_to(&output, &options)
                .with_context(|| format!("creating {}", output.display()))?;
            for folder in report.folders() {
                println!("{}", folder);
            }
            if !report.is_success() {
                bail!("extraction was incomplete");
            }
        }
        Command::Ls { cab, long } => {
            let set = open_set(&cab)?;
            for volume in set.iter() {
                let cabinet = volume.cabinet();
                let num_folders = cabinet.folder_entries().len();
                for file in cabinet.file_entries() {
                    if file.folder_index().is_continued_from_prev() {
                        continue;
                    }
                    if !long {
                        println!("{}", file.name());
                        continue;
                    }
                    let ctype = file
                        .folder_index()
                        .resolve(num_folders)
                        .map(|index| &cabinet.folder_entries()[index])
                        .map(|folder| folder.compression_type().to_string())
                        .unwrap_or_else(|| "?".to_string());
                    list_file(volume.name(), &ctype, file);
                }
            }
        }
    }
    Ok(())
}

fn open_set(path: &Path) -> anyhow::Result<CabinetSet<File>> {
    CabinetSet::open(path)
        .with_context(|| format!("opening {}", path.display()))
}

// ========================================================================= //

fn list_file(volume: &str, ctype: &str, file: &FileEntry) {
    let file_size = if file.uncompressed_size() >= 100_000_000 {
        format!("{} MB", file.uncompressed_size() / (1 << 20))
    } else if file.uncompressed_size() >= 1_000_000 {
        format!("{} kB", file.uncompressed_size() / (1 << 10))
    } else {
        format!("{} B ", file.uncompressed_size())
    };
    let span = match file.folder_index() {
        FolderIndex::ContinuedToNext => ">",
        _ => " ",
    };
    println!(
        "{}{}{}{}{}{} {:<12} {:<7} {:>10} {} {}{}",
        if file.is_read_only() { 'R' } else { '-' },
        if file.is_hidden() { 'H' } else { '-' },
        if file.is_system() { 'S' } else { '-' },
        if file.is_archive() { 'A' } else { '-' },
        if file.is_exec() { 'E' } else { '-' },
        if file.is_name_utf() { 'U' } else { '-' },
        volume,
        ctype,
        file_size,
        file.datetime()
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| "invalid datetime".to_string()),
        file.name(),
        span,
    );
}
