#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use sevenz_stream::{
    create_archive, extract_archive, list_archive, test_archive, CompressionLevel, ProgressFn,
    ProgressUpdate, WriteOptions,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Create, extract, list and test 7z archives
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an archive from files and directories
    Create {
        /// Path of the output .7z archive
        output: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Compression level 0-9 (0 = store)
        #[arg(short, long, default_value_t = 5)]
        level: u32,

        /// Split the archive into volumes of this many bytes
        #[arg(short, long, default_value_t = 0)]
        split: u64,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value_t = 0)]
        threads: u32,
    },
    /// Extract an archive into a directory
    Extract {
        /// Archive path (base path or first .001 volume)
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// List the entries of an archive
    List {
        archive: PathBuf,
    },
    /// Verify archive integrity without writing files
    Test {
        archive: PathBuf,
    },
}

fn level_from_cli(level: u32) -> Result<CompressionLevel, String> {
    Ok(match level {
        0 => CompressionLevel::Store,
        1..=2 => CompressionLevel::Fastest,
        3..=4 => CompressionLevel::Fast,
        5..=6 => CompressionLevel::Normal,
        7..=8 => CompressionLevel::Maximum,
        9 => CompressionLevel::Ultra,
        other => return Err(format!("compression level must be 0-9, got {other}")),
    })
}

fn print_progress(update: &ProgressUpdate<'_>) -> bool {
    if update.bytes_total > 0 {
        eprint!(
            "\r{:>3}% {}",
            update.bytes_done * 100 / update.bytes_total,
            update.file_name
        );
    }
    true
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Create {
            output,
            inputs,
            level,
            split,
            threads,
        } => {
            let options = WriteOptions::new()
                .level(level_from_cli(level)?)
                .split_size(split)
                .threads(threads);
            let summary =
                create_archive(&output, &inputs, &options, &mut ProgressFn(print_progress))?;
            eprintln!(
                "\rCreated {} ({} entries, {} -> {} bytes, {} volume(s))",
                output.display(),
                summary.files,
                summary.unpack_size,
                summary.pack_size,
                summary.volumes
            );
        }
        Command::Extract { archive, output } => {
            extract_archive(&archive, &output, None, &mut ProgressFn(print_progress))?;
            eprintln!("\rExtracted {} to {}", archive.display(), output.display());
        }
        Command::List { archive } => {
            let entries = list_archive(&archive, None)?;
            for entry in &entries {
                let kind = if entry.is_directory { 'D' } else { '.' };
                println!("{kind} {:>12} {}", entry.size, entry.name);
            }
            eprintln!("{} entries", entries.len());
        }
        Command::Test { archive } => {
            test_archive(&archive, None, &mut ProgressFn(print_progress))?;
            eprintln!("\r{}: archive OK", archive.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
