//! CLI tool for reading, initializing and erasing NoFS memory cards.
//!
//! This tool uses the `nofs` library to locate the card, stream its data
//! region into a file, lay down a fresh NoFS header or erase the card.

use clap::{CommandFactory, Parser};
use nofs::{
    erase, initialize, locate, EraseMode, Error, NofsStream, Operation, Options, Selection,
    SysfsSource,
};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

/// Read, initialize or erase a NoFS memory card.
///
/// Unless -c is given the card's data is read to OUTPUT (or stdout); -e and
/// -E erase the card once it has been read out.
/// The card is located automatically unless -i names it; the tool refuses
/// to act whenever more than one device could be the card.
#[derive(Parser, Debug)]
#[command(name = "nofs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device (or disk image) to use instead of automatic detection
    #[arg(short, long, value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Write the card's data to OUTPUT (default: stdout)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Initialize the device by creating a NoFS on it
    #[arg(short, long, conflicts_with_all = ["output", "erase", "full_erase"])]
    create: bool,

    /// Erase the data region after reading it out; keeps the header
    #[arg(short, long, conflicts_with = "full_erase")]
    erase: bool,

    /// Read out, then erase the header as well; the card no longer reads as NoFS
    #[arg(short = 'E', long)]
    full_erase: bool,

    /// Act even if the device carries no NoFS header; -e/-E then skip the read. DANGEROUS!
    #[arg(short, long)]
    force: bool,

    /// Accept devices not flagged removable
    #[arg(long)]
    allow_fixed: bool,

    /// Largest device size in bytes accepted as a card
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Fill the whole data region with the erase pattern when initializing
    #[arg(long)]
    prefill: bool,

    /// Number of consecutive sentinel bytes that end the data
    #[arg(long, default_value = "1")]
    sentinel_run: usize,

    /// Show what would be written without touching the device
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if args.create && args.input.is_some() && !args.force {
        Args::command()
            .error(
                clap::error::ErrorKind::ArgumentConflict,
                "can't use -c and -i unless -f is set (are you SURE you want to do this?)",
            )
            .exit();
    }

    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(e.kind().exit_code());
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), Error> {
    let mut options = Options::new()
        .with_allow_fixed(args.allow_fixed)
        .with_sentinel_run(args.sentinel_run)
        .with_prefill(args.prefill)
        .with_force(args.force)
        .with_dry_run(args.dry_run);
    if let Some(max) = args.max_size {
        options = options.with_max_device_size(max);
    }

    // Request sudo privileges only if we need to access a real device
    if needs_root(args) {
        sudo::escalate_if_needed().map_err(|e| {
            Error::io(
                "escalate privileges",
                io::Error::new(io::ErrorKind::PermissionDenied, e.to_string()),
            )
        })?;
    }

    let selection = match &args.input {
        Some(path) => Selection::Explicit(path.clone()),
        None => Selection::Auto,
    };
    let source = SysfsSource::new();

    if args.create {
        let card = locate(&source, &selection, Operation::Initialize, &options)?;
        eprintln!("Initializing NoFS on {} ({})...", card.path.display(), card.size_human());
        let state = initialize(&card.path, &options)?;
        report("initialized", &state);
        return Ok(());
    }

    let erase_mode = if args.erase {
        Some(EraseMode::KeepHeader)
    } else if args.full_erase {
        Some(EraseMode::WipeHeader)
    } else {
        None
    };
    let op = if erase_mode.is_some() {
        Operation::Erase
    } else {
        Operation::Read
    };

    let card = locate(&source, &selection, op, &options)?;
    eprintln!("Using {} ({})", card.path.display(), card.size_human());
    read_then_erase(&card.path, args.output.as_deref(), erase_mode, &options)
}

/// Read the card out, then erase it if asked.
///
/// The erase only runs after the data is safely in `output`. With
/// [`Options::force`] a card without a usable header has nothing to read
/// and goes straight to the erase.
fn read_then_erase(
    device: &Path,
    output: Option<&Path>,
    erase_mode: Option<EraseMode>,
    options: &Options,
) -> Result<(), Error> {
    match read_card(device, output, options) {
        Ok(bytes) => info!(device = %device.display(), bytes, "read card"),
        Err(e @ (Error::NotNoFsFormatted(_) | Error::UnsupportedVersion { .. }))
            if erase_mode.is_some() && options.force =>
        {
            warn!(device = %device.display(), error = %e, "nothing to read, erasing anyway");
        }
        Err(e) => return Err(e),
    }

    if let Some(mode) = erase_mode {
        eprintln!("Erasing {}...", device.display());
        let state = erase(device, mode, options).inspect_err(|_| {
            eprintln!("Erase failed: card status unknown, do not assume the original data is intact.");
        })?;
        report("erased", &state);
    }

    Ok(())
}

fn read_card(device: &Path, output: Option<&Path>, options: &Options) -> Result<u64, Error> {
    let mut stream = NofsStream::open(device, options)?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
            let mut writer = io::BufWriter::new(file);
            let bytes = stream.copy_to(&mut writer)?;
            writer
                .flush()
                .map_err(|e| Error::io(format!("flush {}", path.display()), e))?;
            Ok(bytes)
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let bytes = stream.copy_to(&mut handle)?;
            handle.flush().map_err(|e| Error::io("flush stdout", e))?;
            Ok(bytes)
        }
    }
}

fn needs_root(args: &Args) -> bool {
    if args.dry_run && args.input.is_some() {
        return false;
    }
    match &args.input {
        Some(path) => !path.metadata().map(|m| m.is_file()).unwrap_or(false),
        None => true,
    }
}

fn report(action: &str, state: &nofs::State) {
    if state.dry_run {
        eprintln!(
            "Dry run: {} would have written {} bytes",
            state.device_path.display(),
            state.bytes_written
        );
    } else {
        eprintln!(
            "Device {} {} ({} bytes written)",
            state.device_path.display(),
            action,
            state.bytes_written
        );
    }
}
