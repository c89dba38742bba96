// Command-line front end for a revision store kept in a JSON snapshot file.
//
// Every command loads the snapshot, runs on a single-threaded tokio runtime
// and (for `push`) writes the snapshot back.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use bytes::Bytes;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use log::debug;

use crate::chain::{DEFAULT_CACHE_SIZE, Revisions, StoreError, StoreOptions};
use crate::codec::{Codec, DeltaCodec, DeltaOptions, WorkerCodec};
use crate::snapshot::{SnapshotError, TextEncoding};

const DEFAULT_LEVEL: u32 = 6;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Append-only revision store with skip-delta chains.
#[derive(Parser, Debug)]
#[command(
    name = "skipdelta",
    version,
    about = "Skip-delta revision store",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit results as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Append a new revision.
    Push(PushArgs),
    /// Write out one revision.
    Get(GetArgs),
    /// List the stored revisions.
    Log(LogArgs),
    /// Reconstruct every revision and report failures.
    Verify(StoreArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EncodingArg {
    Utf8,
    Base64,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Base64 => TextEncoding::Base64,
        }
    }
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Snapshot file holding the store.
    #[arg(long, value_hint = ValueHint::FilePath)]
    store: PathBuf,

    /// Number of decoded revisions to cache.
    #[arg(long = "cache-size", default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,
}

#[derive(Args, Debug)]
struct PushArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Compression level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_LEVEL)]
    level: u32,

    /// Disable Adler-32 checksums in new deltas.
    #[arg(long = "no-checksum")]
    no_checksum: bool,

    /// Text encoding for revision data in the snapshot.
    #[arg(long, value_enum, default_value_t = EncodingArg::Base64)]
    encoding: EncodingArg,

    /// Run the codec on a dedicated worker thread.
    #[arg(long)]
    worker: bool,

    /// Input file (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GetArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Revision index.
    index: usize,

    /// Output file (default: stdout).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LogArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Include a SHA-256 of each reconstructed revision.
    #[arg(long)]
    digest: bool,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Push,
    Get,
    Log,
    Verify,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    store_file: PathBuf,
    cache_size: usize,
    level: u32,
    checksum: bool,
    encoding: TextEncoding,
    use_worker: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    index: usize,
    digest: bool,
}

impl Options {
    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            cache_size: self.cache_size,
            snapshot_encoding: self.encoding,
        }
    }

    fn delta_options(&self) -> DeltaOptions {
        DeltaOptions {
            level: self.level,
            checksum: self.checksum,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        store_file: PathBuf::new(),
        cache_size: DEFAULT_CACHE_SIZE,
        level: DEFAULT_LEVEL,
        checksum: true,
        encoding: TextEncoding::default(),
        use_worker: false,
        input_file: None,
        output_file: None,
        index: 0,
        digest: false,
    };

    let store = match cli.command {
        Cmd::Push(args) => {
            opts.command = Command::Push;
            opts.level = args.level;
            opts.checksum = !args.no_checksum;
            opts.encoding = args.encoding.into();
            opts.use_worker = args.worker;
            opts.input_file = args.input;
            Some(args.store)
        }
        Cmd::Get(args) => {
            opts.command = Command::Get;
            opts.index = args.index;
            opts.output_file = args.output;
            Some(args.store)
        }
        Cmd::Log(args) => {
            opts.command = Command::Log;
            opts.digest = args.digest;
            Some(args.store)
        }
        Cmd::Verify(args) => {
            opts.command = Command::Verify;
            Some(args)
        }
        Cmd::Config => None,
    };

    if let Some(store) = store {
        opts.store_file = store.store;
        opts.cache_size = store.cache_size;
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("skipdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Errors and shared helpers
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Stdio(#[source] io::Error),
    #[error("{}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("output file exists, use -f to overwrite: {}", .0.display())]
    OutputExists(PathBuf),
    #[error("{}: no such store", .0.display())]
    MissingStore(PathBuf),
    #[error("cannot start codec worker: {0}")]
    Worker(#[source] io::Error),
    #[error("cannot start runtime: {0}")]
    Runtime(#[source] io::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn fail(err: CliError) -> i32 {
    eprintln!("skipdelta: {err}");
    1
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(CliError::Runtime)?;
    Ok(runtime.block_on(future))
}

/// Load the store at `path`, or start an empty one if the file is missing.
fn load_or_create_store<C: Codec + 'static>(
    path: &Path,
    codec: C,
    options: StoreOptions,
) -> Result<Revisions<C>, CliError> {
    if !path.exists() {
        debug!("{} does not exist, starting an empty store", path.display());
        return Ok(Revisions::new(codec, options));
    }
    load_store(path, codec, options)
}

fn load_store<C: Codec + 'static>(
    path: &Path,
    codec: C,
    options: StoreOptions,
) -> Result<Revisions<C>, CliError> {
    if !path.exists() {
        return Err(CliError::MissingStore(path.to_path_buf()));
    }
    let json = fs::read_to_string(path).map_err(io_error(path))?;
    Revisions::from_json(&json, codec, options).map_err(|source| CliError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

fn save_store<C>(path: &Path, store: &Revisions<C>) -> Result<(), CliError> {
    let json = store
        .to_snapshot()
        .to_json_pretty()
        .map_err(|source| CliError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, json).map_err(io_error(path))
}

fn emit_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("skipdelta: json: {e}"),
    }
}

#[cfg(feature = "file-io")]
fn content_digest(data: &[u8]) -> Option<String> {
    use sha2::{Digest, Sha256};

    Some(format!("{:x}", Sha256::digest(data)))
}

#[cfg(not(feature = "file-io"))]
fn content_digest(_data: &[u8]) -> Option<String> {
    None
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("skipdelta version {version}");

    let adler32 = cfg!(feature = "adler32") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("ADLER32={adler32}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("DEFAULT_LEVEL={DEFAULT_LEVEL}");
    eprintln!("DEFAULT_CACHE_SIZE={DEFAULT_CACHE_SIZE}");
    eprintln!("DEFAULT_ENCODING={}", TextEncoding::default());
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Push command
// ---------------------------------------------------------------------------

fn read_input(opts: &Options) -> Result<Bytes, CliError> {
    match &opts.input_file {
        Some(path) => fs::read(path).map(Bytes::from).map_err(io_error(path)),
        None => {
            let mut data = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .map_err(CliError::Stdio)?;
            Ok(Bytes::from(data))
        }
    }
}

async fn push_with<C: Codec + 'static>(
    opts: &Options,
    codec: C,
    data: Bytes,
) -> Result<serde_json::Value, CliError> {
    let mut store = load_or_create_store(&opts.store_file, codec, opts.store_options())?;
    let size = data.len();
    store.push(data).await?;

    let index = store.len() - 1;
    save_store(&opts.store_file, &store)?;

    let entry = &store.entries()[index];
    Ok(serde_json::json!({
        "command": "push",
        "index": index,
        "id": entry.id().to_string(),
        "base": store.base_index(index),
        "size": size,
        "stored_bytes": entry.data().len(),
    }))
}

fn cmd_push(opts: &Options) -> i32 {
    let data = match read_input(opts) {
        Ok(data) => data,
        Err(e) => return fail(e),
    };

    let result = if opts.use_worker {
        match WorkerCodec::spawn(opts.delta_options()) {
            Ok(worker) => block_on(push_with(opts, worker, data)),
            Err(e) => Err(CliError::Worker(e)),
        }
    } else {
        block_on(push_with(opts, DeltaCodec::new(opts.delta_options()), data))
    };

    match result.and_then(|r| r) {
        Ok(report) => {
            if opts.json_output {
                emit_json(&report);
            } else if opts.verbose > 0 && !opts.quiet {
                eprintln!(
                    "skipdelta: pushed revision {} ({} bytes, {} stored)",
                    report["index"], report["size"], report["stored_bytes"]
                );
            }
            0
        }
        Err(e) => fail(e),
    }
}

// ---------------------------------------------------------------------------
// Get command
// ---------------------------------------------------------------------------

fn cmd_get(opts: &Options) -> i32 {
    let result = block_on(async {
        let store = load_store(&opts.store_file, DeltaCodec::default(), opts.store_options())?;
        Ok::<_, CliError>(store.get(opts.index).await?)
    });
    let data = match result.and_then(|r| r) {
        Ok(data) => data,
        Err(e) => return fail(e),
    };

    let written = match &opts.output_file {
        Some(path) => {
            if path.exists() && !opts.force {
                return fail(CliError::OutputExists(path.clone()));
            }
            fs::write(path, &data).map_err(io_error(path))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&data)
                .and_then(|()| stdout.flush())
                .map_err(CliError::Stdio)
        }
    };
    if let Err(e) = written {
        return fail(e);
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("skipdelta: revision {}: {} bytes", opts.index, data.len());
    }
    0
}

// ---------------------------------------------------------------------------
// Log command
// ---------------------------------------------------------------------------

async fn log_rows(opts: &Options) -> Result<Vec<serde_json::Value>, CliError> {
    let store = load_store(&opts.store_file, DeltaCodec::default(), opts.store_options())?;
    let mut rows = Vec::with_capacity(store.len());
    for (index, entry) in store.entries().iter().enumerate() {
        let digest = if opts.digest {
            content_digest(&store.get(index).await?)
        } else {
            None
        };
        rows.push(serde_json::json!({
            "index": index,
            "id": entry.id().to_string(),
            "parent": entry.parent().map(|p| p.to_string()),
            "base": store.base_index(index),
            "depth": store.depth(index),
            "stored_bytes": entry.data().len(),
            "sha256": digest,
        }));
    }
    Ok(rows)
}

fn cmd_log(opts: &Options) -> i32 {
    let rows = match block_on(log_rows(opts)).and_then(|r| r) {
        Ok(rows) => rows,
        Err(e) => return fail(e),
    };

    if opts.json_output {
        emit_json(&serde_json::Value::Array(rows));
        return 0;
    }
    if opts.digest && !cfg!(feature = "file-io") && !opts.quiet {
        eprintln!("skipdelta: warning: digests need the file-io feature");
    }

    println!(
        "{:>6}  {:>8}  {:>8}  {:>6}  {:>5}  {:>10}",
        "index", "id", "parent", "base", "depth", "stored"
    );
    for row in &rows {
        let text = |key: &str| match &row[key] {
            serde_json::Value::Null => "-".to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut line = format!(
            "{:>6}  {:>8}  {:>8}  {:>6}  {:>5}  {:>10}",
            text("index"),
            text("id"),
            text("parent"),
            text("base"),
            text("depth"),
            text("stored_bytes")
        );
        if let serde_json::Value::String(digest) = &row["sha256"] {
            line.push_str("  ");
            line.push_str(digest);
        }
        println!("{line}");
    }
    0
}

// ---------------------------------------------------------------------------
// Verify command
// ---------------------------------------------------------------------------

fn cmd_verify(opts: &Options) -> i32 {
    let result = block_on(async {
        let store = load_store(&opts.store_file, DeltaCodec::default(), opts.store_options())?;
        let mut failures = Vec::new();
        for index in 0..store.len() {
            if let Err(e) = store.get(index).await {
                failures.push((index, e));
            }
        }
        Ok::<_, CliError>((store.len(), failures))
    });
    let (total, failures) = match result.and_then(|r| r) {
        Ok(outcome) => outcome,
        Err(e) => return fail(e),
    };

    for (index, err) in &failures {
        eprintln!("skipdelta: revision {index}: {err}");
    }
    if opts.json_output {
        emit_json(&serde_json::json!({
            "command": "verify",
            "revisions": total,
            "failures": failures
                .iter()
                .map(|(index, err)| serde_json::json!({"index": index, "error": err.to_string()}))
                .collect::<Vec<_>>(),
        }));
    } else if !opts.quiet {
        eprintln!(
            "skipdelta: verified {} of {total} revisions",
            total - failures.len()
        );
    }

    if failures.is_empty() { 0 } else { 1 }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let default_filter = match opts.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Push => cmd_push(&opts),
        Command::Get => cmd_get(&opts),
        Command::Log => cmd_log(&opts),
        Command::Verify => cmd_verify(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
