//! cerelink CLI - Command-line tool for the Cerelog X8 biosignal board.
//!
//! ## Features
//!
//! - Negotiate the link rate and stream decoded samples
//! - Decode raw byte captures offline
//! - Print handshake packets and the baud code table
//! - Configuration files and environment variable support

use {
    cerelink::{BaudCode, Error as LinkError, protocol::DEFAULT_TARGET},
    clap::{Parser, Subcommand},
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        process::ExitCode,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;

use {
    commands::{
        bauds::cmd_bauds, decode::cmd_decode, handshake::cmd_handshake, stream::cmd_stream,
    },
    config::Config,
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if spinners and styling should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// cerelink - Stream and inspect data from a Cerelog X8 board.
///
/// Environment variables:
///   CERELINK_PORT   - Serial port
///   CERELINK_BAUD   - Target baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "cerelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port the board is attached to.
    #[arg(short, long, global = true, env = "CERELINK_PORT")]
    port: Option<String>,

    /// Target baud rate to negotiate.
    #[arg(short, long, global = true, env = "CERELINK_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Negotiate the link rate and stream decoded records.
    Stream {
        /// Stop after this many seconds (default: until Ctrl-C).
        #[arg(short, long, value_name = "SECS")]
        duration: Option<u64>,

        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Decode a raw byte capture file.
    Decode {
        /// Capture file containing raw bytes read from the board.
        capture: PathBuf,

        /// Print records and statistics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the handshake packet for the target baud rate.
    Handshake {
        /// Timestamp to embed (default: current Unix time).
        #[arg(long)]
        timestamp: Option<u32>,
    },

    /// List supported baud rates and their configuration codes.
    Bauds {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// CLI failure, mapped to the process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad arguments or configuration.
    #[error("{0}")]
    Usage(String),

    /// Stopped by Ctrl-C.
    #[error("Interrupted")]
    Cancelled,

    /// Any other failure.
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled => 130,
            Self::Runtime(_) => 1,
        }
    }

    /// Wrap a library error, keeping cancellation distinct.
    pub(crate) fn from_link(err: LinkError, context: String) -> Self {
        match err {
            LinkError::Interrupted => Self::Cancelled,
            other => Self::Runtime(anyhow::Error::new(other).context(context)),
        }
    }
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "cerelink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    cerelink::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                CliError::Cancelled => {
                    eprintln!("{}", console::style("Interrupted").yellow());
                },
                CliError::Usage(msg) => {
                    eprintln!("{} {msg}", console::style("Error:").red().bold());
                },
                CliError::Runtime(e) => {
                    eprintln!("{} {e:#}", console::style("Error:").red().bold());
                },
            }
            ExitCode::from(err.exit_code())
        },
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Stream { duration, json } => cmd_stream(cli, &config, *duration, *json),
        Commands::Decode { capture, json } => cmd_decode(&config, capture, *json),
        Commands::Handshake { timestamp } => cmd_handshake(cli, &config, *timestamp),
        Commands::Bauds { json } => cmd_bauds(*json).map_err(CliError::from),
    }
}

/// Target rate from the command line, then config, then the default.
pub(crate) fn resolve_target(cli: &Cli, config: &Config) -> Result<BaudCode, CliError> {
    match cli
        .baud
        .or(config.connection.baud)
    {
        Some(baud) => BaudCode::from_baud(baud).map_err(|e| {
            CliError::Usage(format!(
                "{e}; run `cerelink bauds` for the supported rates"
            ))
        }),
        None => Ok(DEFAULT_TARGET),
    }
}

/// Serial port from the command line or config.
pub(crate) fn resolve_port(cli: &Cli, config: &Config) -> Result<String, CliError> {
    cli.port
        .clone()
        .or_else(|| {
            config
                .connection
                .port
                .clone()
        })
        .ok_or_else(|| {
            CliError::Usage(
                "no serial port given; use --port, CERELINK_PORT or [connection] port".to_string(),
            )
        })
}

/// Validated sample scale from the config.
pub(crate) fn resolve_scale(config: &Config) -> Result<cerelink::SampleScale, CliError> {
    config
        .scale()
        .map_err(|e| CliError::Usage(e.to_string()))
}
