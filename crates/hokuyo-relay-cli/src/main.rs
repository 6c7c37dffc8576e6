use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use glob::glob;
use hokuyo_relay_core::{
    Channel, ChannelError, ChannelSettings, ChannelSummary, RelayConfig, ReplayOptions,
    SCANNER_LAYOUT, ShutdownToken, decode_fields, decode_frame, fragment, make_run_report_now,
    synthetic_scan,
};
use serde::Serialize;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("HOKUYO_RELAY_BUILD_COMMIT"),
    " ",
    env!("HOKUYO_RELAY_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "hokuyo-relay")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "UDP relay for Hokuyo safety laser scanners with simulator failover.",
    long_about = None,
    after_help = "Examples:\n  hokuyo-relay run --config relay.toml\n  hokuyo-relay simulate --target 192.168.179.158:10940\n  hokuyo-relay pcap analyse capture.pcapng -o report.json"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Relay every configured channel until Ctrl-C.
    Run {
        /// TOML configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write channel statistics (JSON) on shutdown
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    GenConfig {
        /// Write to a file instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Decode one raw STX..ETX frame.
    Decode {
        /// File holding the frame bytes
        frame: PathBuf,

        /// Write the binary message to this path (hex on stdout otherwise)
        #[arg(short = 'o', long, conflicts_with = "json")]
        output: Option<PathBuf>,

        /// Print decoded fields as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send synthetic scans, fragmented like the real sensor.
    Simulate {
        /// Relay sim input to feed, e.g. 192.168.179.158:10940
        #[arg(long)]
        target: SocketAddr,

        /// Frames per second
        #[arg(long, default_value_t = 40.0)]
        rate_hz: f64,

        /// Maximum datagram size
        #[arg(long, default_value_t = 1400)]
        fragment: usize,

        /// Stop after this many frames
        #[arg(long)]
        count: Option<u64>,
    },
    /// Operations on PCAP/PCAPNG inputs.
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Replay scanner traffic from a capture and report per-port frame counts.
    #[command(alias = "analyze")]
    #[command(
        after_help = "Examples:\n  hokuyo-relay pcap analyse capture.pcapng -o report.json\n  hokuyo-relay pcap analyse capture.pcap --port 5005 --stdout"
    )]
    Analyse {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Only replay datagrams sent to this UDP port (repeatable)
        #[arg(long = "port")]
        ports: Vec<u16>,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run { config, stats } => cmd_run(config, stats),
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Decode {
            frame,
            output,
            json,
        } => cmd_decode(frame, output, json),
        Commands::Simulate {
            target,
            rate_hz,
            fragment,
            count,
        } => cmd_simulate(target, rate_hz, fragment, count),
        Commands::Pcap { command } => match command {
            PcapCommands::Analyse {
                input,
                report,
                stdout,
                pretty,
                ports,
                quiet,
            } => cmd_pcap_analyse(input, report, stdout, pretty, ports, quiet),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

fn cmd_run(config: Option<PathBuf>, stats: Option<PathBuf>) -> Result<(), CliError> {
    let config = match config {
        Some(path) => RelayConfig::from_file(&path).map_err(|err| {
            CliError::new(
                format!("invalid configuration {}: {err}", path.display()),
                Some("run `hokuyo-relay gen-config` for a reference file".to_string()),
            )
        })?,
        None => RelayConfig::default(),
    };

    let shutdown = ShutdownToken::new();
    install_ctrlc(&shutdown)?;

    let workers = config
        .channel_settings()
        .into_iter()
        .map(|settings| spawn_channel(settings, shutdown.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("relay running with {} channel(s), Ctrl-C to stop", workers.len());

    let mut summaries = Vec::new();
    let mut failed = Vec::new();
    for (name, handle) in workers {
        match handle.join() {
            Ok(Ok(summary)) => summaries.push(summary),
            Ok(Err(err)) => {
                log::error!("{err}");
                failed.push(name);
            }
            Err(_) => {
                log::error!("[{name}] worker panicked");
                failed.push(name);
            }
        }
    }

    if let Some(path) = stats {
        let report = make_run_report_now(summaries);
        let json = serialize_json(&report, true)?;
        write_output(&path, json.as_bytes())?;
        log::info!("statistics written -> {}", path.display());
    }

    if !failed.is_empty() {
        return Err(CliError::new(
            format!("channel(s) failed: {}", failed.join(", ")),
            Some("check that the bind addresses exist on this host and are free".to_string()),
        ));
    }
    Ok(())
}

type Worker = (String, thread::JoinHandle<Result<ChannelSummary, ChannelError>>);

fn spawn_channel(settings: ChannelSettings, shutdown: ShutdownToken) -> Result<Worker, CliError> {
    let name = settings.name.clone();
    let handle = thread::Builder::new()
        .name(format!("channel-{name}"))
        .spawn(move || -> Result<ChannelSummary, ChannelError> {
            let channel = Channel::bind(&settings)?;
            Ok(channel.run(&shutdown))
        })
        .with_context(|| format!("Failed to spawn worker for channel {name}"))?;
    Ok((name, handle))
}

fn install_ctrlc(shutdown: &ShutdownToken) -> Result<(), CliError> {
    let token = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<(), CliError> {
    let content = RelayConfig::default()
        .to_toml_string()
        .context("TOML serialization failed")?;
    match output {
        Some(path) => {
            write_output(&path, content.as_bytes())?;
            eprintln!("OK: configuration written -> {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn cmd_decode(frame: PathBuf, output: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let bytes = fs::read(&frame)
        .with_context(|| format!("Failed to read frame file: {}", frame.display()))?;
    let frame_hint = || {
        Some(format!(
            "expected one STX..ETX frame of at least {} bytes",
            SCANNER_LAYOUT.frame_len()
        ))
    };

    if json {
        let fields = decode_fields(&bytes, &SCANNER_LAYOUT)
            .map_err(|err| CliError::new(err.to_string(), frame_hint()))?;
        println!("{}", serialize_json(&fields, true)?);
        return Ok(());
    }

    let message = decode_frame(&bytes, &SCANNER_LAYOUT)
        .map_err(|err| CliError::new(err.to_string(), frame_hint()))?;
    match output {
        Some(path) => {
            write_output(&path, &message)?;
            eprintln!(
                "OK: {} bytes written -> {}",
                message.len(),
                path.display()
            );
        }
        None => println!("{}", to_hex(&message)),
    }
    Ok(())
}

fn cmd_simulate(
    target: SocketAddr,
    rate_hz: f64,
    fragment_len: usize,
    count: Option<u64>,
) -> Result<(), CliError> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(CliError::new(
            format!("invalid rate: {rate_hz}"),
            Some("use a positive --rate-hz, e.g. 40".to_string()),
        ));
    }
    if fragment_len == 0 {
        return Err(CliError::new(
            "fragment size must be positive",
            Some("the sensor uses datagrams of up to 1400 bytes".to_string()),
        ));
    }

    let bind: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind)
        .with_context(|| format!("Failed to bind simulator socket on {bind}"))?;

    let shutdown = ShutdownToken::new();
    install_ctrlc(&shutdown)?;

    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let started = Instant::now();
    let mut next_frame = started;
    let mut sent = 0u64;
    log::info!("simulating scans -> {target} at {rate_hz} Hz");

    while !shutdown.is_cancelled() && count.is_none_or(|limit| sent < limit) {
        let timestamp_ms = started.elapsed().as_millis() as u32;
        let frame = synthetic_scan(&SCANNER_LAYOUT, sent, timestamp_ms)
            .context("Failed to encode synthetic scan")?;
        for chunk in fragment(&frame, fragment_len) {
            if let Err(err) = socket.send_to(chunk, target) {
                log::warn!("send to {target} failed: {err}");
            }
        }
        sent += 1;

        next_frame += period;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }

    log::info!("simulator stopped after {sent} frame(s)");
    Ok(())
}

fn cmd_pcap_analyse(
    input: PathBuf,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    ports: Vec<u16>,
    quiet: bool,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;

    let report = if stdout {
        None
    } else {
        let report_path = report.ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?;
        ensure_distinct_output(&report_path, &input_abs)?;
        Some(report_path)
    };

    let options = ReplayOptions {
        ports: (!ports.is_empty()).then_some(ports),
        ..ReplayOptions::default()
    };
    let rep = hokuyo_relay_core::analyze_capture_file(&resolved_input, &options)
        .context("PCAP/PCAPNG replay failed")?;
    let json = serialize_json(&rep, pretty)?;

    match report {
        None => print!("{}", json),
        Some(report) => {
            write_output(&report, json.as_bytes())?;
            if !quiet {
                eprintln!("OK: report written -> {}", report.display());
            }
        }
    }
    Ok(())
}

fn ensure_distinct_output(report_path: &Path, input_abs: &Path) -> Result<(), CliError> {
    let parent = match report_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // A missing output directory cannot hold the input.
    let Ok(report_dir) = fs::canonicalize(parent) else {
        return Ok(());
    };
    let file_name = report_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid report path: {}", report_path.display()))?;
    if report_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!(
                "report path must differ from input: {}",
                report_path.display()
            ),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn serialize_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.context("JSON serialization failed").map_err(Into::into)
}

fn write_output(path: &Path, content: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(path, content)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    Ok(())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        0 => Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .pcap or .pcapng".to_string()),
        )),
        1 => Ok(matches.remove(0)),
        n => {
            let mut listed = matches
                .iter()
                .take(3)
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if n > 3 {
                listed.push_str(", ...");
            }
            Err(CliError::new(
                format!(
                    "multiple files match pattern '{pattern}' ({n} matches); matches: {listed}"
                ),
                Some("pass a single capture file, or run once per file".to_string()),
            ))
        }
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
