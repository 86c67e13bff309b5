use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;

use crate::{
    constants::{
        DEFAULT_CHUNK_SIZE_MB, DEFAULT_JOIN_TIMEOUT, DEFAULT_REPORT_INTERVAL, HIGH_PERCENTAGE,
        LOW_PERCENTAGE, MIB, MID_PERCENTAGE,
    },
    core::domain::Intensity,
};

#[derive(Parser, Debug)]
#[command(
    name = "jaws",
    about = "Jaws: reserves a share of system RAM and keeps it resident",
    version
)]
pub struct Args {
    /// Consume 30% of total RAM
    #[arg(long)]
    pub low: bool,

    /// Consume 50% of total RAM
    #[arg(long)]
    pub mid: bool,

    /// Consume 75% of total RAM
    #[arg(long)]
    pub high: bool,

    /// Create a static buffer (workers still keep it resident)
    #[arg(long = "static")]
    pub static_mode: bool,

    /// Chunk size for memory allocation (e.g. 100MB, 1GB, 512K)
    #[arg(long, default_value = "100MB")]
    pub chunk: String,

    /// Memory access intensity (1-10)
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    pub intensity: i64,

    /// Seconds between memory/CPU reports
    #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL.as_secs())]
    pub report_interval: u64,

    /// How long to wait for each worker on shutdown, in milliseconds
    #[arg(long, default_value_t = DEFAULT_JOIN_TIMEOUT.as_millis() as u64)]
    pub join_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("must specify one of --low, --mid or --high")]
    MissingMemoryLevel,
    #[error("only one of --low, --mid or --high may be given")]
    ConflictingMemoryLevels,
    #[error("invalid chunk size format: {input}")]
    InvalidChunkSize { input: String },
    #[error("--report-interval must be at least one second")]
    InvalidReportInterval,
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub percentage: u8,
    pub chunk_bytes: u64,
    pub intensity: Intensity,
    pub static_mode: bool,
    pub report_interval: Duration,
    pub join_timeout: Duration,
}

impl TryFrom<Args> for RunConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, ConfigError> {
        let percentage = match (args.low, args.mid, args.high) {
            (true, false, false) => LOW_PERCENTAGE,
            (false, true, false) => MID_PERCENTAGE,
            (false, false, true) => HIGH_PERCENTAGE,
            (false, false, false) => return Err(ConfigError::MissingMemoryLevel),
            _ => return Err(ConfigError::ConflictingMemoryLevels),
        };
        if args.report_interval == 0 {
            return Err(ConfigError::InvalidReportInterval);
        }

        let chunk_mb = chunk_size_mb_or_default(&args.chunk);
        tracing::info!(chunk_mb, "using chunk size");

        Ok(Self {
            percentage,
            chunk_bytes: (chunk_mb * MIB as f64) as u64,
            intensity: resolve_intensity(args.intensity),
            static_mode: args.static_mode,
            report_interval: Duration::from_secs(args.report_interval),
            join_timeout: Duration::from_millis(args.join_timeout_ms),
        })
    }
}

/// Parses sizes like `512MB`, `1GB`, `2048KB` or `100` into megabytes.
/// Units are case-insensitive, the trailing `B` is optional and unitless
/// numbers are megabytes.
pub fn parse_chunk_size(input: &str) -> Result<f64, ConfigError> {
    let invalid = || ConfigError::InvalidChunkSize {
        input: input.to_string(),
    };

    let trimmed = input.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(digits_end);

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }

    let factor = match unit.trim_start().to_ascii_uppercase().as_str() {
        "" | "M" | "MB" => 1.0,
        "G" | "GB" => 1024.0,
        "K" | "KB" => 1.0 / 1024.0,
        _ => return Err(invalid()),
    };

    Ok(value as f64 * factor)
}

pub fn chunk_size_mb_or_default(input: &str) -> f64 {
    parse_chunk_size(input).unwrap_or_else(|e| {
        tracing::warn!(
            default_mb = DEFAULT_CHUNK_SIZE_MB,
            "{}, using default chunk size",
            e
        );
        DEFAULT_CHUNK_SIZE_MB
    })
}

pub fn resolve_intensity(raw: i64) -> Intensity {
    u8::try_from(raw)
        .ok()
        .and_then(Intensity::new)
        .unwrap_or_else(|| {
            let fallback = Intensity::default();
            tracing::warn!(
                requested = raw,
                fallback = fallback.level(),
                "invalid intensity level, using default"
            );
            fallback
        })
}

/// Parses argv after [`normalize_args`].
pub fn parse_args<I, T>(argv: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    Args::try_parse_from(normalize_args(argv))
}

/// Exit status for a command line clap refused. Help and version output
/// are not failures; everything else is a fatal configuration error.
pub fn usage_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Accepts the historical single-dash long flags (`-low`, `-chunk 1GB`) by
/// rewriting them to their `--` form. Short flags and negative numbers are
/// left untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some(s) if is_single_dash_long_flag(s) => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

fn is_single_dash_long_flag(arg: &str) -> bool {
    let Some(name) = arg.strip_prefix('-') else {
        return false;
    };
    name.len() > 1
        && !name.starts_with('-')
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
