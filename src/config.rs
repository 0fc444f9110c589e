use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::suite::TestCategory;

/// Pulse Diagnostics: guided hardware self-tests with an exportable report.
#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-diagnostics")]
pub struct CliArgs {
    /// Directory the report files are written to
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,

    /// Which report documents to write
    #[arg(short = 'f', long = "format", value_enum, default_value_t = ExportFormat::Both)]
    pub format: ExportFormat,

    /// Only register checks from this category (input, display, camera,
    /// sensors, biometrics, system)
    #[arg(short = 'c', long = "category")]
    pub category: Option<TestCategory>,

    /// Treat the hardware for this check as unavailable (repeatable)
    #[arg(short = 'u', long = "unsupported")]
    pub unsupported: Vec<String>,

    /// Skip a check left unconfirmed for this many seconds
    #[arg(long = "confirm-timeout")]
    pub confirm_timeout_secs: Option<u64>,

    /// Directory holding persistent settings
    #[arg(long = "settings-dir")]
    pub settings_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Print the catalogue and exit
    #[arg(long = "list")]
    pub list: bool,

    /// Print the engine's event trace after the run
    #[arg(long = "trace")]
    pub trace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Pdf,
    Both,
}

impl ExportFormat {
    pub fn wants_json(self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Both)
    }

    pub fn wants_pdf(self) -> bool {
        matches!(self, ExportFormat::Pdf | ExportFormat::Both)
    }
}

pub struct DiagnosticsConfig {
    pub output_dir: PathBuf,
    pub format: ExportFormat,
    pub category: Option<TestCategory>,
    pub unsupported: Vec<String>,
    pub confirm_timeout: Option<Duration>,
    pub settings_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub list_only: bool,
    pub show_trace: bool,
}

// Failure / skip reasons recorded by the engine
pub const UNSUPPORTED_REASON: &str = "Not supported on this device";
pub const ABANDONED_REASON: &str = "Abandoned before confirmation";
pub const TIMEOUT_REASON: &str = "Timed out waiting for confirmation";

// Event constants
pub const EVENT_BUFFER_SIZE: usize = 200;
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// Settings
pub const SETTINGS_DIR_NAME: &str = "pulse-diagnostics";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

// Report file naming
pub const REPORT_FILE_PREFIX: &str = "pulse-report";

impl DiagnosticsConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let settings_dir = args.settings_dir.unwrap_or_else(default_settings_dir);

        DiagnosticsConfig {
            output_dir: args.output_dir,
            format: args.format,
            category: args.category,
            unsupported: args.unsupported,
            confirm_timeout: args.confirm_timeout_secs.map(Duration::from_secs),
            settings_dir,
            log_file: args.log_file,
            list_only: args.list,
            show_trace: args.trace,
        }
    }
}

/// `<config dir>/pulse-diagnostics`, falling back to the working directory.
pub fn default_settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_DIR_NAME)
}
