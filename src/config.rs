use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://consultaprocesos.ramajudicial.gov.co/Procesos/NumeroRadicacion";
pub const DEFAULT_INPUT: &str = "NumeroRadicacion.xlsx";

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Runtime configuration, read once in `main` and handed to each component.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Portal page to open for every case number
    #[arg(long, env = "SCRAPER_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Spreadsheet holding case numbers in column D (.xlsx or .csv)
    #[arg(short, long, env = "SCRAPER_INPUT", default_value = DEFAULT_INPUT)]
    pub input: PathBuf,

    /// Directory for execution logs
    #[arg(long, env = "SCRAPER_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Console log level (the log file always records debug)
    #[arg(
        short,
        long,
        env = "SCRAPER_LOG_LEVEL",
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    pub log_level: String,

    /// Run Chrome without a window
    #[arg(long, env = "SCRAPER_HEADLESS")]
    pub headless: bool,

    /// Extra attempts per case number after the first one fails
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Seconds to wait between attempts for the same case number
    #[arg(long, default_value_t = 10)]
    pub retry_wait_secs: u64,

    /// Retries when the portal answers with a block page
    #[arg(long, default_value_t = 2)]
    pub block_retries: u32,

    /// Base of the exponential backoff after a block page, in seconds
    #[arg(long, default_value_t = 5)]
    pub backoff_base_secs: u64,

    /// Minimum pause between case numbers, in seconds
    #[arg(long, default_value_t = 5)]
    pub pace_base_secs: u64,

    /// The pause grows by `index % pace_spread` seconds
    #[arg(long, default_value_t = 3)]
    pub pace_spread: u64,

    /// Skip case numbers already completed in a previous run
    #[arg(long)]
    pub resume: bool,

    /// Where completed case numbers are remembered for --resume
    #[arg(long, default_value = "progress.json")]
    pub progress_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: DEFAULT_URL.to_string(),
            input: PathBuf::from(DEFAULT_INPUT),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            headless: false,
            max_retries: 2,
            retry_wait_secs: 10,
            block_retries: 2,
            backoff_base_secs: 5,
            pace_base_secs: 5,
            pace_spread: 3,
            resume: false,
            progress_file: PathBuf::from("progress.json"),
        }
    }
}

/// Bounded waits used by the navigation driver and extractor.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Wait for a required element (radios, inputs, tables, tabs).
    pub element: Duration,
    /// Wait given to each fallback strategy for the submit control.
    pub strategy: Duration,
    /// Wait for the optional dialog's dismiss control.
    pub dialog: Duration,
    /// Wait for the Actuaciones table to carry real content.
    pub table_ready: Duration,
    pub poll: Duration,
    /// Settle time after the initial navigation.
    pub page_settle: Duration,
    /// Settle time after a light interaction (radio, typing, dialog, tab).
    pub short_settle: Duration,
    /// Settle time after an interaction that loads content (submit, row, parties tab).
    pub long_settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            element: Duration::from_secs(10),
            strategy: Duration::from_secs(5),
            dialog: Duration::from_secs(3),
            table_ready: Duration::from_secs(8),
            poll: Duration::from_millis(500),
            page_settle: Duration::from_secs(2),
            short_settle: Duration::from_secs(1),
            long_settle: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
}
