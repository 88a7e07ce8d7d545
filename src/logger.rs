use chrono::Local;
use env_logger::{Builder, Logger, Target};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Prefix shared by the library and binary targets.
const CRATE_TARGET: &str = "judicial_scraper";

/// Sends every record to the console logger and the file logger.
struct DualLogger {
    console: Logger,
    file: Logger,
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if self.file.matches(record) {
            self.file.log(record);
        }
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// `execution_YYYYmmdd_HHMMSS.log` inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("execution_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

/// Installs the process logger: console at `console_level`, file at debug.
/// Returns the path of the log file.
pub fn init(log_dir: &Path, console_level: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir);
    let file = File::create(&path)?;

    let parsed_level = console_level.parse::<LevelFilter>().ok();
    let console_filter = parsed_level.unwrap_or(LevelFilter::Info);

    let console = Builder::new()
        .format(|buf, record| writeln!(buf, "{} - {}", record.level(), record.args()))
        .filter(None, LevelFilter::Warn)
        .filter(Some(CRATE_TARGET), console_filter)
        .target(Target::Stderr)
        .build();

    let file = Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .filter(Some(CRATE_TARGET), LevelFilter::Debug)
        .target(Target::Pipe(Box::new(file)))
        .build();

    let max = console.filter().max(file.filter());
    log::set_boxed_logger(Box::new(DualLogger { console, file }))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    log::set_max_level(max);

    if parsed_level.is_none() {
        log::warn!("Unknown log level '{}', using info", console_level);
    }
    log::info!("Logger initialized. Writing debug log to {:?}", path);
    Ok(path)
}
