use clap::Parser;
use judicial_scraper_lib::delay_manager::{Backoff, Clock, Pacing, RetryPolicy, SystemClock};
use judicial_scraper_lib::{logger, open_store};
use judicial_scraper_lib::{BatchOrchestrator, ChromeLauncher, Config, Extractor, Navigator, ProgressState, SessionManager, Timeouts};

use log::{error, info, warn};
use std::error::Error;
use std::rc::Rc;

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::parse();
    let log_path = logger::init(&config.log_dir, &config.log_level)?;
    info!("Starting Judicial Scraper...");
    info!("Input file: {:?}", config.input);

    // 1. Load case numbers
    let mut store = open_store(&config.input);
    let case_numbers = match store.list_pending_keys() {
        Ok(keys) => keys,
        Err(e) => {
            error!("Error reading input file: {}", e);
            Vec::new()
        }
    };
    if case_numbers.is_empty() {
        warn!("No numbers to search. Exiting.");
        return Ok(());
    }
    info!("Found {} number(s) to search", case_numbers.len());

    // 2. Wire the components
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let timeouts = Timeouts::default();
    let sessions = SessionManager::new(
        ChromeLauncher { headless: config.headless },
        config.url.clone(),
        timeouts.page_settle,
        config.block_retries,
        Backoff::new(config.backoff_base()),
        clock.clone(),
    );
    let mut batch = BatchOrchestrator::new(
        sessions,
        Navigator::new(clock.clone(), timeouts),
        Extractor::new(clock.clone(), timeouts),
        store.as_mut(),
        RetryPolicy::new(config.max_retries, config.retry_wait()),
        Pacing {
            base_secs: config.pace_base_secs,
            spread: config.pace_spread,
        },
        clock,
    );
    if config.resume {
        batch = batch.with_progress(ProgressState::load(&config.progress_file));
    }

    // 3. Run
    let summary = batch.run(&case_numbers);
    summary.log_report();

    info!("Execution complete! Check logs at: {}", log_path.display());
    println!("Execution complete! Check logs at: {}", log_path.display());
    Ok(())
}
