//! Per-case loop: retries, pacing, accounting and partial writes.

use crate::delay_manager::{Clock, Pacing, RetryPolicy};
use crate::error::{FailureReason, ScrapeError};
use crate::extractor::Extractor;
use crate::navigator::{DetailTab, Navigator};
use crate::resume_manager::ProgressState;
use crate::session::{Launcher, SessionManager};
use crate::store::{FieldGroup, RecordStore};
use log::{error, info, warn};
use std::rc::Rc;

/// Result of the last attempt made for one case number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub case_number: String,
    /// 1-based.
    pub attempt_index: u32,
    pub succeeded: bool,
    pub failure_reason: Option<FailureReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Cases skipped because a previous run completed them.
    pub skipped: usize,
    /// Failed case numbers with the reason of their last attempt.
    pub failures: Vec<(String, FailureReason)>,
}

impl BatchSummary {
    /// Percentage of processed cases that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64 * 100.0
        }
    }

    fn record(&mut self, outcome: &AttemptOutcome) {
        self.total += 1;
        if outcome.succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            let reason = outcome.failure_reason.unwrap_or(FailureReason::IncompleteExtraction);
            self.failures.push((outcome.case_number.clone(), reason));
        }
    }

    pub fn log_report(&self) {
        info!("{}", "=".repeat(60));
        info!("FINAL SUMMARY");
        info!("{}", "=".repeat(60));
        info!("Total numbers processed: {}", self.total);
        info!("Successful: {}", self.succeeded);
        info!("Failed: {}", self.failed);
        if self.skipped > 0 {
            info!("Skipped (already completed): {}", self.skipped);
        }
        if self.total > 0 {
            info!("Success rate: {:.1}%", self.success_rate());
        }
        for (case_number, reason) in &self.failures {
            warn!("  {} failed: {}", case_number, reason);
        }
        info!("{}", "=".repeat(60));
    }
}

/// Which fields one attempt managed to extract.
#[derive(Debug, Default)]
struct Extracted {
    court: bool,
    action: bool,
    plaintiff: bool,
    defendant: bool,
}

impl Extracted {
    fn missing(&self) -> Vec<&'static str> {
        [
            (self.court, FieldGroup::Court),
            (self.action, FieldGroup::LatestAction),
            (self.plaintiff, FieldGroup::Plaintiff),
            (self.defendant, FieldGroup::Defendant),
        ]
        .into_iter()
        .filter(|(found, _)| !found)
        .map(|(_, group)| group.name())
        .collect()
    }
}

pub struct BatchOrchestrator<'s, L: Launcher> {
    sessions: SessionManager<L>,
    navigator: Navigator,
    extractor: Extractor,
    store: &'s mut dyn RecordStore,
    retry: RetryPolicy,
    pacing: Pacing,
    clock: Rc<dyn Clock>,
    progress: Option<ProgressState>,
}

impl<'s, L: Launcher> BatchOrchestrator<'s, L> {
    pub fn new(
        sessions: SessionManager<L>,
        navigator: Navigator,
        extractor: Extractor,
        store: &'s mut dyn RecordStore,
        retry: RetryPolicy,
        pacing: Pacing,
        clock: Rc<dyn Clock>,
    ) -> Self {
        BatchOrchestrator {
            sessions,
            navigator,
            extractor,
            store,
            retry,
            pacing,
            clock,
            progress: None,
        }
    }

    /// Skip case numbers recorded in `progress` and record new successes there.
    pub fn with_progress(mut self, progress: ProgressState) -> Self {
        self.progress = Some(progress);
        self
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionManager<L> {
        &self.sessions
    }

    /// Processes every case number in order. Never aborts the batch.
    pub fn run(&mut self, case_numbers: &[String]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = case_numbers.len();

        for (i, case_number) in case_numbers.iter().enumerate() {
            let index = i + 1;
            if self.progress.as_ref().map_or(false, |p| p.contains(case_number)) {
                info!("Skipping {} (completed in a previous run)", case_number);
                summary.skipped += 1;
                continue;
            }

            info!("{}", "=".repeat(60));
            info!("Processing {}/{}: {}", index, total, case_number);
            info!("{}", "=".repeat(60));

            let outcome = self.process_case(case_number);
            if outcome.succeeded {
                info!("Successfully processed: {}", case_number);
                if let Some(progress) = self.progress.as_mut() {
                    progress.mark_complete(case_number);
                }
            } else {
                error!("Failed to process {} after {} attempt(s)", case_number, outcome.attempt_index);
            }
            summary.record(&outcome);

            if index < total {
                self.pacing.wait(self.clock.as_ref(), index);
            }
        }
        summary
    }

    /// Up to `retry.max_attempts()` attempts, each on a fresh session.
    pub fn process_case(&mut self, case_number: &str) -> AttemptOutcome {
        let max_attempts = self.retry.max_attempts();
        let mut attempt_index = 0;
        let mut last_reason = None;

        while attempt_index < max_attempts {
            attempt_index += 1;
            if attempt_index > 1 {
                info!("Retry attempt {}/{} for {}", attempt_index - 1, self.retry.max_retries, case_number);
            }

            match self.attempt(case_number) {
                Ok(()) => {
                    return AttemptOutcome {
                        case_number: case_number.to_string(),
                        attempt_index,
                        succeeded: true,
                        failure_reason: None,
                    }
                }
                Err(reason) => {
                    warn!("Attempt {} for {} failed: {}", attempt_index, case_number, reason);
                    last_reason = Some(reason);
                }
            }

            if attempt_index < max_attempts {
                info!("Waiting {} seconds before retry...", self.retry.wait.as_secs());
                self.clock.sleep(self.retry.wait);
            }
        }

        AttemptOutcome {
            case_number: case_number.to_string(),
            attempt_index,
            succeeded: false,
            failure_reason: last_reason,
        }
    }

    /// One session from acquisition to teardown. The session is dropped (and
    /// the browser closed) on every return path.
    fn attempt(&mut self, case_number: &str) -> Result<(), FailureReason> {
        let session = self.sessions.acquire().map_err(|e| {
            error!("Could not open a session for {}: {}", case_number, e);
            FailureReason::from(&e)
        })?;

        let extracted = self.run_stages(session.page(), case_number).map_err(|e| {
            error!("Error processing {}: {}", case_number, e);
            FailureReason::from(&e)
        })?;

        let missing = extracted.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            warn!("Incomplete data for {}: missing {}", case_number, missing.join(", "));
            Err(FailureReason::IncompleteExtraction)
        }
    }

    fn run_stages(&mut self, page: &L::Page, case_number: &str) -> Result<Extracted, ScrapeError> {
        let mut extracted = Extracted::default();

        self.navigator.reset();
        self.navigator.select_search_mode(page)?;
        self.navigator.enter_query(page, case_number)?;
        self.navigator.submit_query(page)?;
        self.navigator.dismiss_dialog_if_present(page);
        self.navigator.open_first_result(page)?;

        let court = self.extractor.extract_court(page);
        if !court.is_empty() {
            self.write(case_number, FieldGroup::Court, &[court.clone()]);
            extracted.court = true;
        }

        self.navigator.open_tab(page, DetailTab::Actuaciones)?;
        let action = self.extractor.extract_first_action_row(page);
        if !action.is_empty() {
            self.write(case_number, FieldGroup::LatestAction, action.values());
            extracted.action = true;
        }
        // rewritten once the detail view has been read; same value, same cell
        if !court.is_empty() {
            self.write(case_number, FieldGroup::Court, &[court]);
        }

        self.navigator.open_tab(page, DetailTab::SujetosProcesales)?;
        let parties = self.extractor.extract_parties(page);
        if !parties.plaintiff.is_empty() {
            self.write(case_number, FieldGroup::Plaintiff, &[parties.plaintiff]);
            extracted.plaintiff = true;
        }
        if !parties.defendant.is_empty() {
            self.write(case_number, FieldGroup::Defendant, &[parties.defendant]);
            extracted.defendant = true;
        }

        self.navigator.finish();
        Ok(extracted)
    }

    /// Store errors only cost this one write.
    fn write(&mut self, case_number: &str, group: FieldGroup, values: &[String]) {
        if let Err(e) = self.store.upsert_fields(case_number, group, values) {
            error!("Could not write {} for {}: {}", group.name(), case_number, e);
        }
    }
}
