use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Case numbers completed in earlier runs, persisted as JSON after every success.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct ProgressState {
    pub completed_cases: BTreeSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl ProgressState {
    /// Loads `path`, or starts empty when it is missing or unreadable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!("No progress file found. Starting fresh.");
            return ProgressState { path, ..Default::default() };
        }

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read progress file: {}", e);
                return ProgressState { path, ..Default::default() };
            }
        };
        match serde_json::from_str::<ProgressState>(&content) {
            Ok(mut state) => {
                info!("Resumed previous session: {} case(s) already completed.", state.completed_cases.len());
                state.path = path;
                state
            }
            Err(e) => {
                error!("Failed to parse progress file: {}. Starting fresh.", e);
                ProgressState { path, ..Default::default() }
            }
        }
    }

    pub fn contains(&self, case_number: &str) -> bool {
        self.completed_cases.contains(case_number)
    }

    pub fn mark_complete(&mut self, case_number: &str) {
        self.completed_cases.insert(case_number.to_string());
        self.save();
    }

    fn save(&self) {
        let json = match serde_json::to_string_pretty(self) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize progress state: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json) {
            error!("Failed to write progress file {:?}: {}", self.path, e);
        }
    }
}
