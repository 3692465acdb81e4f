//! Service logging initialization for pagewatch_app.
//!
//! Logs go to the terminal, and are also appended to `APP_LOGFILE` when set.

use engine_logging::LogDestination;
use pagewatch_core::ServiceSettings;

pub fn initialize(settings: &ServiceSettings) {
    let destination = LogDestination::terminal_and(settings.log_file.clone());
    if !engine_logging::initialize(destination, settings.log_level) {
        eprintln!("Warning: logger was not installed; continuing without logs");
    }
}
