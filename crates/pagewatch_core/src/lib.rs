//! Pagewatch core: configuration, the diff and the per-watch state machine.
mod config;
mod diff;
mod event;
mod outcome;
mod record;
mod stage;
mod update;

pub use config::{
    load_watches, watch_key, ConfigError, ServiceSettings, WatchConfig, CHROMIUM_PATH_KEY,
    DEFAULT_PORT, LOG_FILE_KEY, LOG_LEVEL_KEY, PORT_KEY, PUSHBULLET_TOKEN_KEY,
    STORAGE_CONNECTION_KEY,
};
pub use diff::new_items;
pub use event::WatchEvent;
pub use outcome::{CycleReport, FatalError, StepFailure, WatchReport};
pub use record::{Notification, SeenRecord, BODY_SEPARATOR};
pub use stage::WatchStage;
pub use update::advance;
