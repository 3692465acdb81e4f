use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use engine_logging::engine_warn;
use log::LevelFilter;
use thiserror::Error;

pub const STORAGE_CONNECTION_KEY: &str = "AzureWebJobsStorage";
pub const PUSHBULLET_TOKEN_KEY: &str = "APP_PUSHBULLETACCESSTOKEN";
pub const PORT_KEY: &str = "FUNCTIONS_CUSTOMHANDLER_PORT";
pub const CHROMIUM_PATH_KEY: &str = "APP_CHROMIUMPATH";
pub const LOG_LEVEL_KEY: &str = "APP_LOGLEVEL";
pub const LOG_FILE_KEY: &str = "APP_LOGFILE";

pub const DEFAULT_PORT: u16 = 8080;

const TABLE_NAME_FIELD: &str = "AZURESTORAGETABLENAME";
const TARGET_URL_FIELD: &str = "TARGETURL";
const SCRIPT_FIELD: &str = "STRINGARRAYJS";
const WAIT_SECONDS_FIELD: &str = "WAITSECONDS";
const TITLE_FIELD: &str = "NOTIFICATIONTITLE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(String),
    #[error("could not parse {key} value {value:?}: {reason}")]
    InvalidNumber {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{key} is not a valid url ({value:?}): {reason}")]
    InvalidUrl {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{key} is not a log level: {value:?}")]
    InvalidLogLevel { key: String, value: String },
    #[error("no watch configurations found")]
    NoWatches,
}

/// One configured watch: a page to render, the script that lists its items,
/// the ledger table for those items and the title of the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub table_name: String,
    pub target_url: String,
    pub extraction_script: String,
    pub wait: Duration,
    pub notification_title: String,
}

/// Process-wide settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub storage_connection: String,
    pub pushbullet_token: String,
    pub port: u16,
    pub chromium_path: Option<PathBuf>,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl ServiceSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_connection = required(&lookup, STORAGE_CONNECTION_KEY)?;
        let pushbullet_token = required(&lookup, PUSHBULLET_TOKEN_KEY)?;

        let port = match lookup(PORT_KEY) {
            Some(raw) => parse_number::<u16>(PORT_KEY, &raw)?,
            None => DEFAULT_PORT,
        };

        let log_level = match lookup(LOG_LEVEL_KEY) {
            Some(raw) => raw
                .trim()
                .parse::<LevelFilter>()
                .map_err(|_| ConfigError::InvalidLogLevel {
                    key: LOG_LEVEL_KEY.to_string(),
                    value: raw,
                })?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            storage_connection,
            pushbullet_token,
            port,
            chromium_path: non_empty(lookup(CHROMIUM_PATH_KEY)).map(PathBuf::from),
            log_level,
            log_file: non_empty(lookup(LOG_FILE_KEY)).map(PathBuf::from),
        })
    }
}

/// Name of the setting `field` for the watch at `ordinal`, e.g. `APP_0_TARGETURL`.
pub fn watch_key(ordinal: usize, field: &str) -> String {
    format!("APP_{ordinal}_{field}")
}

/// Scans ordinals 0, 1, 2, ... and collects watches until the first ordinal
/// missing one of its five settings.
///
/// An unparsable wait or target url is an error even when later settings of
/// the same ordinal are missing. At least one watch is required.
pub fn load_watches<F>(lookup: F) -> Result<Vec<WatchConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut watches = Vec::new();
    for ordinal in 0.. {
        match load_watch(&lookup, ordinal)? {
            Some(watch) => watches.push(watch),
            None => break,
        }
    }

    if watches.is_empty() {
        return Err(ConfigError::NoWatches);
    }

    warn_on_shared_tables(&watches);
    Ok(watches)
}

fn load_watch<F>(lookup: &F, ordinal: usize) -> Result<Option<WatchConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(table_name) = lookup(&watch_key(ordinal, TABLE_NAME_FIELD)) else {
        return Ok(None);
    };

    let url_key = watch_key(ordinal, TARGET_URL_FIELD);
    let Some(target_url) = lookup(&url_key) else {
        return Ok(None);
    };
    if let Err(err) = url::Url::parse(&target_url) {
        return Err(ConfigError::InvalidUrl {
            key: url_key,
            value: target_url,
            reason: err.to_string(),
        });
    }

    let Some(extraction_script) = lookup(&watch_key(ordinal, SCRIPT_FIELD)) else {
        return Ok(None);
    };

    let wait_key = watch_key(ordinal, WAIT_SECONDS_FIELD);
    let Some(raw_wait) = lookup(&wait_key) else {
        return Ok(None);
    };
    let wait = Duration::from_secs(parse_number::<u64>(&wait_key, &raw_wait)?);

    let Some(notification_title) = lookup(&watch_key(ordinal, TITLE_FIELD)) else {
        return Ok(None);
    };

    Ok(Some(WatchConfig {
        table_name,
        target_url,
        extraction_script,
        wait,
        notification_title,
    }))
}

fn warn_on_shared_tables(watches: &[WatchConfig]) {
    let mut seen = HashSet::new();
    for watch in watches {
        if !seen.insert(watch.table_name.as_str()) {
            engine_warn!(
                "Table {} is configured for more than one watch; their ledgers will mix",
                watch.table_name
            );
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
