use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use engine_logging::engine_info;
use pagewatch_core::{load_watches, ServiceSettings};
use pagewatch_engine::{
    AzureTableStore, ChromiumExtractor, ChromiumSettings, HttpSettings, PushbulletNotifier,
    Reconciler, ServiceContext,
};

const BUNDLED_CHROMIUM: &str = "chrome-linux/chrome";

/// Reads the watch list and builds the clients once for the whole process.
pub fn build_context<F>(settings: &ServiceSettings, lookup: F) -> anyhow::Result<ServiceContext>
where
    F: Fn(&str) -> Option<String>,
{
    let watches = load_watches(lookup).context("invalid watch configuration")?;
    engine_info!("Loaded {} watch(es)", watches.len());

    let http = HttpSettings::default();
    let store = AzureTableStore::from_connection_string(&settings.storage_connection, &http)
        .context("could not build table storage client")?;
    let notifier = PushbulletNotifier::new(settings.pushbullet_token.clone(), &http)
        .context("could not build notification client")?;

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let extractor = ChromiumExtractor::new(ChromiumSettings {
        executable: chromium_executable(settings.chromium_path.as_deref(), &cwd),
        ..ChromiumSettings::default()
    });

    let reconciler = Reconciler::new(Arc::new(extractor), Arc::new(store), Arc::new(notifier));
    Ok(ServiceContext::new(watches, reconciler))
}

/// Explicit setting first, then a browser shipped next to the app, then
/// whatever chromiumoxide can find on the system.
fn chromium_executable(configured: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    let bundled = cwd.join(BUNDLED_CHROMIUM);
    bundled.is_file().then_some(bundled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings() -> ServiceSettings {
        ServiceSettings::from_lookup(|key| match key {
            "AzureWebJobsStorage" => Some("UseDevelopmentStorage=true".to_string()),
            "APP_PUSHBULLETACCESSTOKEN" => Some("token".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn configured_chromium_path_wins() {
        let cwd = std::env::temp_dir();
        assert_eq!(
            chromium_executable(Some(Path::new("/opt/chrome")), &cwd),
            Some(PathBuf::from("/opt/chrome"))
        );
    }

    #[test]
    fn missing_bundled_chromium_falls_back_to_detection() {
        let cwd = std::env::temp_dir().join("pagewatch-no-such-dir");
        assert_eq!(chromium_executable(None, &cwd), None);
    }

    #[test]
    fn context_needs_at_least_one_watch() {
        let err = build_context(&settings(), |_| None).err().expect("no watches");
        assert!(format!("{err:#}").contains("no watch configurations found"));
    }

    #[test]
    fn context_holds_configured_watches() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("APP_0_AZURESTORAGETABLENAME", "books"),
            ("APP_0_TARGETURL", "https://example.com/books"),
            ("APP_0_STRINGARRAYJS", "[]"),
            ("APP_0_WAITSECONDS", "1"),
            ("APP_0_NOTIFICATIONTITLE", "New books"),
        ]);

        let context = build_context(&settings(), |key| env.get(key).map(|v| v.to_string()))
            .expect("context");
        assert_eq!(context.watches().len(), 1);
        assert_eq!(context.watches()[0].table_name, "books");
    }
}
