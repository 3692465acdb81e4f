use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig};
use engine_logging::{engine_debug, engine_warn};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("could not launch browser: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("script did not return a list of strings: {0}")]
    Decode(String),
}

/// Renders a page and evaluates a script in it.
#[async_trait::async_trait]
pub trait PageExtractor: Send + Sync {
    /// Opens `url`, lets the page settle for `wait`, then evaluates `script`
    /// and returns the strings it produced, in order.
    async fn extract(
        &self,
        url: &str,
        wait: Duration,
        script: &str,
    ) -> Result<Vec<String>, ExtractError>;
}

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    /// Browser binary; `None` lets chromiumoxide look for an installed one.
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub launch_timeout: Duration,
}

impl Default for ChromiumSettings {
    fn default() -> Self {
        Self {
            executable: None,
            no_sandbox: true,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

impl ChromiumSettings {
    fn browser_config(&self) -> Result<BrowserConfig, ExtractError> {
        let mut builder = BrowserConfig::builder().launch_timeout(self.launch_timeout);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(ExtractError::Launch)
    }
}

/// Headless Chromium, one browser process per extraction.
#[derive(Debug, Clone, Default)]
pub struct ChromiumExtractor {
    settings: ChromiumSettings,
}

impl ChromiumExtractor {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl PageExtractor for ChromiumExtractor {
    async fn extract(
        &self,
        url: &str,
        wait: Duration,
        script: &str,
    ) -> Result<Vec<String>, ExtractError> {
        let config = self.settings.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| ExtractError::Launch(err.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let session = ShutdownGuard::new(LaunchedBrowser { browser, events });

        let result = match session.get() {
            Some(launched) => render(&launched.browser, url, wait, script).await,
            None => Err(ExtractError::Launch("browser already shut down".to_string())),
        };
        session.finish().await;

        result
    }
}

/// Something that needs an async step to release its resources.
trait Shutdown: Send + 'static {
    fn shutdown(self) -> BoxFuture<'static, ()>;
}

struct LaunchedBrowser {
    browser: Browser,
    events: JoinHandle<()>,
}

impl Shutdown for LaunchedBrowser {
    fn shutdown(mut self) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(err) = self.browser.close().await {
                engine_debug!("Closing browser failed: {}", err);
            }
            if let Err(err) = self.browser.wait().await {
                engine_debug!("Waiting for browser exit failed: {}", err);
            }
            self.events.abort();
        })
    }
}

/// Runs the shutdown inline on [`finish`](Self::finish). If the owning future
/// is dropped first (the watch deadline cancelled it), the shutdown is spawned
/// onto the current runtime instead.
struct ShutdownGuard<T: Shutdown> {
    inner: Option<T>,
}

impl<T: Shutdown> ShutdownGuard<T> {
    fn new(inner: T) -> Self {
        Self { inner: Some(inner) }
    }

    fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    async fn finish(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.shutdown().await;
        }
    }
}

impl<T: Shutdown> Drop for ShutdownGuard<T> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                engine_debug!("Extraction cancelled, shutting the browser down in the background");
                runtime.spawn(inner.shutdown());
            }
            Err(_) => engine_warn!("Extraction cancelled outside a runtime, browser left to exit"),
        }
    }
}

async fn render(
    browser: &Browser,
    url: &str,
    wait: Duration,
    script: &str,
) -> Result<Vec<String>, ExtractError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|err| ExtractError::Navigation(err.to_string()))?;
    page.goto(url)
        .await
        .map_err(|err| ExtractError::Navigation(err.to_string()))?;

    tokio::time::sleep(wait).await;

    // Command line API so scripts may use `$$` and friends.
    let params = EvaluateParams::builder()
        .expression(script)
        .include_command_line_api(true)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(ExtractError::Script)?;
    let evaluation = page
        .evaluate_expression(params)
        .await
        .map_err(|err| ExtractError::Script(err.to_string()))?;

    decode_items(evaluation.value().cloned().unwrap_or(serde_json::Value::Null))
}

fn decode_items(value: serde_json::Value) -> Result<Vec<String>, ExtractError> {
    serde_json::from_value(value).map_err(|err| ExtractError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    #[test]
    fn decodes_string_arrays() {
        assert_eq!(
            decode_items(json!(["b", "a", "b"])).unwrap(),
            vec!["b", "a", "b"]
        );
        assert!(decode_items(json!([])).unwrap().is_empty());
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(matches!(decode_items(json!(null)), Err(ExtractError::Decode(_))));
        assert!(matches!(decode_items(json!("a")), Err(ExtractError::Decode(_))));
        assert!(matches!(decode_items(json!([1, 2])), Err(ExtractError::Decode(_))));
    }

    struct SignalOnShutdown(oneshot::Sender<()>);

    impl Shutdown for SignalOnShutdown {
        fn shutdown(self) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                let _ = self.0.send(());
            })
        }
    }

    #[tokio::test]
    async fn finished_session_shuts_down_inline() {
        let (tx, mut rx) = oneshot::channel();
        let session = ShutdownGuard::new(SignalOnShutdown(tx));
        assert!(session.get().is_some());

        session.finish().await;

        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn cancelled_session_still_shuts_down() {
        let (tx, rx) = oneshot::channel();
        let render = async move {
            let _session = ShutdownGuard::new(SignalOnShutdown(tx));
            std::future::pending::<()>().await;
        };

        let cancelled = tokio::time::timeout(Duration::from_millis(20), render).await;
        assert!(cancelled.is_err());

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("shutdown was not spawned")
            .expect("shutdown dropped its sender");
    }

    #[tokio::test]
    async fn missing_browser_binary_is_a_launch_error() {
        let extractor = ChromiumExtractor::new(ChromiumSettings {
            executable: Some(PathBuf::from("/nonexistent/pagewatch/chrome")),
            launch_timeout: Duration::from_secs(2),
            ..ChromiumSettings::default()
        });

        let err = extractor
            .extract("https://example.com/", Duration::ZERO, "[]")
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Launch(_)), "{err:?}");
    }

    #[test]
    fn browser_config_honours_settings() {
        let settings = ChromiumSettings {
            executable: Some(PathBuf::from("/opt/chrome-linux/chrome")),
            ..ChromiumSettings::default()
        };
        assert!(settings.browser_config().is_ok());
    }
}
