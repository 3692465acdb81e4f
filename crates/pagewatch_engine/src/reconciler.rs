use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use pagewatch_core::{
    new_items, CycleReport, FatalError, Notification, SeenRecord, StepFailure, WatchConfig,
    WatchEvent, WatchReport,
};
use tokio::time::{timeout_at, Instant};

use crate::{Continuation, Notifier, PageExtractor, RecordStore, StoreError};

pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs the extract, diff, notify and record steps for every watch, one watch
/// at a time.
pub struct Reconciler {
    extractor: Arc<dyn PageExtractor>,
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    watch_timeout: Duration,
}

struct ExistingRows {
    rows: HashSet<String>,
    partial: Option<StepFailure>,
}

impl Reconciler {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            extractor,
            store,
            notifier,
            watch_timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }

    /// Deadline shared by all steps of one watch.
    pub fn with_watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout = timeout;
        self
    }

    /// One pass over `configs` in order.
    ///
    /// An extraction failure stops the pass; the remaining watches are
    /// reported as not visited. A ledger write that fails after a successful
    /// notification is returned as [`FatalError`].
    pub async fn run_cycle(&self, configs: &[WatchConfig]) -> Result<CycleReport, FatalError> {
        let mut report = CycleReport::default();

        for (index, config) in configs.iter().enumerate() {
            engine_info!(
                "Watch {} table={} url={}",
                index,
                config.table_name,
                config.target_url
            );
            let watch = self.run_watch(config).await?;
            engine_info!("Watch {} finished: {}", index, watch);

            let aborted = watch.aborted_cycle();
            report.push(watch);
            if aborted {
                let remaining = &configs[index + 1..];
                if !remaining.is_empty() {
                    engine_warn!(
                        "Skipping {} remaining watch(es) after extraction failure",
                        remaining.len()
                    );
                }
                for skipped in remaining {
                    report.push(WatchReport::new(&skipped.table_name));
                }
                break;
            }
        }

        Ok(report)
    }

    async fn run_watch(&self, config: &WatchConfig) -> Result<WatchReport, FatalError> {
        let deadline = Instant::now() + self.watch_timeout;
        let mut report = WatchReport::new(&config.table_name);
        report.apply(WatchEvent::Started);

        let extracted = match self.extract(config, deadline).await {
            Ok(items) => items,
            Err(failure) => {
                report.record_failure(failure);
                return Ok(report);
            }
        };
        report.extracted = extracted.len();
        report.apply(WatchEvent::Extracted);

        let existing = match self.load_existing(config, deadline).await {
            Ok(existing) => existing,
            Err(failure) => {
                report.record_failure(failure);
                return Ok(report);
            }
        };
        if let Some(partial) = existing.partial {
            report.record_failure(partial);
        }

        let fresh = new_items(&extracted, &existing.rows);
        report.apply(WatchEvent::Diffed {
            new_items: fresh.len(),
        });
        report.new_items = fresh;
        if report.new_items.is_empty() {
            engine_info!("Nothing to notify for {}", config.table_name);
            return Ok(report);
        }

        if let Err(failure) = self.notify(config, &report.new_items, deadline).await {
            report.record_failure(failure);
            return Ok(report);
        }
        report.apply(WatchEvent::Notified);

        report.recorded = self.persist(config, &report.new_items, deadline).await?;
        report.apply(WatchEvent::Persisted);
        Ok(report)
    }

    async fn extract(
        &self,
        config: &WatchConfig,
        deadline: Instant,
    ) -> Result<Vec<String>, StepFailure> {
        let extraction = self.extractor.extract(
            &config.target_url,
            config.wait,
            &config.extraction_script,
        );
        let reason = match timeout_at(deadline, extraction).await {
            Ok(Ok(items)) => {
                engine_debug!("Extracted {} item(s) from {}", items.len(), config.target_url);
                return Ok(items);
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => "watch deadline elapsed".to_string(),
        };

        engine_error!(
            "Could not query {} using script {}: {}",
            config.target_url,
            config.extraction_script,
            reason
        );
        Err(StepFailure::AbortCycle { reason })
    }

    async fn load_existing(
        &self,
        config: &WatchConfig,
        deadline: Instant,
    ) -> Result<ExistingRows, StepFailure> {
        let table = config.table_name.as_str();

        let reason = match timeout_at(deadline, self.store.create_table(table)).await {
            Ok(Ok(())) => {
                engine_info!("Created table {}", table);
                None
            }
            Ok(Err(StoreError::TableAlreadyExists)) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some("watch deadline elapsed".to_string()),
        };
        if let Some(reason) = reason {
            engine_error!("Could not create table {}: {}", table, reason);
            return Err(StepFailure::SkipWatch { reason });
        }

        let mut rows = HashSet::new();
        let mut continuation: Option<Continuation> = None;
        loop {
            let page = match timeout_at(deadline, self.store.list_page(table, continuation.take()))
                .await
            {
                Ok(Ok(page)) => page,
                Ok(Err(err)) => return Ok(partial(table, rows, err.to_string())),
                Err(_) => return Ok(partial(table, rows, "watch deadline elapsed".to_string())),
            };
            rows.extend(page.row_keys);
            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        engine_debug!("Table {} holds {} item(s)", table, rows.len());
        Ok(ExistingRows {
            rows,
            partial: None,
        })
    }

    async fn notify(
        &self,
        config: &WatchConfig,
        items: &[String],
        deadline: Instant,
    ) -> Result<(), StepFailure> {
        engine_info!("Notifying for {} item(s)...", items.len());
        let notification = Notification::for_new_items(&config.notification_title, items);

        let reason = match timeout_at(deadline, self.notifier.notify(&notification)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(_) => "watch deadline elapsed".to_string(),
        };

        engine_warn!(
            "Notification for {} failed, items stay unrecorded: {}",
            config.table_name,
            reason
        );
        Err(StepFailure::SkipPersist { reason })
    }

    async fn persist(
        &self,
        config: &WatchConfig,
        items: &[String],
        deadline: Instant,
    ) -> Result<usize, FatalError> {
        let table = config.table_name.as_str();
        engine_info!("Adding {} item(s) to {}...", items.len(), table);

        for item in items {
            let record = SeenRecord::for_identifier(item);
            let reason = match timeout_at(deadline, self.store.insert(table, &record)).await {
                Ok(Ok(())) => continue,
                Ok(Err(StoreError::EntityAlreadyExists)) => {
                    engine_debug!("{:?} already recorded in {}", item, table);
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => "watch deadline elapsed".to_string(),
            };
            return Err(FatalError::Persist {
                table: table.to_string(),
                identifier: item.clone(),
                reason,
            });
        }

        Ok(items.len())
    }
}

fn partial(table: &str, rows: HashSet<String>, reason: String) -> ExistingRows {
    engine_warn!(
        "Could not query entities from table {} after {} item(s): {}",
        table,
        rows.len(),
        reason
    );
    ExistingRows {
        rows,
        partial: Some(StepFailure::Recovered { reason }),
    }
}
