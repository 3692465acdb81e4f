#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use pagewatch_core::{Notification, SeenRecord, WatchConfig};
use pagewatch_engine::{
    Continuation, ExtractError, MemoryStore, Notifier, NotifyError, PageExtractor, Reconciler,
    RecordPage, RecordStore, StoreError,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

pub fn watch(table: &str) -> WatchConfig {
    WatchConfig {
        table_name: table.to_string(),
        target_url: format!("https://example.com/{table}"),
        extraction_script: format!("listItems('{table}')"),
        wait: Duration::ZERO,
        notification_title: format!("New {table}"),
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
pub struct FakeExtractor {
    pages: Mutex<HashMap<String, Result<Vec<String>, ExtractError>>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeExtractor {
    pub fn serve(&self, config: &WatchConfig, items: &[&str]) {
        self.pages
            .lock()
            .unwrap()
            .insert(config.target_url.clone(), Ok(strings(items)));
    }

    pub fn fail(&self, config: &WatchConfig, err: ExtractError) {
        self.pages
            .lock()
            .unwrap()
            .insert(config.target_url.clone(), Err(err));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageExtractor for FakeExtractor {
    async fn extract(
        &self,
        url: &str,
        _wait: Duration,
        _script: &str,
    ) -> Result<Vec<String>, ExtractError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(ExtractError::Navigation(format!("no page for {url}"))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create(String),
    List(String),
    Insert(String, String),
}

/// Which store call a delay applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Create,
    List,
    Insert,
}

impl StoreOp {
    pub fn table(&self) -> &str {
        match self {
            StoreOp::Create(table) | StoreOp::List(table) | StoreOp::Insert(table, _) => table,
        }
    }
}

/// Memory ledger that records every call and can be told to fail.
pub struct RecordingStore {
    pub inner: MemoryStore,
    ops: Mutex<Vec<StoreOp>>,
    fail_create: Mutex<HashMap<String, StoreError>>,
    fail_list_call: Mutex<Option<usize>>,
    list_calls: AtomicUsize,
    fail_insert: Mutex<Option<StoreError>>,
    delays: Mutex<HashMap<StoreCall, Duration>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::with_page_size(MemoryStore::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: MemoryStore::with_page_size(page_size),
            ops: Mutex::new(Vec::new()),
            fail_create: Mutex::new(HashMap::new()),
            fail_list_call: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            fail_insert: Mutex::new(None),
            delays: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_create(&self, table: &str, err: StoreError) {
        self.fail_create
            .lock()
            .unwrap()
            .insert(table.to_string(), err);
    }

    /// Fails the `n`th listing call (1-based) across all tables.
    pub fn fail_list_call(&self, n: usize) {
        *self.fail_list_call.lock().unwrap() = Some(n);
    }

    pub fn fail_inserts(&self, err: StoreError) {
        *self.fail_insert.lock().unwrap() = Some(err);
    }

    /// Makes every `call` sleep for `delay` before answering.
    pub fn set_delay(&self, call: StoreCall, delay: Duration) {
        self.delays.lock().unwrap().insert(call, delay);
    }

    async fn pause(&self, call: StoreCall) {
        let delay = self.delays.lock().unwrap().get(&call).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn ops_for(&self, table: &str) -> Vec<StoreOp> {
        self.ops()
            .into_iter()
            .filter(|op| op.table() == table)
            .collect()
    }

    pub fn inserts(&self) -> Vec<StoreOp> {
        self.ops()
            .into_iter()
            .filter(|op| matches!(op, StoreOp::Insert(..)))
            .collect()
    }
}

#[async_trait::async_trait]
impl RecordStore for RecordingStore {
    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(StoreOp::Create(table.to_string()));
        self.pause(StoreCall::Create).await;
        if let Some(err) = self.fail_create.lock().unwrap().get(table) {
            return Err(err.clone());
        }
        self.inner.create_table(table).await
    }

    async fn list_page(
        &self,
        table: &str,
        continuation: Option<Continuation>,
    ) -> Result<RecordPage, StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(StoreOp::List(table.to_string()));
        self.pause(StoreCall::List).await;
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_list_call.lock().unwrap() == Some(call) {
            return Err(StoreError::Network("connection reset".to_string()));
        }
        self.inner.list_page(table, continuation).await
    }

    async fn insert(&self, table: &str, record: &SeenRecord) -> Result<(), StoreError> {
        self.ops
            .lock()
            .unwrap()
            .push(StoreOp::Insert(table.to_string(), record.row_key.clone()));
        self.pause(StoreCall::Insert).await;
        if let Some(err) = self.fail_insert.lock().unwrap().clone() {
            return Err(err);
        }
        self.inner.insert(table, record).await
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    replies: Mutex<VecDeque<Result<(), NotifyError>>>,
    sent: Mutex<Vec<Notification>>,
    delay: Mutex<Duration>,
}

impl FakeNotifier {
    /// Queues the reply for the next delivery; unqueued deliveries succeed.
    pub fn reply_next(&self, reply: Result<(), NotifyError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(notification.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

pub struct Harness {
    pub extractor: Arc<FakeExtractor>,
    pub store: Arc<RecordingStore>,
    pub notifier: Arc<FakeNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(RecordingStore::new())
    }

    pub fn with_store(store: RecordingStore) -> Self {
        init_logging();
        Self {
            extractor: Arc::new(FakeExtractor::default()),
            store: Arc::new(store),
            notifier: Arc::new(FakeNotifier::default()),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.extractor.clone(),
            self.store.clone(),
            self.notifier.clone(),
        )
    }
}
