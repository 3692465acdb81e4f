//! Pagewatch engine: browser extraction, ledger storage, notifications and
//! the reconciliation cycle that ties them together.
mod azure;
mod context;
mod extract;
mod http;
mod notify;
mod reconciler;
mod store;

pub use azure::{AzureTableStore, ConnectionString, Credential};
pub use context::ServiceContext;
pub use extract::{ChromiumExtractor, ChromiumSettings, ExtractError, PageExtractor};
pub use http::HttpSettings;
pub use notify::{Notifier, NotifyError, PushbulletNotifier, PUSHBULLET_BASE_URL};
pub use reconciler::{Reconciler, DEFAULT_WATCH_TIMEOUT};
pub use store::{Continuation, MemoryStore, RecordPage, RecordStore, StoreError};
