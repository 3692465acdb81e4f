use serde::{Deserialize, Serialize};

pub const BODY_SEPARATOR: &str = ", ";

/// Ledger row marking an identifier as already notified. Both keys hold the
/// identifier, so there is one row per identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
}

impl SeenRecord {
    pub fn for_identifier(identifier: &str) -> Self {
        Self {
            partition_key: identifier.to_string(),
            row_key: identifier.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_new_items(title: &str, items: &[String]) -> Self {
        Self {
            title: title.to_string(),
            body: items.join(BODY_SEPARATOR),
        }
    }
}
