//! Ledger tables on the Azure Table service REST API.
//!
//! Requests are authorised with SharedKeyLite or with a SAS token taken from
//! the storage connection string.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use pagewatch_core::SeenRecord;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use sha2::Sha256;
use url::Url;

use crate::http::{describe_reqwest_error, HttpSettings};
use crate::{Continuation, RecordPage, RecordStore, StoreError};

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2019-02-02";
const JSON_NO_METADATA: &str = "application/json;odata=nometadata";
const DATA_SERVICE_VERSION: &str = "3.0;NetFx";
const NEXT_PARTITION_KEY: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_KEY: &str = "x-ms-continuation-NextRowKey";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credential::Sas(_) => f.write_str("Sas(..)"),
        }
    }
}

/// The parts of a storage connection string the table client needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub table_endpoint: Url,
    pub credential: Credential,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let mut values: HashMap<String, String> = HashMap::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                StoreError::Config(format!("connection string segment without '=': {segment:?}"))
            })?;
            values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let development = values
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if development {
            return Ok(Self {
                table_endpoint: parse_endpoint(DEV_TABLE_ENDPOINT)?,
                credential: Credential::SharedKey {
                    account: DEV_ACCOUNT.to_string(),
                    key: decode_key(DEV_ACCOUNT_KEY)?,
                },
            });
        }

        let account = values.get("accountname").cloned();
        let table_endpoint = match values.get("tableendpoint") {
            Some(endpoint) => parse_endpoint(endpoint)?,
            None => {
                let account = account.as_deref().ok_or_else(|| {
                    StoreError::Config(
                        "connection string needs AccountName or TableEndpoint".into(),
                    )
                })?;
                let protocol = values
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = values
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                parse_endpoint(&format!("{protocol}://{account}.table.{suffix}"))?
            }
        };

        let sas = values.get("sharedaccesssignature");
        let credential = match (sas, account, values.get("accountkey")) {
            (Some(sas), _, _) => Credential::Sas(sas.trim_start_matches('?').to_string()),
            (None, Some(account), Some(key)) => Credential::SharedKey {
                account,
                key: decode_key(key)?,
            },
            _ => {
                return Err(StoreError::Config(
                    "connection string needs AccountName and AccountKey, or SharedAccessSignature"
                        .into(),
                ))
            }
        };

        Ok(Self {
            table_endpoint,
            credential,
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, StoreError> {
    Url::parse(raw)
        .map_err(|err| StoreError::Config(format!("invalid table endpoint {raw:?}: {err}")))
}

fn decode_key(raw: &str) -> Result<Vec<u8>, StoreError> {
    STANDARD
        .decode(raw)
        .map_err(|err| StoreError::Config(format!("AccountKey is not base64: {err}")))
}

/// `/{account}{path}`; the query string is not part of the SharedKeyLite
/// resource for tables.
pub(crate) fn canonicalized_resource(account: &str, url: &Url) -> String {
    format!("/{account}{}", url.path())
}

pub(crate) fn shared_key_lite_signature(
    key: &[u8],
    date: &str,
    resource: &str,
) -> Result<String, StoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| StoreError::Config(err.to_string()))?;
    mac.update(date.as_bytes());
    mac.update(b"\n");
    mac.update(resource.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[derive(Debug, Deserialize)]
struct EntityPage {
    #[serde(default)]
    value: Vec<EntityRow>,
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    #[serde(rename = "RowKey")]
    row_key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "odata.error")]
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
}

#[derive(Debug, Clone)]
pub struct AzureTableStore {
    client: reqwest::Client,
    connection: ConnectionString,
}

impl AzureTableStore {
    pub fn new(connection: ConnectionString, settings: &HttpSettings) -> Result<Self, StoreError> {
        let client = settings
            .build_client()
            .map_err(|err| StoreError::Config(describe_reqwest_error(&err)))?;
        Ok(Self { client, connection })
    }

    pub fn from_connection_string(raw: &str, settings: &HttpSettings) -> Result<Self, StoreError> {
        Self::new(ConnectionString::parse(raw)?, settings)
    }

    fn resource_url(&self, resource: &str) -> Result<Url, StoreError> {
        let base = self.connection.table_endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{resource}"))
            .map_err(|err| StoreError::Config(format!("invalid resource {resource:?}: {err}")))
    }

    fn request(&self, method: Method, mut url: Url) -> Result<RequestBuilder, StoreError> {
        let date = rfc1123_now();
        let builder = match &self.connection.credential {
            Credential::Sas(token) => {
                {
                    let mut query = url.query_pairs_mut();
                    for (key, value) in url::form_urlencoded::parse(token.as_bytes()) {
                        query.append_pair(&key, &value);
                    }
                }
                self.client.request(method, url)
            }
            Credential::SharedKey { account, key } => {
                let resource = canonicalized_resource(account, &url);
                let signature = shared_key_lite_signature(key, &date, &resource)?;
                self.client
                    .request(method, url)
                    .header(AUTHORIZATION, format!("SharedKeyLite {account}:{signature}"))
            }
        };

        Ok(builder
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header(ACCEPT, JSON_NO_METADATA)
            .header("DataServiceVersion", DATA_SERVICE_VERSION)
            .header("MaxDataServiceVersion", DATA_SERVICE_VERSION))
    }

    async fn send_json(&self, url: Url, body: Vec<u8>) -> Result<Response, StoreError> {
        self.request(Method::POST, url)?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return-no-content")
            .body(body)
            .send()
            .await
            .map_err(|err| StoreError::Network(describe_reqwest_error(&err)))
    }
}

async fn failure(response: Response, table: &str) -> StoreError {
    let status = response.status().as_u16();
    let header_code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await.unwrap_or_default();
    let code = header_code.or_else(|| {
        serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .map(|parsed| parsed.error.code)
    });

    match code.as_deref() {
        Some("TableAlreadyExists") => StoreError::TableAlreadyExists,
        Some("EntityAlreadyExists") => StoreError::EntityAlreadyExists,
        Some("TableNotFound") => StoreError::TableNotFound(table.to_string()),
        _ => StoreError::Status { status, code },
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl RecordStore for AzureTableStore {
    async fn create_table(&self, table: &str) -> Result<(), StoreError> {
        let body = serde_json::to_vec(&serde_json::json!({ "TableName": table }))
            .map_err(|err| StoreError::Decode(err.to_string()))?;
        let response = self.send_json(self.resource_url("Tables")?, body).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(failure(response, table).await)
    }

    async fn list_page(
        &self,
        table: &str,
        continuation: Option<Continuation>,
    ) -> Result<RecordPage, StoreError> {
        let mut url = self.resource_url(&format!("{table}()"))?;
        if let Some(continuation) = continuation {
            let mut query = url.query_pairs_mut();
            query.append_pair("NextPartitionKey", &continuation.next_partition_key);
            if let Some(row_key) = &continuation.next_row_key {
                query.append_pair("NextRowKey", row_key);
            }
        }

        let response = self
            .request(Method::GET, url)?
            .send()
            .await
            .map_err(|err| StoreError::Network(describe_reqwest_error(&err)))?;
        if !response.status().is_success() {
            return Err(failure(response, table).await);
        }

        let continuation = header_value(&response, NEXT_PARTITION_KEY).map(|next_partition_key| {
            Continuation {
                next_partition_key,
                next_row_key: header_value(&response, NEXT_ROW_KEY),
            }
        });
        let body = response
            .bytes()
            .await
            .map_err(|err| StoreError::Network(describe_reqwest_error(&err)))?;
        let page: EntityPage =
            serde_json::from_slice(&body).map_err(|err| StoreError::Decode(err.to_string()))?;

        Ok(RecordPage {
            row_keys: page.value.into_iter().map(|row| row.row_key).collect(),
            continuation,
        })
    }

    async fn insert(&self, table: &str, record: &SeenRecord) -> Result<(), StoreError> {
        let body = serde_json::to_vec(record).map_err(|err| StoreError::Decode(err.to_string()))?;
        let response = self.send_json(self.resource_url(table)?, body).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(failure(response, table).await)
    }
}
