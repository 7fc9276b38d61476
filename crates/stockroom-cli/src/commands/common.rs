use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use stockroom_core::config::ClientConfig;
use stockroom_core::http::{ReqwestNetwork, SyncApiClient};
use stockroom_core::models::{ChangeEvent, Collection, Record};
use stockroom_core::offline::OfflineInterceptor;
use stockroom_core::util::parse_iso_timestamp;
use stockroom_core::{LocalStore, SyncEngine};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "stockroom.db";

pub type ClientNetwork = OfflineInterceptor<ReqwestNetwork>;

/// Resolved configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: ClientConfig,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl Settings {
    /// Config file, then `STOCKROOM_*` env, then command-line flags.
    pub fn resolve(
        cli_config_path: Option<PathBuf>,
        cli_db_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config_path = match cli_config_path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config = ClientConfig::load_from_path(&config_path)?
            .with_env_overrides(|key| env::var(key).ok())?;
        let db_path = match cli_db_path.or_else(|| config.db_path.clone()) {
            Some(path) => path,
            None => default_db_path()?,
        };

        Ok(Self {
            config,
            config_path,
            db_path,
        })
    }

    pub async fn open_store(&self) -> Result<LocalStore, CliError> {
        Ok(LocalStore::open_path(&self.db_path).await?)
    }

    /// HTTP stack used for every server call: reqwest behind the offline cache.
    pub fn network(&self, store: &LocalStore) -> Result<ClientNetwork, CliError> {
        let base_url = self.config.require_api_base_url()?;
        let network = ReqwestNetwork::new(base_url, self.config.request_timeout())?;
        Ok(OfflineInterceptor::new(network, store.clone())
            .with_generation(self.config.cache_generation.clone()))
    }

    pub fn sync_engine(&self, store: &LocalStore) -> Result<SyncEngine<ClientNetwork>, CliError> {
        let network = self.network(store)?;
        Ok(SyncEngine::new(store.clone(), SyncApiClient::new(network)))
    }
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("stockroom").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("stockroom").join(DB_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// One-line human label for a record.
pub fn record_title(collection: Collection, record: &Record) -> String {
    let text = |name: &str| {
        record
            .field(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let number = |name: &str| record.field(name).and_then(Value::as_f64).unwrap_or(0.0);

    match collection {
        Collection::Products => {
            let stock = record.field("stock_qty").and_then(Value::as_i64).unwrap_or(0);
            format!("{} ({} in stock)", text("name"), stock)
        }
        Collection::Customers => {
            let phone = text("phone");
            if phone.is_empty() {
                text("full_name")
            } else {
                format!("{} {}", text("full_name"), phone)
            }
        }
        Collection::Sales => {
            let items = record
                .field("items")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!(
                "{:.2} {} ({} items)",
                number("total"),
                text("payment_type"),
                items
            )
        }
        Collection::Expenses => format!("{:.2} {}", number("amount"), text("category")),
    }
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_record_lines(collection: Collection, records: &[Record]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let title = truncate(&record_title(collection, record), 40);
            let relative_time = relative_time_label(&record.updated_at, now_ms);
            format!(
                "{:<36}  {title:<40}  v{:<3}  {relative_time}",
                record.id,
                record.version
            )
        })
        .collect()
}

pub fn format_outbox_lines(events: &[ChangeEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let line = format!(
                "{}  {:<7}  {:<6}  {}/{}",
                event.event_id,
                event.status.as_str(),
                event.operation.as_str(),
                event.entity_type.as_str(),
                event.entity_id
            );
            if event.retry_count > 0 {
                format!("{line}  retries={}", event.retry_count)
            } else {
                line
            }
        })
        .collect()
}

pub fn relative_time_label(timestamp: &str, now_ms: i64) -> String {
    parse_iso_timestamp(timestamp).map_or_else(
        || "unknown".to_string(),
        |parsed| format_relative_time(parsed.timestamp_millis(), now_ms),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::InvalidArgument("record id cannot be empty".to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Parse `key=value`; the value is read as JSON when it parses, else as text.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), CliError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(CliError::InvalidArgument(format!(
            "expected KEY=VALUE, got '{raw}'"
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "missing key in '{raw}'"
        )));
    }

    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Parse a sale line `PRODUCT_ID:QTY[:PRICE]`.
pub fn parse_sale_item(raw: &str) -> Result<(String, u32, Option<f64>), CliError> {
    let invalid = || CliError::InvalidArgument(format!("expected PRODUCT_ID:QTY[:PRICE], got '{raw}'"));
    let mut parts = raw.split(':').map(str::trim);

    let product = parts
        .next()
        .filter(|product| !product.is_empty())
        .ok_or_else(invalid)?;
    let quantity = parts
        .next()
        .and_then(|quantity| quantity.parse::<u32>().ok())
        .filter(|quantity| *quantity > 0)
        .ok_or_else(invalid)?;
    let price = match parts.next() {
        Some(price) => Some(price.parse::<f64>().map_err(|_| invalid())?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok((product.to_string(), quantity, price))
}
