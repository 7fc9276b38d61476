//! Typed client for the CRM sync endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HttpRequest, Network, TransportError};
use crate::models::{ChangeEvent, Collection, EntityType, Operation, Record};

pub const AUTH_TOKEN_PATH: &str = "/api/auth/token/";
pub const PUSH_PATH: &str = "/api/sync/push";
pub const PULL_PATH: &str = "/api/sync/pull";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    pub device_id: String,
    pub events: Vec<PushEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub event_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: Operation,
    pub payload_json: Value,
}

impl From<&ChangeEvent> for PushEvent {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
            entity_type: event.entity_type,
            entity_id: event.entity_id.clone(),
            operation: event.operation,
            payload_json: event.payload_json.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default)]
    pub results: Vec<PushResult>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushResult {
    pub event_id: String,
    pub status: String,
}

/// Server verdict for one pushed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Applied,
    /// Already seen; counts as delivered
    Duplicate,
    Rejected(String),
}

impl PushStatus {
    pub fn from_wire(status: &str) -> Self {
        let status = status.trim();
        if status.eq_ignore_ascii_case("applied") {
            Self::Applied
        } else if status.eq_ignore_ascii_case("duplicate") {
            Self::Duplicate
        } else {
            Self::Rejected(status.to_string())
        }
    }

    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Applied | Self::Duplicate)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub server_time: Option<String>,
    #[serde(default)]
    pub products: Vec<Record>,
    #[serde(default)]
    pub sales: Vec<Record>,
    #[serde(default)]
    pub expenses: Vec<Record>,
    #[serde(default)]
    pub customers: Vec<Record>,
}

impl PullResponse {
    /// Pulled records grouped by collection, in apply order.
    pub fn into_changes(self) -> Vec<(Collection, Vec<Record>)> {
        vec![
            (Collection::Products, self.products),
            (Collection::Customers, self.customers),
            (Collection::Sales, self.sales),
            (Collection::Expenses, self.expenses),
        ]
    }

    pub fn record_count(&self) -> usize {
        self.products.len() + self.sales.len() + self.expenses.len() + self.customers.len()
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Option<String>,
}

/// Sync API client over any [`Network`].
#[derive(Debug, Clone)]
pub struct SyncApiClient<N> {
    network: N,
}

impl<N: Network> SyncApiClient<N> {
    pub const fn new(network: N) -> Self {
        Self { network }
    }

    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Exchange credentials for a bearer token.
    pub async fn obtain_token(&self, username: &str, password: &str) -> Result<String, TransportError> {
        let request = HttpRequest::post_json(AUTH_TOKEN_PATH, &TokenRequest { username, password })?;
        let response = self.network.send(&request).await?.error_for_status()?;
        response
            .json::<TokenResponse>()?
            .access
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| TransportError::Decode("token response without access token".to_string()))
    }

    pub async fn push(&self, token: &str, batch: &PushRequest) -> Result<PushResponse, TransportError> {
        let request = HttpRequest::post_json(PUSH_PATH, batch)?.with_bearer(token);
        let response = self.network.send(&request).await?.error_for_status()?;
        response.json()
    }

    pub async fn pull(&self, token: &str, since: Option<&str>) -> Result<PullResponse, TransportError> {
        let since = urlencoding::encode(since.unwrap_or_default());
        let request = HttpRequest::get(format!("{PULL_PATH}?since={since}")).with_bearer(token);
        let response = self.network.send(&request).await?.error_for_status()?;
        response.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
        response: Option<HttpResponse>,
    }

    impl Network for Recorder {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            self.response
                .clone()
                .ok_or_else(|| TransportError::Unreachable("offline".to_string()))
        }
    }

    fn responding(status: u16, body: &Value) -> Recorder {
        Recorder {
            requests: Mutex::default(),
            response: Some(HttpResponse::json_body(status, body).unwrap()),
        }
    }

    #[test]
    fn push_status_from_wire() {
        assert_eq!(PushStatus::from_wire("applied"), PushStatus::Applied);
        assert_eq!(PushStatus::from_wire("duplicate"), PushStatus::Duplicate);
        assert_eq!(
            PushStatus::from_wire("invalid"),
            PushStatus::Rejected("invalid".to_string())
        );
        assert!(!PushStatus::from_wire("conflict").is_delivered());
    }

    #[test]
    fn pull_response_treats_missing_arrays_as_empty() {
        let response: PullResponse = serde_json::from_value(json!({
            "server_time": "2024-05-01T10:00:00+00:00",
            "products": [{"id": "P1", "name": "Tea", "version": 2}]
        }))
        .unwrap();
        assert_eq!(response.record_count(), 1);
        assert!(response.sales.is_empty());
        assert_eq!(response.products[0].version, 2);
    }

    #[tokio::test]
    async fn pull_encodes_since_and_sends_bearer() {
        let client = SyncApiClient::new(responding(200, &json!({"server_time": "t"})));

        client
            .pull("tok", Some("2024-05-01T10:00:00+00:00"))
            .await
            .unwrap();

        let requests = client.network().requests.lock().unwrap();
        assert_eq!(
            requests[0].path,
            "/api/sync/pull?since=2024-05-01T10%3A00%3A00%2B00%3A00"
        );
        assert_eq!(requests[0].bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn pull_without_watermark_sends_empty_since() {
        let client = SyncApiClient::new(responding(200, &json!({})));
        client.pull("tok", None).await.unwrap();
        assert_eq!(
            client.network().requests.lock().unwrap()[0].path,
            "/api/sync/pull?since="
        );
    }

    #[tokio::test]
    async fn push_maps_http_errors_to_status() {
        let client = SyncApiClient::new(responding(500, &json!({"detail": "boom"})));
        let batch = PushRequest {
            device_id: "d1".to_string(),
            events: Vec::new(),
        };
        let error = client.push("tok", &batch).await.unwrap_err();
        assert!(matches!(error, TransportError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn obtain_token_reads_access_field() {
        let client = SyncApiClient::new(responding(200, &json!({"access": "abc", "refresh": "r"})));
        assert_eq!(client.obtain_token("ann", "pw").await.unwrap(), "abc");

        let requests = client.network().requests.lock().unwrap();
        let body: Value = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "ann", "password": "pw"}));
        assert!(requests[0].bearer.is_none());
    }

    #[tokio::test]
    async fn obtain_token_rejects_missing_access() {
        let client = SyncApiClient::new(responding(200, &json!({})));
        assert!(matches!(
            client.obtain_token("ann", "pw").await,
            Err(TransportError::Decode(_))
        ));
    }
}
