//! Inventory REST client
//!
//! Resources live under `/api/v1/tenants/{tenant}/resources`. Change notifications
//! are read by long-polling `/api/v1/events` with a cursor.

use crate::common::HttpClient;
use crate::common::filter::Filter;
use crate::error::InventoryError;
use crate::field_mask::FieldMask;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Long-poll window for the event stream
const EVENT_POLL_WAIT_SECS: u64 = 30;
const EVENT_POLL_TIMEOUT: Duration = Duration::from_secs(EVENT_POLL_WAIT_SECS + 5);
const EVENT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    field_mask: &'a [String],
    resource: &'a Resource,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct FindAllResponse {
    #[serde(default)]
    resources: Vec<TenantResourceId>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    cursor: u64,
    #[serde(default)]
    events: Vec<InventoryEvent>,
}

/// Inventory API client
#[derive(Debug, Clone)]
pub struct InventoryClient {
    http: HttpClient,
}

impl InventoryClient {
    /// Create a new inventory client
    ///
    /// # Arguments
    /// * `base_url` - Inventory base URL (e.g., "http://inventory:8080")
    /// * `token` - optional bearer token
    /// * `timeout` - per-call timeout, see [`DEFAULT_TIMEOUT`]
    pub fn new(base_url: String, token: Option<String>, timeout: Duration) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InventoryError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    fn resources_path(tenant_id: &str) -> String {
        format!("/api/v1/tenants/{}/resources", urlencoding::encode(tenant_id))
    }

    fn resource_path(tenant_id: &str, resource_id: &str) -> String {
        format!(
            "{}/{}",
            Self::resources_path(tenant_id),
            urlencoding::encode(resource_id)
        )
    }

    fn events_path(kinds: &[ResourceKind], cursor: Option<u64>) -> String {
        let kinds = kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
        let mut path = format!(
            "/api/v1/events?kinds={}&wait={}",
            urlencoding::encode(&kinds),
            EVENT_POLL_WAIT_SECS
        );
        if let Some(cursor) = cursor {
            path.push_str(&format!("&cursor={cursor}"));
        }
        path
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for InventoryClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn get(&self, tenant_id: &str, resource_id: &str) -> Result<Resource, InventoryError> {
        self.http.get(&Self::resource_path(tenant_id, resource_id)).await
    }

    async fn list(
        &self,
        tenant_id: &str,
        kind: ResourceKind,
        filter: Option<&Filter>,
    ) -> Result<Vec<Resource>, InventoryError> {
        let mut path = format!("{}?kind={}", Self::resources_path(tenant_id), kind.as_str());
        if let Some(filter) = filter {
            path.push_str("&filter=");
            path.push_str(&urlencoding::encode(&filter.to_string()));
        }
        let response: ListResponse = self.http.get(&path).await?;
        debug!("Listed {} {} resources", response.resources.len(), kind);
        Ok(response.resources)
    }

    async fn create(&self, tenant_id: &str, resource: Resource) -> Result<Resource, InventoryError> {
        self.http.post(&Self::resources_path(tenant_id), &resource).await
    }

    async fn update(
        &self,
        tenant_id: &str,
        resource_id: &str,
        mask: &FieldMask,
        resource: Resource,
    ) -> Result<Resource, InventoryError> {
        mask.validate()?;
        let body = UpdateRequest {
            field_mask: mask.paths(),
            resource: &resource,
        };
        self.http.patch(&Self::resource_path(tenant_id, resource_id), &body).await
    }

    async fn delete(&self, tenant_id: &str, resource_id: &str) -> Result<(), InventoryError> {
        self.http.delete(&Self::resource_path(tenant_id, resource_id)).await
    }

    async fn find_all(&self, kind: ResourceKind) -> Result<Vec<TenantResourceId>, InventoryError> {
        let path = format!("/api/v1/resources?kind={}", kind.as_str());
        let response: FindAllResponse = self.http.get(&path).await?;
        Ok(response.resources)
    }

    async fn subscribe(
        &self,
        kinds: &[ResourceKind],
        buffer: usize,
    ) -> Result<mpsc::Receiver<InventoryEvent>, InventoryError> {
        // Prime the cursor so a subscription only sees changes made after it starts
        let first: EventsResponse = self.http.get(&Self::events_path(kinds, None)).await?;

        let (tx, rx) = mpsc::channel(buffer.max(1));
        let http = self.http.clone();
        let kinds = kinds.to_vec();
        tokio::spawn(async move {
            let mut cursor = first.cursor;
            loop {
                let page: Result<EventsResponse, _> = http
                    .get_with_timeout(&Self::events_path(&kinds, Some(cursor)), Some(EVENT_POLL_TIMEOUT))
                    .await;
                match page {
                    Ok(page) => {
                        cursor = page.cursor;
                        for event in page.events {
                            // Blocks while the consumer is behind
                            if tx.send(event).await.is_err() {
                                debug!("Event subscriber dropped, stopping event poller");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        if tx.is_closed() {
                            return;
                        }
                        warn!("Failed to poll inventory events: {}", e);
                        tokio::time::sleep(EVENT_RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok(rx)
    }
}
