//! Common utilities for the inventory client
//!
//! Shared HTTP plumbing and the list filter grammar.

pub mod filter;

use crate::error::InventoryError;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// HTTP client wrapper with optional bearer authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(client: Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-success response into the matching error
    async fn check(method: &str, path: &str, response: Response) -> Result<Response, InventoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(InventoryError::from_status(
            status,
            format!("{} {} failed: {} - {}", method, path, status, body),
        ))
    }

    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, InventoryError> {
        self.get_with_timeout(path, None).await
    }

    /// GET overriding the client timeout, for long-poll endpoints
    pub async fn get_with_timeout<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<T, InventoryError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let mut builder = self.authorize(self.client.get(&url));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder
            .send()
            .await
            .map_err(InventoryError::Http)?;

        let response = Self::check("GET", path, response).await?;
        response.json().await.map_err(InventoryError::Http)
    }

    pub async fn post<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, InventoryError> {
        let url = self.build_url(path);
        debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(InventoryError::Http)?;

        let response = Self::check("POST", path, response).await?;
        response.json().await.map_err(InventoryError::Http)
    }

    pub async fn patch<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, InventoryError> {
        let url = self.build_url(path);
        debug!("PATCH {}", url);

        let response = self
            .authorize(self.client.patch(&url))
            .json(body)
            .send()
            .await
            .map_err(InventoryError::Http)?;

        let response = Self::check("PATCH", path, response).await?;
        response.json().await.map_err(InventoryError::Http)
    }

    pub async fn delete(&self, path: &str) -> Result<(), InventoryError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self
            .authorize(self.client.delete(&url))
            .send()
            .await
            .map_err(InventoryError::Http)?;

        Self::check("DELETE", path, response).await?;
        Ok(())
    }
}
