//! Typed HTTP client mirroring the page scripts' fetch/render/re-sync
//! cycle: load a listing, mutate through the endpoint, then re-fetch the
//! listing from the server instead of patching local state in place.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by [`ApiClient`] calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request never produced a response
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a failure envelope
    #[error("api error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    /// 2xx response whose body was not the expected envelope
    #[error("unexpected response shape: {message}")]
    UnexpectedShape { message: String },
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetches a listing and returns its `data` array. An empty array is a
    /// normal result, not an error.
    pub async fn list(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, ClientError> {
        let envelope = self.send(Method::GET, path, query, None).await?;
        match envelope.get("data").and_then(Value::as_array) {
            Some(rows) => Ok(rows.clone()),
            None => Err(ClientError::UnexpectedShape {
                message: "listing response carried no data array".into(),
            }),
        }
    }

    /// Fetches a single record and returns its `data` object.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        let envelope = self.send(Method::GET, path, query, None).await?;
        envelope
            .get("data")
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedShape {
                message: "get response carried no data object".into(),
            })
    }

    /// Creates a record and returns the created `data` payload.
    pub async fn create(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Value,
    ) -> Result<Value, ClientError> {
        let envelope = self.send(Method::POST, path, query, Some(body)).await?;
        envelope
            .get("data")
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedShape {
                message: "create response carried no data object".into(),
            })
    }

    /// Applies a partial update; returns the full success envelope since
    /// some endpoints answer with a message and others echo the record.
    pub async fn update(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Value,
    ) -> Result<Value, ClientError> {
        self.send(Method::PUT, path, query, Some(body)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        self.send(Method::DELETE, path, query, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, url).query(query);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let envelope: Value =
            resp.json()
                .await
                .map_err(|e| ClientError::UnexpectedShape {
                    message: e.to_string(),
                })?;

        let success = envelope
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !status.is_success() || !success {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            return Err(ClientError::Api { status, message });
        }
        Ok(envelope)
    }
}

/// Local snapshot of one listing endpoint. Mutations go through the inner
/// [`ApiClient`]; the rows are re-fetched from the server after every
/// successful mutation, never patched optimistically.
pub struct ResourceSync {
    client: ApiClient,
    path: String,
    list_query: Vec<(String, String)>,
    rows: Vec<Value>,
}

impl ResourceSync {
    pub fn new(client: ApiClient, path: impl Into<String>, list_query: &[(&str, &str)]) -> Self {
        Self {
            client,
            path: path.into(),
            list_query: list_query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub async fn refresh(&mut self) -> Result<&[Value], ClientError> {
        let query: Vec<(&str, &str)> = self
            .list_query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.rows = self.client.list(&self.path, &query).await?;
        Ok(&self.rows)
    }

    pub async fn create(
        &mut self,
        query: &[(&str, &str)],
        body: Value,
    ) -> Result<Value, ClientError> {
        let created = self.client.create(&self.path, query, body).await?;
        self.refresh().await?;
        Ok(created)
    }

    pub async fn update(
        &mut self,
        query: &[(&str, &str)],
        body: Value,
    ) -> Result<Value, ClientError> {
        let updated = self.client.update(&self.path, query, body).await?;
        self.refresh().await?;
        Ok(updated)
    }

    pub async fn delete(&mut self, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        let deleted = self.client.delete(&self.path, query).await?;
        self.refresh().await?;
        Ok(deleted)
    }
}
