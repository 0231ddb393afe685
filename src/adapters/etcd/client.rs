//! etcd v2 HTTP coordination client.

use super::keys::{classify, key_url, EtcdResponse};
use crate::adapters::{BoxFuture, CoordOutcome, CoordinationBackend, SwapCondition};
use crate::core::config::CoordinationConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::time::ceil_seconds;
use reqwest::{Client, Method};
use std::time::Duration;

/// One keys API request, replayable against each endpoint.
#[derive(Debug, Clone)]
struct KeysRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    form: Vec<(&'static str, String)>,
}

/// Coordination backend over the etcd v2 keys API.
///
/// Endpoints are tried in order; the first definite answer (applied,
/// conflict or not found) decides the outcome. Unreachable endpoints and
/// server errors move on to the next endpoint. Only when every endpoint
/// fails is a transport error reported.
pub struct EtcdHttpCoordination {
    client: Client,
    endpoints: Vec<String>,
}

impl EtcdHttpCoordination {
    /// Create a client for the given endpoints.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> CacheResult<Self> {
        if endpoints.is_empty() {
            return Err(CacheError::configuration("etcd endpoint list is empty"));
        }
        for endpoint in &endpoints {
            key_url(endpoint, "")?;
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::configuration(format!("failed to build etcd client: {}", e)))?;
        Ok(Self { client, endpoints })
    }

    /// Create a client from the coordination configuration.
    pub fn from_config(config: &CoordinationConfig) -> CacheResult<Self> {
        Self::new(config.endpoints.clone(), config.request_timeout())
    }

    /// Configured endpoints.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn send(&self, request: KeysRequest) -> CacheResult<CoordOutcome> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = key_url(endpoint, &request.path)?;
            let mut builder = self
                .client
                .request(request.method.clone(), url)
                .query(&request.query);
            if !request.form.is_empty() {
                builder = builder.form(&request.form);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            match classify(status, &EtcdResponse::parse(&body)) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "etcd endpoint failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(CacheError::transport(format!(
            "every etcd endpoint failed: {}",
            last_error.unwrap_or_else(|| "no endpoints".to_string())
        )))
    }
}

impl CoordinationBackend for EtcdHttpCoordination {
    fn name(&self) -> &'static str {
        "etcd"
    }

    fn create_if_absent<'a>(
        &'a self,
        path: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        Box::pin(self.send(KeysRequest {
            method: Method::PUT,
            path: path.to_string(),
            query: vec![("prevExist", "false".to_string())],
            form: vec![
                ("value", value.to_string()),
                ("ttl", ceil_seconds(ttl).to_string()),
            ],
        }))
    }

    fn compare_and_swap<'a>(
        &'a self,
        path: &'a str,
        condition: &'a SwapCondition,
        new_value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        let mut query = vec![("prevValue", condition.prev_value.clone())];
        if let Some(revision) = condition.prev_revision {
            query.push(("prevIndex", revision.to_string()));
        }
        Box::pin(self.send(KeysRequest {
            method: Method::PUT,
            path: path.to_string(),
            query,
            form: vec![
                ("value", new_value.to_string()),
                ("ttl", ceil_seconds(ttl).to_string()),
            ],
        }))
    }

    fn compare_and_delete<'a>(
        &'a self,
        path: &'a str,
        prev_value: &'a str,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        Box::pin(self.send(KeysRequest {
            method: Method::DELETE,
            path: path.to_string(),
            query: vec![("prevValue", prev_value.to_string())],
            form: Vec::new(),
        }))
    }
}
