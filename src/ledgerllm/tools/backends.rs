//! HTTP clients for the internal micro-services the tools call into.
//!
//! Finance and user service calls get 5 seconds, retrieval gets 10.  An error status maps
//! to [`ToolError::Backend`] with a capped body excerpt; elapsed deadlines map to
//! [`ToolError::Timeout`].

use serde_json::{json, Value};
use std::time::Duration;

use crate::ledgerllm::providers::common::{shared_http_client, truncate_chars};
use crate::ledgerllm::tools::ToolError;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(5);
const RAG_TIMEOUT: Duration = Duration::from_secs(10);

/// Clients for the finance, user, and retrieval services.
pub struct BackendClients {
    http: reqwest::Client,
    finance_url: String,
    user_url: String,
    rag_url: String,
}

impl BackendClients {
    pub fn new(finance_url: &str, user_url: &str, rag_url: &str) -> BackendClients {
        BackendClients {
            http: shared_http_client().clone(),
            finance_url: finance_url.trim_end_matches('/').to_string(),
            user_url: user_url.trim_end_matches('/').to_string(),
            rag_url: rag_url.trim_end_matches('/').to_string(),
        }
    }

    /// `GET /accounts?userId=…` on the finance service.
    pub async fn accounts(&self, user_id: &str) -> Result<Value, ToolError> {
        self.get(
            &format!("{}/accounts", self.finance_url),
            &[("userId", user_id)],
            BACKEND_TIMEOUT,
        )
        .await
    }

    /// `GET /transactions?userId=…` on the finance service.
    pub async fn transactions(&self, user_id: &str) -> Result<Value, ToolError> {
        self.get(
            &format!("{}/transactions", self.finance_url),
            &[("userId", user_id)],
            BACKEND_TIMEOUT,
        )
        .await
    }

    /// `POST /transfers` on the finance service.
    pub async fn post_transfer(&self, payload: &Value) -> Result<Value, ToolError> {
        self.post(
            &format!("{}/transfers", self.finance_url),
            payload,
            BACKEND_TIMEOUT,
        )
        .await
    }

    /// `GET /users?name=…` on the user service.
    pub async fn search_users(&self, name: &str) -> Result<Value, ToolError> {
        self.get(
            &format!("{}/users", self.user_url),
            &[("name", name)],
            BACKEND_TIMEOUT,
        )
        .await
    }

    /// `POST /query` on the retrieval service.
    pub async fn rag_query(&self, query: &str, k: Option<u32>) -> Result<Value, ToolError> {
        let mut payload = json!({"query": query});
        if let Some(k) = k.filter(|k| *k > 0) {
            payload["k"] = json!(k);
        }
        self.post(&format!("{}/query", self.rag_url), &payload, RAG_TIMEOUT)
            .await
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        log::debug!("backend GET {}", url);
        let response = self
            .http
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::decode(response).await
    }

    async fn post(&self, url: &str, payload: &Value, timeout: Duration) -> Result<Value, ToolError> {
        log::debug!("backend POST {}", url);
        let response = self
            .http
            .post(url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value, ToolError> {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        if status >= 400 {
            return Err(ToolError::Backend {
                status,
                detail: truncate_chars(&text, 500),
            });
        }
        // Non-JSON bodies come back as a raw string, mirroring lenient backends.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn map_transport_error(err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        ToolError::Timeout
    } else {
        ToolError::Connection(err.to_string())
    }
}
