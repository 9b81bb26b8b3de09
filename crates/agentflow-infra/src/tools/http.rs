//! HTTP tool gateway.
//!
//! `execute(name, params)` posts the params as JSON to
//! `{base_url}/tools/{name}`. A 2xx body that already is a result envelope
//! (`success`, `data`, `error`) is taken as-is; any other 2xx body becomes
//! the `data` of a successful result. Non-2xx statuses become failed
//! results carrying the status, so callers see tool failures as data.

use std::time::Duration;

use serde_json::{Map, Value};

use agentflow_core::tools::{ToolError, ToolGateway, ToolResult};

pub struct HttpToolGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, name: &str) -> String {
        format!("{}/tools/{name}", self.base_url)
    }
}

impl std::fmt::Debug for HttpToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpToolGateway")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn error_message(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(Value::as_str)))
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

impl ToolGateway for HttpToolGateway {
    async fn execute(&self, name: &str, params: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        let response = self
            .client
            .post(self.url(name))
            .json(params)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ToolError::Decode(format!("tool '{name}' returned non-JSON body: {e}")))?
        };

        if !(200..300).contains(&status) {
            tracing::warn!(tool = name, status, "tool call failed");
            return Ok(ToolResult::failed(status, error_message(&body, &text)));
        }

        let result = match body {
            Value::Object(mut fields) if fields.get("success").is_some_and(Value::is_boolean) => {
                fields.insert("status".to_string(), Value::from(status));
                serde_json::from_value::<ToolResult>(Value::Object(fields))
                    .map_err(|e| ToolError::Decode(format!("tool '{name}' envelope: {e}")))?
            }
            data => {
                let mut result = ToolResult::ok(data);
                result.status = status;
                result
            }
        };

        tracing::debug!(tool = name, status, success = result.success, "tool call completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::respond_once;
    use serde_json::json;

    fn params() -> Map<String, Value> {
        json!({"entity_id": "42", "priority": "high"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_body_becomes_data() {
        let (base_url, server) = respond_once(201, r#"{"task_id": 17}"#).await;
        let gateway = HttpToolGateway::new(format!("{base_url}/")).unwrap();

        let result = gateway.execute("create_task", &params()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.status, 201);
        assert_eq!(result.data, json!({"task_id": 17}));

        let captured = server.await.unwrap();
        assert!(captured.request_line.starts_with("POST /tools/create_task"));
        let sent: Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent["priority"], json!("high"));
    }

    #[tokio::test]
    async fn test_envelope_is_respected() {
        let (base_url, _server) =
            respond_once(200, r#"{"success": false, "error": "project archived"}"#).await;
        let gateway = HttpToolGateway::new(base_url).unwrap();

        let result = gateway.execute("create_task", &params()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("project archived"));
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_error_status_is_failed_result() {
        let (base_url, _server) =
            respond_once(422, r#"{"error": {"message": "missing project"}}"#).await;
        let gateway = HttpToolGateway::new(base_url).unwrap();

        let result = gateway.execute("create_task", &params()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status, 422);
        assert_eq!(result.error.as_deref(), Some("missing project"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway = HttpToolGateway::new(format!("http://{addr}")).unwrap();
        let err = gateway.execute("create_task", &params()).await.unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
    }
}
