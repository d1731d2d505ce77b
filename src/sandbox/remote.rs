//! HTTP client for the remote sandbox service
//!
//! ```text
//! POST   /sandboxes                    {template?, env_vars, metadata} → {sandbox_id}
//! POST   /sandboxes/{id}/execute       {code, timeout_ms}             → RunOutput
//! PUT    /sandboxes/{id}/files?path=…  raw bytes
//! DELETE /sandboxes/{id}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::backend::{BackendError, CreateSandbox, RunOutput, SandboxBackend};

#[derive(Deserialize)]
struct CreateResponse {
    sandbox_id: String,
}

/// Client for the sandbox service API
#[derive(Clone)]
pub struct RemoteSandboxClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteSandboxClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - service root, e.g. `https://sandbox.internal:3000`
    /// * `api_key` - sent as a bearer token when present
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(
        sandbox_id: Option<&str>,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            if let Some(id) = sandbox_id {
                return Err(BackendError::NotFound(id.to_string()));
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SandboxBackend for RemoteSandboxClient {
    async fn create(&self, request: &CreateSandbox) -> Result<String, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "/sandboxes")
            .json(request)
            .send()
            .await?;
        let created: CreateResponse = Self::check(None, response).await?.json().await?;
        Ok(created.sandbox_id)
    }

    async fn run(
        &self,
        sandbox_id: &str,
        code: &str,
        timeout: Duration,
    ) -> Result<RunOutput, BackendError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/sandboxes/{}/execute", sandbox_id),
            )
            .json(&serde_json::json!({
                "code": code,
                "timeout_ms": timeout.as_millis() as u64,
            }))
            .send()
            .await?;
        Ok(Self::check(Some(sandbox_id), response).await?.json().await?)
    }

    async fn write_file(&self, sandbox_id: &str, path: &str, bytes: &[u8]) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/sandboxes/{}/files", sandbox_id))
            .query(&[("path", path)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check(Some(sandbox_id), response).await?;
        Ok(())
    }

    async fn destroy(&self, sandbox_id: &str) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/sandboxes/{}", sandbox_id))
            .send()
            .await?;
        Self::check(Some(sandbox_id), response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_sends_template_and_secrets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "template": "skills-v2",
                "env_vars": {"DATA_TOKEN": "t0k"}
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"sandbox_id": "sbx-1"})),
            )
            .mount(&server)
            .await;

        let client = RemoteSandboxClient::new(server.uri(), Some("sk-test".into()));
        let mut request = CreateSandbox {
            template: Some("skills-v2".into()),
            ..Default::default()
        };
        request.env_vars.insert("DATA_TOKEN".into(), "t0k".into());

        assert_eq!(client.create(&request).await.unwrap(), "sbx-1");
    }

    #[tokio::test]
    async fn test_run_parses_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes/sbx-1/execute"))
            .and(body_partial_json(serde_json::json!({"code": "print(2+2)", "timeout_ms": 60000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "stdout": [{"text": "4\n", "timestamp": 10}],
                "stderr": [],
                "results": [{"png": "iVBORw0"}],
                "error": null
            })))
            .mount(&server)
            .await;

        let client = RemoteSandboxClient::new(server.uri(), None);
        let output = client
            .run("sbx-1", "print(2+2)", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(output.stdout[0].text, "4\n");
        assert_eq!(output.results[0].png.as_deref(), Some("iVBORw0"));
        assert!(output.error.is_none());
    }

    #[tokio::test]
    async fn test_write_file_and_destroy() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/sandboxes/sbx-1/files"))
            .and(query_param("path", "/home/user/data.csv"))
            .and(body_bytes(b"a,b\n1,2\n".to_vec()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/sandboxes/sbx-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = RemoteSandboxClient::new(server.uri(), None);
        client
            .write_file("sbx-1", "/home/user/data.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        client.destroy("sbx-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_sandbox_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RemoteSandboxClient::new(server.uri(), None);
        let err = client.destroy("gone").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(id) if id == "gone"));
    }
}
