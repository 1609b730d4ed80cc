//! HTTP transport abstraction.

use async_trait::async_trait;

use super::request::{HttpRequest, HttpResponse, UploadRequest};
use crate::error::{OptimizerError, Result};

/// Sends intercepted requests.
///
/// Implementations report connection failures as
/// [`OptimizerError::Network`] and expired deadlines as
/// [`OptimizerError::Timeout`]. Any HTTP status, including errors, is a
/// successful send; the dispatcher interprets it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Multipart file upload.
    async fn upload(&self, _request: UploadRequest) -> Result<HttpResponse> {
        Err(OptimizerError::Configuration(
            "transport does not support uploads".into(),
        ))
    }
}

#[cfg(feature = "reqwest-transport")]
pub use self::reqwest_impl::ReqwestTransport;

#[cfg(feature = "reqwest-transport")]
mod reqwest_impl {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;
    use reqwest::multipart::{Form, Part};
    use serde_json::Value;

    use super::Transport;
    use crate::dispatch::request::{HttpRequest, HttpResponse, Method, UploadRequest};
    use crate::error::{OptimizerError, Result};

    /// [`Transport`] backed by a shared `reqwest` client.
    #[derive(Clone, Default)]
    pub struct ReqwestTransport {
        http: Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Use a preconfigured client (proxies, TLS roots, ...).
        pub fn with_client(http: Client) -> Self {
            Self { http }
        }
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }

    fn map_error(err: reqwest::Error, timeout: Duration) -> OptimizerError {
        if err.is_timeout() {
            OptimizerError::Timeout(timeout)
        } else {
            OptimizerError::Network(err.to_string())
        }
    }

    async fn into_response(
        response: reqwest::Response,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| map_error(e, timeout))?;
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => Value::String(text),
        };
        Ok(HttpResponse { status, body })
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let mut builder = self
                .http
                .request(method(request.method), &request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| map_error(e, request.timeout))?;
            into_response(response, request.timeout).await
        }

        async fn upload(&self, request: UploadRequest) -> Result<HttpResponse> {
            let bytes = tokio::fs::read(&request.file_path).await.map_err(|e| {
                OptimizerError::InvalidInput(format!(
                    "failed to read upload file {:?}: {e}",
                    request.file_path
                ))
            })?;
            let file_name = request
                .file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let mut form = Form::new();
            for (name, value) in request.form_data {
                form = form.text(name, value);
            }
            form = form.part(request.name, Part::bytes(bytes).file_name(file_name));

            let mut builder = self
                .http
                .post(&request.url)
                .timeout(request.timeout)
                .multipart(form);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| map_error(e, request.timeout))?;
            into_response(response, request.timeout).await
        }
    }
}
