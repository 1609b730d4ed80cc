//! Request and response types used by the dispatcher and its transports.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as issued by application code, before interception.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    /// Absolute URL, or a path relative to the dispatcher's base URL.
    pub url: String,
    pub method: Method,
    pub data: Option<Value>,
    /// Merged over the dispatcher's default headers.
    pub headers: BTreeMap<String, String>,
    /// Overrides the dispatcher's timeout.
    pub timeout: Option<Duration>,
    /// Serve from and store into the response cache. Default: false.
    pub enable_cache: bool,
    /// Abort an identical in-flight request when this one starts. Default: true.
    pub enable_cancel: bool,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: None,
            headers: BTreeMap::new(),
            timeout: None,
            enable_cache: false,
            enable_cancel: true,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.enable_cache = enabled;
        self
    }

    pub fn enable_cancel(mut self, enabled: bool) -> Self {
        self.enable_cancel = enabled;
        self
    }
}

/// A fully intercepted request, ready for a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// JSON body. Always `None` for GET, whose data moves into the query.
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// Identity used for caching and newest-wins cancellation:
    /// `"{METHOD}:{url}:{body json}"`, with `{}` for a missing body.
    pub fn key(&self) -> String {
        let body = self
            .body
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());
        format!("{}:{}:{}", self.method, self.url, body)
    }
}

/// Raw transport response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Decoded JSON body; a body that is not JSON is kept as a string.
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Options for [`Dispatcher::upload`](super::Dispatcher::upload).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Multipart field name of the file. Default: `file`.
    pub name: Option<String>,
    pub form_data: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_data.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A fully intercepted multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub url: String,
    pub file_path: PathBuf,
    pub name: String,
    pub form_data: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}
