//! Request, upload, response and error interceptors.
//!
//! Requests are decorated with credentials, device headers and a
//! timestamp before they reach the transport. Responses are expected in
//! the backend's envelope:
//!
//! ```json
//! { "code": 0, "message": "ok", "data": { ... } }
//! ```
//!
//! Only `data` of a successful envelope reaches the caller. Everything
//! else becomes an [`OptimizerError`] after the user has been notified
//! through the [`SessionHooks`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::request::{HttpRequest, HttpResponse, Method, RequestConfig, UploadOptions, UploadRequest};
use super::session::{CredentialStore, SessionHooks};
use crate::config::DispatcherConfig;
use crate::error::{OptimizerError, Result, unix_millis};
use crate::timer;

/// Business code of a successful envelope.
pub const SUCCESS_CODE: i64 = 0;

/// Pause between an expired-session notice and the login redirect.
pub const LOGIN_REDIRECT_DELAY: Duration = Duration::from_millis(1_500);

const UNAUTHORIZED: i64 = 401;
const FORBIDDEN: i64 = 403;
const NOT_FOUND: i64 = 404;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Resolve the URL, merge headers and move GET data into the query string.
pub fn prepare_request(
    config: RequestConfig,
    settings: &DispatcherConfig,
    credentials: &dyn CredentialStore,
) -> HttpRequest {
    let mut url = resolve_url(&config.url, settings);

    let mut headers = settings.headers.clone();
    headers.extend(config.headers);
    if let Some(token) = credentials.token() {
        headers.insert("Authorization".into(), format!("Bearer {token}"));
    }
    if let Some(user) = credentials.user() {
        headers.insert("X-User-Id".into(), user.id);
        headers.insert(
            "X-User-Type".into(),
            user.user_type.unwrap_or_else(|| "user".to_string()),
        );
    }
    headers.insert("X-Platform".into(), settings.platform.clone());
    headers.insert("X-Version".into(), settings.system_version.clone());
    headers.insert("X-App-Version".into(), settings.app_version.clone());
    headers.insert(
        "X-Timestamp".into(),
        unix_millis(SystemTime::now()).to_string(),
    );

    let mut body = config.data;
    if config.method == Method::Get {
        if let Some(query) = body.take().as_ref().and_then(query_string) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
    }

    let request = HttpRequest {
        method: config.method,
        url,
        headers,
        body,
        timeout: config.timeout.unwrap_or_else(|| settings.timeout_duration()),
    };
    debug!(method = %request.method, url = %request.url, "request prepared");
    request
}

/// Decorate an upload with credentials. `Content-Type` is left to the
/// transport, which must set the multipart boundary.
pub fn prepare_upload(
    url: &str,
    file_path: PathBuf,
    options: UploadOptions,
    settings: &DispatcherConfig,
    credentials: &dyn CredentialStore,
) -> UploadRequest {
    let mut headers = options.headers;
    if let Some(token) = credentials.token() {
        headers.insert("Authorization".into(), format!("Bearer {token}"));
    }
    if let Some(user) = credentials.user() {
        headers.insert("X-User-Id".into(), user.id);
        headers.insert(
            "X-User-Type".into(),
            user.user_type.unwrap_or_else(|| "user".to_string()),
        );
    }
    headers.remove("Content-Type");

    let request = UploadRequest {
        url: resolve_url(url, settings),
        file_path,
        name: options.name.unwrap_or_else(|| "file".to_string()),
        form_data: options.form_data,
        headers,
        timeout: settings.timeout_duration(),
    };
    debug!(url = %request.url, file = ?request.file_path, "upload prepared");
    request
}

fn resolve_url(url: &str, settings: &DispatcherConfig) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("{}{}", settings.base_url, url)
    }
}

/// Encode the non-null fields of a JSON object as a query string.
fn query_string(data: &Value) -> Option<String> {
    let fields = data.as_object()?;
    let pairs: Vec<String> = fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&value)
            )
        })
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("&"))
}

/// Unwrap a response envelope.
pub fn handle_response(
    response: HttpResponse,
    credentials: &dyn CredentialStore,
    hooks: &Arc<dyn SessionHooks>,
) -> Result<Value> {
    if response.status != 200 {
        return Err(http_error(response.status, hooks.as_ref()));
    }
    unwrap_envelope(response.body, "request failed", credentials, hooks)
}

/// Unwrap an upload response, whose envelope may arrive as a JSON string.
pub fn handle_upload_response(
    response: HttpResponse,
    credentials: &dyn CredentialStore,
    hooks: &Arc<dyn SessionHooks>,
) -> Result<Value> {
    if response.status != 200 {
        return Err(http_error(response.status, hooks.as_ref()));
    }
    let body = match response.body {
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
            hooks.notify("failed to parse response data");
            OptimizerError::Decode(e.to_string())
        })?,
        other => other,
    };
    unwrap_envelope(body, "upload failed", credentials, hooks)
}

/// Notify the user about a transport failure and pass it on.
pub fn handle_transport_error(err: OptimizerError, hooks: &dyn SessionHooks) -> OptimizerError {
    match &err {
        OptimizerError::Network(_) => {
            hooks.notify("network connection failed, please check your network")
        }
        OptimizerError::Timeout(_) => hooks.notify("request timed out, please try again later"),
        _ => {}
    }
    err
}

/// User-facing message for a non-200 HTTP status.
pub fn http_error_message(status: u16) -> &'static str {
    match status {
        400 => "invalid request parameters",
        401 => "unauthorized access",
        403 => "access forbidden",
        404 => "request address not found",
        405 => "request method not allowed",
        408 => "request timed out",
        500 => "internal server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => "network error, please try again later",
    }
}

fn http_error(status: u16, hooks: &dyn SessionHooks) -> OptimizerError {
    let message = http_error_message(status);
    hooks.notify(message);
    OptimizerError::Http {
        status,
        message: message.to_string(),
    }
}

fn unwrap_envelope(
    body: Value,
    fallback: &str,
    credentials: &dyn CredentialStore,
    hooks: &Arc<dyn SessionHooks>,
) -> Result<Value> {
    let envelope: Envelope = serde_json::from_value(body).map_err(|e| {
        hooks.notify("failed to parse response data");
        OptimizerError::Decode(e.to_string())
    })?;
    if envelope.code == SUCCESS_CODE {
        return Ok(envelope.data);
    }

    handle_business_error(envelope.code, envelope.message.as_deref(), credentials, hooks);
    Err(OptimizerError::Api {
        code: envelope.code,
        message: envelope.message.unwrap_or_else(|| fallback.to_string()),
    })
}

fn handle_business_error(
    code: i64,
    message: Option<&str>,
    credentials: &dyn CredentialStore,
    hooks: &Arc<dyn SessionHooks>,
) {
    match code {
        UNAUTHORIZED => {
            credentials.clear();
            hooks.notify(message.unwrap_or("login expired, please log in again"));
            schedule_login_redirect(hooks.clone());
        }
        FORBIDDEN => hooks.notify(message.unwrap_or("insufficient permissions")),
        NOT_FOUND => hooks.notify(message.unwrap_or("the requested resource does not exist")),
        _ => {
            if let Some(message) = message {
                hooks.notify(message);
            }
        }
    }
}

fn schedule_login_redirect(hooks: Arc<dyn SessionHooks>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                timer::sleep(LOGIN_REDIRECT_DELAY).await;
                hooks.redirect_to_login();
            });
        }
        // no runtime to delay on
        Err(_) => hooks.redirect_to_login(),
    }
}
