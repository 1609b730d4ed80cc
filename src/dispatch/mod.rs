//! Enhanced HTTP request dispatcher.
//!
//! Wraps a [`Transport`] with the backend's conventions: credential and
//! device headers, response envelopes, session expiry handling, a
//! response cache, and newest-wins cancellation of identical in-flight
//! requests.
//!
//! ```rust,no_run
//! # async fn demo() -> request_optimizer::Result<()> {
//! use request_optimizer::DispatcherConfig;
//! use request_optimizer::dispatch::Dispatcher;
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::new("https://api.example.com"));
//! let user = dispatcher.get("/users/7", Some(json!({"fields": "name"}))).await?;
//! # Ok(())
//! # }
//! ```

pub mod interceptor;
pub mod request;
pub mod session;
pub mod transport;

pub use request::{
    HttpRequest, HttpResponse, Method, RequestConfig, UploadOptions, UploadRequest,
};
pub use session::{CredentialStore, LoggingHooks, MemoryCredentials, SessionHooks, UserInfo};
#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;
pub use transport::Transport;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{AbortHandle, Abortable};
use moka::sync::Cache;
use serde_json::Value;
use tracing::debug;

use crate::config::DispatcherConfig;
use crate::error::{OptimizerError, Result};
use crate::telemetry;
use crate::timer;

struct InFlight {
    id: u64,
    handle: AbortHandle,
}

type PendingMap = Arc<Mutex<HashMap<String, InFlight>>>;

/// Upper bound on the response cache lifetime; moka rejects longer ones.
const MAX_CACHE_TIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// HTTP client applying the backend's request conventions.
///
/// Cloning is cheap; clones share the cache and in-flight table.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    hooks: Arc<dyn SessionHooks>,
    cache: Cache<String, Value>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Dispatcher over [`ReqwestTransport`] with in-memory credentials and
    /// log-only hooks.
    #[cfg(feature = "reqwest-transport")]
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(config: DispatcherConfig, transport: Arc<dyn Transport>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_time_duration().min(MAX_CACHE_TIME))
            .build();
        Self {
            config: Arc::new(config),
            transport,
            credentials: Arc::new(MemoryCredentials::new()),
            hooks: Arc::new(LoggingHooks),
            cache,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Send a request and return the `data` of its response envelope.
    ///
    /// With `enable_cache`, a fresh cached response is returned without
    /// touching the network. With `enable_cancel`, an identical request
    /// still in flight is aborted and fails with
    /// [`OptimizerError::Cancelled`].
    pub async fn request(&self, config: RequestConfig) -> Result<Value> {
        let enable_cache = config.enable_cache;
        let enable_cancel = config.enable_cancel;
        let request =
            interceptor::prepare_request(config, &self.config, self.credentials.as_ref());
        let key = request.key();

        if enable_cache {
            if let Some(data) = self.cache.get(&key) {
                debug!(%key, "served from response cache");
                return Ok(data);
            }
        }

        let (handle, registration) = AbortHandle::new_pair();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _in_flight = if enable_cancel {
            if let Some(previous) = lock(&self.pending).insert(key.clone(), InFlight { id, handle }) {
                previous.handle.abort();
                debug!(%key, "superseded in-flight request");
            }
            Some(InFlightGuard {
                pending: self.pending.clone(),
                key: key.clone(),
                id,
            })
        } else {
            None
        };

        let timeout = request.timeout;
        let send = timer::with_timeout(timeout, self.transport.send(request));
        let response = match Abortable::new(send, registration).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(interceptor::handle_transport_error(e, self.hooks.as_ref())),
            Err(_aborted) => {
                metrics::counter!(telemetry::DISPATCH_CANCELLED_TOTAL).increment(1);
                debug!(%key, "request cancelled");
                return Err(OptimizerError::Cancelled);
            }
        };

        let data = interceptor::handle_response(response, self.credentials.as_ref(), &self.hooks)?;
        if enable_cache {
            self.cache.insert(key, data.clone());
        }
        Ok(data)
    }

    pub async fn get(&self, url: &str, params: Option<Value>) -> Result<Value> {
        self.request(with_data(RequestConfig::get(url), params)).await
    }

    pub async fn post(&self, url: &str, data: Option<Value>) -> Result<Value> {
        self.request(with_data(RequestConfig::post(url), data)).await
    }

    pub async fn put(&self, url: &str, data: Option<Value>) -> Result<Value> {
        self.request(with_data(RequestConfig::put(url), data)).await
    }

    pub async fn delete(&self, url: &str, data: Option<Value>) -> Result<Value> {
        self.request(with_data(RequestConfig::delete(url), data)).await
    }

    pub async fn patch(&self, url: &str, data: Option<Value>) -> Result<Value> {
        self.request(with_data(RequestConfig::patch(url), data)).await
    }

    /// Upload a file as multipart form data.
    pub async fn upload(
        &self,
        url: &str,
        file_path: impl Into<PathBuf>,
        options: UploadOptions,
    ) -> Result<Value> {
        let upload = interceptor::prepare_upload(
            url,
            file_path.into(),
            options,
            &self.config,
            self.credentials.as_ref(),
        );
        let response = timer::with_timeout(upload.timeout, self.transport.upload(upload))
            .await
            .map_err(|e| interceptor::handle_transport_error(e, self.hooks.as_ref()))?;
        interceptor::handle_upload_response(response, self.credentials.as_ref(), &self.hooks)
    }

    /// Drop cached responses whose key contains `pattern`, or all of them.
    pub fn clear_cache(&self, pattern: Option<&str>) {
        match pattern {
            Some(pattern) => {
                let matching: Vec<Arc<String>> = self
                    .cache
                    .iter()
                    .map(|(key, _)| key)
                    .filter(|key| key.contains(pattern))
                    .collect();
                for key in matching {
                    self.cache.invalidate(key.as_str());
                }
            }
            None => self.cache.invalidate_all(),
        }
    }

    /// Abort every in-flight request.
    pub fn cancel_all(&self) {
        let drained: Vec<InFlight> = lock(&self.pending).drain().map(|(_, f)| f).collect();
        for in_flight in drained {
            in_flight.handle.abort();
        }
    }

    /// Live cached responses. Runs pending cache maintenance first, so
    /// expired and invalidated entries are not counted.
    pub fn cache_len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Requests registered for cancellation.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn with_data(config: RequestConfig, data: Option<Value>) -> RequestConfig {
    match data {
        Some(data) => config.data(data),
        None => config,
    }
}

/// Unregisters a request when it settles, unless a newer one took its key.
struct InFlightGuard {
    pending: PendingMap,
    key: String,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut pending = lock(&self.pending);
        if pending.get(&self.key).is_some_and(|f| f.id == self.id) {
            pending.remove(&self.key);
        }
    }
}
