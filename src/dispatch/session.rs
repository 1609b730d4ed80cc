//! Credential storage and user-facing session hooks.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

/// Identity of the signed-in user, reported in `X-User-Id`/`X-User-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    /// Defaults to `user` when absent.
    pub user_type: Option<String>,
}

impl UserInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_type: None,
        }
    }

    pub fn user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = Some(user_type.into());
        self
    }
}

/// Source of the bearer token and user identity.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn user(&self) -> Option<UserInfo>;

    /// Forget the token and user, e.g. after the session expired.
    fn clear(&self);
}

/// In-process [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    inner: RwLock<Stored>,
}

#[derive(Debug, Default)]
struct Stored {
    token: Option<String>,
    user: Option<UserInfo>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Stored> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Stored> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.write().token = Some(token.into());
    }

    pub fn set_user(&self, user: UserInfo) {
        self.write().user = Some(user);
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    fn user(&self) -> Option<UserInfo> {
        self.read().user.clone()
    }

    fn clear(&self) {
        let mut stored = self.write();
        stored.token = None;
        stored.user = None;
    }
}

/// Callbacks for user-visible side effects of a response.
pub trait SessionHooks: Send + Sync {
    /// Show a short message to the user.
    fn notify(&self, message: &str);

    /// Send the user to the login screen.
    fn redirect_to_login(&self);
}

/// [`SessionHooks`] that only emit tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl SessionHooks for LoggingHooks {
    fn notify(&self, message: &str) {
        warn!(message, "request notification");
    }

    fn redirect_to_login(&self) {
        info!("session expired, redirecting to login");
    }
}
