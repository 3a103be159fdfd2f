//! Authentication session context.
//!
//! [`Session`] owns the bearer token used by [`ApiClient`](crate::ApiClient).
//! It is created once and shared via `Arc<Session>`; nothing in the
//! workspace keeps the token in global state. The refresh token itself
//! lives in an HTTP-only cookie held by the HTTP client's cookie store and
//! is never visible here.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Shared authentication state.
#[derive(Debug, Default)]
pub struct Session {
    access_token: RwLock<Option<String>>,
    /// Serializes token refreshes so concurrent 401s trigger one refresh.
    refresh_lock: Mutex<()>,
    /// Set when the backend refused a refresh; cleared by a new token.
    refresh_refused: AtomicBool,
}

impl Session {
    /// An anonymous session.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that starts with a known access token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            access_token: RwLock::new(Some(token.into())),
            ..Self::default()
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
        self.refresh_refused.store(false, Ordering::SeqCst);
    }

    /// Forget the access token (sign-out or failed refresh).
    pub async fn clear(&self) {
        *self.access_token.write().await = None;
    }

    /// Forget the access token after the backend refused to refresh it.
    ///
    /// Until a new token is set, further refreshes are pointless and
    /// [`refresh_refused`](Self::refresh_refused) reports `true`.
    pub async fn refuse_refresh(&self) {
        self.clear().await;
        self.refresh_refused.store(true, Ordering::SeqCst);
    }

    pub fn refresh_refused(&self) -> bool {
        self.refresh_refused.load(Ordering::SeqCst)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// Acquire the single-flight refresh guard.
    ///
    /// Holders must re-check [`access_token`](Self::access_token) after
    /// acquiring: if it differs from the token that was rejected, another
    /// caller already refreshed and no new refresh is needed.
    pub async fn refresh_guard(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}
