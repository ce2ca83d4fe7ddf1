//! Single-flight refresh coordination
//!
//! The coordinator is either `Idle` or `Refreshing`. The first 401 moves it
//! to `Refreshing` and makes that caller the leader, which owns the one
//! refresh exchange. Every other 401 that arrives meanwhile is queued.
//! When the leader finishes, the queue is handed back in issue order and the
//! state returns to `Idle`.
//!
//! The leader stores the new tokens before calling `finish`, and `enqueue`
//! compares the caller's token with the store under the same lock. A 401 that
//! lands after a burst has settled is therefore replayed, never led again.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

use super::error::ApiError;
use super::request::{join_url, ApiRequest, ApiResponse};
use crate::auth::TokenStore;

/// Continuation for a request parked during a refresh.
pub type Reply = oneshot::Sender<Result<ApiResponse, ApiError>>;

/// A caller's request waiting for the refresh outcome.
#[derive(Debug)]
pub struct PendingRequest {
    /// Issue order, assigned when the caller first sent the request
    pub seq: u64,
    pub request: ApiRequest,
    pub reply: Reply,
}

#[derive(Debug)]
enum RefreshState {
    Idle,
    Refreshing { queue: Vec<PendingRequest> },
}

/// Result of parking a request.
#[derive(Debug)]
pub enum Admission {
    /// Coordinator went Idle -> Refreshing; caller must run the exchange
    Leader,
    /// A refresh is already in flight
    Queued,
    /// The request was sent with a token the store has since replaced; it is
    /// handed back for a plain replay
    Superseded(PendingRequest),
}

#[derive(Debug)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    exchanges: AtomicU64,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
            exchanges: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Park a request that got a 401 with `used_token`. Exactly one caller
    /// per burst gets `Leader`.
    pub fn enqueue(
        &self,
        pending: PendingRequest,
        used_token: Option<&str>,
        store: &dyn TokenStore,
    ) -> Admission {
        let mut state = self.lock();
        if let RefreshState::Refreshing { queue } = &mut *state {
            queue.push(pending);
            return Admission::Queued;
        }

        let current = store.access_token();
        if current.is_some() && current.as_deref() != used_token {
            return Admission::Superseded(pending);
        }

        *state = RefreshState::Refreshing {
            queue: vec![pending],
        };
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Admission::Leader
    }

    /// Return to `Idle`, handing back the parked requests in issue order.
    pub fn finish(&self) -> Vec<PendingRequest> {
        let previous = std::mem::replace(&mut *self.lock(), RefreshState::Idle);
        match previous {
            RefreshState::Idle => Vec::new(),
            RefreshState::Refreshing { mut queue } => {
                queue.sort_by_key(|p| p.seq);
                queue
            }
        }
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of refresh exchanges started so far.
    pub fn refresh_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token pair returned by login and refresh.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchange a refresh token for a new pair. Any failure is reported as a
/// reason string; the caller turns it into `AuthIrrecoverable`.
pub async fn exchange_refresh_token(
    http: &reqwest::Client,
    base_url: &str,
    refresh_path: &str,
    refresh_token: Option<String>,
) -> Result<TokenPair, String> {
    let refresh_token = refresh_token.ok_or_else(|| "no refresh token".to_string())?;
    let url = join_url(base_url, refresh_path).map_err(|e| e.to_string())?;

    tracing::debug!("Refresh POST {}", url);
    let resp = http
        .post(url)
        .json(&RefreshRequest {
            refresh_token: &refresh_token,
        })
        .send()
        .await
        .map_err(|e| format!("refresh request failed: {}", e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(format!("refresh rejected with HTTP {}", status.as_u16()));
    }

    resp.json::<TokenPair>()
        .await
        .map_err(|e| format!("invalid refresh response: {}", e))
}
