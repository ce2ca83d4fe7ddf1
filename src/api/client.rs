//! Authenticated HTTP client for the admin API
//!
//! `AdminClient::send` is the single entry point for feature code. It tags
//! each request with the stored access token, classifies the response and,
//! on a 401, hands the request to the refresh coordinator so that a burst of
//! failures costs exactly one refresh exchange.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::classify::{classify, Classification};
use super::error::ApiError;
use super::hooks::{ConsoleNavigator, ConsoleNotifier, Navigator, Notifier};
use super::refresh::{exchange_refresh_token, Admission, PendingRequest, RefreshCoordinator};
use super::request::{tag, ApiRequest, ApiResponse};
use crate::auth::{MemoryTokenStore, TokenStore};
use crate::config::Config;

/// Cheap to clone; clones share the token store and refresh state.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    refresh_path: String,
    store: Arc<dyn TokenStore>,
    coordinator: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    next_seq: AtomicU64,
}

impl AdminClient {
    pub fn builder() -> AdminClientBuilder {
        AdminClientBuilder::default()
    }

    /// Client wired to the console collaborators, using the config's
    /// endpoints and timeout.
    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        Self::builder()
            .base_url(&config.base_url)
            .refresh_path(&config.refresh_path)
            .timeout(config.timeout())
            .store(store)
            .navigator(Arc::new(ConsoleNavigator))
            .notifier(Arc::new(ConsoleNotifier))
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    /// Underlying transport, for calls that must bypass the refresh
    /// pipeline (login).
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Number of refresh exchanges this client has started.
    pub fn refresh_count(&self) -> u64 {
        self.inner.coordinator.refresh_count()
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Perform a request, transparently refreshing the session on 401.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let token = self.inner.store.access_token();

        let resp = self.inner.attempt(&request, token.as_deref()).await?;
        match classify(resp.status) {
            Classification::Success => Ok(resp),
            Classification::OtherError => Err(self.inner.fail(resp)),
            Classification::AuthFailure => self.on_auth_failure(seq, request, token).await,
        }
    }

    async fn on_auth_failure(
        &self,
        seq: u64,
        request: ApiRequest,
        used_token: Option<String>,
    ) -> Result<ApiResponse, ApiError> {
        let path = request.path.clone();
        let (reply, parked) = oneshot::channel();
        let pending = PendingRequest {
            seq,
            request,
            reply,
        };

        let admission = self.inner.coordinator.enqueue(
            pending,
            used_token.as_deref(),
            self.inner.store.as_ref(),
        );
        match admission {
            Admission::Superseded(pending) => {
                tracing::debug!("401 for {} with a superseded token, replaying", path);
                return self.inner.replay(&pending.request).await;
            }
            Admission::Leader => {
                tracing::info!("Access token rejected for {}, refreshing...", path);
                // Spawned so the exchange finishes even if this caller is dropped.
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run_refresh().await });
            }
            Admission::Queued => {
                tracing::debug!("Refresh in flight, queued {}", path);
            }
        }

        parked.await.unwrap_or_else(|_| {
            Err(ApiError::AuthIrrecoverable {
                reason: "refresh task ended without a result".to_string(),
            })
        })
    }
}

impl Inner {
    /// One network round trip. Transport failures are reported and returned.
    async fn attempt(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        tracing::debug!("{} {}", request.method, request.path);

        let transport = |source: reqwest::Error| ApiError::Transport {
            path: request.path.clone(),
            source,
        };

        let result = async {
            let resp = tag(request, &self.http, &self.base_url, token)?
                .send()
                .await
                .map_err(transport)?;
            let status = resp.status();
            let body = resp.text().await.map_err(transport)?;
            Ok::<_, ApiError>(ApiResponse {
                status,
                path: request.path.clone(),
                body,
            })
        }
        .await;

        if let Err(ref e) = result {
            self.notifier.notify_error(e);
        }
        result
    }

    fn fail(&self, resp: ApiResponse) -> ApiError {
        let err = ApiError::from_status(resp.status.as_u16(), &resp.path, resp.body);
        self.notifier.notify_error(&err);
        err
    }

    /// Resubmit with the current token. A second 401 is final.
    async fn replay(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.store.access_token();
        let resp = self.attempt(request, token.as_deref()).await?;
        match classify(resp.status) {
            Classification::Success => Ok(resp),
            Classification::OtherError => Err(self.fail(resp)),
            Classification::AuthFailure => {
                let err = ApiError::AuthExpired {
                    path: request.path.clone(),
                };
                self.notifier.notify_error(&err);
                Err(err)
            }
        }
    }

    /// Leader side of a refresh burst: one exchange, then settle the queue.
    async fn run_refresh(&self) {
        let refresh_token = self.store.refresh_token();
        let outcome =
            exchange_refresh_token(&self.http, &self.base_url, &self.refresh_path, refresh_token)
                .await;

        match outcome {
            Ok(pair) => {
                self.store.set_tokens(pair.token, pair.refresh_token);
                let queue = self.coordinator.finish();
                tracing::info!("Token refreshed, replaying {} request(s)", queue.len());

                // Sequential so the backend sees replays in issue order.
                for pending in queue {
                    let result = self.replay(&pending.request).await;
                    // Receiver is gone if that caller was dropped.
                    let _ = pending.reply.send(result);
                }
            }
            Err(reason) => {
                tracing::warn!("Token refresh failed: {}", reason);
                self.store.clear();
                let queue = self.coordinator.finish();
                self.navigator.redirect_to_login(&reason);

                for pending in queue {
                    let _ = pending.reply.send(Err(ApiError::AuthIrrecoverable {
                        reason: reason.clone(),
                    }));
                }
            }
        }
    }
}

/// Builder for AdminClient
#[derive(Default)]
pub struct AdminClientBuilder {
    base_url: Option<String>,
    refresh_path: Option<String>,
    timeout: Option<Duration>,
    store: Option<Arc<dyn TokenStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AdminClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<AdminClient, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Configuration("base_url is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut http = reqwest::Client::builder()
            .user_agent(concat!("shop-admin/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))?;

        let store: Arc<dyn TokenStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryTokenStore::default()),
        };
        let navigator: Arc<dyn Navigator> = match self.navigator {
            Some(navigator) => navigator,
            None => Arc::new(ConsoleNavigator),
        };
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(ConsoleNotifier),
        };

        Ok(AdminClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                refresh_path: self
                    .refresh_path
                    .unwrap_or_else(|| Config::default().refresh_path),
                store,
                coordinator: RefreshCoordinator::new(),
                navigator,
                notifier,
                next_seq: AtomicU64::new(0),
            }),
        })
    }
}
