use crate::domain::models::Token;
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::session_store::SessionStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Deadline for a single refresh round-trip. Without one a hung request
/// would occupy the in-flight slot indefinitely.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

type RefreshResult = Result<Token, ApiError>;
type RefreshReceiver = watch::Receiver<Option<RefreshResult>>;
type RefreshSlot = Arc<Mutex<Option<RefreshReceiver>>>;

/// Clears the in-flight slot on drop, so the slot frees up on success,
/// failure and task cancellation alike.
struct SlotGuard {
    slot: RefreshSlot,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }
}

/// Hands out bearer tokens and guarantees at most one refresh request is in
/// flight per manager: concurrent callers all wait on the same result.
pub struct TokenManager {
    auth_client: AuthClient,
    session: Arc<SessionStore>,
    inflight: RefreshSlot,
    refresh_timeout: Duration,
}

impl TokenManager {
    pub fn new(auth_client: AuthClient, session: Arc<SessionStore>) -> Self {
        Self {
            auth_client,
            session,
            inflight: Arc::new(Mutex::new(None)),
            refresh_timeout: REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Returns a usable token. A valid cached token is returned without any
    /// network traffic unless `force_refresh` is set; otherwise callers
    /// share whatever refresh is already in flight, or start one.
    pub async fn access_token(&self, force_refresh: bool) -> RefreshResult {
        let receiver = {
            let mut slot = self
                .inflight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(receiver) = slot.as_ref() {
                receiver.clone()
            } else {
                let token = self.session.token().ok_or(ApiError::NotLoggedIn)?;
                if token.is_valid() && !force_refresh {
                    return Ok(token);
                }
                let receiver = self.start_refresh(token.refresh);
                *slot = Some(receiver.clone());
                receiver
            }
        };
        self.wait_for_result(receiver).await
    }

    fn start_refresh(&self, refresh_token: String) -> RefreshReceiver {
        let (sender, receiver) = watch::channel::<Option<RefreshResult>>(None);
        let guard = SlotGuard {
            slot: Arc::clone(&self.inflight),
        };
        let auth_client = self.auth_client.clone();
        let session = Arc::clone(&self.session);
        let timeout = self.refresh_timeout;

        tokio::spawn(async move {
            debug!("starting access token refresh");
            let result = Self::run_refresh(auth_client, session, refresh_token, timeout).await;
            match &result {
                Ok(_) => info!("access token refreshed"),
                Err(error) => warn!(%error, "access token refresh failed"),
            }
            // Free the slot before waking waiters, so a caller reacting to
            // this result can immediately start a new refresh.
            drop(guard);
            let _ = sender.send(Some(result));
        });

        receiver
    }

    async fn run_refresh(
        auth_client: AuthClient,
        session: Arc<SessionStore>,
        refresh_token: String,
        timeout: Duration,
    ) -> RefreshResult {
        let refreshed = match tokio::time::timeout(timeout, auth_client.refresh(&refresh_token)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(ApiError::Timeout),
        };

        // A logout that happened while the request was in flight wins: the
        // refreshed credential must not resurrect the cleared session.
        if session.token().is_none() {
            return Err(ApiError::NotLoggedIn);
        }

        session.set_token(Some(refreshed.clone()))?;
        Ok(refreshed)
    }

    async fn wait_for_result(&self, mut receiver: RefreshReceiver) -> RefreshResult {
        loop {
            {
                let value = receiver.borrow_and_update();
                if let Some(result) = value.as_ref() {
                    return result.clone();
                }
            }
            if receiver.changed().await.is_err() {
                // The refresh task vanished without publishing a result;
                // make sure its slot entry cannot linger.
                self.clear_slot_if_same(&receiver);
                return Err(ApiError::Network(
                    "token refresh was interrupted".to_string(),
                ));
            }
        }
    }

    fn clear_slot_if_same(&self, receiver: &RefreshReceiver) {
        let mut slot = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot
            .as_ref()
            .is_some_and(|current| current.same_channel(receiver))
        {
            *slot = None;
        }
    }
}
