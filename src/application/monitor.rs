use crate::application::energy_api::EnergyApi;
use crate::domain::models::{LiveStatus, PowerHistory};
use crate::infrastructure::error::ApiError;
use crate::infrastructure::session_store::{SessionEvent, SessionStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const LIVE_STATUS_INTERVAL: Duration = Duration::from_secs(3);
pub const HISTORY_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to a polling task. The timer is cancelled when the handle is
/// dropped or stopped, so periodic work cannot outlive the screen that
/// asked for it.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls live status every 3 seconds, publishing snapshots on the returned
/// watch channel. The poll loop ends on logout or once the session has no
/// usable credential.
pub fn watch_live_status(
    api: Arc<EnergyApi>,
    session: &SessionStore,
    site_id: i64,
) -> (watch::Receiver<Option<LiveStatus>>, PollHandle) {
    spawn_poller(session, LIVE_STATUS_INTERVAL, move || {
        let api = Arc::clone(&api);
        async move { api.live_status(site_id).await }
    })
}

/// Polls the current day's power history every 60 seconds.
pub fn watch_power_history(
    api: Arc<EnergyApi>,
    session: &SessionStore,
    site_id: i64,
) -> (watch::Receiver<Option<PowerHistory>>, PollHandle) {
    spawn_poller(session, HISTORY_INTERVAL, move || {
        let api = Arc::clone(&api);
        async move { api.power_history(site_id, None).await }
    })
}

fn spawn_poller<T, F, Fut>(
    session: &SessionStore,
    interval: Duration,
    fetch: F,
) -> (watch::Receiver<Option<T>>, PollHandle)
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    let mut events = session.subscribe();
    let (sender, receiver) = watch::channel(None);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match fetch().await {
                        Ok(value) => {
                            if sender.send(Some(value)).is_err() {
                                // Nobody is watching any more.
                                break;
                            }
                        }
                        Err(ApiError::NotLoggedIn) => {
                            debug!("session is signed out, stopping poller");
                            break;
                        }
                        Err(error) => {
                            warn!(%error, "poll failed, keeping the timer running");
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(SessionEvent::LoggedOut) | Err(RecvError::Closed) => break,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                    }
                }
            }
        }
    });

    (receiver, PollHandle { task })
}
