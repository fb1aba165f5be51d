use crate::domain::models::{GraphPreferences, Site, Token};
use crate::infrastructure::error::ApiError;
use crate::infrastructure::secure_store::SecureStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::warn;

const PREFERENCES_SCHEMA: u8 = 1;
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Broadcast after every session write so dependents can react to
/// login/logout transitions without polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    TokenChanged,
    SiteChanged,
    PreferencesChanged,
    LoggedOut,
}

#[derive(Debug, Serialize, Deserialize)]
struct PreferencesFile {
    schema: u8,
    site: Option<Site>,
    graph: Option<GraphPreferences>,
}

#[derive(Debug, Default)]
struct CachedState {
    token: Option<Token>,
    site: Option<Site>,
    graph: Option<GraphPreferences>,
}

/// Owns the current credential, the selected site and display preferences.
/// The token lives in the platform secret store; site and preferences live
/// in a schema-tagged JSON file. Reads are served from an in-memory cache
/// that only advances on successful persistence.
pub struct SessionStore {
    secure: Arc<dyn SecureStore>,
    preferences_path: PathBuf,
    state: Mutex<CachedState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Loads persisted state. An unreadable secret store or preferences file
    /// degrades to a signed-out session rather than failing.
    pub fn open(secure: Arc<dyn SecureStore>, preferences_path: PathBuf) -> Self {
        let token = match secure.get() {
            Ok(Some(blob)) => match serde_json::from_slice::<Token>(&blob) {
                Ok(token) => Some(token),
                Err(error) => {
                    warn!(%error, "stored token is unreadable, treating as signed out");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "secure store unavailable, treating as signed out");
                None
            }
        };

        let (site, graph) = match Self::read_preferences(&preferences_path) {
            Ok(Some(file)) => (file.site, file.graph),
            Ok(None) => (None, None),
            Err(error) => {
                warn!(%error, "preferences file is unreadable, using defaults");
                (None, None)
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            secure,
            preferences_path,
            state: Mutex::new(CachedState { token, site, graph }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn token(&self) -> Option<Token> {
        self.state.lock().ok().and_then(|state| state.token.clone())
    }

    pub fn site(&self) -> Option<Site> {
        self.state.lock().ok().and_then(|state| state.site.clone())
    }

    pub fn graph_preferences(&self) -> Option<GraphPreferences> {
        self.state.lock().ok().and_then(|state| state.graph)
    }

    pub fn set_token(&self, token: Option<Token>) -> Result<(), ApiError> {
        match &token {
            Some(token) => {
                let blob = serde_json::to_vec(token)
                    .map_err(|error| ApiError::Credential(error.to_string()))?;
                self.secure.set(&blob)?;
            }
            None => self.secure.delete()?,
        }

        self.with_state(|state| state.token = token)?;
        let _ = self.events.send(SessionEvent::TokenChanged);
        Ok(())
    }

    pub fn set_site(&self, site: Option<Site>) -> Result<(), ApiError> {
        let graph = self.graph_preferences();
        self.write_preferences(site.clone(), graph)?;
        self.with_state(|state| state.site = site)?;
        let _ = self.events.send(SessionEvent::SiteChanged);
        Ok(())
    }

    pub fn set_graph_preferences(&self, graph: Option<GraphPreferences>) -> Result<(), ApiError> {
        let site = self.site();
        self.write_preferences(site, graph)?;
        self.with_state(|state| state.graph = graph)?;
        let _ = self.events.send(SessionEvent::PreferencesChanged);
        Ok(())
    }

    /// Clears the credential, site and preferences in one observable
    /// transition: dependents see a single `LoggedOut` event.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.secure.delete()?;
        self.write_preferences(None, None)?;
        self.with_state(|state| {
            state.token = None;
            state.site = None;
            state.graph = None;
        })?;
        let _ = self.events.send(SessionEvent::LoggedOut);
        Ok(())
    }

    fn with_state(&self, update: impl FnOnce(&mut CachedState)) -> Result<(), ApiError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| ApiError::Storage(format!("session state lock poisoned: {error}")))?;
        update(&mut state);
        Ok(())
    }

    fn read_preferences(path: &Path) -> Result<Option<PreferencesFile>, ApiError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|error| ApiError::Storage(format!("failed reading preferences: {error}")))?;
        let file = serde_json::from_str::<PreferencesFile>(&raw)
            .map_err(|error| ApiError::Storage(format!("invalid preferences file: {error}")))?;
        if file.schema != PREFERENCES_SCHEMA {
            return Err(ApiError::Storage(format!(
                "unsupported preferences schema {}",
                file.schema
            )));
        }
        Ok(Some(file))
    }

    fn write_preferences(
        &self,
        site: Option<Site>,
        graph: Option<GraphPreferences>,
    ) -> Result<(), ApiError> {
        let file = PreferencesFile {
            schema: PREFERENCES_SCHEMA,
            site,
            graph,
        };
        let formatted = serde_json::to_string_pretty(&file)
            .map_err(|error| ApiError::Storage(error.to_string()))?;
        fs::write(&self.preferences_path, format!("{formatted}\n"))
            .map_err(|error| ApiError::Storage(format!("failed writing preferences: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::secure_store::testing::FailableSecureStore;
    use crate::infrastructure::secure_store::InMemorySecureStore;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn sample_token(auth: &str) -> Token {
        Token {
            auth: auth.to_string(),
            refresh: "refresh".to_string(),
            valid_until: Utc::now() + Duration::hours(1),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> (Arc<InMemorySecureStore>, SessionStore) {
        let secure = Arc::new(InMemorySecureStore::default());
        let store = SessionStore::open(
            Arc::clone(&secure) as Arc<dyn SecureStore>,
            dir.path().join("preferences.json"),
        );
        (secure, store)
    }

    #[test]
    fn token_survives_a_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (secure, store) = store_in(&dir);
        let token = sample_token("persisted");
        store.set_token(Some(token.clone())).expect("set token");

        let reopened = SessionStore::open(
            secure as Arc<dyn SecureStore>,
            dir.path().join("preferences.json"),
        );
        assert_eq!(reopened.token(), Some(token));
    }

    #[test]
    fn site_and_preferences_survive_a_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (secure, store) = store_in(&dir);
        let site = Site {
            id: 1_234_567,
            name: "Home".to_string(),
        };
        let graph = GraphPreferences {
            battery: true,
            solar: false,
            house: true,
            grid: false,
        };
        store.set_site(Some(site.clone())).expect("set site");
        store
            .set_graph_preferences(Some(graph))
            .expect("set preferences");

        let reopened = SessionStore::open(
            secure as Arc<dyn SecureStore>,
            dir.path().join("preferences.json"),
        );
        assert_eq!(reopened.site(), Some(site));
        assert_eq!(reopened.graph_preferences(), Some(graph));
    }

    #[test]
    fn every_write_emits_one_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, store) = store_in(&dir);
        let mut events = store.subscribe();

        store
            .set_token(Some(sample_token("a")))
            .expect("set token");
        store
            .set_site(Some(Site {
                id: 1,
                name: "Home".to_string(),
            }))
            .expect("set site");
        store
            .set_graph_preferences(Some(GraphPreferences::default()))
            .expect("set preferences");

        assert_eq!(events.try_recv(), Ok(SessionEvent::TokenChanged));
        assert_eq!(events.try_recv(), Ok(SessionEvent::SiteChanged));
        assert_eq!(events.try_recv(), Ok(SessionEvent::PreferencesChanged));
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn logout_clears_everything_with_a_single_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, store) = store_in(&dir);
        store
            .set_token(Some(sample_token("a")))
            .expect("set token");
        store
            .set_site(Some(Site {
                id: 1,
                name: "Home".to_string(),
            }))
            .expect("set site");
        store
            .set_graph_preferences(Some(GraphPreferences::default()))
            .expect("set preferences");

        let mut events = store.subscribe();
        store.logout().expect("logout");

        assert_eq!(store.token(), None);
        assert_eq!(store.site(), None);
        assert_eq!(store.graph_preferences(), None);
        assert_eq!(events.try_recv(), Ok(SessionEvent::LoggedOut));
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn failed_persistence_keeps_the_last_successful_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let secure = Arc::new(FailableSecureStore::default());
        let store = SessionStore::open(
            Arc::clone(&secure) as Arc<dyn SecureStore>,
            dir.path().join("preferences.json"),
        );

        let good = sample_token("good");
        store.set_token(Some(good.clone())).expect("set token");

        secure.set_failing(true);
        let result = store.set_token(Some(sample_token("bad")));
        assert!(matches!(result, Err(ApiError::Credential(_))));
        assert_eq!(store.token(), Some(good));
    }

    #[test]
    fn unavailable_secure_store_degrades_to_signed_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let secure = Arc::new(FailableSecureStore::default());
        secure.set_failing(true);
        let store = SessionStore::open(
            secure as Arc<dyn SecureStore>,
            dir.path().join("preferences.json"),
        );
        assert_eq!(store.token(), None);
    }

    #[test]
    fn corrupt_preferences_file_degrades_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{ not json").expect("write corrupt file");

        let store = SessionStore::open(Arc::new(InMemorySecureStore::default()), path);
        assert_eq!(store.site(), None);
        assert_eq!(store.graph_preferences(), None);
    }

    fn token_pattern() -> impl Strategy<Value = String> {
        "[A-Za-z0-9._\\-]{1,64}"
    }

    proptest! {
        #[test]
        fn token_roundtrip_through_secure_store(
            auth in token_pattern(),
            refresh in token_pattern(),
            valid_for_seconds in -604_800i64..604_800i64,
            subsec_millis in 0i64..1000i64,
        ) {
            let dir = tempfile::tempdir().expect("tempdir");
            let (secure, store) = store_in(&dir);
            let token = Token {
                auth,
                refresh,
                valid_until: Utc::now()
                    + Duration::seconds(valid_for_seconds)
                    + Duration::milliseconds(subsec_millis),
            };
            store.set_token(Some(token.clone())).expect("set token");

            let reopened = SessionStore::open(
                secure as Arc<dyn SecureStore>,
                dir.path().join("preferences.json"),
            );
            prop_assert_eq!(reopened.token(), Some(token));
        }
    }
}
