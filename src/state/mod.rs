pub mod channels;
pub mod identity;
pub mod questions;
pub mod rate_limit;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::ServiceError,
    state::{
        channels::RoomChannels,
        identity::IdentityRegistry,
        questions::{QuestionSource, StaticQuestions},
        rate_limit::RateLimiters,
    },
};

pub type SharedState = Arc<AppState>;

/// Central application state: the room store handle plus every process-local index.
///
/// Nothing here besides the store survives a restart; connections rebuild their
/// registry entries and group memberships through the reconnect events.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    questions: Arc<dyn QuestionSource>,
    identities: IdentityRegistry,
    channels: RoomChannels,
    rate_limiters: RateLimiters,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let questions = Arc::new(StaticQuestions::new(config.questions.clone()));
        Self::with_questions(config, questions)
    }

    /// Like [`AppState::new`] but with an explicit question source.
    pub fn with_questions(config: AppConfig, questions: Arc<dyn QuestionSource>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let limits = config.rate_limits;
        Arc::new(Self {
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            config: Arc::new(config),
            questions,
            identities: IdentityRegistry::new(),
            channels: RoomChannels::new(),
            rate_limiters: RateLimiters::new(
                limits.create_room,
                limits.join_room,
                limits.submit_answer,
            ),
        })
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current room store, or [`ServiceError::Degraded`] when none is installed.
    ///
    /// The lock is released before returning so callers never hold it across store calls.
    pub async fn require_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.room_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn questions(&self) -> &dyn QuestionSource {
        self.questions.as_ref()
    }

    /// Connection -> identity index.
    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Live connections and per-room broadcast groups.
    pub fn channels(&self) -> &RoomChannels {
        &self.channels
    }

    pub fn rate_limiters(&self) -> &RateLimiters {
        &self.rate_limiters
    }

    /// Broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::memory::MemoryRoomStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_room_store().await;
        assert!(state.require_store().await.is_err());
        assert!(*watcher.borrow_and_update());
    }
}
