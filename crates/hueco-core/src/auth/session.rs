use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Credentials, StoreError, TokenStore};

/// Publishes whether a session is active, derived from the token store.
///
/// Navigation subscribes to this and sends the user to login on `false`.
pub struct SessionState {
    store: Arc<TokenStore>,
    tokens: watch::Receiver<Credentials>,
    active: Arc<watch::Sender<bool>>,
    observer: JoinHandle<()>,
}

impl SessionState {
    /// Start observing `store`. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<TokenStore>) -> Self {
        let tokens = store.subscribe();
        let (observed, initial) = seed(&store);
        let (active, _) = watch::channel(initial);
        let active = Arc::new(active);

        let observer = tokio::spawn(observe(observed, active.clone()));

        Self {
            store,
            tokens,
            active,
            observer,
        }
    }

    /// Whether the store currently holds a usable access token.
    pub fn is_active(&self) -> bool {
        self.tokens.borrow().is_active()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    /// Every change of the active flag, starting after the current value.
    pub fn changes(&self) -> impl Stream<Item = bool> + Send + 'static {
        futures::stream::unfold(self.subscribe(), |mut rx| async move {
            rx.changed().await.ok()?;
            let active = *rx.borrow_and_update();
            Some((active, rx))
        })
    }

    /// Clear the tokens and publish `false` right away.
    ///
    /// Subscribers are told even if the backend fails to delete the tokens;
    /// the error is still returned.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let result = self.store.clear().await;
        self.active.send_replace(false);
        info!("Logged out");
        result
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.observer.abort();
    }
}

/// Subscribe to the store and read the initial flag from that same receiver.
///
/// A save landing after the read is still pending on the receiver, so the
/// observer publishes it instead of missing it.
fn seed(store: &TokenStore) -> (watch::Receiver<Credentials>, bool) {
    let mut observed = store.subscribe();
    let active = observed.borrow_and_update().is_active();
    (observed, active)
}

async fn observe(mut tokens: watch::Receiver<Credentials>, active: Arc<watch::Sender<bool>>) {
    while tokens.changed().await.is_ok() {
        let is_active = tokens.borrow_and_update().is_active();
        active.send_if_modified(|current| {
            if *current == is_active {
                return false;
            }
            *current = is_active;
            true
        });
        debug!(active = is_active, "Session state updated");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_starts_from_stored_tokens() {
        let store = Arc::new(TokenStore::in_memory());
        store.save(Some("X"), Some("R")).await.unwrap();

        let session = SessionState::spawn(store);
        assert!(session.is_active());
        assert!(*session.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_active_immediately_after_save() {
        let store = Arc::new(TokenStore::in_memory());
        let session = SessionState::spawn(store.clone());
        assert!(!session.is_active());

        store.save(Some("X"), Some("R")).await.unwrap();
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_inactive_immediately_after_clear() {
        let store = Arc::new(TokenStore::in_memory());
        store.save(Some("X"), Some("R")).await.unwrap();
        let session = SessionState::spawn(store.clone());

        store.clear().await.unwrap();
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_logout_publishes_false_without_waiting() {
        let store = Arc::new(TokenStore::in_memory());
        store.save(Some("X"), Some("R")).await.unwrap();
        let session = SessionState::spawn(store.clone());
        let rx = session.subscribe();

        session.logout().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!session.is_active());
        assert_eq!(store.refresh_token().await, None);
    }

    #[tokio::test]
    async fn test_subscribers_follow_store_changes() {
        let store = Arc::new(TokenStore::in_memory());
        let session = SessionState::spawn(store.clone());
        let mut rx = session.subscribe();

        store.save(Some("X"), None).await.unwrap();
        tokio::time::timeout(WAIT, rx.wait_for(|active| *active))
            .await
            .expect("timed out waiting for active")
            .unwrap();

        store.clear().await.unwrap();
        tokio::time::timeout(WAIT, rx.wait_for(|active| !*active))
            .await
            .expect("timed out waiting for inactive")
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_between_seed_and_observer_start_is_published() {
        let store = Arc::new(TokenStore::in_memory());
        let (observed, seeded) = seed(&store);
        assert!(!seeded);

        // Lands after the seed was read but before the observer runs
        store.save(Some("X"), Some("R")).await.unwrap();

        let active = Arc::new(watch::channel(seeded).0);
        let mut rx = active.subscribe();
        let observer = tokio::spawn(observe(observed, active.clone()));

        tokio::time::timeout(WAIT, rx.wait_for(|active| *active))
            .await
            .expect("save was never published")
            .unwrap();
        observer.abort();
    }

    #[tokio::test]
    async fn test_blank_token_is_not_a_session() {
        let store = Arc::new(TokenStore::in_memory());
        let session = SessionState::spawn(store.clone());
        store.save(Some(" "), Some("R")).await.unwrap();
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_changes_stream_reports_transitions() {
        let store = Arc::new(TokenStore::in_memory());
        let session = SessionState::spawn(store.clone());
        let mut changes = Box::pin(session.changes());

        store.save(Some("X"), Some("R")).await.unwrap();
        let first = tokio::time::timeout(WAIT, changes.next()).await.unwrap();
        assert_eq!(first, Some(true));

        session.logout().await.unwrap();
        let second = tokio::time::timeout(WAIT, changes.next()).await.unwrap();
        assert_eq!(second, Some(false));
    }
}
