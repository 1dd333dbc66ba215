//! The token store: sole owner of the persisted credential pair.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::StoreError;

/// Persisted key names for the two tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Access => "access_token",
            TokenKey::Refresh => "refresh_token",
        }
    }
}

/// Snapshot of the access/refresh token pair.
///
/// Both values are opaque; nothing here parses claims or expiry.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn new(access: Option<String>, refresh: Option<String>) -> Self {
        Self { access, refresh }
    }

    pub fn get(&self, key: TokenKey) -> Option<&str> {
        match key {
            TokenKey::Access => self.access.as_deref(),
            TokenKey::Refresh => self.refresh.as_deref(),
        }
    }

    /// A session is active while a non-blank access token is held.
    pub fn is_active(&self) -> bool {
        self.access
            .as_deref()
            .map(|token| !token.trim().is_empty())
            .unwrap_or(false)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("access", &redact(&self.access))
            .field("refresh", &redact(&self.refresh))
            .finish()
    }
}

/// Persistence backend for the token pair.
///
/// Implementations are plain blocking I/O; `TokenStore` serializes every call.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Credentials, StoreError>;

    fn persist(&mut self, credentials: &Credentials) -> Result<(), StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

/// Storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    credentials: Credentials,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Credentials, StoreError> {
        Ok(self.credentials.clone())
    }

    fn persist(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        self.credentials = credentials.clone();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.credentials = Credentials::default();
        Ok(())
    }
}

type SharedStorage = Arc<StdMutex<Box<dyn TokenStorage>>>;

/// Shared, injected owner of the credential pair.
///
/// Writes hold `writer` across persistence and publication, so once a
/// `save` or `clear` returns, every reader and subscriber sees the new pair.
/// Reads never wait on a write in progress; they see the last completed one.
/// Backend I/O runs on the blocking pool.
pub struct TokenStore {
    writer: Mutex<()>,
    storage: SharedStorage,
    snapshot: watch::Sender<Credentials>,
}

impl TokenStore {
    /// Open a store over `storage`, loading whatever it already holds.
    /// An unreadable backend starts the store signed out.
    pub fn open(storage: impl TokenStorage + 'static) -> Self {
        let initial = match storage.load() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Failed to load stored tokens, starting signed out");
                Credentials::default()
            }
        };
        debug!(active = initial.is_active(), "Token store opened");

        let (snapshot, _) = watch::channel(initial);
        Self {
            writer: Mutex::new(()),
            storage: Arc::new(StdMutex::new(Box::new(storage))),
            snapshot,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryTokenStorage::new())
    }

    /// Persist whichever tokens are given, leaving the other one unchanged.
    pub async fn save(
        &self,
        access: Option<&str>,
        refresh: Option<&str>,
    ) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        let mut next = self.snapshot.borrow().clone();
        if let Some(access) = access {
            next.access = Some(access.to_string());
        }
        if let Some(refresh) = refresh {
            next.refresh = Some(refresh.to_string());
        }

        let pair = next.clone();
        self.with_storage(move |storage| storage.persist(&pair)).await?;
        self.snapshot.send_replace(next);
        debug!(
            access = access.is_some(),
            refresh = refresh.is_some(),
            "Tokens saved"
        );
        Ok(())
    }

    pub async fn read(&self, key: TokenKey) -> Option<String> {
        self.snapshot.borrow().get(key).map(str::to_string)
    }

    pub async fn access_token(&self) -> Option<String> {
        self.read(TokenKey::Access).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.read(TokenKey::Refresh).await
    }

    /// Remove both tokens.
    ///
    /// The in-memory pair is cleared and published even if the backend fails,
    /// so a broken keychain still logs the user out.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let result = self.with_storage(|storage| storage.clear()).await;
        self.snapshot.send_replace(Credentials::default());
        debug!("Tokens cleared");
        result
    }

    /// The last completed pair.
    pub fn snapshot(&self) -> Credentials {
        self.snapshot.borrow().clone()
    }

    /// Receive the latest pair on every change.
    pub fn subscribe(&self) -> watch::Receiver<Credentials> {
        self.snapshot.subscribe()
    }

    async fn with_storage<F>(&self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut (dyn TokenStorage + 'static)) -> Result<(), StoreError> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let mut storage = storage.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut **storage)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::ThreadId;

    use super::*;

    struct BrokenStorage;

    impl TokenStorage for BrokenStorage {
        fn load(&self) -> Result<Credentials, StoreError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn persist(&mut self, _credentials: &Credentials) -> Result<(), StoreError> {
            Err(std::io::Error::other("disk on fire").into())
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    /// Holds its pair in shared state so a test can reopen over it, and
    /// fails every write while `failing` is set.
    #[derive(Clone, Default)]
    struct RecordingStorage {
        saved: Arc<StdMutex<Credentials>>,
        failing: Arc<AtomicBool>,
        writer_thread: Arc<StdMutex<Option<ThreadId>>>,
    }

    impl TokenStorage for RecordingStorage {
        fn load(&self) -> Result<Credentials, StoreError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn persist(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
            *self.writer_thread.lock().unwrap() = Some(std::thread::current().id());
            if self.failing.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("keychain locked").into());
            }
            *self.saved.lock().unwrap() = credentials.clone();
            Ok(())
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            *self.saved.lock().unwrap() = Credentials::default();
            Ok(())
        }
    }

    #[test]
    fn test_token_key_names() {
        assert_eq!(TokenKey::Access.as_str(), "access_token");
        assert_eq!(TokenKey::Refresh.as_str(), "refresh_token");
    }

    #[test]
    fn test_credentials_is_active() {
        assert!(!Credentials::default().is_active());
        assert!(!Credentials::new(Some("   ".into()), Some("r".into())).is_active());
        assert!(!Credentials::new(None, Some("r".into())).is_active());
        assert!(Credentials::new(Some("a".into()), None).is_active());
    }

    #[test]
    fn test_credentials_debug_redacts_tokens() {
        let credentials = Credentials::new(Some("secret-access".into()), None);
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("secret-access"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_save_keeps_unspecified_token() {
        let store = TokenStore::in_memory();
        store.save(Some("A1"), Some("R1")).await.unwrap();
        store.save(Some("A2"), None).await.unwrap();

        assert_eq!(store.access_token().await.as_deref(), Some("A2"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("R1"));

        store.save(None, Some("R2")).await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("A2"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_clear_removes_both() {
        let store = TokenStore::in_memory();
        store.save(Some("A"), Some("R")).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.read(TokenKey::Access).await, None);
        assert_eq!(store.read(TokenKey::Refresh).await, None);
    }

    #[tokio::test]
    async fn test_open_loads_existing_credentials() {
        let credentials = Credentials::new(Some("A".into()), Some("R".into()));
        let storage = MemoryTokenStorage::with_credentials(credentials);
        let store = TokenStore::open(storage);
        assert!(store.snapshot().is_active());
        assert_eq!(store.refresh_token().await.as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_snapshot() {
        let store = TokenStore::in_memory();
        let mut rx = store.subscribe();

        store.save(Some("A"), Some("R")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().access.as_deref(), Some("A"));

        store.clear().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_active());
    }

    #[tokio::test]
    async fn test_unreadable_storage_starts_signed_out() {
        let store = TokenStore::open(BrokenStorage);
        assert!(!store.snapshot().is_active());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_snapshot_untouched() {
        let store = TokenStore::open(BrokenStorage);
        assert!(store.save(Some("A"), Some("R")).await.is_err());
        assert_eq!(store.access_token().await, None);
    }

    #[tokio::test]
    async fn test_failed_clear_still_signs_out() {
        let store = TokenStore::open(MemoryTokenStorage::new());
        store.save(Some("A"), Some("R")).await.unwrap();

        // Swap in a backend that fails on clear
        *store.storage.lock().unwrap() = Box::new(BrokenStorage);
        assert!(store.clear().await.is_err());
        assert!(!store.snapshot().is_active());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_pair_everywhere() {
        let backend = RecordingStorage::default();
        let store = TokenStore::open(backend.clone());
        store.save(Some("A1"), Some("R1")).await.unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        assert!(store.save(Some("A2"), Some("R2")).await.is_err());

        let old = Credentials::new(Some("A1".into()), Some("R1".into()));
        assert_eq!(store.snapshot(), old);
        assert_eq!(*backend.saved.lock().unwrap(), old);

        // A fresh start sees the same pair, never half of the failed write
        let reopened = TokenStore::open(backend.clone());
        assert_eq!(reopened.snapshot(), old);
    }

    #[tokio::test]
    async fn test_backend_writes_run_off_the_runtime_thread() {
        let backend = RecordingStorage::default();
        let store = TokenStore::open(backend.clone());
        store.save(Some("A"), Some("R")).await.unwrap();

        let writer = backend.writer_thread.lock().unwrap().expect("persist was not called");
        assert_ne!(writer, std::thread::current().id());
    }
}
