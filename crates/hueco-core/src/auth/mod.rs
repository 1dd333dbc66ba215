//! Session and authentication lifecycle.
//!
//! This module provides:
//! - `TokenStore`: the single owner of the access/refresh token pair, with
//!   pluggable persistence (file, OS keychain, memory)
//! - `BearerAuthenticator`: attaches the current access token to requests
//! - `RefreshCoordinator`: exchanges the refresh token after a 401 and hands
//!   back the request to retry, at most once per original request
//! - `SessionState`: publishes whether a session is active
//!
//! Every consumer reads tokens through a shared `Arc<TokenStore>`; nothing
//! else keeps its own copy.

pub mod authenticator;
pub mod error;
pub mod file;
pub mod keychain;
pub mod refresh;
pub mod session;
pub mod store;

pub use authenticator::BearerAuthenticator;
pub use error::{RefreshError, StoreError};
pub use file::FileTokenStorage;
pub use keychain::KeyringTokenStorage;
pub use refresh::RefreshCoordinator;
pub use session::SessionState;
pub use store::{Credentials, MemoryTokenStorage, TokenKey, TokenStorage, TokenStore};
