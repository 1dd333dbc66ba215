//! Core library for HuecoApp.
//!
//! HuecoApp is a crowdsourced pothole-reporting client. This crate holds the
//! pieces with a real contract behind them:
//!
//! - [`auth`]: token storage, bearer injection, transparent refresh on 401,
//!   and the derived "session active" signal
//! - [`api`]: the authenticated request pipeline and the login endpoints
//! - [`config`]: user configuration and on-disk locations

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiError};
pub use auth::{
    BearerAuthenticator, Credentials, RefreshCoordinator, SessionState, StoreError, TokenKey,
    TokenStore,
};
pub use config::{Config, TokenBackend};
