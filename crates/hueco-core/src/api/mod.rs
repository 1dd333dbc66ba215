//! REST API client module for the HuecoApp backend.
//!
//! This module provides the `ApiClient`, through which every backend call
//! goes. Authenticated calls carry the stored access token; a 401 triggers
//! one transparent refresh and retry before the error reaches the caller.
//!
//! Login endpoints issue a fresh access/refresh pair and save it.

pub mod auth;
pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
