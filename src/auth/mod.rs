//! IoT API 认证

pub mod oauth;

pub use oauth::{AccessToken, TokenProvider};
