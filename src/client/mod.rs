//! Outbound API clients.
//!
//! - [`BrowserClient`]: long-lived, holds one user's session, refreshes once
//!   on 401 with concurrent failures coalesced onto a single refresh.
//! - [`ServerClient`]: per render request, bound to that request's cookies,
//!   never refreshes by itself.

mod browser;
mod request;
mod server;
mod store;

pub use browser::{BrowserClient, BrowserClientBuilder, Download, LogNavigator, LoginOutcome, Navigator};
pub use request::{ApiRequest, ApiResponse, ClientError};
pub use server::{ServerClient, ServerClientFactory};
pub use store::{
    ACCESS_TOKEN_KEY, CURRENT_LOCALE_KEY, FileStore, MemoryStore, StoreError, TokenStore,
    USER_ROLE_KEY,
};
