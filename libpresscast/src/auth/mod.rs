//! OAuth2 credential storage and token lifecycle

pub mod credentials;
pub mod token_store;

pub use credentials::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, OAuthSession,
};
pub use token_store::{TokenState, TokenStore, OAUTH_SCOPES, REFRESH_INTERVAL_SECS};
