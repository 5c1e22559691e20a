// lmbridge Core Library

pub mod extension;
pub mod host;
pub mod model;
pub mod provider;

pub use extension::{Extension, REFRESH_COMMAND, SERVER_URL_KEY, VENDOR, activate};
pub use provider::{LocalModelProvider, ProviderError, ProviderSettings};
