//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (single attempt unless a retry policy is set)
//! - `BrowserLauncher` using the `open` crate
//! - `SecureStore` using the `keyring` crate
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SystemBrowser};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let browser = SystemBrowser::new();
//! ```

mod browser;
mod http;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use browser::SystemBrowser;
pub use http::ReqwestHttpClient;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
