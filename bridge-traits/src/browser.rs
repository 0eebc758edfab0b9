//! Browser Launching Abstraction
//!
//! The interactive OAuth flow hands the authorization URL to the host, which
//! decides how to present it (system browser, embedded webview, printing it to
//! a terminal).

use crate::error::Result;

/// Opens a URL for the user.
///
/// Implementations must not block until the user finishes interacting with
/// the page; they only start the presentation.
pub trait BrowserLauncher: Send + Sync {
    fn open_url(&self, url: &str) -> Result<()>;
}

/// Launcher that never opens anything; the flow logs the URL instead.
///
/// Useful for headless hosts where the user copies the URL manually.
#[derive(Debug, Clone, Default)]
pub struct NoopBrowser;

impl BrowserLauncher for NoopBrowser {
    fn open_url(&self, _url: &str) -> Result<()> {
        Err(crate::error::BridgeError::NotAvailable(
            "No browser available on this host".to_string(),
        ))
    }
}
