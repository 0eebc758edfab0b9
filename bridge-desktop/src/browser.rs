//! System browser launcher backed by the `open` crate.

use bridge_traits::{
    browser::BrowserLauncher,
    error::{BridgeError, Result},
};
use tracing::debug;

/// Opens URLs in the user's default browser.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    pub fn new() -> Self {
        Self
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open_url(&self, url: &str) -> Result<()> {
        open::that(url).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to launch system browser: {}", e))
        })?;
        debug!("Launched system browser for authorization");
        Ok(())
    }
}
