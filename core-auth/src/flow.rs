//! Interactive authorization code flow for installed applications.
//!
//! One run of [`AuthorizationFlow::begin`] binds the loopback listener, shows
//! the consent page through the host's `BrowserLauncher`, waits for the
//! redirect and exchanges the code for a [`TokenPair`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bridge_traits::browser::BrowserLauncher;
use bridge_traits::time::Clock;
use core_runtime::config::AuthSettings;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::callback::CallbackListener;
use crate::error::{AuthError, Result};
use crate::oauth::{OAuthFlowManager, PkceVerifier};
use crate::types::{FlowState, PendingAuthorization, TokenPair};
use crate::PROVIDER_NAME;

/// Drives the authorization code grant with a loopback redirect.
///
/// At most one run is in flight per instance; a concurrent `begin` fails
/// with [`AuthError::SignInInProgress`]. The listener is released on every
/// exit path, including when the returned future is dropped.
pub struct AuthorizationFlow {
    oauth: Arc<OAuthFlowManager>,
    browser: Arc<dyn BrowserLauncher>,
    clock: Arc<dyn Clock>,
    redirect_port: u16,
    timeout: Duration,
    event_bus: Option<EventBus>,
    run_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingAuthorization>>,
    state: watch::Sender<FlowState>,
}

impl AuthorizationFlow {
    pub fn new(
        oauth: Arc<OAuthFlowManager>,
        browser: Arc<dyn BrowserLauncher>,
        clock: Arc<dyn Clock>,
        settings: &AuthSettings,
    ) -> Self {
        let (state, _) = watch::channel(FlowState::Idle);
        Self {
            oauth,
            browser,
            clock,
            redirect_port: settings.redirect_port,
            timeout: settings.authorization_timeout,
            event_bus: None,
            run_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            state,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn state(&self) -> FlowState {
        *self.state.borrow()
    }

    /// Follow state transitions as they happen.
    pub fn watch_state(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// The outstanding authorization, if a run is waiting for its redirect.
    pub fn pending(&self) -> Option<PendingAuthorization> {
        self.pending_slot().clone()
    }

    /// Run the flow to completion.
    pub async fn begin(&self) -> Result<TokenPair> {
        self.begin_with_cancel(CancellationToken::new()).await
    }

    /// Run the flow; cancelling `cancel` ends it with `AuthCancelled`.
    #[instrument(skip(self, cancel))]
    pub async fn begin_with_cancel(&self, cancel: CancellationToken) -> Result<TokenPair> {
        let _running = self.run_lock.try_lock().map_err(|_| {
            warn!("Authorization requested while another one is running");
            AuthError::SignInInProgress
        })?;

        self.emit(AuthEvent::SigningIn {
            provider: PROVIDER_NAME.to_string(),
        });

        let mut attempt = AttemptGuard {
            flow: self,
            succeeded: false,
        };
        let result = self.run(&cancel).await;
        attempt.succeeded = result.is_ok();
        drop(attempt);

        match &result {
            Ok(tokens) => {
                info!(expires_at = %tokens.expires_at, "Authorization succeeded");
                self.emit(AuthEvent::SignedIn {
                    provider: PROVIDER_NAME.to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, "Authorization failed");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: !e.requires_reauthorization(),
                });
            }
        }
        result
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<TokenPair> {
        let listener = CallbackListener::bind(self.redirect_port).await?;
        let redirect_uri = listener.redirect_uri();
        let verifier = PkceVerifier::new();

        let window = chrono::Duration::from_std(self.timeout)
            .map_err(|e| AuthError::Other(format!("Invalid authorization timeout: {}", e)))?;
        *self.pending_slot() = Some(PendingAuthorization {
            verifier: verifier.clone(),
            port: listener.port(),
            deadline: self.clock.now() + window,
        });

        let auth_url = self.oauth.build_auth_url(&redirect_uri, &verifier)?;
        self.set_state(FlowState::Listening);

        if let Err(e) = self.browser.open_url(&auth_url) {
            warn!(
                error = %e,
                url = %auth_url,
                "Could not open a browser; open the URL manually to continue"
            );
        }

        let code = listener
            .wait_for_code(verifier.state(), self.timeout, cancel.clone())
            .await?;
        self.set_state(FlowState::CodeReceived);

        self.set_state(FlowState::Exchanging);
        tokio::select! {
            exchanged = self.oauth.exchange_code(&code, &verifier, &redirect_uri) => exchanged,
            _ = cancel.cancelled() => Err(AuthError::AuthCancelled),
        }
    }

    fn set_state(&self, state: FlowState) {
        self.state.send_replace(state);
    }

    fn pending_slot(&self) -> std::sync::MutexGuard<'_, Option<PendingAuthorization>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

/// Clears the pending authorization and records the terminal state, even if
/// the run is dropped mid-way.
struct AttemptGuard<'a> {
    flow: &'a AuthorizationFlow,
    succeeded: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.flow.pending_slot().take();
        self.flow.set_state(if self.succeeded {
            FlowState::Succeeded
        } else {
            FlowState::Failed
        });
    }
}
