//! Loopback Redirect Listener
//!
//! A single-use HTTP server on `127.0.0.1` that captures the provider's
//! redirect after the user grants (or denies) consent.
//!
//! - Accepts exactly one redirect on `/`; later requests get an informational page
//! - Validates the state nonce before looking at the code
//! - Answers the browser with a confirmation or error page
//! - Shuts down on every exit path, including when the waiting future is dropped

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};

/// How long a graceful shutdown may take to flush the browser's response.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    #[allow(dead_code)]
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct ServerState {
    result_tx: Mutex<Option<oneshot::Sender<Result<String>>>>,
    expected_state: String,
}

/// Bound, not yet serving, loopback listener.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>`; port `0` picks an ephemeral port.
    #[instrument]
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::ListenerFailed {
                port,
                reason: e.to_string(),
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::ListenerFailed {
                port,
                reason: e.to_string(),
            })?
            .port();

        debug!(port, "Redirect listener bound");
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Serve until one redirect arrives, `timeout` elapses or `cancel` fires.
    ///
    /// # Errors
    ///
    /// - `AuthStateMismatch` when the redirect's state is missing or differs
    /// - `AuthCancelled` on `error=access_denied` or when `cancel` fires
    /// - `AuthProviderError` for any other provider error or a missing code
    /// - `AuthTimeout` when no redirect arrives in time
    #[instrument(skip(self, expected_state, cancel), fields(port = self.port))]
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String> {
        let (result_tx, result_rx) = oneshot::channel();
        let state = Arc::new(ServerState {
            result_tx: Mutex::new(Some(result_tx)),
            expected_state: expected_state.to_string(),
        });

        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(state);

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        let listener = self.listener;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
        });
        let mut server = ServerGuard {
            shutdown,
            handle: Some(handle),
        };

        info!("Waiting for authorization redirect");

        let outcome = tokio::select! {
            received = result_rx => match received {
                Ok(result) => result,
                Err(_) => Err(AuthError::Other("Redirect listener stopped unexpectedly".to_string())),
            },
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "No authorization redirect received");
                Err(AuthError::AuthTimeout { timeout_secs: timeout.as_secs() })
            }
            _ = cancel.cancelled() => {
                info!("Authorization cancelled by caller");
                Err(AuthError::AuthCancelled)
            }
        };

        server.shutdown().await;
        outcome
    }
}

/// Owns the serving task; dropping it stops the server.
struct ServerGuard {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerGuard {
    async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(Ok(()))) => debug!("Redirect listener stopped"),
                Ok(Ok(Err(e))) => warn!(error = %e, "Redirect listener exited with error"),
                Ok(Err(e)) => warn!(error = %e, "Redirect listener task failed"),
                Err(_) => {
                    debug!("Redirect listener did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn handle_redirect(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<RedirectParams>,
) -> Html<String> {
    let Some(sender) = state.result_tx.lock().await.take() else {
        debug!("Ignoring redirect after the first one");
        return Html(render_page(
            "Sign-in already handled",
            "You can close this window.",
        ));
    };

    let outcome = evaluate_redirect(&state.expected_state, params);
    let page = match &outcome {
        Ok(_) => render_page(
            "Sign-in complete",
            "Google Drive is connected. You can close this window and return to the application.",
        ),
        Err(e) => render_page("Sign-in failed", e.user_message()),
    };

    if sender.send(outcome).is_err() {
        debug!("Redirect arrived after the flow stopped waiting");
    }
    Html(page)
}

fn evaluate_redirect(expected_state: &str, params: RedirectParams) -> Result<String> {
    if params.state.as_deref() != Some(expected_state) {
        warn!("Redirect state does not match the issued nonce");
        return Err(AuthError::AuthStateMismatch);
    }

    if let Some(error) = params.error {
        if error == "access_denied" {
            info!("User denied consent");
            return Err(AuthError::AuthCancelled);
        }
        let message = match params.error_description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        };
        warn!(error = %message, "Provider returned an error on the redirect");
        return Err(AuthError::AuthProviderError(message));
    }

    match params.code {
        Some(code) if !code.is_empty() => {
            debug!("Authorization code received");
            Ok(code)
        }
        _ => Err(AuthError::AuthProviderError(
            "Redirect did not include an authorization code".to_string(),
        )),
    }
}

fn render_page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
               display: flex; justify-content: center; align-items: center;
               min-height: 100vh; margin: 0; background: #f5f5f5; }}
        .card {{ background: white; padding: 2rem 3rem; border-radius: 8px;
                box-shadow: 0 2px 8px rgba(0,0,0,0.1); text-align: center; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>"#
    )
}
