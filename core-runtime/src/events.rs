//! # Event Bus System
//!
//! Provides an event-driven notification channel for the Drive Share core using
//! `tokio::sync::broadcast`. Hosts subscribe to observe sign-in progress, token
//! refreshes and upload lifecycle without wiring callbacks through every layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ core-auth    ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//!                                │ (broadcast│                  └────────────┘
//! ┌──────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │ google-drive ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::SigningIn {
//!         provider: "GoogleDrive".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Auth(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Emission is best-effort: `emit` returns an error when nobody is subscribed,
//! and emitters ignore it. Subscribers receive `RecvError::Lagged(n)` when they
//! fall more than the buffer size behind; that is non-fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authorization and token lifecycle events
    Auth(AuthEvent),
    /// Upload pipeline events
    Upload(UploadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::PermissionFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Upload(UploadEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to authorization and token refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Interactive authorization started; the consent page is being shown.
    SigningIn {
        provider: String,
    },
    /// Interactive authorization produced a token pair.
    SignedIn {
        provider: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing {
        provider: String,
    },
    /// Token refresh completed successfully.
    TokenRefreshed {
        provider: String,
        /// When the new access token expires (Unix epoch seconds).
        expires_at: i64,
    },
    /// Authorization, refresh or token persistence failed.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// `false` when the user must sign in again.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authorization in progress",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events mirroring the upload pipeline.
///
/// `Progress` duplicates what the task's own progress callback receives so
/// that observers without access to the task can follow along.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// A stage transition.
    Progress {
        upload_id: String,
        /// Stage name (`Preparing`, `Uploading`, `SettingPermission`, `Complete`, `Error`)
        stage: String,
        message: String,
        percent: u8,
    },
    /// The object was stored but could not be made publicly readable.
    PermissionFailed {
        upload_id: String,
        remote_id: String,
        message: String,
    },
    /// The upload finished and produced an `UploadResult`.
    Completed {
        upload_id: String,
        remote_id: String,
        shared: bool,
    },
    /// The upload terminated with an error.
    Failed {
        upload_id: String,
        message: String,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Progress { .. } => "Upload progress",
            UploadEvent::PermissionFailed { .. } => "Public permission could not be set",
            UploadEvent::Completed { .. } => "Upload completed",
            UploadEvent::Failed { .. } => "Upload failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let uploads_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Upload(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(upload_id: &str, stage: &str, percent: u8) -> CoreEvent {
        CoreEvent::Upload(UploadEvent::Progress {
            upload_id: upload_id.to_string(),
            stage: stage.to_string(),
            message: format!("{} stage", stage),
            percent,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Auth(AuthEvent::SigningIn {
            provider: "GoogleDrive".to_string(),
        });

        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Upload(UploadEvent::Completed {
            upload_id: "u-1".to_string(),
            remote_id: "file-1".to_string(),
            shared: true,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)));

        bus.emit(progress("u-1", "Preparing", 10)).ok();

        let auth_event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            provider: "GoogleDrive".to_string(),
            expires_at: 1_700_000_000,
        });
        bus.emit(auth_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), auth_event);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for percent in [10, 30, 70, 100, 100] {
            bus.emit(progress("u-1", "Uploading", percent)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error_event = CoreEvent::Auth(AuthEvent::AuthError {
            message: "refresh rejected".to_string(),
            recoverable: false,
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let warning_event = CoreEvent::Upload(UploadEvent::PermissionFailed {
            upload_id: "u-1".to_string(),
            remote_id: "file-1".to_string(),
            message: "403".to_string(),
        });
        assert_eq!(warning_event.severity(), EventSeverity::Warning);

        assert_eq!(
            progress("u-1", "Uploading", 30).severity(),
            EventSeverity::Debug
        );
        assert_eq!(
            progress("u-1", "Uploading", 30).description(),
            "Upload progress"
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = progress("u-42", "SettingPermission", 70);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Upload\""));
        assert!(json.contains("SettingPermission"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
