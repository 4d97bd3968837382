//! Login/session state machine.
//!
//! [`SessionTracker`] is owned by exactly one task at a time: the caller of
//! `Connection::open` until the credentials are written, then the delivery
//! task. Everyone else observes the state through a `watch` receiver and the
//! login outcome through a `oneshot` receiver.

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};

use crate::error::{FicsError, FicsResult};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    CredentialsSent,
    AwaitingConfirmation,
    LoggedIn {
        username: String,
        titles: Option<String>,
    },
    /// The server rejected the login. The socket stays open until the
    /// server closes it.
    Failed {
        reason: String,
    },
}

/// What moves the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Connect,
    SocketEstablished,
    CredentialsWritten,
    LoginSucceeded {
        username: String,
        titles: Option<String>,
    },
    LoginFailed {
        reason: String,
    },
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::CredentialsSent => "credentials-sent",
            Self::AwaitingConfirmation => "awaiting-confirmation",
            Self::LoggedIn { .. } => "logged-in",
            Self::Failed { .. } => "failed",
        }
    }

    /// The state `transition` leads to, or `None` if it is not allowed from
    /// here.
    pub fn next(&self, transition: &Transition) -> Option<SessionState> {
        use Transition as T;

        match (self, transition) {
            (_, T::Closed) => Some(Self::Disconnected),
            (Self::Disconnected, T::Connect) => Some(Self::Connecting),
            (Self::Connecting, T::SocketEstablished) => Some(Self::CredentialsSent),
            (Self::CredentialsSent, T::CredentialsWritten) => Some(Self::AwaitingConfirmation),
            (
                Self::CredentialsSent | Self::AwaitingConfirmation,
                T::LoginSucceeded { username, titles },
            ) => Some(Self::LoggedIn {
                username: username.clone(),
                titles: titles.clone(),
            }),
            (Self::CredentialsSent | Self::AwaitingConfirmation, T::LoginFailed { reason }) => {
                Some(Self::Failed {
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }

    /// Whether the socket is (still) supposed to be open.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::LoggedIn { username, .. } => Some(username),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedIn { username, .. } => write!(f, "logged-in({})", username),
            Self::Failed { reason } => write!(f, "failed({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The server-confirmed identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub titles: Option<String>,
}

pub type LoginOutcome = FicsResult<LoginInfo>;

pub struct SessionTracker {
    state: watch::Sender<SessionState>,
    outcome: Option<oneshot::Sender<LoginOutcome>>,
}

impl SessionTracker {
    /// A tracker in `Disconnected`, the receiver observing it, and the
    /// receiver of the login outcome.
    pub fn new() -> (
        Self,
        watch::Receiver<SessionState>,
        oneshot::Receiver<LoginOutcome>,
    ) {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let tracker = Self {
            state: state_tx,
            outcome: Some(outcome_tx),
        };
        (tracker, state_rx, outcome_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_none()
    }

    /// Apply `transition`. Invalid transitions are logged and ignored.
    /// Returns whether the state changed.
    pub fn apply(&mut self, transition: Transition) -> bool {
        let current = self.state();
        let Some(next) = current.next(&transition) else {
            tracing::warn!(
                state = %current,
                ?transition,
                "Ignoring session transition"
            );
            return false;
        };

        tracing::debug!("Session {} -> {}", current, next);

        let outcome = match &next {
            SessionState::LoggedIn { username, titles } => Some(Ok(LoginInfo {
                username: username.clone(),
                titles: titles.clone(),
            })),
            SessionState::Failed { reason } => Some(Err(FicsError::LoginFailed(reason.clone()))),
            SessionState::Disconnected => Some(Err(FicsError::Disconnected)),
            _ => None,
        };

        self.state.send_replace(next);

        if let Some(outcome) = outcome {
            self.resolve(outcome);
        }
        true
    }

    fn resolve(&mut self, outcome: LoginOutcome) {
        if let Some(tx) = self.outcome.take() {
            // The receiver is gone if nobody is waiting to log in.
            let _ = tx.send(outcome);
        }
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("state", &*self.state.borrow())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
