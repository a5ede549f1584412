//! Prompt/completion handshake.
//!
//! Some operations cannot finish until the user confirms them. The daemon
//! then returns a prompt object instead of `/`. The client asks the daemon
//! to show the prompt and waits for a `Completed` signal emitted by that
//! same prompt object.
//!
//! Each wait owns its own signal subscription and matches on the prompt
//! path, so several prompts may be outstanding on one bus at a time.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, SecretError};
use crate::transport::{Bus, BusError, MethodCall, ObjectPath};
use crate::types::names::{PROMPT_COMPLETED, PROMPT_INTERFACE};

/// How long to wait for a prompt to complete.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Prompt reference returned by a prompt-gated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptHandle {
    /// The operation already completed.
    None,

    /// The operation is waiting on the prompt at this path.
    Pending(ObjectPath),
}

impl PromptHandle {
    /// Interpret a prompt path from a reply, `/` meaning no prompt.
    pub fn from_path(path: ObjectPath) -> Self {
        if path.is_root() {
            Self::None
        } else {
            Self::Pending(path)
        }
    }

    /// Whether user interaction is required.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Where a prompt wait stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    NoPromptNeeded,
    Prompting,
    Completed,
    Dismissed,
    TimedOut,
    /// The wait ended on a transport or reply error.
    Failed,
}

impl PromptState {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Prompting)
    }
}

/// A single prompt wait.
pub struct PromptWait<'a, B: Bus + ?Sized> {
    bus: &'a B,
    destination: &'a str,
    handle: PromptHandle,
    window_id: String,
    timeout: Duration,
    state: PromptState,
}

impl<'a, B: Bus + ?Sized> PromptWait<'a, B> {
    pub fn new(bus: &'a B, destination: &'a str, handle: PromptHandle) -> Self {
        let state = match handle {
            PromptHandle::None => PromptState::NoPromptNeeded,
            PromptHandle::Pending(_) => PromptState::Prompting,
        };
        Self {
            bus,
            destination,
            handle,
            window_id: secretbus_core::config::DEFAULT_PROMPT_WINDOW_ID.to_string(),
            timeout: PROMPT_TIMEOUT,
            state,
        }
    }

    /// Set the purpose string shown with the prompt.
    pub fn with_window_id(mut self, window_id: impl Into<String>) -> Self {
        self.window_id = window_id.into();
        self
    }

    /// Set how long to wait for completion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> PromptState {
        self.state
    }

    /// Drive the prompt to a terminal state.
    ///
    /// Returns `None` when no prompt was needed, otherwise the completion
    /// result carried by the `Completed` signal.
    pub async fn run(&mut self) -> Result<Option<Value>> {
        let path = match (&self.handle, self.state) {
            (PromptHandle::None, _) => return Ok(None),
            (PromptHandle::Pending(path), PromptState::Prompting) => path.clone(),
            (PromptHandle::Pending(path), state) => {
                return Err(SecretError::session(
                    "prompt",
                    format!("prompt {path} already finished as {state:?}"),
                ))
            }
        };

        // Subscribe before asking for the prompt so the completion cannot
        // slip past between the call and the first recv.
        let mut signals = self.bus.subscribe();

        let call = MethodCall::new(self.destination, path.clone(), PROMPT_INTERFACE, "Prompt")
            .with_args((&self.window_id,))
            .map_err(|e| SecretError::from_bus("prompt", e))?;
        self.bus
            .call(call)
            .await
            .map_err(|e| SecretError::from_bus("prompt", e))?;
        debug!(prompt = %path, "prompt shown, waiting for completion");

        let deadline = deadline_after(self.timeout);
        loop {
            let signal = match tokio::time::timeout_at(deadline, signals.recv()).await {
                Ok(Ok(signal)) => signal,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(prompt = %path, skipped, "signal receiver lagged");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => {
                    self.state = PromptState::Failed;
                    return Err(SecretError::Transport {
                        operation: "prompt",
                        source: BusError::Disconnected,
                    })
                }
                Err(_) => {
                    self.state = PromptState::TimedOut;
                    warn!(prompt = %path, timeout = ?self.timeout, "prompt timed out");
                    return Err(SecretError::PromptTimeout {
                        prompt: path,
                        after: self.timeout,
                    });
                }
            };

            if signal.path != path || !signal.is(PROMPT_INTERFACE, PROMPT_COMPLETED) {
                continue;
            }

            let (dismissed, result): (bool, Value) =
                match serde_json::from_value(Value::Array(signal.body)) {
                    Ok(body) => body,
                    Err(source) => {
                        self.state = PromptState::Failed;
                        return Err(SecretError::Decode {
                            operation: "prompt completed",
                            source,
                        });
                    }
                };

            if dismissed {
                self.state = PromptState::Dismissed;
                info!(prompt = %path, "prompt dismissed");
                return Err(SecretError::PromptDismissed(path));
            }

            self.state = PromptState::Completed;
            info!(prompt = %path, "prompt completed");
            return Ok(Some(result));
        }
    }
}

/// `now + timeout`, saturating far in the future instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}
