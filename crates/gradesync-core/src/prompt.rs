//! Blocking request/response handshake between the engine worker and the
//! thread that owns user interaction.
//!
//! The worker sends a [`PromptRequest`] and suspends until the responder
//! answers or cancels. Invalid answers are re-asked up to a fixed bound.

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("prompt responder disconnected")]
    Disconnected,

    #[error("no valid answer for {key} after {attempts} attempt(s): {last_error}")]
    AttemptsExhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },
}

/// Answer to one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Value(String),
    Cancel,
}

/// One question in flight. Must be answered exactly once.
#[derive(Debug)]
pub struct PromptRequest {
    pub key: String,
    pub message: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Why the previous answer was rejected.
    pub previous_error: Option<String>,
    respond: Sender<PromptReply>,
}

impl PromptRequest {
    pub fn reply(self, reply: PromptReply) -> Result<(), PromptError> {
        self.respond
            .send(reply)
            .map_err(|_| PromptError::Disconnected)
    }
}

/// Worker side of the handshake.
#[derive(Debug, Clone)]
pub struct PromptChannel {
    requests: Sender<PromptRequest>,
    max_attempts: u32,
}

/// Interaction side of the handshake.
#[derive(Debug)]
pub struct PromptResponder {
    requests: Receiver<PromptRequest>,
}

impl PromptResponder {
    /// Block for the next request; `None` once every channel is dropped.
    pub fn recv(&self) -> Option<PromptRequest> {
        self.requests.recv().ok()
    }
}

impl PromptChannel {
    pub fn pair(max_attempts: u32) -> (PromptChannel, PromptResponder) {
        let (tx, rx) = unbounded();
        (
            PromptChannel {
                requests: tx,
                max_attempts: max_attempts.max(1),
            },
            PromptResponder { requests: rx },
        )
    }

    /// Ask for a value and block until it is answered.
    ///
    /// Returns `Ok(None)` when the responder cancels. An answer rejected by
    /// `validate` is re-asked with the rejection reason attached, up to the
    /// attempt bound.
    pub fn ask<T>(
        &self,
        key: &str,
        message: &str,
        validate: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, PromptError> {
        let mut previous_error: Option<String> = None;
        for attempt in 1..=self.max_attempts {
            let (respond, response) = bounded(1);
            self.requests
                .send(PromptRequest {
                    key: key.to_string(),
                    message: message.to_string(),
                    attempt,
                    previous_error: previous_error.take(),
                    respond,
                })
                .map_err(|_| PromptError::Disconnected)?;

            match response.recv().map_err(|_| PromptError::Disconnected)? {
                PromptReply::Cancel => {
                    tracing::info!(key, "prompt cancelled");
                    return Ok(None);
                }
                PromptReply::Value(raw) => match validate(&raw) {
                    Ok(value) => return Ok(Some(value)),
                    Err(err) => {
                        tracing::warn!(key, attempt, "prompt answer rejected: {err}");
                        previous_error = Some(err);
                    }
                },
            }
        }

        Err(PromptError::AttemptsExhausted {
            key: key.to_string(),
            attempts: self.max_attempts,
            last_error: previous_error.unwrap_or_default(),
        })
    }
}
