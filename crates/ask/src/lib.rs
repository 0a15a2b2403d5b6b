//! Bounded-time single request/response exchange against an addressable
//! endpoint, with response classification and retry on transient failure.
//!
//! Issuing an ask sends the request synchronously before the first await, so
//! it never reorders relative to a plain `tell` issued immediately after it
//! in the same control flow.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use twinguard_core_types::{EnforcementError, Recipient, Signal, SignalKind};

/// Attempt budget and backoff applied when an exchange times out.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(300),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AskConfig {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("no reply from {target} within {timeout:?} after {attempts} attempt(s)")]
    Timeout {
        target: String,
        attempts: u32,
        timeout: Duration,
    },
    #[error("target replied with a domain error: {0}")]
    ErrorResponse(EnforcementError),
    #[error("unexpected response: {hint}")]
    Unexpected { hint: String },
    #[error("mailbox of {target} is gone")]
    Closed { target: String },
}

impl From<AskError> for EnforcementError {
    fn from(value: AskError) -> Self {
        match value {
            AskError::Timeout {
                target,
                attempts,
                timeout,
            } => EnforcementError::AskTimeout {
                target,
                attempts,
                timeout_ms: timeout.as_millis() as u64,
            },
            AskError::ErrorResponse(err) => err,
            AskError::Unexpected { hint } => EnforcementError::UnexpectedResponse { hint },
            AskError::Closed { target } => {
                EnforcementError::internal(format!("mailbox of {target} is gone"))
            }
        }
    }
}

/// Sends `signal` to `target` and awaits a correlated reply.
///
/// Classification, in priority order: a reply accepted by `is_expected` is
/// the success value; a typed error-response signal fails with its embedded
/// domain error; a timeout is retried with linear backoff up to the policy's
/// attempt budget before surfacing; anything else fails immediately with a
/// diagnostic hint.
pub async fn ask<F>(
    target: &Recipient,
    signal: Signal,
    config: &AskConfig,
    is_expected: F,
) -> Result<Signal, AskError>
where
    F: Fn(&Signal) -> bool,
{
    let attempts = config.retry.max_attempts.max(1);
    for attempt in 1..=attempts {
        let (reply_tx, reply_rx) = oneshot::channel();
        if !target.send_with_reply(signal.clone(), reply_tx) {
            return Err(AskError::Closed {
                target: target.name().to_string(),
            });
        }

        match timeout(config.timeout, reply_rx).await {
            Ok(Ok(reply)) => return classify(target, reply, is_expected),
            Ok(Err(_)) => {
                return Err(AskError::Unexpected {
                    hint: format!("{} dropped the reply channel", target.name()),
                })
            }
            Err(_) => {
                if attempt < attempts {
                    debug!(
                        target: "ask",
                        endpoint = target.name(),
                        attempt,
                        "ask timed out, retrying"
                    );
                    sleep(config.retry.backoff * attempt).await;
                } else {
                    warn!(
                        target: "ask",
                        endpoint = target.name(),
                        attempts,
                        timeout_ms = config.timeout.as_millis() as u64,
                        "ask exhausted its retry budget"
                    );
                    return Err(AskError::Timeout {
                        target: target.name().to_string(),
                        attempts,
                        timeout: config.timeout,
                    });
                }
            }
        }
    }
    unreachable!("attempt loop either returns or retries")
}

fn classify<F>(target: &Recipient, reply: Signal, is_expected: F) -> Result<Signal, AskError>
where
    F: Fn(&Signal) -> bool,
{
    if is_expected(&reply) {
        return Ok(reply);
    }
    if reply.kind == SignalKind::Error {
        let err = reply
            .embedded_error()
            .unwrap_or_else(|| EnforcementError::internal("malformed error response"));
        return Err(AskError::ErrorResponse(err));
    }
    Err(AskError::Unexpected {
        hint: format!(
            "{} replied {} ({:?}) to an ask expecting a different response type",
            target.name(),
            reply.name,
            reply.kind
        ),
    })
}
