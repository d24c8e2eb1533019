// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Failure classification.
//!
//! Decides whether a failure is transient (worth retrying) and attaches a short label used in
//! logs and metrics. The rules form a fixed, ordered taxonomy; the first matching rule wins:
//!
//! 1. Errors produced by this crate: [`ContextError::DeadlineExceeded`] and
//!    [`TimeoutError`] are retryable `timeout`, [`ContextError::Canceled`] is non-retryable
//!    `canceled` and [`CircuitOpenError`] is non-retryable `circuit_open`.
//! 2. [`std::io::Error`] with a connection or network [`ErrorKind`].
//! 3. [`HttpError`]: `429` and every `5xx` are retryable, everything else is not.
//! 4. A status code supplied by the caller, classified like rule 3. Errors of other transport
//!    libraries that implement [`StatusCode`] go through [`classify_status_error`], or through
//!    [`classify_with_status`] when the status has to be extracted by hand.
//! 5. A case-insensitive match of the error message against known network and transient phrases
//!    such as `connection refused` or `service unavailable`.
//! 6. Everything else is a non-retryable `unknown`.
//!
//! Rules 1 to 3 inspect the whole [`source`][Error::source] chain before rule 5 looks at any
//! message, so a typed error nested inside a wrapper is still found.
//!
//! # Examples
//!
//! ```rust
//! use breakwater::classify::{HttpError, classify, is_retryable};
//!
//! assert!(!is_retryable(&HttpError::new(400, "bad request")));
//! assert!(is_retryable(&HttpError::new(503, "service unavailable")));
//!
//! let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
//! assert_eq!(classify(&refused).label(), "connection_refused");
//! ```

use std::borrow::Cow;
use std::error::Error;
use std::io::ErrorKind;

use crate::breaker::CircuitOpenError;
use crate::timeout::TimeoutError;
use crate::{ContextError, Recovery, RecoveryInfo};

pub(crate) const TIMEOUT: &str = "timeout";
pub(crate) const CANCELED: &str = "canceled";
pub(crate) const CONNECTION_REFUSED: &str = "connection_refused";
pub(crate) const CONNECTION_RESET: &str = "connection_reset";
pub(crate) const BROKEN_PIPE: &str = "broken_pipe";
pub(crate) const DNS_ERROR: &str = "dns_error";
pub(crate) const NETWORK_UNREACHABLE: &str = "network_unreachable";
pub(crate) const NETWORK_ERROR: &str = "network_error";
pub(crate) const RATE_LIMITED: &str = "rate_limited";
pub(crate) const SERVER_ERROR: &str = "server_error";
pub(crate) const CLIENT_ERROR: &str = "client_error";
pub(crate) const HTTP_ERROR: &str = "http_error";
pub(crate) const CIRCUIT_OPEN: &str = "circuit_open";
pub(crate) const TRANSIENT: &str = "transient";
pub(crate) const UNKNOWN: &str = "unknown";

/// Message fragments that identify low-level network failures, checked in order.
const NETWORK_PHRASES: &[(&str, &str)] = &[
    ("connection refused", CONNECTION_REFUSED),
    ("connection reset", CONNECTION_RESET),
    ("broken pipe", BROKEN_PIPE),
    ("no such host", DNS_ERROR),
    ("network unreachable", NETWORK_UNREACHABLE),
    ("network is unreachable", NETWORK_UNREACHABLE),
];

/// Message fragments that identify transient failures of the remote side.
const TRANSIENT_PHRASES: &[&str] = &[
    "temporary failure",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "too many requests",
    "i/o timeout",
];

/// The verdict of the failure classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    retryable: bool,
    label: &'static str,
    recovery: RecoveryInfo,
}

impl Classification {
    fn retryable(label: &'static str) -> Self {
        Self {
            retryable: true,
            label,
            recovery: RecoveryInfo::retry(),
        }
    }

    fn permanent(label: &'static str) -> Self {
        Self {
            retryable: false,
            label,
            recovery: RecoveryInfo::never(),
        }
    }

    /// Returns `true` if the failure is transient and the operation may be attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Returns the short classification label, for example `timeout` or `client_error`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Returns the recovery information matching this classification.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryInfo {
        &self.recovery
    }
}

/// Returns `true` if `error` is transient and the failed operation may be attempted again.
#[must_use]
pub fn is_retryable(error: &(dyn Error + 'static)) -> bool {
    classify(error).is_retryable()
}

/// Classifies `error` according to the rules described in the [module documentation][self].
#[must_use]
pub fn classify(error: &(dyn Error + 'static)) -> Classification {
    classify_with_status(error, None)
}

/// Classifies an error that exposes its status code through [`StatusCode`].
///
/// # Examples
///
/// ```rust
/// use breakwater::classify::{StatusCode, classify_status_error};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("upstream returned status {0}")]
/// struct TransportError(u16);
///
/// impl StatusCode for TransportError {
///     fn status_code(&self) -> u16 {
///         self.0
///     }
/// }
///
/// assert!(classify_status_error(&TransportError(503)).is_retryable());
/// assert!(!classify_status_error(&TransportError(404)).is_retryable());
/// ```
#[must_use]
pub fn classify_status_error<E: Error + StatusCode + 'static>(error: &E) -> Classification {
    classify_with_status(error, Some(error.status_code()))
}

/// Classifies `error`, using `status` when none of the errors in its source chain is known to
/// this crate.
///
/// Errors produced by this crate, [`std::io::Error`] and [`HttpError`] take precedence over
/// `status`; message matching only applies when `status` is `None`.
#[must_use]
pub fn classify_with_status(error: &(dyn Error + 'static), status: Option<u16>) -> Classification {
    chain(error)
        .find_map(classify_typed)
        .or_else(|| status.map(classify_status))
        .or_else(|| chain(error).find_map(classify_message))
        .unwrap_or_else(|| Classification {
            retryable: false,
            label: UNKNOWN,
            recovery: RecoveryInfo::unknown(),
        })
}

/// Classifies a bare HTTP-style status code.
///
/// Transport clients whose error types carry a status code can use this directly instead of
/// converting to [`HttpError`].
#[must_use]
pub fn classify_status(status: u16) -> Classification {
    match status {
        429 => Classification::retryable(RATE_LIMITED),
        500..=599 => Classification::retryable(SERVER_ERROR),
        400..=499 => Classification::permanent(CLIENT_ERROR),
        _ => Classification::permanent(HTTP_ERROR),
    }
}

/// An error that exposes an HTTP-style numeric status code.
pub trait StatusCode {
    /// Returns the status code carried by the error.
    fn status_code(&self) -> u16;
}

/// A transport failure that carries an HTTP-style status code.
///
/// Transport clients convert their own error types into `HttpError` (or wrap it as the
/// [`source`][Error::source] of their error) so the classifier can inspect the status code
/// without depending on a specific HTTP library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct HttpError {
    status: u16,
    message: Cow<'static, str>,
}

impl HttpError {
    /// Creates an error for the given status code.
    #[must_use]
    pub fn new(status: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates an error from anything that exposes a status code.
    #[must_use]
    pub fn from_status(source: &impl StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(source.status_code(), message)
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl StatusCode for HttpError {
    fn status_code(&self) -> u16 {
        self.status
    }
}

impl Recovery for HttpError {
    fn recovery(&self) -> RecoveryInfo {
        match self.status {
            503 => RecoveryInfo::unavailable(),
            _ => classify_status(self.status).recovery,
        }
    }
}

pub(crate) fn chain<'a>(error: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(error), |&current| current.source())
}

fn classify_typed(error: &(dyn Error + 'static)) -> Option<Classification> {
    if let Some(context) = error.downcast_ref::<ContextError>() {
        return Some(match context {
            ContextError::DeadlineExceeded => Classification::retryable(TIMEOUT),
            ContextError::Canceled => Classification::permanent(CANCELED),
        });
    }

    if error.downcast_ref::<TimeoutError>().is_some() {
        return Some(Classification::retryable(TIMEOUT));
    }

    if error.downcast_ref::<CircuitOpenError>().is_some() {
        return Some(Classification {
            retryable: false,
            label: CIRCUIT_OPEN,
            recovery: RecoveryInfo::unavailable(),
        });
    }

    if let Some(io) = error.downcast_ref::<std::io::Error>() {
        return classify_io(io.kind());
    }

    error.downcast_ref::<HttpError>().map(|http| classify_status(http.status))
}

fn classify_io(kind: ErrorKind) -> Option<Classification> {
    let label = match kind {
        ErrorKind::ConnectionRefused => CONNECTION_REFUSED,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => CONNECTION_RESET,
        ErrorKind::BrokenPipe => BROKEN_PIPE,
        ErrorKind::TimedOut => TIMEOUT,
        ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable => NETWORK_UNREACHABLE,
        ErrorKind::NotConnected | ErrorKind::AddrNotAvailable | ErrorKind::NetworkDown => NETWORK_ERROR,
        _ => return None,
    };

    Some(Classification::retryable(label))
}

fn classify_message(error: &(dyn Error + 'static)) -> Option<Classification> {
    let message = error.to_string().to_lowercase();

    NETWORK_PHRASES
        .iter()
        .find(|(phrase, _)| message.contains(phrase))
        .map(|(_, label)| Classification::retryable(*label))
        .or_else(|| {
            TRANSIENT_PHRASES
                .iter()
                .any(|phrase| message.contains(phrase))
                .then(|| Classification::retryable(TRANSIENT))
        })
}
