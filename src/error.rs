// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The error taxonomy every component in this crate returns through.
//!
//! Call sites switch on the [`RoutingError`] sum type, never on raw server
//! error code strings: vendor code classification happens once, at the
//! boundary, via [`ServerError::classify`].

use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::Address;

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Every error this crate's components can produce, closed over the kinds
/// enumerated by the routing/pooling design: connectivity, server-reported,
/// and internal-bookkeeping failures all funnel through here so the retry
/// executor and the pool never need to know about a specific vendor's
/// status codes.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RoutingError {
    /// No server in the routing table (or the seed) could be reached.
    #[error("no server is available to serve this request: {message}")]
    ServiceUnavailable { message: String },

    /// The routing table backing the current operation went stale or was
    /// invalidated mid-flight; callers should re-acquire and retry.
    ///
    /// `writer_invalidated` is set when this was produced by transforming a
    /// not-a-leader/forbidden-on-read-only-database server error: it
    /// tells the retry executor and the delegating connection that the
    /// writer which produced it should be forgotten, something a bare
    /// "routing table went stale" `SessionExpired` doesn't imply.
    #[error("the session's routing information expired: {message}")]
    SessionExpired {
        message: String,
        writer_invalidated: bool,
    },

    /// The driver or server violated the wire protocol. Never retryable.
    #[error(
        "the driver encountered a protocol violation, this is likely a bug \
         in the driver or the server: {message}"
    )]
    ProtocolError { message: String },

    /// The connection's authorization token is no longer valid.
    #[error("authorization expired: {message}")]
    AuthorizationExpired { message: String },

    /// Authentication itself failed (bad credentials, expired ticket).
    #[error("authentication failed: {message}")]
    AuthenticationError { message: String },

    /// The transaction this connection belonged to was terminated.
    #[error("transaction terminated: {message}")]
    TransactionTerminated { message: String },

    /// The transaction's locks were terminated by the server (deadlock
    /// detection, admin action).
    #[error("transaction locks terminated: {message}")]
    LocksTerminated { message: String },

    /// A server-reported error that does not fall into a more specific kind.
    #[error("{0}")]
    DatabaseError(ServerError),

    /// The request requires a different access mode than the one the
    /// connection/session was opened with.
    #[error("illegal access mode: {message}")]
    IllegalAccessMode { message: String },

    /// No slot became free within the configured acquisition timeout.
    #[error("timed out after {waited_ms}ms acquiring a connection to {address}")]
    AcquisitionTimeout { address: Address, waited_ms: u64 },

    /// The pool (or a specific address's slot) has been shut down.
    #[error("the connection pool is closed")]
    PoolClosed,

    /// A retryable condition that doesn't warrant its own kind.
    #[error("{message}")]
    TransientOther { message: String },
}

impl RoutingError {
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
            writer_invalidated: false,
        }
    }

    /// A not-a-leader/forbidden-on-read-only-database server error,
    /// transformed to `SessionExpired` with the writer-invalidation flag
    /// set so retry and the delegating connection know to forget it.
    pub fn not_a_leader(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
            writer_invalidated: true,
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn acquisition_timeout(address: Address, waited_ms: u64) -> Self {
        Self::AcquisitionTimeout { address, waited_ms }
    }

    /// Whether the retry executor should attempt this operation again.
    /// `DatabaseError` defers to the wrapped [`ServerError`]'s own
    /// classification since only the embedding driver knows which vendor
    /// codes are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable { .. } => true,
            Self::SessionExpired { .. } => true,
            Self::TransientOther { .. } => true,
            Self::AuthorizationExpired { .. } => true,
            Self::DatabaseError(err) => err.is_retryable(),
            Self::ProtocolError { .. }
            | Self::AuthenticationError { .. }
            | Self::TransactionTerminated { .. }
            | Self::LocksTerminated { .. }
            | Self::IllegalAccessMode { .. }
            | Self::AcquisitionTimeout { .. }
            | Self::PoolClosed => false,
        }
    }

    /// Whether, on this error, the offending server should be removed from
    /// the writer set of its routing table.
    pub fn invalidates_writer(&self) -> bool {
        match self {
            Self::SessionExpired {
                writer_invalidated, ..
            } => *writer_invalidated,
            Self::DatabaseError(err) => err.invalidates_writer(),
            _ => false,
        }
    }

    /// Whether the offending server should be deactivated entirely (removed
    /// from the pool and every routing table it appears in).
    pub fn deactivates_server(&self) -> bool {
        matches!(self, Self::DatabaseError(err) if err.deactivates_server())
    }

    /// Whether every pooled connection authenticated with the same token
    /// as the one that produced this error must be dropped.
    pub fn unauthenticates_all_connections(&self) -> bool {
        matches!(self, Self::AuthorizationExpired { .. })
            || matches!(self, Self::DatabaseError(err) if err.is_security_error())
    }

    /// Whether this error should abort rediscovery outright rather than
    /// fall back to the next router.
    pub fn fatal_during_discovery(&self) -> bool {
        matches!(
            self,
            Self::ProtocolError { .. } | Self::AuthenticationError { .. }
        )
    }
}

/// A server-reported error, kept vendor-neutral: this crate never parses
/// `code`, it only carries it until the embedding driver classifies it via
/// [`ServerError::classify`].
#[derive(Debug, Clone)]
pub struct ServerError {
    code: String,
    message: String,
    class: ErrorClass,
}

impl ServerError {
    /// Builds a `ServerError` whose classification is supplied by the
    /// caller (the concrete driver, which alone knows its vendor's code
    /// taxonomy) rather than inferred here from the code string.
    pub fn new(code: impl Into<String>, message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            class,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    fn is_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Transient | ErrorClass::InvalidatesWriter)
    }

    fn invalidates_writer(&self) -> bool {
        self.class == ErrorClass::InvalidatesWriter
    }

    fn deactivates_server(&self) -> bool {
        self.class == ErrorClass::DeactivatesServer
    }

    fn is_security_error(&self) -> bool {
        self.class == ErrorClass::Security
    }

    /// Turns this server error into the [`RoutingError`] kind its class
    /// implies. Centralizes the one place in the crate that maps a raw
    /// classification onto the taxonomy every other component switches on.
    pub fn classify(self) -> RoutingError {
        match self.class {
            ErrorClass::Security => RoutingError::AuthenticationError {
                message: self.message,
            },
            ErrorClass::InvalidatesWriter => RoutingError::not_a_leader(self.message),
            _ => RoutingError::DatabaseError(self),
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "server error {}: {}", self.code, self.message)
    }
}

/// The classification an embedding driver assigns a raw server error code,
/// fed into [`ServerError::new`] so this crate's retry/registry logic never
/// needs to know a single vendor code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Safe to retry as-is.
    Transient,
    /// The writer that produced this should be forgotten (e.g. lost
    /// leadership); retrying against a fresh writer is safe.
    InvalidatesWriter,
    /// The server itself should be deactivated (e.g. unavailable database).
    DeactivatesServer,
    /// A security failure: every connection sharing this auth token is
    /// invalid.
    Security,
    /// None of the above: fatal, not retryable, server stays in rotation.
    Other,
}

impl From<ServerError> for RoutingError {
    fn from(err: ServerError) -> Self {
        err.classify()
    }
}
