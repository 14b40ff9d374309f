//! Error types for the sweep domain.
//!
//! [`FetchError`] and [`MutationError`] are what collaborators return through
//! the traits in [`crate::ports`]. Neither ever escapes the engine: a fetch
//! error ends pagination and a mutation error becomes a failed
//! [`ItemOutcome`](crate::ItemOutcome).
//!
//! [`SweepError`] covers the few conditions that are fatal to a run, all of
//! which happen outside the fetch-and-mutate loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FailureKind, MutationFailure};

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failure to obtain a page or the pending-count estimate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or no response arrived (DNS, TLS, timeout).
    #[error("Transport failure: {message}")]
    Transport {
        /// Description from the transport layer.
        message: String,
    },

    /// The collaborator answered with a non-success status.
    #[error("Listing call failed with status {status}: {message}")]
    Status {
        /// HTTP-style status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Credentials were missing, expired, or lacked the required scope.
    #[error("Listing call was not authorised")]
    Unauthorized,

    /// The response arrived but could not be decoded.
    #[error("Could not decode listing response: {message}")]
    Decode {
        /// Decoder error text.
        message: String,
    },

    /// The collaborator was asked for something it does not offer
    /// (e.g. no count endpoint is configured).
    #[error("Not supported: {message}")]
    Unsupported {
        /// What was requested.
        message: String,
    },
}

/// Failure to apply the mutation to one item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// The request could not be sent or no response arrived.
    #[error("Transport failure: {message}")]
    Transport {
        /// Description from the transport layer.
        message: String,
    },

    /// The collaborator answered with a server-side error status.
    #[error("Mutation failed with status {status}: {message}")]
    Status {
        /// HTTP-style status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Credentials were missing, expired, or lacked the required scope.
    #[error("Mutation was not authorised")]
    Unauthorized,

    /// The item no longer exists.
    #[error("Item not found")]
    NotFound,

    /// The collaborator throttled the call. Not retried.
    #[error("Rate limited")]
    RateLimited,

    /// The collaborator refused the request as invalid.
    #[error("Mutation rejected: {message}")]
    Rejected {
        /// Reason given by the collaborator.
        message: String,
    },
}

impl MutationError {
    /// Classifies this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            MutationError::Transport { .. } | MutationError::Status { .. } => {
                FailureKind::Transient
            }
            MutationError::Unauthorized => FailureKind::Unauthorized,
            MutationError::NotFound => FailureKind::NotFound,
            MutationError::RateLimited => FailureKind::RateLimited,
            MutationError::Rejected { .. } => FailureKind::Rejected,
        }
    }
}

impl From<MutationError> for MutationFailure {
    fn from(err: MutationError) -> Self {
        MutationFailure::new(err.kind(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that prevent a run from starting or indicate a broken invariant.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum SweepError {
    /// The run configuration is invalid.
    ///
    /// Produced at load time; the pipeline never starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },

    /// An internal invariant did not hold. Not expected in normal operation.
    #[error("Invariant violated: {message}")]
    InvariantViolation {
        /// Which invariant and how.
        message: String,
    },
}
