//! Error taxonomy for flux computations.
//!
//! Every fallible operation in the library reports one of these variants to its
//! immediate caller. Nothing is silently corrected: the only tolerated oddities
//! are the trailing-bin discard threshold and the continuity-corrected flux at
//! zero count, both of which are documented behaviours rather than errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type FluxResult<T> = Result<T, FluxError>;

/// Errors raised by the time, zenith, binning and dataset layers.
#[derive(Error, Debug)]
pub enum FluxError {
    /// Observation rows were not in strictly ascending time order.
    #[error("observations not ascending at index {index}: {previous} followed by {current}")]
    InputOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    /// A formula was evaluated outside its mathematical domain.
    #[error("domain error: {0}")]
    Domain(String),

    /// None of the accepted timestamp formats matched.
    #[error("unrecognised timestamp '{input}'")]
    Parse { input: String },

    /// The binning or dataset configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The observation source failed to deliver rows.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl FluxError {
    /// True for errors caused by the caller's request rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FluxError::Config(_) | FluxError::Parse { .. })
    }
}
