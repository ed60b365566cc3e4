//! Failure kinds surfaced by the scanner's collaborators.
//!
//! Per-item failures (one price lookup, one estimate sample) are turned into
//! "absent" at the component boundary; only an upstream failure of the event
//! listing aborts a run.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// The market-data provider answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    UpstreamStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// A midpoint lookup exceeded its deadline.
    #[error("price lookup timed out after {0:?}")]
    Timeout(Duration),

    /// A midpoint outside the [0, 1] probability range.
    #[error("price {0} is outside [0, 1]")]
    PriceOutOfRange(f64),

    /// The estimate response contained no `{ ... }` object.
    #[error("no JSON object found in estimate response")]
    MissingPayload,

    /// The estimate object was found but could not be decoded.
    #[error("malformed estimate payload: {0}")]
    MalformedPayload(String),
}
