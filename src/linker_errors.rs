use thiserror::Error;

use crate::constants::ObsIndex;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid observation record {index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    #[error("Observation identity too long ({len} > 8 characters): {id}")]
    IdentityTooLong { id: String, len: usize },

    #[error("Observation not found: {0}")]
    ObservationNotFound(ObsIndex),

    #[error("Track must hold at least one observation")]
    EmptyTrack,
}
