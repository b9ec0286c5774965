//! # tracklink
//!
//! Linking of point detections of moving objects into tracks.
//!
//! Pipeline
//! -----------------
//! * [`observations`] – the observation store: dense, index-addressed detections.
//! * [`rdt_tree`] – RA/DEC/time kd-tree with moving-point, range and nearest queries.
//! * [`tracklets`] – same-night tracklet assembly (MHT or PHT).
//! * [`linking`] – multi-night linking under bounded acceleration (VTREE or sequential).
//! * [`postprocess`] – subset and overlap removal on the final track set.
//! * [`pipeline`] – the [`Linker`] chaining the stages into a [`TrackResultSet`].
//!
//! Features
//! -----------------
//! * `progress` – `indicatif` progress bars over the tracklet and VTREE loops.

pub mod constants;
pub mod conversion;
pub mod linker_errors;
pub mod linking;
pub mod observations;
pub mod pipeline;
pub mod postprocess;
pub mod rdt_tree;
pub mod results;
pub mod tracklets;
pub mod tracks;

#[cfg(feature = "progress")]
pub(crate) mod progress_bar;

pub use linker_errors::LinkerError;
pub use observations::{Observation, ObservationRecord, ObservationStore};
pub use pipeline::{Linker, LinkerParams};
pub use results::{TrackResult, TrackResultSet};
pub use tracks::Track;
