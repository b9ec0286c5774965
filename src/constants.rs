//! # Constants and type definitions for tracklink
//!
//! This module centralizes the **unit conversions**, **numerical floors**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Unit conversions (hours ↔ degrees ↔ radians)
//! - Epsilon floors used for degenerate geometry
//! - Core type aliases (angles, epochs, store indices)
//! - Small inline containers for index lists

use smallvec::SmallVec;

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Hours of right ascension → degrees
pub const DEG_PER_HOUR: f64 = 15.0;

/// Hours of right ascension → radians
pub const RADH: f64 = DPI / 24.0;

/// Length of the right ascension circle in hours
pub const HOURS_PER_CIRCLE: f64 = 24.0;

/// Seconds in one day, to convert exposure times
pub const SECONDS_PER_DAY: f64 = 86400.0;

// -------------------------------------------------------------------------------------------------
// Numerical floors
// -------------------------------------------------------------------------------------------------

/// Any box dimension narrower than this is treated as exactly this wide.
pub const MIN_WIDTH: f64 = 1e-10;

/// Two epochs closer than this (days) are considered simultaneous.
pub const TIME_EPS: f64 = 1e-8;

/// Slack added to pruning bounds so that rounding never drops a true match.
pub const PRUNE_SLACK: f64 = 1e-9;

/// Default number of distinct epochs required before a track is fitted with
/// an acceleration term.
pub const DEFAULT_NUM_FOR_QUAD: usize = 4;

/// Maximum length of an observation identity string.
pub const MAX_ID_LEN: usize = 8;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Right ascension in hours, `[0, 24)`
pub type Hours = f64;
/// Angle in radians
pub type Radian = f64;
/// Modified Julian Date (days)
pub type MJD = f64;
/// Apparent magnitude
pub type Magnitude = f64;
/// Stable index of an observation inside an
/// [`ObservationStore`](crate::observations::ObservationStore)
pub type ObsIndex = usize;

/// Inline-optimized list of observation indices; tracklets rarely exceed eight detections.
pub type IndexList = SmallVec<[ObsIndex; 8]>;
