//! # Point observations
//!
//! A single detection of a moving object: epoch, sky position, brightness and an
//! identity string, with the optional trail metadata some surveys report.
//!
//! Observations are immutable values. They live inside an
//! [`ObservationStore`](crate::observations::store::ObservationStore), which hands out
//! **stable integer indices**; every other structure in the crate (tracks, trees,
//! graphs) refers to observations through those indices only.
//!
//! Units
//! -----------------
//! * `time` – Modified Julian Date (days)
//! * `ra` – right ascension in **hours**, `[0, 24)`
//! * `dec` – declination in **degrees**, `[-90, 90]`
//! * `brightness` – apparent magnitude

pub mod store;

pub use store::ObservationStore;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, Hours, Magnitude, MAX_ID_LEN, MJD},
    conversion::{angular_distance, wrap_hours},
    linker_errors::LinkerError,
};

/// Trail metadata of an elongated detection.
///
/// # Fields
///
/// * `length_deg` - imaged trail length (degrees)
/// * `angle_deg` - trail orientation, measured from the +RA axis towards +DEC (degrees)
/// * `exposure_sec` - exposure time the trail was integrated over (seconds), if known
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Elongation {
    pub length_deg: Degree,
    pub angle_deg: Degree,
    pub exposure_sec: Option<f64>,
}

/// A single point observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: MJD,
    pub ra: Hours,
    pub dec: Degree,
    pub brightness: Magnitude,
    pub id: String,
    pub obs_code: Option<String>,
    pub elongation: Option<Elongation>,
}

impl Observation {
    /// Create a new observation without survey metadata.
    ///
    /// Arguments
    /// ---------
    /// * `id`: identity string (at most 8 characters, longer strings are truncated)
    /// * `time`: epoch (MJD)
    /// * `ra`: right ascension (hours), wrapped onto `[0, 24)`
    /// * `dec`: declination (degrees)
    /// * `brightness`: apparent magnitude
    pub fn new(id: &str, time: MJD, ra: Hours, dec: Degree, brightness: Magnitude) -> Self {
        Observation {
            time,
            ra: wrap_hours(ra),
            dec,
            brightness,
            id: id.chars().take(MAX_ID_LEN).collect(),
            obs_code: None,
            elongation: None,
        }
    }

    /// Attach trail metadata to this observation.
    pub fn with_elongation(mut self, elongation: Elongation) -> Self {
        self.elongation = Some(elongation);
        self
    }

    /// Attach an observatory code to this observation.
    pub fn with_obs_code(mut self, code: &str) -> Self {
        self.obs_code = Some(code.to_string());
        self
    }

    /// Great-circle distance to another observation, in degrees.
    #[inline]
    pub fn distance_to(&self, other: &Observation) -> Degree {
        angular_distance(self.ra, self.dec, other.ra, other.dec)
    }

    /// Identity padded with spaces to the fixed 8-character width.
    pub fn padded_id(&self) -> String {
        format!("{:<width$}", self.id, width = MAX_ID_LEN)
    }
}

/// Raw ingestion tuple, as produced by the external file readers or a host language.
///
/// `(identity, time_mjd, RA, DEC, brightness, obs_code?, elongation_length_deg?,
/// elongation_angle_deg?, exposure_time_sec?)`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: String,
    pub time: MJD,
    pub ra: Hours,
    pub dec: Degree,
    pub brightness: Magnitude,
    pub obs_code: Option<String>,
    pub elongation_length_deg: Option<Degree>,
    pub elongation_angle_deg: Option<Degree>,
    pub exposure_sec: Option<f64>,
}

impl ObservationRecord {
    pub fn new(id: &str, time: MJD, ra: Hours, dec: Degree, brightness: Magnitude) -> Self {
        ObservationRecord {
            id: id.to_string(),
            time,
            ra,
            dec,
            brightness,
            ..Default::default()
        }
    }

    /// Validate the record and turn it into an [`Observation`].
    ///
    /// Arguments
    /// ---------
    /// * `index`: position of the record in its input sequence, used for diagnostics
    ///
    /// Return
    /// ------
    /// * the observation, or a [`LinkerError`] naming the first inconsistency found
    ///
    /// Notes
    /// -----
    /// * Elongation length and angle must be given together; an exposure time
    ///   without a trail is rejected as inconsistent.
    pub fn into_observation(self, index: usize) -> Result<Observation, LinkerError> {
        let invalid = |reason: &str| LinkerError::InvalidObservation {
            index,
            reason: reason.to_string(),
        };

        let len = self.id.chars().count();
        if len > MAX_ID_LEN {
            return Err(LinkerError::IdentityTooLong { id: self.id, len });
        }
        if !self.time.is_finite() {
            return Err(invalid("time is not finite"));
        }
        if !(self.ra.is_finite() && (0.0..24.0).contains(&self.ra)) {
            return Err(invalid("RA outside [0, 24) hours"));
        }
        if !(self.dec.is_finite() && (-90.0..=90.0).contains(&self.dec)) {
            return Err(invalid("DEC outside [-90, 90] degrees"));
        }

        let elongation = match (
            self.elongation_length_deg,
            self.elongation_angle_deg,
            self.exposure_sec,
        ) {
            (Some(length_deg), Some(angle_deg), exposure_sec) => {
                if !(length_deg.is_finite() && length_deg >= 0.0 && angle_deg.is_finite()) {
                    return Err(invalid("elongation must be finite and non-negative"));
                }
                Some(Elongation {
                    length_deg,
                    angle_deg,
                    exposure_sec,
                })
            }
            (None, None, None) => None,
            _ => return Err(invalid("inconsistent elongation fields")),
        };

        Ok(Observation {
            time: self.time,
            ra: self.ra,
            dec: self.dec,
            brightness: self.brightness,
            id: self.id,
            obs_code: self.obs_code,
            elongation,
        })
    }
}
