//! Trail-metadata consistency checks.
//!
//! A moving object imaged during an exposure of `τ` seconds leaves a trail of length
//! `speed·τ/86400` degrees, oriented along its direction of motion. A tracklet is
//! rejected when one of its detections reports a trail that disagrees with the
//! tracklet's fitted linear motion:
//!
//! * by more than `max_lerr` degrees in length (detections with a known exposure), or
//! * by more than `athresh` degrees in orientation, modulo 180°, for trails at least
//!   `min_elong_for_angle` degrees long.

use crate::{
    constants::{Degree, SECONDS_PER_DAY},
    observations::{Elongation, ObservationStore},
    tracks::Track,
};

use super::TrackletParams;

/// Smallest separation between two undirected orientations, on `[0, 90]` degrees.
pub fn orientation_difference(a: Degree, b: Degree) -> Degree {
    let d = (a - b).rem_euclid(180.0);
    d.min(180.0 - d)
}

/// Whether a single trail agrees with the given angular speed (deg/day) and bearing (deg).
pub fn trail_matches(
    elongation: &Elongation,
    speed: f64,
    bearing: Degree,
    params: &TrackletParams,
) -> bool {
    if let Some(exposure) = elongation.exposure_sec {
        let expected = speed * exposure / SECONDS_PER_DAY;
        if (expected - elongation.length_deg).abs() > params.max_lerr {
            return false;
        }
    }
    if elongation.length_deg >= params.min_elong_for_angle
        && orientation_difference(bearing, elongation.angle_deg) > params.athresh
    {
        return false;
    }
    true
}

/// Whether every elongated detection of `track` agrees with its linear motion.
///
/// Single-observation tracklets carry no motion and always pass. A track fitted with
/// an acceleration is refitted with a constant velocity first.
pub fn is_consistent(store: &ObservationStore, track: &Track, params: &TrackletParams) -> bool {
    if track.num_obs() < 2 {
        return true;
    }
    let refit;
    let motion = if track.num_distinct_times() < track.num_for_quad() {
        track
    } else {
        refit = Track::linear(store, track.individuals().iter().copied());
        &refit
    };
    let speed = motion.angular_speed();
    let bearing = motion.bearing_deg();
    track
        .individuals()
        .iter()
        .filter_map(|&i| store.obs(i).elongation.as_ref())
        .all(|e| trail_matches(e, speed, bearing, params))
}

#[cfg(test)]
mod elongation_test {
    use super::*;
    use crate::observations::Observation;

    fn params() -> TrackletParams {
        TrackletParams::builder()
            .max_lerr(1e-3)
            .athresh(10.0)
            .min_elong_for_angle(2e-3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_orientation_difference_is_undirected() {
        assert_eq!(orientation_difference(10.0, 190.0), 0.0);
        assert_eq!(orientation_difference(-85.0, 85.0), 10.0);
        assert_eq!(orientation_difference(0.0, 90.0), 90.0);
    }

    #[test]
    fn test_trail_length_and_angle() {
        let p = params();
        // 1 deg/day over 864 s is 0.01 deg
        let good = Elongation {
            length_deg: 0.01,
            angle_deg: 95.0,
            exposure_sec: Some(864.0),
        };
        assert!(trail_matches(&good, 1.0, -85.0, &p));
        assert!(!trail_matches(&good, 2.0, 90.0, &p));
        assert!(!trail_matches(&good, 1.0, 45.0, &p));

        // too short to carry a direction, no exposure: always compatible
        let stub = Elongation {
            length_deg: 1e-3,
            angle_deg: 0.0,
            exposure_sec: None,
        };
        assert!(trail_matches(&stub, 5.0, 90.0, &p));
    }

    #[test]
    fn test_track_consistency() {
        let trail = Elongation {
            length_deg: 0.01,
            angle_deg: 90.0,
            exposure_sec: Some(864.0),
        };
        let store: ObservationStore = [
            Observation::new("a", 0.0, 2.0, 0.0, 20.0).with_elongation(trail),
            Observation::new("b", 0.1, 2.0, 0.1, 20.0),
            Observation::new("c", 0.1, 2.0, -0.1, 20.0).with_elongation(trail),
        ]
        .into_iter()
        .collect();
        let p = params();
        // northbound at 1 deg/day: the trail agrees
        assert!(is_consistent(&store, &Track::new(&store, [0, 1]), &p));
        // southbound: same length, orientation modulo 180 agrees too
        assert!(is_consistent(&store, &Track::new(&store, [0, 2]), &p));
        assert!(is_consistent(&store, &Track::new(&store, [1]), &p));
    }

    #[test]
    fn test_curved_tracklet_uses_linear_rate() {
        // DEC = (10/3)·t²: at rest at the first epoch, 1 deg/day on average
        let trail = Elongation {
            length_deg: 0.01,
            angle_deg: 90.0,
            exposure_sec: Some(864.0),
        };
        let store: ObservationStore = [0.0, 0.1, 0.2, 0.3]
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                Observation::new(&format!("q{i}"), t, 2.0, 10.0 / 3.0 * t * t, 20.0)
                    .with_elongation(trail)
            })
            .collect();
        let track = Track::new(&store, [0, 1, 2, 3]);
        assert!(track.angular_speed() < 1e-6);
        assert!(is_consistent(&store, &track, &params()));
    }
}
