//! # Tracks
//!
//! A [`Track`] is an ordered set of observation indices ("individuals") together
//! with the polynomial [`MotionModel`] fitted through them. Short same-night tracks
//! are called *tracklets*; multi-night assemblies are simply tracks.
//!
//! Tracks are **value types**. Extending or combining always produces a new track
//! whose model is refitted from the underlying observations; there is no in-place
//! update of a fit, so a model can never go stale with respect to its individuals.
//!
//! Invariants
//! -----------------
//! * individuals are sorted by ascending observation time (ties by index) and unique,
//! * a track holds at least one individual,
//! * the residual statistics cached at construction match the fitted model.

pub mod fit;

pub use fit::MotionModel;

use crate::{
    constants::{
        Degree, Hours, IndexList, ObsIndex, DEFAULT_NUM_FOR_QUAD, DEG_PER_HOUR, MJD, RADEG,
        TIME_EPS,
    },
    conversion::angular_distance,
    linker_errors::LinkerError,
    observations::ObservationStore,
};
use fit::{count_distinct_times, fit_motion};
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    individuals: IndexList,
    times: SmallVec<[MJD; 8]>,
    model: MotionModel,
    mean_brightness: f64,
    mean_residual: Degree,
    mean_sq_residual: f64,
    max_residual: Degree,
    num_for_quad: usize,
}

impl Track {
    /// Fit a new track through the given observations with the default quadratic threshold.
    ///
    /// # Panics
    ///
    /// Panics if `indices` is empty or references a removed observation.
    pub fn new<I>(store: &ObservationStore, indices: I) -> Self
    where
        I: IntoIterator<Item = ObsIndex>,
    {
        Self::with_quad_threshold(store, indices, DEFAULT_NUM_FOR_QUAD)
    }

    /// Fallible variant of [`Track::new`].
    pub fn try_new<I>(store: &ObservationStore, indices: I) -> Result<Self, LinkerError>
    where
        I: IntoIterator<Item = ObsIndex>,
    {
        let indices: IndexList = indices.into_iter().collect();
        if indices.is_empty() {
            return Err(LinkerError::EmptyTrack);
        }
        for &i in &indices {
            store.try_get(i)?;
        }
        Ok(Self::with_quad_threshold(store, indices, DEFAULT_NUM_FOR_QUAD))
    }

    /// Fit a new track, requiring `num_for_quad` distinct epochs before an acceleration is fitted.
    ///
    /// Arguments
    /// ---------
    /// * `store`: the observation store the indices refer to
    /// * `indices`: observation indices, in any order; duplicates are dropped
    /// * `num_for_quad`: distinct-epoch threshold for the quadratic model
    ///
    /// Return
    /// ------
    /// * a track whose individuals are time-sorted and whose model and residual
    ///   statistics are computed from scratch
    pub fn with_quad_threshold<I>(
        store: &ObservationStore,
        indices: I,
        num_for_quad: usize,
    ) -> Self
    where
        I: IntoIterator<Item = ObsIndex>,
    {
        let mut individuals: IndexList = indices.into_iter().collect();
        assert!(!individuals.is_empty(), "a track needs at least one observation");

        individuals.sort_unstable_by(|&a, &b| {
            store
                .obs(a)
                .time
                .total_cmp(&store.obs(b).time)
                .then(a.cmp(&b))
        });
        individuals.dedup();

        let samples: Vec<(MJD, Hours, Degree)> = individuals
            .iter()
            .map(|&i| {
                let o = store.obs(i);
                (o.time, o.ra, o.dec)
            })
            .collect();
        let model = fit_motion(&samples, num_for_quad);

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut max: Degree = 0.0;
        for &(t, ra, dec) in &samples {
            let (pra, pdec) = model.predict(t);
            let d = angular_distance(ra, dec, pra, pdec);
            sum += d;
            sum_sq += d * d;
            max = max.max(d);
        }
        let n = samples.len() as f64;

        let mags: Vec<f64> = individuals
            .iter()
            .map(|&i| store.obs(i).brightness)
            .filter(|m| m.is_finite())
            .collect();
        let mean_brightness = if mags.is_empty() {
            f64::NAN
        } else {
            mags.iter().sum::<f64>() / mags.len() as f64
        };

        Track {
            times: samples.iter().map(|s| s.0).collect(),
            individuals,
            model,
            mean_brightness,
            mean_residual: sum / n,
            mean_sq_residual: sum_sq / n,
            max_residual: max,
            num_for_quad,
        }
    }

    /// Fit a constant-velocity track, whatever the number of distinct epochs.
    ///
    /// Tracks built from it keep the linear model through [`Track::extend`] and
    /// [`Track::combine`].
    pub fn linear<I>(store: &ObservationStore, indices: I) -> Self
    where
        I: IntoIterator<Item = ObsIndex>,
    {
        Self::with_quad_threshold(store, indices, usize::MAX)
    }

    /// A new track holding this track's observations plus `index`.
    pub fn extend(&self, store: &ObservationStore, index: ObsIndex) -> Track {
        Track::with_quad_threshold(
            store,
            self.individuals.iter().copied().chain(std::iter::once(index)),
            self.num_for_quad,
        )
    }

    /// A new track holding the union of both tracks' observations.
    pub fn combine(&self, store: &ObservationStore, other: &Track) -> Track {
        Track::with_quad_threshold(
            store,
            self.individuals
                .iter()
                .chain(other.individuals.iter())
                .copied(),
            self.num_for_quad,
        )
    }

    /// Observation indices in ascending time order.
    #[inline]
    pub fn individuals(&self) -> &[ObsIndex] {
        &self.individuals
    }

    /// Observation epochs, aligned with [`Track::individuals`].
    #[inline]
    pub fn times(&self) -> &[MJD] {
        &self.times
    }

    /// Observation indices sorted by index value, for set comparisons.
    pub fn sorted_indices(&self) -> IndexList {
        let mut v = self.individuals.clone();
        v.sort_unstable();
        v
    }

    #[inline]
    pub fn model(&self) -> &MotionModel {
        &self.model
    }

    #[inline]
    pub fn num_obs(&self) -> usize {
        self.individuals.len()
    }

    pub fn num_distinct_times(&self) -> usize {
        count_distinct_times(&self.times)
    }

    #[inline]
    pub fn first_time(&self) -> MJD {
        self.times[0]
    }

    #[inline]
    pub fn last_time(&self) -> MJD {
        self.times[self.times.len() - 1]
    }

    #[inline]
    pub fn time_length(&self) -> f64 {
        self.last_time() - self.first_time()
    }

    #[inline]
    pub fn first_index(&self) -> ObsIndex {
        self.individuals[0]
    }

    #[inline]
    pub fn last_index(&self) -> ObsIndex {
        self.individuals[self.individuals.len() - 1]
    }

    pub fn contains(&self, index: ObsIndex) -> bool {
        self.individuals.contains(&index)
    }

    pub fn mean_brightness(&self) -> f64 {
        self.mean_brightness
    }

    /// Mean angular distance between each observation and the fitted prediction (deg).
    pub fn mean_residual(&self) -> Degree {
        self.mean_residual
    }

    /// Mean squared angular residual (deg²).
    pub fn mean_sq_residual(&self) -> f64 {
        self.mean_sq_residual
    }

    pub fn max_residual(&self) -> Degree {
        self.max_residual
    }

    pub fn num_for_quad(&self) -> usize {
        self.num_for_quad
    }

    #[inline]
    pub fn predict(&self, t: MJD) -> (Hours, Degree) {
        self.model.predict(t)
    }

    #[inline]
    pub fn predict_linear(&self, t: MJD) -> (Hours, Degree) {
        self.model.predict_linear(t)
    }

    /// Mean angular distance of other observations from this track's prediction.
    ///
    /// Return
    /// ------
    /// * the mean separation in degrees, `0.0` for an empty slice
    pub fn prediction_residual(&self, store: &ObservationStore, indices: &[ObsIndex]) -> Degree {
        if indices.is_empty() {
            return 0.0;
        }
        let total: f64 = indices
            .iter()
            .map(|&i| {
                let o = store.obs(i);
                let (ra, dec) = self.predict(o.time);
                angular_distance(o.ra, o.dec, ra, dec)
            })
            .sum();
        total / indices.len() as f64
    }

    /// Angular speed on the sky at `t0`, in degrees per day.
    pub fn angular_speed(&self) -> f64 {
        let (vx, vy) = self.tangent_velocity();
        vx.hypot(vy)
    }

    /// Direction of motion at `t0`, in degrees from +RA towards +DEC, on `(-180, 180]`.
    pub fn bearing_deg(&self) -> Degree {
        let (vx, vy) = self.tangent_velocity();
        vy.atan2(vx) / RADEG
    }

    fn tangent_velocity(&self) -> (f64, f64) {
        let m = &self.model;
        (m.vra * DEG_PER_HOUR * (m.dec0 * RADEG).cos(), m.vdec)
    }

    /// Whether the two tracks assign two *different* observations to the same epoch.
    pub fn collides_with(&self, other: &Track) -> bool {
        let mut start = 0;
        for (&ti, &ii) in self.times.iter().zip(self.individuals.iter()) {
            while start < other.times.len() && other.times[start] < ti - TIME_EPS {
                start += 1;
            }
            let mut j = start;
            while j < other.times.len() && other.times[j] <= ti + TIME_EPS {
                if other.individuals[j] != ii {
                    return true;
                }
                j += 1;
            }
        }
        false
    }

    /// Whether every observation of this track also belongs to `other`.
    pub fn is_subset_of(&self, other: &Track) -> bool {
        self.num_obs() <= other.num_obs() && self.individuals.iter().all(|&i| other.contains(i))
    }

    /// Number of observations shared with `other`.
    pub fn shared_count(&self, other: &Track) -> usize {
        self.individuals
            .iter()
            .filter(|&&i| other.contains(i))
            .count()
    }
}

#[cfg(test)]
mod track_test {
    use super::*;
    use crate::observations::Observation;
    use approx::assert_abs_diff_eq;

    fn line_store() -> ObservationStore {
        // RA(t) = 10 + 0.01 t hours, DEC(t) = 20 + 0.005 t degrees
        [0.0, 0.01, 1.0, 1.01, 2.0, 2.01]
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                Observation::new(&format!("L{i}"), t, 10.0 + 0.01 * t, 20.0 + 0.005 * t, 20.0)
            })
            .collect()
    }

    #[test]
    fn test_single_observation_track() {
        let store = line_store();
        let t = Track::new(&store, [3]);
        let m = t.model();
        assert_eq!((m.vra, m.vdec, m.ara, m.adec), (0.0, 0.0, 0.0, 0.0));
        assert_abs_diff_eq!(m.ra0, store.obs(3).ra, epsilon = 1e-12);
        assert!(t.mean_residual() < 1e-12);
    }

    #[test]
    fn test_two_observations_fit_exactly() {
        let store = line_store();
        let t = Track::new(&store, [4, 1]);
        assert_eq!(t.individuals(), &[1, 4]);
        for &i in t.individuals() {
            let o = store.obs(i);
            let (ra, dec) = t.predict(o.time);
            assert!(angular_distance(o.ra, o.dec, ra, dec) < 1e-10);
        }
        assert!(t.mean_residual() < 1e-10);
    }

    #[test]
    fn test_combine_and_extend_refit() {
        let store = line_store();
        let a = Track::new(&store, [0, 1]);
        let b = Track::new(&store, [2, 3]);
        let ab = a.combine(&store, &b);
        assert_eq!(ab.individuals(), &[0, 1, 2, 3]);
        assert_eq!(ab.num_distinct_times(), 4);
        assert!(ab.mean_sq_residual() < 1e-20);
        // the source tracks are untouched
        assert_eq!(a.num_obs(), 2);

        let abc = ab.extend(&store, 5).extend(&store, 5);
        assert_eq!(abc.num_obs(), 5);
        assert_eq!(abc.first_time(), 0.0);
        assert_abs_diff_eq!(abc.time_length(), 2.01, epsilon = 1e-12);
        assert_abs_diff_eq!(abc.model().vra, 0.01, epsilon = 1e-9);
        assert_abs_diff_eq!(abc.prediction_residual(&store, &[4]), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collisions_and_subsets() {
        let mut store = line_store();
        let twin = store.push(Observation::new("twin", 1.0, 10.5, 20.0, 20.0));
        let a = Track::new(&store, [0, 2]);
        let b = Track::new(&store, [1, twin]);
        let c = Track::new(&store, [0, 2, 4]);
        assert!(a.collides_with(&b));
        assert!(b.collides_with(&a));
        assert!(!a.collides_with(&c));
        assert!(a.is_subset_of(&c));
        assert!(!c.is_subset_of(&a));
        assert_eq!(a.shared_count(&c), 2);
    }

    #[test]
    fn test_speed_and_bearing() {
        let store: ObservationStore = [
            Observation::new("a", 0.0, 0.0, 0.0, 20.0),
            Observation::new("b", 1.0, 0.0, 1.0, 20.0),
        ]
        .into_iter()
        .collect();
        let t = Track::new(&store, [0, 1]);
        assert_abs_diff_eq!(t.angular_speed(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.bearing_deg(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_track_ignores_curvature() {
        // DEC(t) = 0.05 t²: four epochs are enough for an acceleration by default
        let store: ObservationStore = [0.0, 0.02, 1.0, 1.02]
            .iter()
            .enumerate()
            .map(|(i, &t)| Observation::new(&format!("c{i}"), t, 5.0, 0.05 * t * t, 20.0))
            .collect();
        let quad = Track::new(&store, [0, 1, 2, 3]);
        assert_abs_diff_eq!(quad.model().adec, 0.1, epsilon = 1e-9);

        let lin = Track::linear(&store, [0, 1]);
        let both = lin.combine(&store, &Track::new(&store, [2, 3]));
        assert_eq!(both.num_distinct_times(), 4);
        assert_eq!(both.model().adec, 0.0);
        assert_eq!(both.model().ara, 0.0);
        assert!(both.mean_residual() > 1e-4);
    }

    #[test]
    fn test_try_new_rejects_empty_and_missing() {
        let store = line_store();
        assert_eq!(
            Track::try_new(&store, std::iter::empty()),
            Err(LinkerError::EmptyTrack)
        );
        assert_eq!(
            Track::try_new(&store, [0, 42]),
            Err(LinkerError::ObservationNotFound(42))
        );
    }
}
