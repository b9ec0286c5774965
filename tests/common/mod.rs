#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::Rng;

use tracklink::constants::{ObsIndex, MJD};
use tracklink::observations::{Observation, ObservationStore};
use tracklink::rdt_tree::MovingPointQuery;
use tracklink::tracks::Track;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Uniform random detections over a sky patch and a time range.
pub fn random_field(
    store: &mut ObservationStore,
    rng: &mut StdRng,
    n: usize,
    ra: (f64, f64),
    dec: (f64, f64),
    time: (MJD, MJD),
    prefix: &str,
) -> Vec<ObsIndex> {
    (0..n)
        .map(|k| {
            store.push(Observation::new(
                &format!("{prefix}{k}"),
                rng.random_range(time.0..time.1),
                rng.random_range(ra.0..ra.1),
                rng.random_range(dec.0..dec.1),
                rng.random_range(18.0..22.0),
            ))
        })
        .collect()
}

/// Constant-acceleration path, RA in hours and DEC in degrees.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticPath {
    pub t0: MJD,
    pub ra0: f64,
    pub vra: f64,
    pub ara: f64,
    pub dec0: f64,
    pub vdec: f64,
    pub adec: f64,
}

impl SyntheticPath {
    pub fn at(&self, t: MJD) -> (f64, f64) {
        let dt = t - self.t0;
        (
            self.ra0 + self.vra * dt + 0.5 * self.ara * dt * dt,
            self.dec0 + self.vdec * dt + 0.5 * self.adec * dt * dt,
        )
    }

    /// Sample the path at every `night + offset` epoch, one tracklet per night.
    ///
    /// Returns the store indices grouped by night.
    pub fn sample(
        &self,
        store: &mut ObservationStore,
        nights: &[f64],
        offsets: &[f64],
        prefix: &str,
    ) -> Vec<Vec<ObsIndex>> {
        self.sample_with(store, nights, offsets, prefix, |_| (0.0, 0.0))
    }

    /// Like [`SyntheticPath::sample`], with Gaussian astrometric errors of `sigma` degrees
    /// on the sky along each axis.
    pub fn sample_noisy(
        &self,
        store: &mut ObservationStore,
        rng: &mut StdRng,
        sigma: f64,
        nights: &[f64],
        offsets: &[f64],
        prefix: &str,
    ) -> Vec<Vec<ObsIndex>> {
        self.sample_with(store, nights, offsets, prefix, |dec| {
            let cos_dec = dec.to_radians().cos();
            (
                sigma * gaussian(rng) / cos_dec / 15.0,
                sigma * gaussian(rng),
            )
        })
    }

    fn sample_with(
        &self,
        store: &mut ObservationStore,
        nights: &[f64],
        offsets: &[f64],
        prefix: &str,
        mut error: impl FnMut(f64) -> (f64, f64),
    ) -> Vec<Vec<ObsIndex>> {
        nights
            .iter()
            .enumerate()
            .map(|(n, &night)| {
                offsets
                    .iter()
                    .enumerate()
                    .map(|(k, &off)| {
                        let t = self.t0 + night + off;
                        let (ra, dec) = self.at(t);
                        let (dra, ddec) = error(dec);
                        let name = format!("{prefix}{n}{k}");
                        store.push(Observation::new(&name, t, ra + dra, dec + ddec, 20.0))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Standard normal deviate (Box-Muller).
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Exhaustive moving-point query over `subset`.
pub fn brute_force_query(
    store: &ObservationStore,
    subset: &[ObsIndex],
    anchor: &Observation,
    query: &MovingPointQuery,
) -> Vec<ObsIndex> {
    let mut out: Vec<ObsIndex> = subset
        .iter()
        .copied()
        .filter(|&i| query.matches(anchor, store.obs(i)))
        .collect();
    out.sort_unstable();
    out
}

pub fn sorted(track: &Track) -> Vec<ObsIndex> {
    track.sorted_indices().to_vec()
}
