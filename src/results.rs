//! # Track result set
//!
//! Flat, serializable view of the tracks accepted by a [`Linker`](crate::pipeline::Linker)
//! run: store indices, external identities, the fitted motion model, mean brightness
//! and fit quality. This is what hosts consume, either directly, as lists of identities
//! ([`TrackResultSet::as_identity_lists`]), or as a table through [`Display`](fmt::Display).
//!
//! Display
//! -----------------
//! * `{}` – one row per track with its size, epoch span, motion at `t0` and MSE.
//! * `{:#}` – same table followed by the identity list of every track.

use std::fmt;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Row, Table};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, Hours, Magnitude, ObsIndex, MJD},
    observations::ObservationStore,
    tracks::Track,
};

/// One accepted track.
///
/// Fields
/// -----------------
/// * `indices` – observation-store indices, time ordered.
/// * `identities` – external identities of the same observations.
/// * `t0` – reference epoch of the motion model, the first epoch (MJD).
/// * `t_last` – last epoch (MJD).
/// * `ra0`, `vra`, `ara` – RA (hours), rate (hours/day), acceleration (hours/day²).
/// * `dec0`, `vdec`, `adec` – DEC (deg), rate (deg/day), acceleration (deg/day²).
/// * `mean_brightness` – mean apparent magnitude.
/// * `mean_sq_residual` – mean squared angular residual of the fit (deg²).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackResult {
    pub indices: Vec<ObsIndex>,
    pub identities: Vec<String>,
    pub t0: MJD,
    pub t_last: MJD,
    pub ra0: Hours,
    pub vra: f64,
    pub ara: f64,
    pub dec0: Degree,
    pub vdec: f64,
    pub adec: f64,
    pub mean_brightness: Magnitude,
    pub mean_sq_residual: f64,
}

impl TrackResult {
    pub fn from_track(store: &ObservationStore, track: &Track) -> Self {
        let m = track.model();
        TrackResult {
            indices: track.individuals().to_vec(),
            identities: store.identities(track.individuals()),
            t0: m.t0,
            t_last: track.last_time(),
            ra0: m.ra0,
            vra: m.vra,
            ara: m.ara,
            dec0: m.dec0,
            vdec: m.vdec,
            adec: m.adec,
            mean_brightness: track.mean_brightness(),
            mean_sq_residual: track.mean_sq_residual(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Ordered collection of [`TrackResult`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackResultSet {
    tracks: Vec<TrackResult>,
}

impl TrackResultSet {
    pub fn from_tracks(store: &ObservationStore, tracks: &[Track]) -> Self {
        TrackResultSet {
            tracks: tracks
                .iter()
                .map(|t| TrackResult::from_track(store, t))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackResult> {
        self.tracks.iter()
    }

    pub fn get(&self, k: usize) -> Option<&TrackResult> {
        self.tracks.get(k)
    }

    /// Identities of every track, in result order.
    pub fn as_identity_lists(&self) -> Vec<Vec<String>> {
        self.tracks.iter().map(|t| t.identities.clone()).collect()
    }

    /// Store indices of every track, in result order.
    pub fn as_index_lists(&self) -> Vec<Vec<ObsIndex>> {
        self.tracks.iter().map(|t| t.indices.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a TrackResultSet {
    type Item = &'a TrackResult;
    type IntoIter = std::slice::Iter<'a, TrackResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

impl fmt::Display for TrackResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tracks.is_empty() {
            return writeln!(f, "<no tracks>");
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("#"),
            Cell::new("N"),
            Cell::new("t0 (MJD)"),
            Cell::new("span [d]"),
            Cell::new("RA [h]"),
            Cell::new("vRA [h/d]"),
            Cell::new("DEC [deg]"),
            Cell::new("vDEC [deg/d]"),
            Cell::new("mag"),
            Cell::new("MSE [deg²]"),
        ]);

        for (k, t) in self.tracks.iter().enumerate() {
            let right = |s: String| Cell::new(s).set_alignment(CellAlignment::Right);
            table.add_row(Row::from(vec![
                right(k.to_string()),
                right(t.len().to_string()),
                right(format!("{:.6}", t.t0)),
                right(format!("{:.4}", t.t_last - t.t0)),
                right(format!("{:.7}", t.ra0)),
                right(format!("{:.3e}", t.vra)),
                right(format!("{:.6}", t.dec0)),
                right(format!("{:.3e}", t.vdec)),
                right(format!("{:.2}", t.mean_brightness)),
                right(format!("{:.2e}", t.mean_sq_residual)),
            ]));
        }
        writeln!(f, "{table}")?;

        if f.alternate() {
            for (k, t) in self.tracks.iter().enumerate() {
                writeln!(f, "  [{k}] {}", t.identities.join(" "))?;
            }
        }
        Ok(())
    }
}
