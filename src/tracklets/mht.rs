//! Multi-hypothesis tracklet expansion.
//!
//! Starting from the singleton `{X}`, every candidate `Y` (ascending time) is offered
//! to every live hypothesis that ends strictly before `Y`. An extension survives when
//! the refitted track's mean angular residual stays below `thresh`; tracks of one or
//! two observations always fit and are accepted unchecked.
//!
//! Outside greedy mode each accepted extension branches into a new hypothesis and the
//! parent stays alive. In greedy mode a hypothesis that already holds three or more
//! observations is replaced in place by its extension, and only the longest
//! hypotheses are reported.

use crate::{constants::ObsIndex, observations::ObservationStore, tracks::Track};

use super::TrackletParams;

/// Expand hypotheses from start observation `x` over time-sorted `candidates`.
pub fn expand(
    store: &ObservationStore,
    x: ObsIndex,
    candidates: &[ObsIndex],
    params: &TrackletParams,
) -> Vec<Track> {
    let mut hypotheses = vec![Track::with_quad_threshold(store, [x], params.num_for_quad)];

    for &y in candidates {
        let t_y = store.obs(y).time;
        let mut branches = Vec::new();

        for hyp in hypotheses.iter_mut() {
            if hyp.num_obs() >= params.max_obs || t_y <= hyp.last_time() {
                continue;
            }
            let ext = hyp.extend(store, y);
            if ext.num_obs() > 2 && ext.mean_residual() >= params.thresh {
                continue;
            }
            if params.greedy && hyp.num_obs() >= 3 {
                *hyp = ext;
            } else {
                branches.push(ext);
            }
        }
        hypotheses.extend(branches);
    }

    if params.greedy {
        let longest = hypotheses.iter().map(Track::num_obs).max().unwrap_or(0);
        hypotheses.retain(|h| h.num_obs() == longest);
    }
    hypotheses
}
