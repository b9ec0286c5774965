mod common;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use tracklink::constants::ObsIndex;
use tracklink::observations::ObservationStore;
use tracklink::postprocess::TrackSetExt;
use tracklink::tracks::Track;

use common::{random_field, sorted};

fn random_tracks(store: &ObservationStore, rng: &mut StdRng, n: usize) -> Vec<Track> {
    let all = store.live_indices();
    (0..n)
        .map(|_| {
            let len = rng.random_range(1..=6);
            let mut pick: Vec<ObsIndex> = all.choose_multiple(rng, len).copied().collect();
            pick.sort_unstable();
            Track::new(store, pick)
        })
        .collect()
}

#[test]
fn subset_removal_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(0xD0_0DAD);
    let mut store = ObservationStore::new();
    // a small pool so that random tracks often contain one another
    random_field(&mut store, &mut rng, 12, (3.0, 3.1), (0.0, 0.1), (0.0, 3.0), "p");

    for _ in 0..25 {
        let mut tracks = random_tracks(&store, &mut rng, 40);
        // explicit containments
        let extra: Vec<Track> = tracks
            .iter()
            .take(5)
            .filter(|t| t.num_obs() > 1)
            .map(|t| Track::new(&store, t.individuals()[1..].iter().copied()))
            .collect();
        tracks.extend(extra);

        let once = tracks.remove_subsets();
        let once_sets: Vec<Vec<ObsIndex>> = once.iter().map(sorted).collect();
        let twice_sets: Vec<Vec<ObsIndex>> = once.remove_subsets().iter().map(sorted).collect();
        assert_eq!(once_sets, twice_sets);

        for (k, a) in once_sets.iter().enumerate() {
            for (l, b) in once_sets.iter().enumerate() {
                if k != l {
                    assert!(
                        !a.iter().all(|i| b.contains(i)),
                        "{a:?} is contained in {b:?}"
                    );
                }
            }
        }
    }
}
