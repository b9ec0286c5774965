mod common;

use tracklink::constants::ObsIndex;
use tracklink::linking::{vtree, LinkStrategy, VtreeParams};
use tracklink::observations::{Observation, ObservationRecord, ObservationStore};
use tracklink::pipeline::{Linker, LinkerParams};
use tracklink::tracks::Track;

use common::{init_logger, sorted};

/// Three two-detection tracklets on RA(t) = 10 + 0.01·t, DEC(t) = 20 + 0.005·t.
fn three_tracklets() -> (ObservationStore, Vec<Track>) {
    let mut store = ObservationStore::new();
    let tracklets = [0.0, 1.0, 2.0]
        .iter()
        .enumerate()
        .map(|(n, &t)| {
            let ids: Vec<ObsIndex> = [t, t + 1e-4]
                .iter()
                .enumerate()
                .map(|(k, &tk)| {
                    store.push(Observation::new(
                        &format!("L{n}{k}"),
                        tk,
                        10.0 + 0.01 * tk,
                        20.0 + 0.005 * tk,
                        20.5,
                    ))
                })
                .collect();
            Track::new(&store, ids)
        })
        .collect();
    (store, tracklets)
}

fn scenario_params(strategy: LinkStrategy) -> LinkerParams {
    LinkerParams::builder()
        .linking(|b| {
            b.acc_r_max(0.001)
                .acc_d_max(0.001)
                .min_support(3)
                .fit_thresh(1e-6)
                .strategy(strategy)
        })
        .build()
        .unwrap()
}

#[test]
fn vtree_links_three_tracklets_into_one_track() {
    init_logger();
    let (store, tracklets) = three_tracklets();
    let params = scenario_params(LinkStrategy::Vtree);

    let tracks = vtree::search(&store, &tracklets, &params.linking);
    assert_eq!(tracks.len(), 1);
    assert_eq!(sorted(&tracks[0]), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn pipeline_links_raw_observations() {
    init_logger();
    for strategy in [LinkStrategy::Vtree, LinkStrategy::Sequential] {
        let (store, _) = three_tracklets();
        let linker = Linker::new(scenario_params(strategy));

        let tracklets = linker.assemble_tracklets(&store);
        assert_eq!(tracklets.len(), 3, "{strategy:?}");

        let results = linker.run(&store);
        assert_eq!(results.len(), 1, "{strategy:?}");
        let track = results.get(0).unwrap();
        assert_eq!(track.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            results.as_identity_lists(),
            vec![vec!["L00", "L01", "L10", "L11", "L20", "L21"]]
        );
        approx::assert_abs_diff_eq!(track.vra, 0.01, epsilon = 1e-8);
        approx::assert_abs_diff_eq!(track.vdec, 0.005, epsilon = 1e-8);
        approx::assert_abs_diff_eq!(track.mean_brightness, 20.5, epsilon = 1e-12);
    }
}

#[test]
fn pipeline_accepts_records_and_tolerates_empty_input() {
    let records = vec![
        ObservationRecord::new("ok", 1.0, 3.0, 4.0, 20.0),
        ObservationRecord::new("bad", f64::NAN, 3.0, 4.0, 20.0),
    ];
    assert!(ObservationStore::from_records(records.clone()).is_err());

    let store = ObservationStore::from_records_lossy(records);
    assert_eq!(store.num_live(), 1);
    assert!(Linker::default().run(&store).is_empty());

    let params = LinkerParams::builder().build().unwrap();
    let json = serde_json::to_string(&params).unwrap();
    let back: LinkerParams = serde_json::from_str(&json).unwrap();
    assert_eq!(back, params);
}

#[test]
fn too_little_support_yields_nothing() {
    let (store, tracklets) = three_tracklets();
    let params = VtreeParams::builder()
        .acc_r_max(0.001)
        .acc_d_max(0.001)
        .min_support(4)
        .build()
        .unwrap();
    assert!(vtree::search(&store, &tracklets, &params).is_empty());
}
