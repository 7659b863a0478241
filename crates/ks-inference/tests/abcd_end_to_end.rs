use approx::assert_relative_eq;
use ks_core::{GammaParams, YieldMatrix, YieldSource};
use ks_inference::{AbcdMethod, PredictionConfig, Quadrant, Sampling, ToyConfig, find_preds};

fn strings(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

/// Two planes (control + signal), one bin each.
fn two_plane_method() -> AbcdMethod {
    AbcdMethod::with_shared_bins(
        "m2l",
        strings(&["met>150&&met<=200", "met>200"]),
        strings(&["njets>=6"]),
        strings(&["mt<=140&&mj<=400", "mt<=140&&mj>400", "mt>140&&mj<=400", "mt>140&&mj>400"]),
    )
    .unwrap()
    .with_first_signal_bin(Some(1))
    .unwrap()
}

fn mc(yield_: f64, err: f64) -> GammaParams {
    GammaParams::new(1000, yield_, err * err)
}

fn scenario() -> YieldMatrix {
    let plane_data = [200, 80, 40, 100].map(GammaParams::from_count);
    let plane_mc = [mc(200.0, 14.0), mc(80.0, 9.0), mc(40.0, 6.0), mc(95.0, 10.0)];
    let data: Vec<GammaParams> = plane_data.iter().chain(&plane_data).copied().collect();
    let bkg: Vec<GammaParams> = plane_mc.iter().chain(&plane_mc).copied().collect();
    YieldMatrix::new(vec![data, bkg]).unwrap()
}

fn config() -> PredictionConfig {
    PredictionConfig { toys: ToyConfig { n_toys: 10_000, sampling: Sampling::Poisson }, seed: 1234 }
}

#[test]
fn test_two_plane_prediction() {
    let method = two_plane_method();
    let mut yields = scenario();
    let p = find_preds(&method, &mut yields, &config()).unwrap();

    assert_eq!(p.n_planes(), 2);
    for plane in 0..2 {
        let ratio = p.plane_ratios[plane];
        assert!(ratio.defined);
        assert_relative_eq!(ratio.ratio, 420.0 / 415.0, epsilon = 1e-9);

        // The plane normalization cancels in the prediction: 80 * 40 / 200 * kappa_mc.
        let kappa = p.kappas_mc[plane][0];
        assert_relative_eq!(kappa.value, 200.0 * 95.0 / (80.0 * 40.0), epsilon = 1e-6);
        assert_relative_eq!(p.kappas_data[plane][0].value, 200.0 * 100.0 / (80.0 * 40.0), epsilon = 1e-9);
        assert_relative_eq!(p.kappas_mc_data_errors[plane][0].value, kappa.value, epsilon = 1e-6);

        let pred = p.preds[plane][0];
        assert_relative_eq!(pred.value, 95.0, epsilon = 1e-6);
        assert!(pred.is_constrained());
        assert!(pred.up > 0.0 && pred.down > 0.0);
        assert!(pred.value - pred.down < 90.0, "down={}", pred.down);
        assert!(pred.value + pred.up > 110.0, "up={}", pred.up);
        // Asymmetric band of a product of Poisson ratios leans upward.
        assert!(pred.up > pred.down);
    }

    assert!(!method.is_signal_plane(0));
    assert!(method.is_signal_plane(1));
}

#[test]
fn test_simulation_normalized_in_place() {
    let method = two_plane_method();
    let mut yields = scenario();
    find_preds(&method, &mut yields, &config()).unwrap();
    let bkg = yields.process(YieldMatrix::BACKGROUND).unwrap();
    let r4 = method.index_bin(1, 0, Quadrant::R4).unwrap();
    assert_relative_eq!(bkg[r4].yield_(), 95.0 * 420.0 / 415.0, epsilon = 1e-9);
    let plane_total: f64 = bkg[method.plane_rows(0)].iter().map(GammaParams::yield_).sum();
    assert_relative_eq!(plane_total, 420.0, epsilon = 1e-9);
}

#[test]
fn test_predictions_reproducible_and_seed_sensitive() {
    let method = two_plane_method();
    let a = find_preds(&method, &mut scenario(), &config()).unwrap();
    let b = find_preds(&method, &mut scenario(), &config()).unwrap();
    assert_eq!(a, b);

    let other = PredictionConfig { seed: 99, ..config() };
    let c = find_preds(&method, &mut scenario(), &other).unwrap();
    assert_eq!(a.preds[0][0].value, c.preds[0][0].value);
    assert_ne!(a.preds[0][0].up, c.preds[0][0].up);
}

#[test]
fn test_json_output_shape() {
    let method = two_plane_method();
    let quick = PredictionConfig { toys: ToyConfig { n_toys: 200, sampling: Sampling::Poisson }, seed: 1 };
    let p = find_preds(&method, &mut scenario(), &quick).unwrap();
    let v = serde_json::to_value(&p).unwrap();
    assert_eq!(v["preds"].as_array().unwrap().len(), 2);
    assert_eq!(v["preds"][1][0]["status"], "ok");
    assert!(v["plane_ratios"][0]["defined"].as_bool().unwrap());
}
