use approx::assert_relative_eq;
use ks_core::{YieldMatrix, YieldSource};
use ks_translate::{AnalysisConfig, DatacardInput, ProcessRole, YieldsFile};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

#[test]
fn test_analysis_fixture_builds_every_method() {
    let cfg = AnalysisConfig::from_path(&fixture_path("analysis.yaml")).unwrap();
    assert_eq!(cfg.method_names(), vec!["m2l", "signal", "m5j_dilepton"]);
    let methods = cfg.build_methods().unwrap();
    assert_eq!(methods[0].total_rows(), 8);
    assert_eq!(methods[1].total_rows(), 3 * (1 + 4 + 1 + 4));
    assert_eq!(methods[2].total_rows(), 4 + 6);
    assert!(methods[1].is_signal_plane(0));
    assert_eq!(methods[2].region_label(3).unwrap(), "met>200&&met<=500 | njets==5 | D4");
}

#[test]
fn test_yields_fixture_matches_method() {
    let cfg = AnalysisConfig::from_path(&fixture_path("analysis.yaml")).unwrap();
    let method = cfg.method("m2l").unwrap().build().unwrap();
    let file = YieldsFile::from_path(&fixture_path("yields_m2l.json")).unwrap();
    let loaded = file.to_matrix(&method, &cfg.options).unwrap();

    // data, bkg, one signal; the component row needs split_bkg.
    assert_eq!(loaded.matrix.n_processes(), 3);
    assert_eq!(loaded.rows_with_role(ProcessRole::Signal), vec![2]);
    let bkg = loaded.matrix.process(YieldMatrix::BACKGROUND).unwrap();
    assert_relative_eq!(bkg[3].uncertainty(), 10.0);

    // The same yields do not fit the larger method.
    let signal = cfg.method("signal").unwrap().build().unwrap();
    let mut other = file.clone();
    other.method = "signal".to_string();
    assert!(other.to_matrix(&signal, &cfg.options).is_err());
}

#[test]
fn test_datacard_fixture_renders_each_signal() {
    let input = DatacardInput::from_path(&fixture_path("datacard_input.json")).unwrap();
    let pairs = input.transfer_pairs().unwrap();
    assert_relative_eq!(pairs[0].control_region.yield_(), 40.0);
    let tfs: Vec<_> = pairs
        .iter()
        .map(|p| ks_core::Estimate::new(p.signal_region.yield_() / p.control_region.yield_(), 0.0, 0.0))
        .collect();
    for i in 0..input.signals.len() {
        let card = input.render(i, &tfs).unwrap();
        assert!(card.starts_with("imax 2  number of channels\n"));
        assert!(card.contains("mCT_CR_stat2 gmN 20"));
    }
}
