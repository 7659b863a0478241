//! `kappastat predict`: run one ABCD method and report kappas, predictions
//! and observed yields as JSON or as a fixed-width table.

use anyhow::Result;
use ks_core::{Estimate, GammaParams, YieldMatrix, YieldSource};
use ks_inference::{AbcdMethod, Predictions, Quadrant, find_preds};
use ks_prob::significance::{ratio_with_error, zbi};
use ks_translate::{AnalysisConfig, AnalysisOptions, LoadedYields, ProcessRole, YieldsFile};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

pub struct PredictArgs {
    pub config: PathBuf,
    pub yields: PathBuf,
    pub method: Option<String>,
    pub toys: Option<usize>,
    pub seed: Option<u64>,
    pub unblind: bool,
    pub only_mc: bool,
    pub table: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ValueError {
    value: f64,
    error: f64,
}

#[derive(Debug, Clone, Serialize)]
struct RowReport {
    index: usize,
    quadrant: Quadrant,
    bin: usize,
    label: String,
    cut: String,
    mc: ValueError,
    /// `None` when blinded.
    obs: Option<f64>,
    obs_over_mc: Option<ValueError>,
    signals: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct BinReport {
    bin: usize,
    cut: String,
    kappa_mc: Estimate,
    /// `None` when blinded.
    kappa_data: Option<Estimate>,
    kappa_mc_data_errors: Estimate,
    pred: Estimate,
    /// `None` when blinded.
    obs: Option<f64>,
    /// Z_Bi of the observation against the prediction; `None` when blinded.
    significance: Option<f64>,
    /// Z_Bi of pseudodata + signal against the prediction, per signal.
    /// Only filled when simulation stands in for data.
    signal_significance: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct PlaneReport {
    plane: usize,
    cut: String,
    signal_plane: bool,
    blinded: bool,
    data_mc: ks_core::PlaneRatio,
    rows: Vec<RowReport>,
    bins: Vec<BinReport>,
}

#[derive(Debug, Clone, Serialize)]
struct PredictReport {
    method: String,
    title: String,
    caption: String,
    n_toys: usize,
    seed: u64,
    unblind: bool,
    only_mc: bool,
    processes: Vec<ks_translate::ProcessLabel>,
    planes: Vec<PlaneReport>,
}

fn effective_options(cfg: &AnalysisConfig, args: &PredictArgs) -> AnalysisOptions {
    let mut options = cfg.options.clone();
    if let Some(n) = args.toys {
        options.n_toys = n;
    }
    if let Some(s) = args.seed {
        options.seed = s;
    }
    options.unblind |= args.unblind;
    options.only_mc |= args.only_mc;
    options
}

fn fmt_estimate(e: &Estimate) -> String {
    if e.is_constrained() {
        format!("{:.2} +{:.2} -{:.2}", e.value, e.up, e.down)
    } else {
        "unconstrained".to_string()
    }
}

fn build_report(
    method: &AbcdMethod,
    loaded: &LoadedYields,
    preds: &Predictions,
    options: &AnalysisOptions,
) -> Result<PredictReport> {
    let data = loaded.matrix.process(YieldMatrix::DATA)?;
    let mc = loaded.matrix.process(YieldMatrix::BACKGROUND)?;
    let signal_rows: Vec<&[GammaParams]> = loaded
        .rows_with_role(ProcessRole::Signal)
        .into_iter()
        .map(|i| loaded.matrix.process(i))
        .collect::<ks_core::Result<_>>()?;

    let mut planes = Vec::with_capacity(method.n_planes());
    for plane in 0..method.n_planes() {
        let signal_plane = method.is_signal_plane(plane);
        let blinded = signal_plane && !options.unblind;

        // Table order: quadrant outer, bin inner; integrated rows once.
        let mut rows = Vec::new();
        for q in Quadrant::ALL {
            for bin in 0..method.arity(plane, q) {
                let index = method.index_bin(plane, bin, q)?;
                let hide = blinded && q == Quadrant::R4;
                let obs = data[index].yield_();
                let mc_row = &mc[index];
                rows.push(RowReport {
                    index,
                    quadrant: q,
                    bin,
                    label: method.region_label(index)?,
                    cut: method.region_cut(index)?,
                    mc: ValueError { value: mc_row.yield_(), error: mc_row.uncertainty() },
                    obs: (!hide).then_some(obs),
                    obs_over_mc: if hide {
                        None
                    } else {
                        ratio_with_error(obs, mc_row.yield_(), mc_row.uncertainty())
                            .map(|(value, error)| ValueError { value, error })
                    },
                    signals: signal_rows.iter().map(|s| s[index].yield_()).collect(),
                });
            }
        }

        let mut bins = Vec::with_capacity(method.n_bins(plane));
        for bin in 0..method.n_bins(plane) {
            let r4 = method.index_bin(plane, bin, Quadrant::R4)?;
            let pred = preds.preds[plane][bin];
            let obs = data[r4].yield_();
            let significance = if blinded || !pred.is_constrained() {
                None
            } else {
                Some(zbi(obs, pred.value, pred.up)?)
            };
            let signal_significance = if options.only_mc {
                signal_rows
                    .iter()
                    .map(|s| {
                        if pred.is_constrained() {
                            zbi(obs + s[r4].yield_(), pred.value, pred.up)
                        } else {
                            Ok(0.0)
                        }
                    })
                    .collect::<ks_core::Result<Vec<f64>>>()?
            } else {
                Vec::new()
            };
            bins.push(BinReport {
                bin,
                cut: method.bins(plane)[bin].clone(),
                kappa_mc: preds.kappas_mc[plane][bin],
                kappa_data: (!blinded).then_some(preds.kappas_data[plane][bin]),
                kappa_mc_data_errors: preds.kappas_mc_data_errors[plane][bin],
                pred,
                obs: (!blinded).then_some(obs),
                significance,
                signal_significance,
            });
        }

        planes.push(PlaneReport {
            plane,
            cut: method.planes()[plane].clone(),
            signal_plane,
            blinded,
            data_mc: preds.plane_ratios[plane],
            rows,
            bins,
        });
    }

    Ok(PredictReport {
        method: method.name().to_string(),
        title: method.title().to_string(),
        caption: method.caption().to_string(),
        n_toys: options.n_toys,
        seed: options.seed,
        unblind: options.unblind,
        only_mc: options.only_mc,
        processes: loaded.labels.clone(),
        planes,
    })
}

fn write_table(out: &mut String, report: &PredictReport) -> std::fmt::Result {
    writeln!(out, "== {} ({}) ==", report.title, report.method)?;
    if !report.caption.is_empty() {
        writeln!(out, "{}", report.caption)?;
    }
    writeln!(out, "toys per estimate: {}, seed: {}", report.n_toys, report.seed)?;
    for p in &report.planes {
        writeln!(out)?;
        let ratio = if p.data_mc.defined {
            format!("{:.2} +- {:.2}", p.data_mc.ratio, p.data_mc.error)
        } else {
            "undefined".to_string()
        };
        writeln!(
            out,
            "-- {}{}  Data/MC = {}",
            p.cut,
            if p.blinded { "  [blinded]" } else { "" },
            ratio
        )?;
        writeln!(
            out,
            "{:<6}{:<32}{:>18}{:>22}{:>10}{:>16}{:>8}{:>22}",
            "Reg.", "Bin", "MC", "Pred", "Obs", "Obs/MC", "Signi.", "kappa"
        )?;
        for row in &p.rows {
            let bin_label = row.label.rsplit(" | ").nth(1).unwrap_or("");
            let mc = format!("{:.2} +- {:.2}", row.mc.value, row.mc.error);
            let obs = row.obs.map_or("-".to_string(), |o| format!("{o:.0}"));
            let obs_mc = row
                .obs_over_mc
                .as_ref()
                .map_or("-".to_string(), |r| format!("{:.2} +- {:.2}", r.value, r.error));
            let (pred, signi, kappa) = if row.quadrant == Quadrant::R4 {
                p.bins
                    .get(row.bin)
                    .map(|b| {
                        (
                            fmt_estimate(&b.pred),
                            b.significance.map_or("-".to_string(), |z| format!("{z:.1}")),
                            fmt_estimate(&b.kappa_mc),
                        )
                    })
                    .unwrap_or_default()
            } else {
                Default::default()
            };
            let quadrant = row.label.rsplit(" | ").next().unwrap_or("");
            writeln!(
                out,
                "{:<6}{:<32}{:>18}{:>22}{:>10}{:>16}{:>8}{:>22}",
                quadrant, bin_label, mc, pred, obs, obs_mc, signi, kappa
            )?;
        }
    }
    Ok(())
}

pub fn cmd_predict(args: &PredictArgs, output: Option<&PathBuf>, bundle: Option<&PathBuf>) -> Result<()> {
    let cfg = AnalysisConfig::from_path(&args.config)?;
    let options = effective_options(&cfg, args);
    if options.n_toys < 2 {
        anyhow::bail!("--toys must be at least 2, got {}", options.n_toys);
    }

    tracing::info!(path = %args.yields.display(), "loading yields");
    let file = YieldsFile::from_path(&args.yields)?;
    let name = args.method.clone().unwrap_or_else(|| file.method.clone());
    let method = cfg.method(&name)?.build()?;
    let mut loaded = file.to_matrix(&method, &options)?;

    let preds = find_preds(&method, &mut loaded.matrix, &options.prediction_config())?;
    let report = build_report(&method, &loaded, &preds, &options)?;
    let output_json = serde_json::to_value(&report)?;

    let table = if args.table {
        let mut text = String::new();
        write_table(&mut text, &report)?;
        Some(text)
    } else {
        None
    };
    match (&table, output) {
        (Some(text), Some(path)) => std::fs::write(path, text)?,
        (Some(text), None) => print!("{text}"),
        (None, _) => crate::write_json(output, &output_json)?,
    }

    if let Some(dir) = bundle {
        let extra: Vec<(String, String)> =
            table.map(|t| vec![("table.txt".to_string(), t)]).unwrap_or_default();
        crate::report::write_bundle(
            dir,
            "predict",
            serde_json::json!({
                "method": name,
                "n_toys": options.n_toys,
                "seed": options.seed,
                "sampling": options.sampling,
                "unblind": options.unblind,
                "only_mc": options.only_mc,
            }),
            &[("config", args.config.as_path()), ("yields", args.yields.as_path())],
            &output_json,
            &extra,
        )?;
    }
    Ok(())
}
