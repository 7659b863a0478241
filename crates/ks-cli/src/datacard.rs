//! `kappastat datacard`: transfer factors and counting datacards.

use anyhow::Result;
use ks_inference::{PredictionConfig, Sampling, ToyConfig, transfer_factors};
use ks_translate::DatacardInput;
use std::path::PathBuf;

pub fn cmd_datacard(
    input: &PathBuf,
    signal: Option<&str>,
    output: Option<&PathBuf>,
    out_dir: Option<&PathBuf>,
    toys: usize,
    seed: u64,
    bundle: Option<&PathBuf>,
) -> Result<()> {
    if toys < 2 {
        anyhow::bail!("--toys must be at least 2, got {}", toys);
    }
    tracing::info!(path = %input.display(), "loading datacard input");
    let card_input = DatacardInput::from_path(input)?;

    let config = PredictionConfig { toys: ToyConfig { n_toys: toys, sampling: Sampling::Poisson }, seed };
    let pairs = card_input.transfer_pairs()?;
    let tfs = transfer_factors(&pairs, &config)?;
    for (bin, tf) in card_input.bins.iter().zip(&tfs) {
        tracing::info!(bin = %bin.name, value = tf.value, up = tf.up, down = tf.down, "transfer factor");
    }

    let mut cards: Vec<(String, String)> = Vec::new();
    if out_dir.is_some() {
        for (i, s) in card_input.signals.iter().enumerate() {
            cards.push((format!("datacard_{}.txt", s.name), card_input.render(i, &tfs)?));
        }
    } else {
        let i = match signal {
            Some(name) => card_input.signal_index(name)?,
            None => 0,
        };
        let name = format!("datacard_{}.txt", card_input.signals[i].name);
        cards.push((name, card_input.render(i, &tfs)?));
    }

    match (out_dir, output) {
        (Some(dir), _) => {
            std::fs::create_dir_all(dir)?;
            for (name, text) in &cards {
                let path = dir.join(name);
                std::fs::write(&path, text)?;
                tracing::info!(path = %path.display(), "datacard written");
            }
        }
        (None, Some(path)) => std::fs::write(path, &cards[0].1)?,
        (None, None) => print!("{}", cards[0].1),
    }

    if let Some(dir) = bundle {
        let bins: Vec<serde_json::Value> = card_input
            .bins
            .iter()
            .zip(pairs.iter().zip(&tfs))
            .map(|(b, (pair, tf))| {
                serde_json::json!({
                    "bin": b.name,
                    "signal_region_yield": pair.signal_region.yield_(),
                    "control_region_yield": pair.control_region.yield_(),
                    "transfer_factor": tf,
                })
            })
            .collect();
        crate::report::write_bundle(
            dir,
            "datacard",
            serde_json::json!({ "n_toys": toys, "seed": seed, "signal": signal }),
            &[("datacard_input", input.as_path())],
            &serde_json::json!({ "transfer_factors": bins }),
            &cards,
        )?;
    }
    Ok(())
}
