use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json;

use crate::config::{OutputPaths, OutputToggles};
use crate::reweight::ReweightOutcome;

#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub directory: PathBuf,
    pub samples_csv: PathBuf,
    pub summary_json: PathBuf,
    pub distribution_png: PathBuf,
    pub distribution_svg: PathBuf,
    pub weights_png: PathBuf,
    pub weights_svg: PathBuf,
    pub convergence_png: PathBuf,
    pub convergence_svg: PathBuf,
    pub difference_png: PathBuf,
    pub difference_svg: PathBuf,
    pub histogram_bins: usize,
    pub toggles: OutputToggles,
}

pub fn resolve_artifacts(paths: &OutputPaths) -> OutputArtifacts {
    let directory = paths.directory.clone();

    OutputArtifacts {
        directory: directory.clone(),
        samples_csv: resolve_path(&directory, &paths.samples_csv),
        summary_json: resolve_path(&directory, &paths.summary_json),
        distribution_png: resolve_path(&directory, &paths.distribution_png),
        distribution_svg: resolve_path(&directory, &paths.distribution_svg),
        weights_png: resolve_path(&directory, &paths.weights_png),
        weights_svg: resolve_path(&directory, &paths.weights_svg),
        convergence_png: resolve_path(&directory, &paths.convergence_png),
        convergence_svg: resolve_path(&directory, &paths.convergence_svg),
        difference_png: resolve_path(&directory, &paths.difference_png),
        difference_svg: resolve_path(&directory, &paths.difference_svg),
        histogram_bins: paths.histogram_bins,
        toggles: paths.toggles,
    }
}

fn resolve_path(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create output directory {}", path.display()))?;
    }
    Ok(())
}

pub fn write_samples_csv(path: &Path, outcome: &ReweightOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create CSV file {}", path.display()))?;

    writer.write_record([
        "sample",
        "source_model",
        "reference_energy_kj_mol",
        "target_energy_kj_mol",
        "reduced_reference",
        "reduced_target",
        "weight",
        "cumulative_estimate_kj_mol",
    ])?;

    for n in 0..outcome.weights.len() {
        writer
            .write_record([
                n.to_string(),
                outcome.source_model[n].to_string(),
                format!("{:.12e}", outcome.reference_energy[n]),
                format!("{:.12e}", outcome.target_energy[n]),
                format!("{:.12e}", outcome.reduced_reference[n]),
                format!("{:.12e}", outcome.reduced_target[n]),
                format!("{:.12e}", outcome.weights[n]),
                format!("{:.12e}", outcome.cumulative[n]),
            ])
            .with_context(|| format!("Failed to write sample {n}"))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

pub fn write_summary_json(path: &Path, outcome: &ReweightOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let file = File::create(path)
        .with_context(|| format!("Unable to create JSON file {}", path.display()))?;

    serde_json::to_writer_pretty(file, &summary_value(outcome))
        .with_context(|| format!("Failed to write JSON payload to {}", path.display()))
}

fn summary_value(outcome: &ReweightOutcome) -> serde_json::Value {
    let delta_f: Vec<_> = outcome
        .delta_f
        .iter()
        .map(|entry| {
            serde_json::json!({
                "model": entry.model,
                "reduced": entry.reduced,
                "kj_per_mol": entry.kj_per_mol,
            })
        })
        .collect();

    serde_json::json!({
        "conditions": {
            "temperature_kelvin": outcome.temperature_kelvin,
            "beta_mol_per_kj": outcome.beta,
        },
        "input": {
            "reference": outcome.reference.to_string(),
            "state_models": outcome.models,
            "samples_per_trajectory": outcome.sample_counts,
            "total_samples": outcome.weights.len(),
        },
        "estimator": {
            "iterations": outcome.iterations,
            "free_energies": outcome.free_energies,
            "delta_f_to_target": delta_f,
        },
        "prediction": {
            "internal_energy_kj_mol": outcome.prediction.mean,
            "std_err_kj_mol": outcome.prediction.std_err,
            "effective_samples": outcome.prediction.effective_samples,
        },
        "direct_reference": {
            "internal_energy_kj_mol": outcome.direct.mean,
            "std_err_kj_mol": outcome.direct.std_err,
            "samples": outcome.direct.samples,
        },
        "deviation_kj_mol": outcome.prediction.mean - outcome.direct.mean,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceSelection;
    use crate::mbar::WeightedExpectation;
    use crate::reweight::{DirectStatistics, StateFreeEnergy};

    fn sample_outcome() -> ReweightOutcome {
        ReweightOutcome {
            reference: ReferenceSelection::Model(1),
            models: vec![1, 0],
            temperature_kelvin: 300.0,
            beta: 0.4,
            sample_counts: vec![2],
            iterations: 3,
            free_energies: vec![0.0, 1.5],
            delta_f: vec![StateFreeEnergy {
                model: 1,
                reduced: 1.5,
                kj_per_mol: 3.75,
            }],
            prediction: WeightedExpectation {
                mean: -100.0,
                std_err: 0.5,
                effective_samples: 1.8,
            },
            direct: DirectStatistics {
                mean: -100.2,
                std_err: 0.4,
                samples: 2,
            },
            direct_energy: vec![-100.1, -100.3],
            source_model: vec![1, 1],
            reference_energy: vec![-90.0, -91.0],
            target_energy: vec![-100.0, -101.0],
            reduced_reference: vec![-36.0, -36.4],
            reduced_target: vec![-40.0, -40.4],
            weights: vec![0.5, 0.5],
            cumulative: vec![-100.0, -100.5],
        }
    }

    #[test]
    fn summary_reports_prediction_and_deviation() {
        let value = summary_value(&sample_outcome());
        assert_eq!(
            value["prediction"]["internal_energy_kj_mol"],
            serde_json::json!(-100.0)
        );
        assert_eq!(value["input"]["total_samples"], serde_json::json!(2));
        assert_eq!(value["estimator"]["iterations"], serde_json::json!(3));
        let deviation = value["deviation_kj_mol"].as_f64().unwrap();
        assert!((deviation - 0.2).abs() < 1e-9);
        assert_eq!(
            value["estimator"]["delta_f_to_target"][0]["model"],
            serde_json::json!(1)
        );
    }

    #[test]
    fn artifact_paths_resolve_against_the_output_directory() {
        let resolved = resolve_path(Path::new("out"), Path::new("samples.csv"));
        assert_eq!(resolved, PathBuf::from("out/samples.csv"));
        let absolute = resolve_path(Path::new("out"), Path::new("/tmp/samples.csv"));
        assert_eq!(absolute, PathBuf::from("/tmp/samples.csv"));
    }
}
