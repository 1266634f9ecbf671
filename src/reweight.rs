use anyhow::{Result, anyhow, bail};
use ndarray::{Array1, Array2};

use crate::config::{ReferenceSelection, ReweightParams};
use crate::mbar::{Mbar, MbarOptions, WeightedExpectation};
use crate::trajectory::{EnergySeries, energy_file_name, load_energy_file};
use crate::units;

/// The model whose internal energy is predicted without sampling it.
pub const TARGET_MODEL: usize = 0;

/// One sampled trajectory with every model's energies evaluated over it.
#[derive(Debug, Clone)]
pub struct TrajectoryData {
    pub sampled_model: usize,
    /// Energy series per state, parallel to `ReweightInputs::models`.
    pub by_state: Vec<EnergySeries>,
}

#[derive(Debug, Clone)]
pub struct ReweightInputs {
    /// State order of the estimator: sampled models first, target last.
    pub models: Vec<usize>,
    pub trajectories: Vec<TrajectoryData>,
    /// Direct simulation of the target model, used only for comparison.
    pub direct_reference: EnergySeries,
    pub reference: ReferenceSelection,
}

#[derive(Debug, Clone, Copy)]
pub struct StateFreeEnergy {
    pub model: usize,
    /// Dimensionless free-energy difference sampled state → target.
    pub reduced: f64,
    pub kj_per_mol: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectStatistics {
    pub mean: f64,
    pub std_err: f64,
    pub samples: usize,
}

/// Everything the exporters and plots need from one analysis run.
#[derive(Debug)]
pub struct ReweightOutcome {
    pub reference: ReferenceSelection,
    pub models: Vec<usize>,
    pub temperature_kelvin: f64,
    pub beta: f64,
    /// Samples contributed by each sampled trajectory, in `models` order.
    pub sample_counts: Vec<usize>,
    pub iterations: usize,
    pub free_energies: Vec<f64>,
    pub delta_f: Vec<StateFreeEnergy>,
    pub prediction: WeightedExpectation,
    pub direct: DirectStatistics,
    /// Target-model energies from its own direct simulation (kJ/mol).
    pub direct_energy: Vec<f64>,
    pub source_model: Vec<usize>,
    pub reference_energy: Vec<f64>,
    pub target_energy: Vec<f64>,
    pub reduced_reference: Vec<f64>,
    pub reduced_target: Vec<f64>,
    /// Target-state expectation weight per sample.
    pub weights: Vec<f64>,
    /// Running reweighted estimate of the target internal energy.
    pub cumulative: Vec<f64>,
}

pub fn load_inputs(params: &ReweightParams) -> Result<ReweightInputs> {
    let sampled: Vec<usize> = match params.reference {
        ReferenceSelection::Model(model) => vec![model],
        ReferenceSelection::Pooled => vec![1, 2],
    };
    let mut models = sampled.clone();
    models.push(TARGET_MODEL);

    let mut trajectories = Vec::with_capacity(sampled.len());
    for &trajectory in &sampled {
        let mut by_state = Vec::with_capacity(models.len());
        let mut expected_len: Option<usize> = None;
        for &model in &models {
            let name = energy_file_name(model, trajectory);
            let series = load_energy_file(&params.data_directory.join(&name))?;
            println!("[load] {name}: {} samples", series.len());
            match expected_len {
                Some(expected) if series.len() != expected => bail!(
                    "{name} holds {} samples but trajectory {trajectory} holds {expected}",
                    series.len()
                ),
                None => expected_len = Some(series.len()),
                _ => {}
            }
            by_state.push(series);
        }
        trajectories.push(TrajectoryData {
            sampled_model: trajectory,
            by_state,
        });
    }

    let direct_name = energy_file_name(TARGET_MODEL, TARGET_MODEL);
    let direct_reference = load_energy_file(&params.data_directory.join(&direct_name))?;
    println!("[load] {direct_name}: {} samples", direct_reference.len());

    Ok(ReweightInputs {
        models,
        trajectories,
        direct_reference,
        reference: params.reference,
    })
}

pub fn run_reweighting(
    inputs: &ReweightInputs,
    temperature_kelvin: f64,
    options: &MbarOptions,
) -> Result<ReweightOutcome> {
    let beta = units::beta(temperature_kelvin)?;
    let k_states = inputs.models.len();
    if k_states < 2 {
        bail!("at least one sampled state and the target state are required");
    }
    let target_state = k_states - 1;

    let n_total: usize = inputs
        .trajectories
        .iter()
        .map(|trajectory| trajectory.by_state[0].len())
        .sum();
    if n_total == 0 {
        bail!("no samples available for reweighting");
    }

    let mut u_kn = Array2::<f64>::zeros((k_states, n_total));
    let mut n_k = vec![0_usize; k_states];
    let mut source_model = Vec::with_capacity(n_total);
    let mut reference_energy = Vec::with_capacity(n_total);
    let mut target_energy = Vec::with_capacity(n_total);
    let mut reduced_reference = Vec::with_capacity(n_total);
    let mut reduced_target = Vec::with_capacity(n_total);
    let mut sample_counts = Vec::with_capacity(inputs.trajectories.len());

    let mut offset = 0;
    for trajectory in &inputs.trajectories {
        let len = trajectory.by_state[0].len();
        if trajectory.by_state.len() != k_states {
            bail!(
                "trajectory of model {} covers {} states, expected {}",
                trajectory.sampled_model,
                trajectory.by_state.len(),
                k_states
            );
        }

        for (k, series) in trajectory.by_state.iter().enumerate() {
            if series.len() != len {
                bail!(
                    "state {} holds {} samples on trajectory of model {}, expected {}",
                    inputs.models[k],
                    series.len(),
                    trajectory.sampled_model,
                    len
                );
            }
            for (n, value) in series.reduced(beta).into_iter().enumerate() {
                u_kn[[k, offset + n]] = value;
            }
        }

        let own_state = inputs
            .models
            .iter()
            .position(|&model| model == trajectory.sampled_model)
            .ok_or_else(|| {
                anyhow!(
                    "trajectory of model {} has no matching state",
                    trajectory.sampled_model
                )
            })?;
        n_k[own_state] += len;
        sample_counts.push(len);

        let own = &trajectory.by_state[own_state];
        let target = &trajectory.by_state[target_state];
        source_model.extend(std::iter::repeat(trajectory.sampled_model).take(len));
        reference_energy.extend_from_slice(&own.energy);
        target_energy.extend_from_slice(&target.energy);
        reduced_reference.extend(own.reduced(beta));
        reduced_target.extend(target.reduced(beta));

        offset += len;
    }

    let mbar = Mbar::solve(u_kn, Array1::from(n_k), options)?;
    let weights = mbar.weights(target_state)?;
    let prediction = mbar.expectation(&target_energy, target_state)?;
    let free_energies = mbar.free_energies().to_vec();

    let delta_f = (0..target_state)
        .map(|k| {
            let reduced = free_energies[target_state] - free_energies[k];
            StateFreeEnergy {
                model: inputs.models[k],
                reduced,
                kj_per_mol: reduced / beta,
            }
        })
        .collect();

    let cumulative = cumulative_estimate(&weights, &target_energy);
    let direct = direct_statistics(&inputs.direct_reference.energy)?;

    Ok(ReweightOutcome {
        reference: inputs.reference,
        models: inputs.models.clone(),
        temperature_kelvin,
        beta,
        sample_counts,
        iterations: mbar.iterations(),
        free_energies,
        delta_f,
        prediction,
        direct,
        direct_energy: inputs.direct_reference.energy.clone(),
        source_model,
        reference_energy,
        target_energy,
        reduced_reference,
        reduced_target,
        weights,
        cumulative,
    })
}

/// Running weighted mean: entry j uses the first j+1 samples.
fn cumulative_estimate(weights: &[f64], observable: &[f64]) -> Vec<f64> {
    let mut weight_sum = 0.0;
    let mut value_sum = 0.0;
    weights
        .iter()
        .zip(observable.iter())
        .map(|(&w, &a)| {
            weight_sum += w;
            value_sum += w * a;
            if weight_sum > 0.0 {
                value_sum / weight_sum
            } else {
                f64::NAN
            }
        })
        .collect()
}

fn direct_statistics(energy: &[f64]) -> Result<DirectStatistics> {
    if energy.is_empty() {
        bail!("direct reference trajectory holds no samples");
    }
    let samples = energy.len();
    let mean = energy.iter().sum::<f64>() / samples as f64;
    let std_err = if samples > 1 {
        let variance =
            energy.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / (samples - 1) as f64;
        (variance / samples as f64).sqrt()
    } else {
        0.0
    };
    Ok(DirectStatistics {
        mean,
        std_err,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(energy: Vec<f64>) -> EnergySeries {
        let pressure_volume = vec![0.0; energy.len()];
        EnergySeries {
            energy,
            pressure_volume,
        }
    }

    fn shifted_inputs(shift_kj_mol: f64) -> ReweightInputs {
        let reference = vec![-100.0, -98.0, -103.0, -99.5, -101.0];
        let target: Vec<f64> = reference.iter().map(|u| u + shift_kj_mol).collect();
        ReweightInputs {
            models: vec![1, TARGET_MODEL],
            trajectories: vec![TrajectoryData {
                sampled_model: 1,
                by_state: vec![series(reference), series(target.clone())],
            }],
            direct_reference: series(target),
            reference: ReferenceSelection::Model(1),
        }
    }

    #[test]
    fn constant_energy_shift_is_recovered_exactly() {
        let shift = 7.5;
        let inputs = shifted_inputs(shift);
        let outcome = run_reweighting(&inputs, 300.0, &MbarOptions::default()).unwrap();

        // A constant offset leaves the configurational distribution unchanged,
        // so the prediction must equal the direct average and Δf the offset.
        assert_relative_eq!(outcome.prediction.mean, outcome.direct.mean, epsilon = 1e-9);
        assert_eq!(outcome.delta_f.len(), 1);
        assert_relative_eq!(outcome.delta_f[0].kj_per_mol, shift, epsilon = 1e-9);
        assert_relative_eq!(
            outcome.delta_f[0].reduced,
            shift * outcome.beta,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            outcome.prediction.effective_samples,
            5.0,
            epsilon = 1e-6
        );
        for weight in &outcome.weights {
            assert_relative_eq!(*weight, 0.2, epsilon = 1e-9);
        }
    }

    #[test]
    fn pooled_inputs_concatenate_trajectories_in_state_order() {
        let inputs = ReweightInputs {
            models: vec![1, 2, TARGET_MODEL],
            trajectories: vec![
                TrajectoryData {
                    sampled_model: 1,
                    by_state: vec![
                        series(vec![-10.0, -11.0]),
                        series(vec![-10.2, -11.1]),
                        series(vec![-9.8, -10.9]),
                    ],
                },
                TrajectoryData {
                    sampled_model: 2,
                    by_state: vec![
                        series(vec![-10.1, -10.8, -11.2]),
                        series(vec![-10.0, -10.7, -11.3]),
                        series(vec![-9.9, -10.6, -11.0]),
                    ],
                },
            ],
            direct_reference: series(vec![-10.0, -10.5]),
            reference: ReferenceSelection::Pooled,
        };

        let outcome = run_reweighting(&inputs, 300.0, &MbarOptions::default()).unwrap();
        assert_eq!(outcome.sample_counts, vec![2, 3]);
        assert_eq!(outcome.source_model, vec![1, 1, 2, 2, 2]);
        assert_eq!(outcome.weights.len(), 5);
        assert_eq!(outcome.free_energies.len(), 3);
        assert_eq!(outcome.delta_f.len(), 2);
        let total: f64 = outcome.weights.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        // Own-model energies land in the per-sample reference column.
        assert_relative_eq!(outcome.reference_energy[0], -10.0, epsilon = 1e-12);
        assert_relative_eq!(outcome.reference_energy[2], -10.0, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_series_lengths_are_rejected() {
        let inputs = ReweightInputs {
            models: vec![1, TARGET_MODEL],
            trajectories: vec![TrajectoryData {
                sampled_model: 1,
                by_state: vec![series(vec![-10.0, -11.0]), series(vec![-10.2])],
            }],
            direct_reference: series(vec![-10.0]),
            reference: ReferenceSelection::Model(1),
        };
        let err = run_reweighting(&inputs, 300.0, &MbarOptions::default()).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn cumulative_estimate_converges_to_the_weighted_mean() {
        let weights = [0.25, 0.25, 0.5];
        let observable = [4.0, 8.0, 2.0];
        let running = cumulative_estimate(&weights, &observable);
        assert_relative_eq!(running[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(running[1], 6.0, epsilon = 1e-12);
        assert_relative_eq!(running[2], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn direct_statistics_match_hand_computed_values() {
        let stats = direct_statistics(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.samples, 4);
        assert_relative_eq!(stats.mean, 2.5, epsilon = 1e-12);
        // Sample variance 5/3, standard error sqrt(5/12).
        assert_relative_eq!(stats.std_err, (5.0_f64 / 12.0).sqrt(), epsilon = 1e-12);
        assert!(direct_statistics(&[]).is_err());
    }
}
