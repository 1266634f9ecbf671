use anyhow::{Result, anyhow, bail};
use ndarray::{Array1, Array2};

/// Iteration controls for the self-consistent solver.
#[derive(Debug, Clone, Copy)]
pub struct MbarOptions {
    pub max_iterations: usize,
    pub relative_tolerance: f64,
}

impl Default for MbarOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            relative_tolerance: 1.0e-7,
        }
    }
}

/// Multistate Bennett acceptance ratio estimator over K thermodynamic states
/// and N uncorrelated samples.
///
/// `u_kn[k, n]` is the reduced potential of sample `n` evaluated at state `k`;
/// `n_k[k]` is the number of samples drawn from state `k`. States with
/// `n_k[k] == 0` are unsampled and contribute nothing to the mixture
/// denominator, yet still receive free energies and expectation weights.
///
/// Reference: Shirts MR and Chodera JD, J. Chem. Phys. 129:124105, 2008.
#[derive(Debug)]
pub struct Mbar {
    u_kn: Array2<f64>,
    n_k: Array1<usize>,
    f_k: Array1<f64>,
    log_w_nk: Array2<f64>,
    iterations: usize,
}

/// Weighted expectation of an observable at one state.
#[derive(Debug, Clone, Copy)]
pub struct WeightedExpectation {
    pub mean: f64,
    pub std_err: f64,
    pub effective_samples: f64,
}

impl Mbar {
    /// Solve the self-consistent free-energy equations in log space.
    pub fn solve(u_kn: Array2<f64>, n_k: Array1<usize>, options: &MbarOptions) -> Result<Self> {
        let k_states = u_kn.nrows();
        let n_tot = u_kn.ncols();

        if k_states == 0 || n_tot == 0 {
            bail!("reduced potential matrix must be non-empty");
        }
        if n_k.len() != k_states {
            bail!(
                "n_k has {} entries but u_kn has {} states",
                n_k.len(),
                k_states
            );
        }
        let n_sum: usize = n_k.iter().sum();
        if n_sum != n_tot {
            bail!("n_k sums to {} but u_kn holds {} samples", n_sum, n_tot);
        }
        if u_kn.iter().any(|value| !value.is_finite()) {
            bail!("u_kn contains non-finite reduced potentials");
        }
        if options.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }
        if !(options.relative_tolerance > 0.0) {
            bail!("relative_tolerance must be positive");
        }

        let log_n_k: Vec<Option<f64>> = n_k
            .iter()
            .map(|&n| if n > 0 { Some((n as f64).ln()) } else { None })
            .collect();

        let mut f_k = Array1::<f64>::zeros(k_states);
        let mut log_denom_n = vec![0.0_f64; n_tot];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < options.max_iterations {
            iterations += 1;
            mixture_log_denominators(&u_kn, &log_n_k, &f_k, &mut log_denom_n);

            let mut f_next = Array1::<f64>::zeros(k_states);
            for k in 0..k_states {
                f_next[k] = -log_sum_exp(
                    (0..n_tot).map(|n| -u_kn[[k, n]] - log_denom_n[n]),
                );
            }

            // Free energies are only defined up to a constant; anchor state 0.
            let shift = f_next[0];
            for value in f_next.iter_mut() {
                *value -= shift;
            }

            let max_delta = f_k
                .iter()
                .zip(f_next.iter())
                .map(|(old, new)| (new - old).abs() / new.abs().max(1.0))
                .fold(0.0_f64, f64::max);

            f_k = f_next;
            if max_delta < options.relative_tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            bail!(
                "MBAR did not converge within {} iterations (tolerance {:e})",
                options.max_iterations,
                options.relative_tolerance
            );
        }

        mixture_log_denominators(&u_kn, &log_n_k, &f_k, &mut log_denom_n);

        let mut log_w_nk = Array2::<f64>::zeros((n_tot, k_states));
        for k in 0..k_states {
            // Self-consistency makes the normalizer 1; renormalize explicitly
            // so that sum_n W_nk == 1 holds to round-off.
            let log_norm = log_sum_exp(
                (0..n_tot).map(|n| f_k[k] - u_kn[[k, n]] - log_denom_n[n]),
            );
            for n in 0..n_tot {
                log_w_nk[[n, k]] = f_k[k] - u_kn[[k, n]] - log_denom_n[n] - log_norm;
            }
        }

        Ok(Self {
            u_kn,
            n_k,
            f_k,
            log_w_nk,
            iterations,
        })
    }

    pub fn state_count(&self) -> usize {
        self.u_kn.nrows()
    }

    pub fn sample_count(&self) -> usize {
        self.u_kn.ncols()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Dimensionless free energies relative to state 0.
    pub fn free_energies(&self) -> &Array1<f64> {
        &self.f_k
    }

    pub fn sample_counts(&self) -> &Array1<usize> {
        &self.n_k
    }

    /// Normalized expectation weights `W_nk` for one state.
    pub fn weights(&self, state: usize) -> Result<Vec<f64>> {
        self.check_state(state)?;
        Ok((0..self.sample_count())
            .map(|n| self.log_w_nk[[n, state]].exp())
            .collect())
    }

    /// Kish effective sample size at one state: 1 / sum_n W_nk².
    ///
    /// Shrinks towards 1 as the weights concentrate on few samples; equals N
    /// for uniform weights. The standard overlap diagnostic for reweighted
    /// estimates.
    pub fn effective_sample_size(&self, state: usize) -> Result<f64> {
        let weights = self.weights(state)?;
        Ok(kish_effective_samples(&weights))
    }

    /// Weighted expectation of `observable` at `state`, with a standard error
    /// from the weighted variance over the effective sample size.
    pub fn expectation(&self, observable: &[f64], state: usize) -> Result<WeightedExpectation> {
        self.check_state(state)?;
        if observable.len() != self.sample_count() {
            bail!(
                "observable has {} values but the estimator holds {} samples",
                observable.len(),
                self.sample_count()
            );
        }

        let weights = self.weights(state)?;
        let mean: f64 = weights
            .iter()
            .zip(observable.iter())
            .map(|(w, a)| w * a)
            .sum();
        let variance: f64 = weights
            .iter()
            .zip(observable.iter())
            .map(|(w, a)| w * (a - mean) * (a - mean))
            .sum();
        let effective_samples = kish_effective_samples(&weights);
        let std_err = if effective_samples > 0.0 {
            (variance / effective_samples).sqrt()
        } else {
            f64::NAN
        };

        Ok(WeightedExpectation {
            mean,
            std_err,
            effective_samples,
        })
    }

    fn check_state(&self, state: usize) -> Result<()> {
        if state >= self.state_count() {
            return Err(anyhow!(
                "state index {} out of range ({} states)",
                state,
                self.state_count()
            ));
        }
        Ok(())
    }
}

fn mixture_log_denominators(
    u_kn: &Array2<f64>,
    log_n_k: &[Option<f64>],
    f_k: &Array1<f64>,
    log_denom_n: &mut [f64],
) {
    let k_states = u_kn.nrows();
    for (n, slot) in log_denom_n.iter_mut().enumerate() {
        *slot = log_sum_exp((0..k_states).filter_map(|k| {
            log_n_k[k].map(|log_n| log_n + f_k[k] - u_kn[[k, n]])
        }));
    }
}

fn kish_effective_samples(weights: &[f64]) -> f64 {
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 }
}

/// Overflow-safe ln(sum(exp(values))). Empty input yields -inf.
pub fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.into_iter().collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values
        .iter()
        .map(|value| (value - max).exp())
        .sum::<f64>()
        .ln()
}
