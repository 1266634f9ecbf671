use anyhow::{Result, anyhow};

/// Boltzmann constant in kJ/(mol·K), CODATA 2018.
pub const BOLTZMANN_KJ_PER_MOL_KELVIN: f64 = 0.008_314_462_618;

/// One bar·nm³ expressed in kJ/mol.
pub const BAR_NM3_IN_KJ_PER_MOL: f64 = 0.060_221_407_6;

/// Inverse temperature β = 1/(k_B T) in mol/kJ.
pub fn beta(temperature_kelvin: f64) -> Result<f64> {
    if !temperature_kelvin.is_finite() || temperature_kelvin <= 0.0 {
        return Err(anyhow!(
            "temperature must be positive and finite, got {temperature_kelvin}"
        ));
    }
    Ok(1.0 / (BOLTZMANN_KJ_PER_MOL_KELVIN * temperature_kelvin))
}

/// Reduced potential u = β(U + pV), with U in kJ/mol and pV in bar·nm³.
///
/// This is the estimator's native unit: dimensionless energy per sample.
pub fn reduced_potential(energy_kj_mol: f64, pv_bar_nm3: f64, beta: f64) -> f64 {
    beta * (energy_kj_mol + pv_bar_nm3 * BAR_NM3_IN_KJ_PER_MOL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn beta_at_room_temperature() {
        let beta = beta(298.15).unwrap();
        assert_relative_eq!(beta, 0.403_395_3, epsilon = 1e-6);
    }

    #[test]
    fn beta_rejects_nonphysical_temperatures() {
        assert!(beta(0.0).is_err());
        assert!(beta(-273.15).is_err());
        assert!(beta(f64::NAN).is_err());
        assert!(beta(f64::INFINITY).is_err());
    }

    #[test]
    fn reduced_potential_is_linear_in_both_inputs() {
        let beta = beta(300.0).unwrap();
        let base = reduced_potential(-1250.0, 37.5, beta);
        let doubled = reduced_potential(-2500.0, 75.0, beta);
        assert_relative_eq!(doubled, 2.0 * base, epsilon = 1e-12);

        let energy_only = reduced_potential(10.0, 0.0, beta);
        let pv_only = reduced_potential(0.0, 4.0, beta);
        let combined = reduced_potential(10.0, 4.0, beta);
        assert_relative_eq!(combined, energy_only + pv_only, epsilon = 1e-12);
    }

    #[test]
    fn reduced_potential_converts_pressure_volume_work() {
        // 1 bar·nm³ is 0.0602 kJ/mol; at β = 1 the pV term contributes exactly that.
        let value = reduced_potential(0.0, 1.0, 1.0);
        assert_relative_eq!(value, BAR_NM3_IN_KJ_PER_MOL, epsilon = 1e-15);
    }
}
