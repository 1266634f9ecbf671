use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::units;

/// Per-sample energy columns of one trajectory file.
#[derive(Debug, Clone)]
pub struct EnergySeries {
    /// Potential energy in kJ/mol.
    pub energy: Vec<f64>,
    /// Pressure–volume term in bar·nm³.
    pub pressure_volume: Vec<f64>,
}

impl EnergySeries {
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }

    /// Per-sample reduced potential at inverse temperature β.
    pub fn reduced(&self, beta: f64) -> Vec<f64> {
        self.energy
            .iter()
            .zip(self.pressure_volume.iter())
            .map(|(&u, &pv)| units::reduced_potential(u, pv, beta))
            .collect()
    }
}

/// Fixed naming scheme of the data set: model `i` evaluated over the
/// trajectory sampled with model `j` lives in `energy{i}_{j}.txt`.
pub fn energy_file_name(model: usize, trajectory: usize) -> String {
    format!("energy{model}_{trajectory}.txt")
}

pub fn load_energy_file(path: &Path) -> Result<EnergySeries> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read energy file {}", path.display()))?;
    parse_energy_text(&raw)
        .with_context(|| format!("Failed to parse energy file {}", path.display()))
}

/// Parse whitespace-delimited energy columns. Lines starting with `#` or `@`
/// are comments; columns beyond the first two are ignored.
pub fn parse_energy_text(raw: &str) -> Result<EnergySeries> {
    let mut energy = Vec::new();
    let mut pressure_volume = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('@') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let energy_field = fields
            .next()
            .ok_or_else(|| anyhow!("line {}: missing energy column", index + 1))?;
        let pv_field = fields.next().ok_or_else(|| {
            anyhow!(
                "line {}: expected two columns (energy, pV), found one",
                index + 1
            )
        })?;

        let u = parse_field(energy_field, "energy", index)?;
        let pv = parse_field(pv_field, "pV", index)?;

        energy.push(u);
        pressure_volume.push(pv);
    }

    if energy.is_empty() {
        return Err(anyhow!("no data rows found"));
    }

    Ok(EnergySeries {
        energy,
        pressure_volume,
    })
}

fn parse_field(field: &str, column: &str, index: usize) -> Result<f64> {
    let value: f64 = field.parse().map_err(|_| {
        anyhow!(
            "line {}: invalid {} value '{}'",
            index + 1,
            column,
            field
        )
    })?;
    if !value.is_finite() {
        return Err(anyhow!(
            "line {}: non-finite {} value '{}'",
            index + 1,
            column,
            field
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_columns_and_skips_comments() {
        let raw = "# GROMACS-style header\n\
                   @ legend \"potential\"\n\
                   -1250.5 36.2\n\
                   \n\
                   -1248.0 35.9 999.0\n";
        let series = parse_energy_text(raw).unwrap();
        assert_eq!(series.len(), 2);
        assert_relative_eq!(series.energy[0], -1250.5, epsilon = 1e-12);
        assert_relative_eq!(series.pressure_volume[1], 35.9, epsilon = 1e-12);
    }

    #[test]
    fn rejects_single_column_rows() {
        let err = parse_energy_text("-1250.5\n").unwrap_err();
        assert!(err.to_string().contains("expected two columns"));
    }

    #[test]
    fn rejects_non_numeric_fields() {
        let err = parse_energy_text("-1250.5 not-a-number\n").unwrap_err();
        assert!(err.to_string().contains("invalid pV value"));
    }

    #[test]
    fn rejects_non_finite_fields() {
        let err = parse_energy_text("inf 35.9\n").unwrap_err();
        assert!(err.to_string().contains("non-finite energy value"));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse_energy_text("# only comments\n").is_err());
    }

    #[test]
    fn file_names_follow_the_fixed_scheme() {
        assert_eq!(energy_file_name(0, 0), "energy0_0.txt");
        assert_eq!(energy_file_name(0, 2), "energy0_2.txt");
        assert_eq!(energy_file_name(2, 1), "energy2_1.txt");
    }

    #[test]
    fn reduced_series_matches_per_sample_transform() {
        let series = EnergySeries {
            energy: vec![-10.0, 20.0],
            pressure_volume: vec![1.0, -2.0],
        };
        let beta = 0.5;
        let reduced = series.reduced(beta);
        assert_eq!(reduced.len(), 2);
        assert_relative_eq!(
            reduced[0],
            units::reduced_potential(-10.0, 1.0, beta),
            epsilon = 1e-15
        );
        assert_relative_eq!(
            reduced[1],
            units::reduced_potential(20.0, -2.0, beta),
            epsilon = 1e-15
        );
    }
}
