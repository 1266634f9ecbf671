use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ConfigRoot {
    conditions: ConditionsSection,
    input: InputSection,
    output: OutputSection,
}

#[derive(Debug, Deserialize)]
struct ConditionsSection {
    temperature_kelvin: f64,
}

#[derive(Debug, Deserialize)]
struct InputSection {
    data_directory: PathBuf,
    #[serde(default = "default_reference")]
    reference: String,
}

fn default_reference() -> String {
    "1".into()
}

#[derive(Debug, Deserialize)]
struct OutputSection {
    directory: PathBuf,
    #[serde(default = "default_samples_csv")]
    samples_csv: PathBuf,
    #[serde(default = "default_summary_json")]
    summary_json: PathBuf,
    #[serde(default = "default_distribution_png")]
    distribution_png: PathBuf,
    #[serde(default = "default_distribution_svg")]
    distribution_svg: PathBuf,
    #[serde(default = "default_weights_png")]
    weights_png: PathBuf,
    #[serde(default = "default_weights_svg")]
    weights_svg: PathBuf,
    #[serde(default = "default_convergence_png")]
    convergence_png: PathBuf,
    #[serde(default = "default_convergence_svg")]
    convergence_svg: PathBuf,
    #[serde(default = "default_difference_png")]
    difference_png: PathBuf,
    #[serde(default = "default_difference_svg")]
    difference_svg: PathBuf,
    #[serde(default = "default_histogram_bins")]
    histogram_bins: usize,
    #[serde(default)]
    toggles: TogglesSection,
}

fn default_samples_csv() -> PathBuf {
    PathBuf::from("samples.csv")
}

fn default_summary_json() -> PathBuf {
    PathBuf::from("summary.json")
}

fn default_distribution_png() -> PathBuf {
    PathBuf::from("energy_distributions.png")
}

fn default_distribution_svg() -> PathBuf {
    PathBuf::from("energy_distributions.svg")
}

fn default_weights_png() -> PathBuf {
    PathBuf::from("weights.png")
}

fn default_weights_svg() -> PathBuf {
    PathBuf::from("weights.svg")
}

fn default_convergence_png() -> PathBuf {
    PathBuf::from("convergence.png")
}

fn default_convergence_svg() -> PathBuf {
    PathBuf::from("convergence.svg")
}

fn default_difference_png() -> PathBuf {
    PathBuf::from("energy_difference.png")
}

fn default_difference_svg() -> PathBuf {
    PathBuf::from("energy_difference.svg")
}

fn default_histogram_bins() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone, Copy)]
struct TogglesSection {
    #[serde(default = "default_true")]
    csv: bool,
    #[serde(default = "default_true")]
    json: bool,
    #[serde(default = "default_true")]
    distribution: bool,
    #[serde(default = "default_true")]
    weights: bool,
    #[serde(default = "default_true")]
    convergence: bool,
    #[serde(default = "default_true")]
    difference: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TogglesSection {
    fn default() -> Self {
        Self {
            csv: true,
            json: true,
            distribution: true,
            weights: true,
            convergence: true,
            difference: true,
        }
    }
}

/// Sampled model whose trajectory feeds the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSelection {
    /// Reweight a single sampled trajectory (model 1 or 2).
    Model(usize),
    /// Combine both sampled trajectories in one estimator.
    Pooled,
}

impl ReferenceSelection {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "1" => Ok(Self::Model(1)),
            "2" => Ok(Self::Model(2)),
            "pooled" => Ok(Self::Pooled),
            other => Err(anyhow!(
                "invalid reference selection '{other}' (use 1, 2, or pooled)"
            )),
        }
    }
}

impl fmt::Display for ReferenceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(model) => write!(f, "model {model}"),
            Self::Pooled => write!(f, "pooled (models 1 and 2)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReweightParams {
    pub temperature_kelvin: f64,
    pub data_directory: PathBuf,
    pub reference: ReferenceSelection,
    pub output: OutputPaths,
}

impl ReweightParams {
    pub fn summary_lines(&self) -> Vec<String> {
        vec![
            format!("temperature: {} K", self.temperature_kelvin),
            format!("data directory: {}", self.data_directory.display()),
            format!("reference: {}", self.reference),
            format!("output directory: {}", self.output.directory.display()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
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

#[derive(Debug, Clone, Copy)]
pub struct OutputToggles {
    pub csv: bool,
    pub json: bool,
    pub distribution: bool,
    pub weights: bool,
    pub convergence: bool,
    pub difference: bool,
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ReweightParams> {
    let raw = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

    let parsed: ConfigRoot =
        toml::from_str(&raw).context("Failed to parse reweighting configuration")?;
    load_from_sections(&parsed)
}

fn load_from_sections(parsed: &ConfigRoot) -> Result<ReweightParams> {
    if !parsed.conditions.temperature_kelvin.is_finite()
        || parsed.conditions.temperature_kelvin <= 0.0
    {
        return Err(anyhow!(
            "Temperature must be positive, got {}",
            parsed.conditions.temperature_kelvin
        ));
    }

    if parsed.output.histogram_bins < 2 {
        return Err(anyhow!(
            "histogram_bins must be at least 2, got {}",
            parsed.output.histogram_bins
        ));
    }

    let reference = ReferenceSelection::parse(&parsed.input.reference)?;

    Ok(ReweightParams {
        temperature_kelvin: parsed.conditions.temperature_kelvin,
        data_directory: parsed.input.data_directory.clone(),
        reference,
        output: OutputPaths {
            directory: parsed.output.directory.clone(),
            samples_csv: parsed.output.samples_csv.clone(),
            summary_json: parsed.output.summary_json.clone(),
            distribution_png: parsed.output.distribution_png.clone(),
            distribution_svg: parsed.output.distribution_svg.clone(),
            weights_png: parsed.output.weights_png.clone(),
            weights_svg: parsed.output.weights_svg.clone(),
            convergence_png: parsed.output.convergence_png.clone(),
            convergence_svg: parsed.output.convergence_svg.clone(),
            difference_png: parsed.output.difference_png.clone(),
            difference_svg: parsed.output.difference_svg.clone(),
            histogram_bins: parsed.output.histogram_bins,
            toggles: OutputToggles {
                csv: parsed.output.toggles.csv,
                json: parsed.output.toggles.json,
                distribution: parsed.output.toggles.distribution,
                weights: parsed.output.toggles.weights,
                convergence: parsed.output.toggles.convergence,
                difference: parsed.output.toggles.difference,
            },
        },
    })
}
