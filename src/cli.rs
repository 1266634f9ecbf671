use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ReferenceSelection;

/// Command line options for the reweighting analysis.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "MBAR reweighting analysis for force-field model comparison"
)]
pub struct CliOptions {
    /// Path to the analysis TOML configuration file.
    #[arg(long, value_name = "FILE", default_value = "config/reweight.toml")]
    pub config: PathBuf,

    /// Override the reference selection configured in the TOML file.
    #[arg(long, value_enum)]
    pub reference: Option<ReferenceOverride>,

    /// Display configuration summary without running the analysis.
    #[arg(long)]
    pub dry_run: bool,
}

/// Reference selections exposed on the CLI; anything else is rejected
/// before the analysis starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReferenceOverride {
    #[value(name = "1")]
    Model1,
    #[value(name = "2")]
    Model2,
    Pooled,
}

impl From<ReferenceOverride> for ReferenceSelection {
    fn from(value: ReferenceOverride) -> Self {
        match value {
            ReferenceOverride::Model1 => ReferenceSelection::Model(1),
            ReferenceOverride::Model2 => ReferenceSelection::Model(2),
            ReferenceOverride::Pooled => ReferenceSelection::Pooled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_reference_values() {
        let options = CliOptions::parse_from(["ff-reweight", "--reference", "2"]);
        assert_eq!(options.reference, Some(ReferenceOverride::Model2));
        assert_eq!(
            ReferenceSelection::from(ReferenceOverride::Model2),
            ReferenceSelection::Model(2)
        );
    }

    #[test]
    fn rejects_out_of_range_model_selection() {
        assert!(CliOptions::try_parse_from(["ff-reweight", "--reference", "3"]).is_err());
        assert!(CliOptions::try_parse_from(["ff-reweight", "--reference", "0"]).is_err());
    }

    #[test]
    fn defaults_to_the_shipped_config_path() {
        let options = CliOptions::parse_from(["ff-reweight"]);
        assert_eq!(options.config, PathBuf::from("config/reweight.toml"));
        assert!(options.reference.is_none());
        assert!(!options.dry_run);
    }
}
