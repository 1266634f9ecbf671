use anyhow::{Context, Result};
use clap::Parser;

use ff_reweight::cli::CliOptions;
use ff_reweight::mbar::MbarOptions;
use ff_reweight::output::{
    ensure_directory, resolve_artifacts, write_samples_csv, write_summary_json,
};
use ff_reweight::plotting::render_all;
use ff_reweight::{config, reweight};

fn main() -> Result<()> {
    let cli = CliOptions::parse();

    let mut params = config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    if let Some(reference) = cli.reference {
        params.reference = reference.into();
    }

    println!("Configuration summary:");
    for line in params.summary_lines() {
        println!("  - {line}");
    }

    if cli.dry_run {
        println!("Dry-run requested; exiting without running the analysis.");
        return Ok(());
    }

    let inputs = reweight::load_inputs(&params)?;
    let outcome =
        reweight::run_reweighting(&inputs, params.temperature_kelvin, &MbarOptions::default())?;
    println!("[mbar] converged in {} iterations", outcome.iterations);

    let artifacts = resolve_artifacts(&params.output);
    ensure_directory(&artifacts.directory)?;

    if artifacts.toggles.csv {
        write_samples_csv(&artifacts.samples_csv, &outcome)?;
    }
    if artifacts.toggles.json {
        write_summary_json(&artifacts.summary_json, &outcome)?;
    }

    println!("[render] writing diagnostic charts");
    render_all(&outcome, &artifacts)?;

    println!("Analysis complete.");
    for entry in &outcome.delta_f {
        println!(
            "Δf model {} → target = {:.6} ({:.6} kJ/mol)",
            entry.model, entry.reduced, entry.kj_per_mol
        );
    }
    println!(
        "Predicted internal energy ⟨U₀⟩ = {:.6} ± {:.6} kJ/mol",
        outcome.prediction.mean, outcome.prediction.std_err
    );
    println!(
        "Direct simulation reference = {:.6} ± {:.6} kJ/mol ({} samples)",
        outcome.direct.mean, outcome.direct.std_err, outcome.direct.samples
    );
    println!(
        "Effective sample size = {:.2} of {}",
        outcome.prediction.effective_samples,
        outcome.weights.len()
    );

    Ok(())
}
