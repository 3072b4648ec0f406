use crate::reports;
use clap::Args;
use faultforge::completion::{
    parse_completion_arg, parse_energy_change, CompletionCriteria, CompoundCompletionCriteria,
    ProgressTrackingCompletionCriteria,
};
use faultforge::config::Config;
use faultforge::constraints::InversionConstraint;
use faultforge::error::{FaultForgeError, FfResult};
use faultforge::inputs::InputGenerator;
use faultforge::optimizer::solution::{read_rates_file, write_rates_file};
use faultforge::optimizer::{AnnealingData, ThreadedAnnealer};
use faultforge::rupture_set::RuptureSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct InvertArgs {
    #[command(flatten)]
    pub config: Config,

    #[arg(short, long)]
    pub rupture_set: String,

    /// Constraint list JSON, as written by `constraints`.
    #[arg(short, long)]
    pub constraints: String,

    /// Global stopping rule, e.g. `10m`, `1000000i`, `0.5e`.
    #[arg(long, default_value = "1m")]
    pub completion: String,

    /// Also stop once the energy plateaus: `<look back>,<percent>,<abs>`.
    #[arg(long)]
    pub energy_change: Option<String>,

    /// Starting rates CSV (`Rupture,Rate`).
    #[arg(long)]
    pub initial: Option<String>,

    /// Minimum rates CSV; the inversion solves for rates above it.
    #[arg(long)]
    pub water_level: Option<String>,

    /// Per-rupture perturbation basis CSV for the variable generation
    /// functions.
    #[arg(long)]
    pub basis: Option<String>,

    /// Relative selection weights CSV for the WEIGHTED sampler.
    #[arg(long)]
    pub sampler_weights: Option<String>,

    #[arg(short, long, default_value = "rates.csv")]
    pub output: String,

    #[arg(long)]
    pub progress: Option<String>,

    /// Checkpoint file prefix; files are written every `--checkpoint`.
    #[arg(long, default_value = "faultforge")]
    pub checkpoint_prefix: String,
}

fn build_criteria(args: &InvertArgs) -> FfResult<Arc<dyn CompletionCriteria>> {
    let global = parse_completion_arg(&args.completion)?;
    Ok(match &args.energy_change {
        Some(ec) => {
            let change: Arc<dyn CompletionCriteria> = Arc::new(parse_energy_change(ec)?);
            Arc::new(CompoundCompletionCriteria::new(vec![global, change]))
        }
        None => global,
    })
}

pub fn run(args: InvertArgs) -> FfResult<()> {
    args.config.annealing.validate()?;
    let rup_set = RuptureSet::load_from_file(&args.rupture_set)?;
    let constraints = InversionConstraint::load_list(&args.constraints, &rup_set)?;
    let n = rup_set.num_ruptures();
    info!(ruptures = n, constraints = constraints.len(), "Loaded inversion inputs");

    let mut generator = InputGenerator::new(n, constraints);
    if let Some(path) = &args.initial {
        generator = generator.with_initial(read_rates_file(path)?);
    }
    if let Some(path) = &args.water_level {
        generator = generator.with_water_level(read_rates_file(path)?);
    }
    let inputs = generator.generate()?;

    let mut data = AnnealingData::from_inputs(&inputs)?;
    if let Some(path) = &args.basis {
        data = data.with_basis(read_rates_file(path)?)?;
    }
    if let Some(path) = &args.sampler_weights {
        data = data.with_sampler_weights(read_rates_file(path)?)?;
    }
    let data = Arc::new(data);
    let energy_names = data.energy_type_names();

    let global = build_criteria(&args)?;
    let mut tracking = ProgressTrackingCompletionCriteria::new(global)
        .with_energy_types(energy_names.clone());
    if let Some(path) = &args.progress {
        tracking = tracking.with_progress_file(path);
    }
    let tracking = Arc::new(tracking);

    let parallel = &args.config.parallel;
    let mut annealer = ThreadedAnnealer::new(
        data,
        args.config.annealing.clone(),
        &inputs.initial,
        parallel.num_threads(),
        parallel.sub_completion()?,
    )?
    .with_average(parallel.average);
    if let Some(millis) = parallel.checkpoint_millis()? {
        annealer = annealer.with_checkpoints(
            millis,
            &args.checkpoint_prefix,
            inputs.water_level.clone(),
        );
    }
    if parallel.reweight {
        annealer = annealer.with_reweighting(parallel.reweight_quantity)?;
    }

    let result = annealer.iterate(tracking.as_ref());
    if args.progress.is_some() {
        // Keep whatever progress was collected, even for a failed run.
        if let Err(e) = tracking.write_progress() {
            warn!("Failed to write progress: {}", e);
        }
    }
    let state = result?;

    let rates = inputs.adjust_solution_for_water_level(annealer.best_solution());
    write_rates_file(&args.output, &rates)?;
    info!("Wrote {} rates to {}", rates.len(), args.output);

    if state.energy.len() != energy_names.len() {
        return Err(FaultForgeError::UnsupportedState(format!(
            "Expected {} energy terms, got {}",
            energy_names.len(),
            state.energy.len()
        )));
    }
    reports::print_energy_table(&energy_names, &state.energy);
    reports::print_run_summary(&state);
    if annealer.reweighter().is_some() {
        reports::print_ranges_table(annealer.constraint_ranges());
    }
    Ok(())
}
