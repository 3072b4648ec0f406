use crate::reports;
use clap::Args;
use faultforge::constraints::{
    normalize_weights_by_row_count, ConstraintWeightingType, InversionConstraint,
    LaplacianSmoothingConstraint, MfdConstraint, MfdTarget, RupRateMinimizationConstraint,
    SlipRateConstraint,
};
use faultforge::error::{FaultForgeError, FfResult};
use faultforge::inputs::build_constraint_ranges;
use faultforge::rupture_set::RuptureSet;
use std::fs;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ConstraintsArgs {
    /// Rupture set JSON.
    #[arg(short, long)]
    pub rupture_set: String,

    /// Where to write the constraint list JSON.
    #[arg(short, long)]
    pub output: String,

    #[arg(long, default_value_t = 1.0)]
    pub slip_weight: f64,
    #[arg(long, default_value_t = ConstraintWeightingType::Normalized)]
    pub slip_weighting: ConstraintWeightingType,

    /// Adds a Gutenberg-Richter MFD constraint with this total rate.
    #[arg(long)]
    pub mfd_total_rate: Option<f64>,
    #[arg(long, default_value_t = 1.0)]
    pub mfd_b_value: f64,
    #[arg(long, default_value_t = 0.1)]
    pub mfd_delta: f64,
    #[arg(long, default_value_t = 1.0)]
    pub mfd_weight: f64,
    /// Bound the MFD from above instead of matching it.
    #[arg(long, default_value_t = false)]
    pub mfd_inequality: bool,

    /// Laplacian smoothing weight along each parent fault. Off when zero.
    #[arg(long, default_value_t = 0.0)]
    pub smoothing_weight: f64,

    /// Pushes rates of ruptures below this magnitude toward zero.
    #[arg(long)]
    pub minimize_below: Option<f64>,
    #[arg(long, default_value_t = 1.0)]
    pub minimize_weight: f64,

    #[arg(long, default_value_t = false)]
    pub normalize_by_row_count: bool,
}

fn mfd_target(
    rup_set: &RuptureSet,
    args: &ConstraintsArgs,
    total_rate: f64,
) -> FfResult<MfdTarget> {
    let mags = rup_set.ruptures().iter().map(|r| r.magnitude);
    let min = mags.clone().fold(f64::INFINITY, f64::min);
    let max = mags.fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return Err(FaultForgeError::Config(
            "Rupture set has no ruptures for an MFD".to_string(),
        ));
    }
    let delta = args.mfd_delta;
    let min_bin = (min / delta).round() * delta;
    let num_bins = ((max - min_bin) / delta).round() as usize + 1;
    Ok(MfdTarget::gutenberg_richter(
        min_bin,
        delta,
        num_bins,
        args.mfd_b_value,
        total_rate,
    ))
}

pub fn build(rup_set: &RuptureSet, args: &ConstraintsArgs) -> FfResult<Vec<InversionConstraint>> {
    let mut constraints: Vec<InversionConstraint> = vec![SlipRateConstraint::from_rupture_set(
        rup_set,
        args.slip_weight,
        args.slip_weighting,
    )?
    .into()];

    if let Some(total) = args.mfd_total_rate {
        let target = mfd_target(rup_set, args, total)?;
        constraints.push(
            MfdConstraint::new(
                rup_set,
                args.mfd_weight,
                ConstraintWeightingType::Normalized,
                args.mfd_inequality,
                target,
                None,
            )?
            .into(),
        );
    }

    if args.smoothing_weight > 0.0 {
        constraints.push(
            LaplacianSmoothingConstraint::from_rupture_set(rup_set, args.smoothing_weight)?.into(),
        );
    }

    if let Some(mag) = args.minimize_below {
        constraints.push(
            RupRateMinimizationConstraint::below_magnitude(rup_set, args.minimize_weight, mag)?
                .into(),
        );
    }

    if args.normalize_by_row_count {
        normalize_weights_by_row_count(&mut constraints);
    }
    Ok(constraints)
}

pub fn run(args: ConstraintsArgs) -> FfResult<()> {
    let rup_set = RuptureSet::load_from_file(&args.rupture_set)?;
    info!(
        sections = rup_set.num_sections(),
        ruptures = rup_set.num_ruptures(),
        "Loaded rupture set {}",
        args.rupture_set
    );

    let constraints = build(&rup_set, &args)?;
    let ranges = build_constraint_ranges(&constraints)?;
    fs::write(&args.output, serde_json::to_string_pretty(&constraints)?)?;
    info!("Wrote {} constraints to {}", constraints.len(), args.output);

    reports::print_ranges_table(&ranges);
    Ok(())
}
