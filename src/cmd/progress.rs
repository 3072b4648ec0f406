use crate::reports;
use clap::Args;
use faultforge::error::{FaultForgeError, FfResult};
use faultforge::progress::AnnealingProgress;

#[derive(Args, Debug, Clone)]
pub struct ProgressArgs {
    /// Progress CSV written by `invert --progress`.
    pub file: String,

    /// Number of evenly spaced rows to show.
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

pub fn run(args: ProgressArgs) -> FfResult<()> {
    let progress = AnnealingProgress::load(&args.file)?;
    if progress.is_empty() {
        return Err(FaultForgeError::Validation(format!(
            "Progress file {} has no rows",
            args.file
        )));
    }
    reports::print_progress_table(&progress, args.rows.max(2));
    Ok(())
}
