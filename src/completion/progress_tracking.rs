use super::{lock, CompletionCriteria, CriteriaBudget, InversionState};
use crate::energy::energy_type_names;
use crate::error::FfResult;
use crate::progress::AnnealingProgress;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Receives the progress series while a run is in flight.
pub trait ProgressListener: Send + Sync {
    fn refresh(&self, progress: &AnnealingProgress) -> FfResult<()>;
}

#[derive(Debug)]
struct Tracking {
    progress: AnnealingProgress,
    types_set: bool,
    last_record_millis: Option<u64>,
    last_refresh: Option<Instant>,
    written: bool,
}

/// Wraps another criterion and records every state it is asked about.
///
/// Once the inner criterion is satisfied the series is written to the
/// configured file (if any).
pub struct ProgressTrackingCompletionCriteria {
    inner: Arc<dyn CompletionCriteria>,
    tracking: Mutex<Tracking>,
    progress_file: Option<PathBuf>,
    record_interval_millis: Option<u64>,
    listener: Option<(Arc<dyn ProgressListener>, Duration)>,
}

impl ProgressTrackingCompletionCriteria {
    pub fn new(inner: Arc<dyn CompletionCriteria>) -> Self {
        Self {
            inner,
            tracking: Mutex::new(Tracking {
                progress: AnnealingProgress::default(),
                types_set: false,
                last_record_millis: None,
                last_refresh: None,
                written: false,
            }),
            progress_file: None,
            record_interval_millis: None,
            listener: None,
        }
    }

    pub fn with_progress_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.progress_file = Some(path.into());
        self
    }

    /// Records at most one point per `millis` of elapsed time.
    pub fn with_record_interval(mut self, millis: u64) -> Self {
        self.record_interval_millis = Some(millis);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>, every: Duration) -> Self {
        self.listener = Some((listener, every));
        self
    }

    pub fn with_energy_types(self, energy_types: Vec<String>) -> Self {
        {
            let mut t = lock(&self.tracking);
            t.progress = AnnealingProgress::new(energy_types);
            t.types_set = true;
        }
        self
    }

    pub fn inner(&self) -> &Arc<dyn CompletionCriteria> {
        &self.inner
    }

    pub fn progress(&self) -> AnnealingProgress {
        lock(&self.tracking).progress.clone()
    }

    /// Writes the series now, returning any error to the caller.
    pub fn write_progress(&self) -> FfResult<()> {
        let t = lock(&self.tracking);
        match &self.progress_file {
            Some(path) => t.progress.write_to_file(path),
            None => Ok(()),
        }
    }

    fn record(&self, t: &mut Tracking, state: &InversionState) {
        if !t.types_set {
            let mut names = energy_type_names(&[]);
            let num_ranges = state.energy.len().saturating_sub(names.len());
            names.truncate(state.energy.len());
            names.extend((0..num_ranges).map(|i| format!("Range {}", i)));
            t.progress = AnnealingProgress::new(names);
            t.types_set = true;
        }
        if let (Some(interval), Some(last)) = (self.record_interval_millis, t.last_record_millis) {
            if state.elapsed_millis < last.saturating_add(interval) {
                return;
            }
        }
        let non_zero = u32::try_from(state.num_non_zero).unwrap_or(u32::MAX);
        match t.progress.add_progress(
            state.iterations,
            state.elapsed_millis,
            state.num_perturbs_kept,
            &state.energy,
            non_zero,
        ) {
            Ok(()) => t.last_record_millis = Some(state.elapsed_millis),
            Err(e) => warn!("Skipping progress point at iteration {}: {}", state.iterations, e),
        }
    }
}

impl CompletionCriteria for ProgressTrackingCompletionCriteria {
    fn is_satisfied(&self, state: &InversionState) -> bool {
        let mut t = lock(&self.tracking);
        self.record(&mut t, state);

        if let Some((listener, every)) = &self.listener {
            let due = t.last_refresh.map_or(true, |last| last.elapsed() >= *every);
            if due {
                if let Err(e) = listener.refresh(&t.progress) {
                    warn!("Progress listener failed: {}", e);
                }
                t.last_refresh = Some(Instant::now());
            }
        }

        let satisfied = self.inner.is_satisfied(state);
        if satisfied && !t.written {
            t.written = true;
            if let Some(path) = &self.progress_file {
                match t.progress.write_to_file(path) {
                    Ok(()) => debug!(
                        "Wrote {} progress points to {}",
                        t.progress.len(),
                        path.display()
                    ),
                    Err(e) => warn!("Failed to write progress to {}: {}", path.display(), e),
                }
            }
        }
        satisfied
    }

    fn budget(&self) -> Option<CriteriaBudget> {
        self.inner.budget()
    }

    fn to_arg(&self) -> Option<String> {
        self.inner.to_arg()
    }
}

impl fmt::Debug for ProgressTrackingCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTrackingCompletionCriteria")
            .field("inner", &self.inner)
            .field("progress_file", &self.progress_file)
            .field("record_interval_millis", &self.record_interval_millis)
            .finish()
    }
}

impl fmt::Display for ProgressTrackingCompletionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgressTracking({})", self.inner)
    }
}
