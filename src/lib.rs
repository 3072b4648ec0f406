//! Simulated-annealing inversion of earthquake rupture rates.
//!
//! Constraints are encoded into a sparse linear system, and replicas anneal
//! non-negative rupture rates against it until a completion criterion is met.

pub mod completion;
pub mod config;
pub mod constraints;
pub mod energy;
pub mod error;
pub mod inputs;
pub mod matrix;
pub mod optimizer;
pub mod progress;
pub mod rupture_set;
