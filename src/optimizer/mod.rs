pub mod cooling;
pub mod perturbation;
pub mod replica;
pub mod reweight;
pub mod runner;
pub mod sampler;
pub mod solution;

pub use cooling::{CoolingSchedule, CoolingScheduleType};
pub use perturbation::{GenerationFunctionType, NonnegativityConstraintType};
pub use replica::{AnnealingData, Replica, ReplicaSnapshot};
pub use reweight::{EvenFitReweighter, MisfitQuantity};
pub use runner::ThreadedAnnealer;
pub use sampler::{RuptureSampler, SamplerType};
