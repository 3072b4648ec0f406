pub mod constraints;
pub mod invert;
pub mod progress;
