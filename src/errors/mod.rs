pub mod types;

pub use types::{HarvestError, ProbeError};
