pub mod combination;
pub mod config;
pub mod error;
pub mod io;
pub mod manifest;
pub mod matrix;
pub mod paths;
pub mod phases;
pub mod report;
pub mod sequencer;
pub mod session;

pub use combination::{Combination, Flavor, StreamLib};
pub use config::Config;
pub use error::{ProbeError, Result};
pub use matrix::{MatrixRunner, ResultStream};
pub use phases::{PhaseKind, PhasePlan};
pub use report::{CombinationResult, GenerationOutcome, RunReport, Verdict};
pub use sequencer::PhaseSequencer;
pub use session::{GenerationFailure, Generator, ScaffoldSession};
