pub mod cursor;
pub mod error;
pub mod job;
pub mod pacing;
pub mod retry;
pub mod step;
pub mod steps;

#[cfg(test)]
mod test_support;

pub use job::{BatchedMigrationJob, JobReport, JobState};
pub use step::{BatchScope, MutationStep};
