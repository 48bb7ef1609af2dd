#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # aecflow ports
//!
//! Interface traits the coordinator consumes. Drivers implement them:
//!
//! - [`AecRepo`]: versioned load/save of the AEC aggregate
//! - [`TaskQueue`]: at-least-once work queue
//! - [`StepRunner`]: fire-and-forget hand-off of runs
//! - [`StepExecutor`]: the opaque content-generation logic for one step
//!
//! All traits are `async_trait` and object-safe, so they can sit behind
//! `Arc<dyn Trait>`.

pub mod error;
pub mod executor;
pub mod queue;
pub mod repo;
pub mod runner;

pub use error::PortsError;
pub use executor::{ResumeSignal, StepContext, StepError, StepExecutor, StepOutcome};
pub use queue::{QueuedTask, TaskQueue};
pub use repo::AecRepo;
pub use runner::StepRunner;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // compile-time checks: these fail to build if a trait loses object safety
    #[test]
    fn traits_are_object_safe() {
        fn _repo(_: &dyn AecRepo) {}
        fn _queue(_: &dyn TaskQueue) {}
        fn _runner(_: &dyn StepRunner) {}
        fn _executor(_: &dyn StepExecutor) {}
    }

    #[test]
    fn traits_work_as_arc_dyn() {
        fn _repo(_: Arc<dyn AecRepo>) {}
        fn _queue(_: Arc<dyn TaskQueue>) {}
        fn _runner(_: Arc<dyn StepRunner>) {}
        fn _executor(_: Arc<dyn StepExecutor>) {}
    }
}
