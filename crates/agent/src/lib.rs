//! # Ironloop Agent
//!
//! The control plane proper: the resilient loop engine and its control
//! gates, the model-backed agent, the three specialized loops (build, ops,
//! research), the lifecycle orchestrator that fronts them, session
//! compaction, and the built-in tools.
//!
//! The composition is small and closed: an [`Orchestrator`] owns three
//! loop agents, each a [`ResilientLoop`] over a pair of [`ModelAgent`]s and
//! a [`ControlGate`]. Everything speaks through `ironloop-core` traits, so
//! tests drive the whole plane with scripted model clients and in-memory
//! stores.

pub mod compaction;
pub mod control;
pub mod loops;
pub mod model_agent;
pub mod orchestrator;
pub mod resilient;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use compaction::Compactor;
pub use control::ControlGate;
pub use loops::{LoopTuning, build_loop, ops_loop, research_loop};
pub use model_agent::ModelAgent;
pub use orchestrator::{
    HEARTBEAT_PREFIX, Orchestrator, OrchestratorConfig, Report, handle_and_compact,
};
pub use resilient::ResilientLoop;
