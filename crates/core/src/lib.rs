//! # Ironloop Core
//!
//! Domain types, traits, and error definitions for the Ironloop autonomous
//! agent control plane. This crate has no framework dependencies beyond the
//! async runtime — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod session;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, InvocationContext, SharedState};
pub use error::{AgentError, Error, ModelError, Result, StoreError, SupervisorError, ToolError};
pub use event::{Event, Part, USER_AUTHOR};
pub use memory::{MemoryKind, MemoryRecord, NewMemory};
pub use model::{ChatReply, ChatRequest, ModelClient, ToolDefinition, TurnStatus, Usage};
pub use session::{Session, SessionStore};
pub use task::{Task, TaskStatus};
pub use tool::{Tool, ToolRegistry};
