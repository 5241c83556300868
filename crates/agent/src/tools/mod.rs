//! Tool implementations.
//!
//! Two registries are wired from these: the "light" set (memory, tasks,
//! read-only filesystem, platform lookup/call) held by the orchestrator and
//! the reviewers, and the full set (plus shell and handoff writing) held by
//! the executor roles. The registry split is the write-permission boundary:
//! the orchestrator coordinates, the loops act.

pub mod fs;
pub mod handoff;
pub mod memory;
pub mod platform;
pub mod shell;
pub mod tasks;
pub mod web;

use ironloop_core::tool::ToolRegistry;
use ironloop_store::Store;
use std::path::Path;
use std::sync::Arc;

/// Inspection/coordination tools: memory, tasks, read-only fs, platform.
pub fn light_registry(store: Store, root: &Path, platform_url: Option<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(memory::MemoryTool::new(store.clone())));
    registry.register(Arc::new(tasks::TasksTool::new(store)));
    registry.register(Arc::new(fs::ReadFileTool::new(root)));
    registry.register(Arc::new(fs::SearchFilesTool::new(root)));
    let platform = platform::PlatformClient::new(platform_url);
    registry.register(Arc::new(platform::PlatformSearchTool::new(platform.clone())));
    registry.register(Arc::new(platform::PlatformCallTool::new(platform)));
    registry
}

/// Executor tools: the light set plus shell execution and a handoff writer.
pub fn executor_registry(
    store: Store,
    root: &Path,
    platform_url: Option<String>,
    handoff: handoff::HandoffTool,
) -> ToolRegistry {
    let mut registry = light_registry(store, root, platform_url);
    registry.register(Arc::new(shell::ShellTool::new(root)));
    registry.register(Arc::new(handoff));
    registry
}

/// Researcher tools: the light set plus web fetch.
pub fn research_registry(store: Store, root: &Path, platform_url: Option<String>) -> ToolRegistry {
    let mut registry = light_registry(store, root, platform_url);
    registry.register(Arc::new(web::WebFetchTool::new()));
    registry
}
