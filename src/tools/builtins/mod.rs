//! Built-in tools.

pub mod food;

use crate::tools::ToolRegistry;

/// Build the registry with every built-in tool.
pub fn registry() -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    food::register(&mut registry)?;
    tracing::debug!(tools = registry.len(), "tool registry built");
    Ok(registry)
}
