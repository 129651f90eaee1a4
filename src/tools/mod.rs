//! Tool registry and dispatcher.
//!
//! A [`ToolRegistry`] holds every invocable tool: its [`ToolDescriptor`]
//! (name, description, typed parameters) plus the async handler bound to
//! it.  It is built once per session and never mutated afterwards.
//!
//! [`ToolDispatcher`] is the single entry point the session uses for
//! tool calls: resolve, validate, execute, and normalise the outcome to
//! a spoken reply or a [`ToolError`].

pub mod builtins;
pub mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::ToolError;
use crate::store::{DayZone, FoodStore};

pub use schema::{parse_arguments, ArgValue, ParamSpec, ParamType, ToolArgs, ToolDescriptor};

/// Per-session state handed to every handler call.
#[derive(Clone)]
pub struct ToolContext {
    /// Identity of the participant the session is serving.
    pub participant_identity: String,
    /// Injected persistence adapter.
    pub store: Arc<dyn FoodStore>,
    /// Zone that defines "today" for daily aggregates.
    pub day_zone: DayZone,
}

/// Async handler bound to a tool.  Returns the spoken reply on success.
pub type ToolHandler = Arc<
    dyn Fn(ToolArgs, ToolContext) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>
        + Send
        + Sync,
>;

struct ToolEntry {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

// ── Registry ─────────────────────────────────────────────────

/// Immutable-after-construction set of tools.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.  Duplicate names are rejected.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: ToolHandler,
    ) -> anyhow::Result<()> {
        if self.entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            anyhow::bail!("duplicate tool registration: {}", descriptor.name);
        }
        self.entries.push(ToolEntry {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, ToolError> {
        self.entry(name).map(|e| &e.descriptor)
    }

    fn entry(&self, name: &str) -> Result<&ToolEntry, ToolError> {
        self.entries
            .iter()
            .find(|e| e.descriptor.name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Function definitions for every tool, in registration order.
    pub fn function_defs(&self) -> Vec<Value> {
        self.descriptors().map(ToolDescriptor::function_def).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Dispatcher ───────────────────────────────────────────────

/// Routes tool calls for one session through the registry.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    /// Invoke `name` with the raw JSON payload as received from the model.
    pub async fn invoke(&self, name: &str, raw_args: &str) -> Result<String, ToolError> {
        let entry = self.registry.entry(name)?;
        let args = parse_arguments(raw_args).inspect_err(|e| {
            warn!(tool = %name, args = %crate::utils::truncate_str(raw_args, 200), error = %e, "rejected tool arguments");
        })?;
        self.run(entry, args).await
    }

    /// Invoke `name` with an already-decoded argument object.
    pub async fn invoke_json(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let entry = self.registry.entry(name)?;
        self.run(entry, args).await
    }

    async fn run(&self, entry: &ToolEntry, raw: Value) -> Result<String, ToolError> {
        let name = entry.descriptor.name.as_str();
        let args = entry.descriptor.validate(&raw).inspect_err(|e| {
            warn!(tool = %name, args = %raw, error = %e, "rejected tool arguments");
        })?;

        debug!(tool = %name, participant = %self.ctx.participant_identity, "invoking tool");
        let timer = Instant::now();
        let result = (entry.handler)(args, self.ctx.clone()).await;
        let elapsed_ms = timer.elapsed().as_millis() as u64;

        match result {
            Ok(reply) => {
                debug!(tool = %name, elapsed_ms, "tool finished");
                Ok(reply)
            }
            Err(e) => {
                error!(
                    tool = %name,
                    args = %raw,
                    participant = %self.ctx.participant_identity,
                    elapsed_ms,
                    error = %format!("{e:#}"),
                    "tool execution failed"
                );
                Err(ToolError::ToolExecutionFailed {
                    tool: name.to_string(),
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteFoodStore;
    use serde_json::json;

    fn echo_handler() -> ToolHandler {
        Arc::new(|args, ctx| {
            Box::pin(async move {
                Ok(format!(
                    "{} said {}",
                    ctx.participant_identity,
                    args.text("word").unwrap_or_default()
                ))
            })
        })
    }

    fn dispatcher(registry: ToolRegistry) -> ToolDispatcher {
        let store = Arc::new(SqliteFoodStore::open_in_memory().unwrap());
        ToolDispatcher::new(
            Arc::new(registry),
            ToolContext {
                participant_identity: "alice".into(),
                store,
                day_zone: DayZone::Local,
            },
        )
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new("echo", "Echo"), echo_handler())
            .unwrap();
        assert!(reg
            .register(ToolDescriptor::new("echo", "Echo again"), echo_handler())
            .is_err());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn resolve_unknown_is_explicit() {
        let reg = ToolRegistry::new();
        assert!(matches!(reg.resolve("nope"), Err(ToolError::UnknownTool(n)) if n == "nope"));
    }

    #[tokio::test]
    async fn invoke_passes_validated_args_and_context() {
        let mut reg = ToolRegistry::new();
        reg.register(
            ToolDescriptor::new("echo", "Echo").required("word", ParamType::String, "w"),
            echo_handler(),
        )
        .unwrap();
        let d = dispatcher(reg);
        let reply = d.invoke("echo", r#"{"word":"hi"}"#).await.unwrap();
        assert_eq!(reply, "alice said hi");

        let reply = d.invoke_json("echo", json!({ "word": "yo" })).await.unwrap();
        assert_eq!(reply, "alice said yo");
    }

    #[tokio::test]
    async fn handler_error_becomes_execution_failed() {
        let mut reg = ToolRegistry::new();
        reg.register(
            ToolDescriptor::new("boom", "Always fails"),
            Arc::new(|_, _| Box::pin(async { Err(anyhow::anyhow!("disk full")) })),
        )
        .unwrap();
        let err = dispatcher(reg).invoke("boom", "{}").await.unwrap_err();
        assert!(matches!(err, ToolError::ToolExecutionFailed { ref tool, .. } if tool == "boom"));
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_arguments() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolDescriptor::new("echo", "Echo"), echo_handler())
            .unwrap();
        let err = dispatcher(reg).invoke("echo", "{oops").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
