use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use vx_domain::{Error, Result};
use vx_providers::ToolSchema;

/// Per-invocation context handed to tool handlers.
///
/// Carries only what a tool may rely on: the session id and the
/// authenticated user, if any.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub user_id: Option<String>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
        }
    }

    /// The authenticated user id, or an authentication error.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| Error::Authentication("user not authenticated".into()))
    }
}

type Handler = Arc<dyn Fn(ToolContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A named, schema-described callable an agent exposes to the model.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
    /// Slow tools trigger a latency-masking filler utterance.
    pub is_slow: bool,
    handler: Handler,
}

impl Tool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            is_slow: false,
            handler: Arc::new(handler),
        }
    }

    pub fn slow(mut self) -> Self {
        self.is_slow = true;
        self
    }

    /// Invoke the tool. Failures surface as tool-execution errors
    /// carrying the tool name and the offending arguments.
    pub async fn invoke(&self, ctx: ToolContext, arguments: Value) -> Result<Value> {
        tracing::info!(tool = %self.name, "executing tool");
        (self.handler)(ctx, arguments.clone())
            .await
            .map_err(|e| match e {
                already @ Error::ToolExecution { .. } => already,
                other => Error::tool(&self.name, arguments, other.to_string()),
            })
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("is_slow", &self.is_slow)
            .finish()
    }
}

/// The tools owned by one agent, looked up by exact name.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<Tool>,
}

impl ToolSet {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn is_slow(&self, name: &str) -> bool {
        self.get(name).map(|t| t.is_slow).unwrap_or(false)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(Tool::schema).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            "Echo the input",
            serde_json::json!({"type": "object"}),
            |_ctx, args| Box::pin(async move { Ok(args) }),
        )
    }

    #[tokio::test]
    async fn invoke_passes_arguments_through() {
        let tool = echo_tool();
        let out = tool
            .invoke(ToolContext::default(), serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn invoke_wraps_failures_with_tool_name() {
        let tool = Tool::new(
            "boom",
            "always fails",
            serde_json::json!({"type": "object"}),
            |_ctx, _args| Box::pin(async { Err(Error::Other("kaput".into())) }),
        );
        let err = tool
            .invoke(ToolContext::default(), serde_json::json!({}))
            .await
            .unwrap_err();
        match err {
            Error::ToolExecution { tool_name, .. } => assert_eq!(tool_name, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn toolset_lookup_and_slow_flag() {
        let set = ToolSet::new(vec![echo_tool().slow()]);
        assert!(set.get("echo").is_some());
        assert!(set.get("nope").is_none());
        assert!(set.is_slow("echo"));
        assert!(!set.is_slow("nope"));
        assert_eq!(set.schemas().len(), 1);
    }

    #[test]
    fn require_user_gates_anonymous_context() {
        let ctx = ToolContext::new("s1", None);
        assert!(matches!(
            ctx.require_user().unwrap_err(),
            Error::Authentication(_)
        ));
        let ctx = ToolContext::new("s1", Some("u1".into()));
        assert_eq!(ctx.require_user().unwrap(), "u1");
    }
}
