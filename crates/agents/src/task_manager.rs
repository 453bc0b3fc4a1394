//! The scribe.
//!
//! Owns the task CRUD tools. Every tool traverses the storage layer and
//! is flagged slow, so the orchestrator masks the round-trip with filler
//! audio. All tools require an authenticated caller.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use vx_domain::{Response, Result, Signal};
use vx_providers::{ChatMessage, LiveClient};
use vx_sessions::{GlobalContext, HandoffData};
use vx_storage::{StorageService, TaskStatus};

use crate::agent::{Agent, AgentCore, ModelSettings, ResponseModality};
use crate::prompt::PromptStore;
use crate::tool::{Tool, ToolContext, ToolSet};

pub struct TaskManagerAgent {
    core: AgentCore,
    client: Arc<dyn LiveClient>,
    conversation: Mutex<Vec<ChatMessage>>,
}

impl TaskManagerAgent {
    pub fn new(
        client: Arc<dyn LiveClient>,
        storage: Arc<StorageService>,
        prompts: &PromptStore,
    ) -> Self {
        let tools = ToolSet::new(vec![
            create_task_tool(storage.clone()),
            search_tasks_tool(storage.clone()),
            get_all_tasks_tool(storage.clone()),
            update_task_status_tool(storage.clone()),
            get_todays_tasks_tool(storage.clone()),
            get_high_priority_tasks_tool(storage.clone()),
            delete_task_tool(storage),
        ]);

        Self {
            core: AgentCore::new(
                "task_manager",
                prompts.load("task_manager"),
                ModelSettings {
                    temperature: 0.7,
                    modality: ResponseModality::Audio,
                    ..Default::default()
                },
                tools,
            ),
            client,
            conversation: Mutex::new(Vec::new()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn create_task_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "create_task",
        "Create a new task for the user",
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "The task description" },
                "priority": {
                    "type": "integer",
                    "description": "Priority level from 1 (highest) to 5 (lowest)",
                    "minimum": 1,
                    "maximum": 5,
                },
                "due_date": {
                    "type": "string",
                    "description": "Due date in ISO8601 format (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)",
                },
            },
            "required": ["description"],
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                let user_id = ctx.require_user()?.to_owned();
                let description = require_str(&args, "description")?;
                let priority = args.get("priority").and_then(|v| v.as_i64()).unwrap_or(3);
                let due_date = args
                    .get("due_date")
                    .and_then(|v| v.as_str())
                    .and_then(parse_due_date);

                let (_, tasks) = storage.repositories();
                let task = tasks.create(&user_id, &description, priority, due_date)?;
                Ok(json!({
                    "success": true,
                    "task_id": task.task_id,
                    "description": task.description,
                    "priority": task.priority,
                    "due_date": task.due_date.map(|d| d.to_rfc3339()),
                    "message": format!("Task created: {description}"),
                }))
            })
        },
    )
    .slow()
}

fn search_tasks_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "search_tasks",
        "Search and retrieve tasks based on query and filters",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to match against task descriptions",
                },
                "status": {
                    "type": "string",
                    "description": "Filter by status: OPEN, IN_PROGRESS, COMPLETED, CANCELLED",
                    "enum": ["OPEN", "IN_PROGRESS", "COMPLETED", "CANCELLED"],
                },
            },
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                let user_id = ctx.require_user()?.to_owned();
                let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let status = parse_status_arg(&args)?;

                let (_, tasks) = storage.repositories();
                let results = if query.is_empty() {
                    tasks.get_by_user(&user_id, status, None, 50)?
                } else {
                    tasks.search(&user_id, query, status)?
                };
                Ok(task_list_result(&results, None))
            })
        },
    )
    .slow()
}

fn get_all_tasks_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "get_all_tasks",
        "Get all tasks for the current user",
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "Optional status filter",
                    "enum": ["OPEN", "IN_PROGRESS", "COMPLETED", "CANCELLED"],
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of tasks to return",
                    "default": 10,
                },
            },
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                let user_id = ctx.require_user()?.to_owned();
                let status = parse_status_arg(&args)?;
                let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

                let (_, tasks) = storage.repositories();
                let results = tasks.get_by_user(&user_id, status, None, limit)?;
                Ok(task_list_result(&results, None))
            })
        },
    )
    .slow()
}

fn update_task_status_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "update_task_status",
        "Update the status of a specific task",
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "The unique task identifier" },
                "status": {
                    "type": "string",
                    "description": "New status for the task",
                    "enum": ["OPEN", "IN_PROGRESS", "COMPLETED", "CANCELLED"],
                },
            },
            "required": ["task_id", "status"],
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                ctx.require_user()?;
                let task_id = require_str(&args, "task_id")?;
                let status: TaskStatus = require_str(&args, "status")?.parse()?;

                let (_, tasks) = storage.repositories();
                match tasks.update_status(&task_id, status)? {
                    Some(_) => Ok(json!({
                        "success": true,
                        "task_id": task_id,
                        "new_status": status.to_string(),
                        "message": format!("Task updated to {status}"),
                    })),
                    None => Ok(json!({
                        "success": false,
                        "error": format!("Task {task_id} not found"),
                    })),
                }
            })
        },
    )
    .slow()
}

fn get_todays_tasks_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "get_todays_tasks",
        "Get tasks that are due today",
        json!({ "type": "object", "properties": {} }),
        move |ctx, _args| {
            let storage = storage.clone();
            Box::pin(async move {
                let user_id = ctx.require_user()?.to_owned();
                let (_, tasks) = storage.repositories();
                let results = tasks.get_due_today(&user_id)?;
                let message = format!("You have {} task(s) due today", results.len());
                Ok(task_list_result(&results, Some(message)))
            })
        },
    )
    .slow()
}

fn get_high_priority_tasks_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "get_high_priority_tasks",
        "Get high priority tasks (priority 1-2)",
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Maximum number of tasks", "default": 5 },
            },
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                let user_id = ctx.require_user()?.to_owned();
                let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(5) as usize;
                let (_, tasks) = storage.repositories();
                let results = tasks.get_high_priority(&user_id, limit)?;
                let message = format!("You have {} high priority task(s)", results.len());
                Ok(task_list_result(&results, Some(message)))
            })
        },
    )
    .slow()
}

fn delete_task_tool(storage: Arc<StorageService>) -> Tool {
    Tool::new(
        "delete_task",
        "Delete a task permanently",
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "The unique task identifier" },
            },
            "required": ["task_id"],
        }),
        move |ctx, args| {
            let storage = storage.clone();
            Box::pin(async move {
                ctx.require_user()?;
                let task_id = require_str(&args, "task_id")?;
                let (_, tasks) = storage.repositories();
                if tasks.delete(&task_id)? {
                    Ok(json!({
                        "success": true,
                        "task_id": task_id,
                        "message": "Task deleted successfully",
                    }))
                } else {
                    Ok(json!({
                        "success": false,
                        "error": format!("Task {task_id} not found"),
                    }))
                }
            })
        },
    )
    .slow()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn require_str(args: &Value, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| vx_domain::Error::InvalidArgument(format!("missing argument: {name}")))
}

fn parse_status_arg(args: &Value) -> Result<Option<TaskStatus>> {
    match args.get("status").and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(s) => Ok(Some(s.parse()?)),
    }
}

/// Parse a spoken-assistant due date: bare dates are coerced to end of
/// day. Unparseable strings are logged and dropped.
fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.contains('T') {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(Utc.from_utc_datetime(&dt));
        }
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let end_of_day = date.and_hms_opt(23, 59, 59).expect("valid time");
        return Some(Utc.from_utc_datetime(&end_of_day));
    }
    tracing::warn!(due_date = raw, "invalid due date, ignoring");
    None
}

fn task_list_result(tasks: &[vx_storage::Task], message: Option<String>) -> Value {
    let mut out = json!({
        "success": true,
        "count": tasks.len(),
        "tasks": tasks.iter().map(|t| t.to_json()).collect::<Vec<_>>(),
    });
    if let Some(message) = message {
        out["message"] = json!(message);
    }
    out
}

/// Natural-language summary of a task list, grouped by priority.
fn summarize_tasks(tasks: &[Value]) -> String {
    if tasks.is_empty() {
        return "You have no tasks.".into();
    }

    fn priority_of(t: &Value) -> i64 {
        t.get("priority").and_then(|p| p.as_i64()).unwrap_or(3)
    }
    fn description_of(t: &Value) -> &str {
        t.get("description").and_then(|d| d.as_str()).unwrap_or("(no description)")
    }

    let high: Vec<&Value> = tasks.iter().filter(|t| priority_of(t) <= 2).collect();
    let normal: Vec<&Value> = tasks
        .iter()
        .filter(|t| (3..=4).contains(&priority_of(t)))
        .collect();

    let count = tasks.len();
    let mut parts = vec![format!(
        "You have {count} task{}.",
        if count != 1 { "s" } else { "" }
    )];

    if !high.is_empty() {
        parts.push(format!("\n{} high priority:", high.len()));
        for t in high.iter().take(3) {
            parts.push(format!("  - {}", description_of(t)));
        }
    }
    if !normal.is_empty() && parts.len() < 6 {
        parts.push(format!("\n{} normal priority:", normal.len()));
        for t in normal.iter().take(2) {
            parts.push(format!("  - {}", description_of(t)));
        }
    }

    parts.join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl Agent for TaskManagerAgent {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn tools(&self) -> &ToolSet {
        &self.core.tools
    }

    fn model_settings(&self) -> &ModelSettings {
        &self.core.settings
    }

    fn render_prompt(&self, ctx: &GlobalContext) -> String {
        self.core.render(ctx)
    }

    async fn process_signal(&self, signal: &Signal, ctx: &mut GlobalContext) -> Result<Response> {
        // A warm handoff may have parked the caller's request; the next
        // turn consumes it.
        if ctx.session.scratchpad.has("handover_context") {
            let handover = ctx.session.scratchpad.take("handover_context");
            tracing::debug!(?handover, "received handover context");
        }
        self.core
            .process_via_model(&self.client, &self.conversation, signal, ctx)
            .await
    }

    async fn on_enter(&self, ctx: &mut GlobalContext, handoff: Option<&HandoffData>) -> Result<()> {
        self.core.enter(handoff);
        if let Some(h) = handoff {
            tracing::info!(
                user = ctx.user.display_name(),
                source = %h.source_agent,
                intent = h.user_intent.as_deref().unwrap_or(""),
                greeting_done = h.greeting_completed,
                "task manager activated with handoff"
            );
        }
        Ok(())
    }

    async fn on_exit(&self, _ctx: &mut GlobalContext) -> Result<()> {
        self.core.exit();
        self.conversation.lock().clear();
        Ok(())
    }

    async fn handle_tool_result(
        &self,
        tool_name: &str,
        result: &Value,
        ctx: &mut GlobalContext,
    ) -> Result<Option<Response>> {
        let success = result.get("success").and_then(|s| s.as_bool()).unwrap_or(false);
        tracing::info!(tool = tool_name, success, "tool result");
        if !success {
            return Ok(None);
        }

        let session_id = ctx.session.session_id.clone();
        match tool_name {
            "create_task" => {
                let description = result
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("your task");
                let priority = result.get("priority").and_then(|p| p.as_i64()).unwrap_or(3);
                Ok(Some(Response::text(
                    session_id,
                    self.name(),
                    format!(
                        "I've created your task: {description}. Priority is set to {priority}."
                    ),
                )))
            }
            "get_all_tasks" | "search_tasks" => {
                let tasks = result
                    .get("tasks")
                    .and_then(|t| t.as_array())
                    .cloned()
                    .unwrap_or_default();
                let content = if tasks.is_empty() {
                    "You don't have any tasks matching that criteria.".to_owned()
                } else {
                    summarize_tasks(&tasks)
                };
                Ok(Some(Response::text(session_id, self.name(), content)))
            }
            "get_todays_tasks" | "get_high_priority_tasks" => {
                let message = result
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Done.")
                    .to_owned();
                Ok(Some(Response::text(session_id, self.name(), message)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_providers::{GenerateRequest, GenerateResponse, LiveSession, ToolSchema};
    use vx_sessions::UserContext;

    struct NullClient;

    #[async_trait::async_trait]
    impl LiveClient for NullClient {
        async fn open_session(
            &self,
            _system_prompt: &str,
            _tools: &[ToolSchema],
        ) -> Result<LiveSession> {
            unimplemented!("not used in task manager tests")
        }

        async fn generate(&self, _req: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::default())
        }
    }

    fn agent() -> (TaskManagerAgent, Arc<StorageService>, ToolContext) {
        let storage = Arc::new(StorageService::in_memory());
        let user_id = {
            let (users, _) = storage.repositories();
            users.create("+15550100", Some("Alice".into())).unwrap().user_id
        };
        let dir = tempfile::tempdir().unwrap();
        let agent = TaskManagerAgent::new(
            Arc::new(NullClient),
            storage.clone(),
            &PromptStore::new(dir.path()),
        );
        (agent, storage, ToolContext::new("s1", Some(user_id)))
    }

    #[test]
    fn every_tool_is_slow() {
        let (agent, _, _) = agent();
        for name in [
            "create_task",
            "search_tasks",
            "get_all_tasks",
            "update_task_status",
            "get_todays_tasks",
            "get_high_priority_tasks",
            "delete_task",
        ] {
            assert!(agent.tools().is_slow(name), "{name} must be slow");
        }
        assert_eq!(agent.tools().len(), 7);
    }

    #[tokio::test]
    async fn tools_require_authentication() {
        let (agent, _, _) = agent();
        let anon = ToolContext::new("s1", None);
        let err = agent
            .tools()
            .get("get_all_tasks")
            .unwrap()
            .invoke(anon, json!({}))
            .await
            .unwrap_err();
        // Surfaced as a tool error wrapping the auth failure.
        assert!(err.to_string().contains("not authenticated"));
    }

    #[tokio::test]
    async fn create_task_clamps_priority_and_coerces_date() {
        let (agent, storage, ctx) = agent();
        let result = agent
            .tools()
            .get("create_task")
            .unwrap()
            .invoke(
                ctx,
                json!({ "description": "call mum", "priority": 9, "due_date": "2026-08-01" }),
            )
            .await
            .unwrap();

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["priority"], json!(5));

        let (_, tasks) = storage.repositories();
        let task = tasks
            .get_by_id(result["task_id"].as_str().unwrap())
            .unwrap()
            .unwrap();
        let due = task.due_date.unwrap();
        assert_eq!(due.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[tokio::test]
    async fn update_task_status_rejects_bad_status() {
        let (agent, _, ctx) = agent();
        let err = agent
            .tools()
            .get("update_task_status")
            .unwrap()
            .invoke(ctx, json!({ "task_id": "t1", "status": "DONE" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid status"));
    }

    #[tokio::test]
    async fn search_with_empty_query_lists_all() {
        let (agent, storage, ctx) = agent();
        {
            let (_, tasks) = storage.repositories();
            tasks.create(&ctx.user_id.clone().unwrap(), "alpha", 1, None).unwrap();
            tasks.create(&ctx.user_id.clone().unwrap(), "beta", 3, None).unwrap();
        }
        let result = agent
            .tools()
            .get("search_tasks")
            .unwrap()
            .invoke(ctx, json!({}))
            .await
            .unwrap();
        assert_eq!(result["count"], json!(2));
    }

    #[test]
    fn summarizer_groups_by_priority() {
        let tasks = vec![
            json!({ "description": "urgent thing", "priority": 1 }),
            json!({ "description": "soon thing", "priority": 2 }),
            json!({ "description": "normal thing", "priority": 3 }),
        ];
        let summary = summarize_tasks(&tasks);
        assert!(summary.starts_with("You have 3 tasks."));
        assert!(summary.contains("2 high priority:"));
        assert!(summary.contains("  - urgent thing"));
        assert!(summary.contains("1 normal priority:"));
    }

    #[test]
    fn summarizer_singular() {
        let tasks = vec![json!({ "description": "only one", "priority": 3 })];
        assert!(summarize_tasks(&tasks).starts_with("You have 1 task."));
        assert_eq!(summarize_tasks(&[]), "You have no tasks.");
    }

    #[tokio::test]
    async fn handle_tool_result_speaks_create_confirmation() {
        let (agent, _, _) = agent();
        let mut ctx = GlobalContext::new("test");
        ctx.set_user(UserContext::authenticated("u1", "+1", Some("Alice".into())));

        let resp = agent
            .handle_tool_result(
                "create_task",
                &json!({ "success": true, "description": "call mum", "priority": 2 }),
                &mut ctx,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resp.text_content().unwrap(),
            "I've created your task: call mum. Priority is set to 2."
        );
    }

    #[tokio::test]
    async fn handle_tool_result_empty_list_message() {
        let (agent, _, _) = agent();
        let mut ctx = GlobalContext::new("test");
        let resp = agent
            .handle_tool_result(
                "get_all_tasks",
                &json!({ "success": true, "tasks": [] }),
                &mut ctx,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resp.text_content().unwrap(),
            "You don't have any tasks matching that criteria."
        );
    }

    #[test]
    fn due_date_with_time_parses_exactly() {
        let due = parse_due_date("2026-08-01T09:30:00").unwrap();
        assert_eq!(due.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-08-01 09:30:00");
        assert!(parse_due_date("next tuesday").is_none());
    }
}
