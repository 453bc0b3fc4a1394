use chrono::{DateTime, Datelike, TimeZone, Utc};
use uuid::Uuid;

use vx_domain::Result;

use crate::models::{clamp_priority, Task, TaskStatus, TaskUpdate};
use crate::store::StorageService;

/// Repository handle for task records, scoped to one service.
pub struct TaskRepo<'a> {
    svc: &'a StorageService,
}

impl<'a> TaskRepo<'a> {
    pub(crate) fn new(svc: &'a StorageService) -> Self {
        Self { svc }
    }

    /// Create a task. Priority is clamped to `[1, 5]`; status starts OPEN.
    pub fn create(
        &self,
        user_id: &str,
        description: &str,
        priority: i64,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let now = Utc::now();
        let task = Task {
            task_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            description: description.to_owned(),
            priority: clamp_priority(priority),
            status: TaskStatus::Open,
            due_date,
            created_at: now,
            updated_at: now,
        };
        self.svc
            .state
            .tasks
            .write()
            .insert(task.task_id.clone(), task.clone());
        self.svc.flush_tasks()?;

        tracing::info!(task_id = %task.task_id, user_id, "task created");
        Ok(task)
    }

    pub fn get_by_id(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.svc.state.tasks.read().get(task_id).cloned())
    }

    /// Tasks for a user, optionally filtered, ordered by priority then due
    /// date (tasks without a due date sort last).
    pub fn get_by_user(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        priority: Option<i32>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .svc
            .state
            .tasks
            .read()
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| status.map_or(true, |s| t.status == s))
            .filter(|t| priority.map_or(true, |p| t.priority == p))
            .cloned()
            .collect();
        sort_by_priority_then_due(&mut tasks);
        tasks.truncate(limit);
        Ok(tasks)
    }

    /// Case-insensitive substring search over descriptions.
    pub fn search(
        &self,
        user_id: &str,
        query: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let needle = query.to_lowercase();
        let mut tasks: Vec<Task> = self
            .svc
            .state
            .tasks
            .read()
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| t.description.to_lowercase().contains(&needle))
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        sort_by_priority_then_due(&mut tasks);
        Ok(tasks)
    }

    pub fn update(&self, task_id: &str, fields: TaskUpdate) -> Result<Option<Task>> {
        let updated = {
            let mut tasks = self.svc.state.tasks.write();
            match tasks.get_mut(task_id) {
                None => None,
                Some(task) => {
                    if let Some(description) = fields.description {
                        task.description = description;
                    }
                    if let Some(priority) = fields.priority {
                        task.priority = clamp_priority(priority);
                    }
                    if let Some(status) = fields.status {
                        task.status = status;
                    }
                    if let Some(due_date) = fields.due_date {
                        task.due_date = due_date;
                    }
                    task.updated_at = Utc::now();
                    Some(task.clone())
                }
            }
        };
        if updated.is_some() {
            self.svc.flush_tasks()?;
            tracing::info!(task_id, "task updated");
        }
        Ok(updated)
    }

    /// Update only the status. The status has already been validated by
    /// the [`TaskStatus`] parse at the tool boundary.
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<Option<Task>> {
        self.update(
            task_id,
            TaskUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    pub fn delete(&self, task_id: &str) -> Result<bool> {
        let removed = self.svc.state.tasks.write().remove(task_id).is_some();
        if removed {
            self.svc.flush_tasks()?;
            tracing::info!(task_id, "task deleted");
        }
        Ok(removed)
    }

    /// Active tasks due today, highest priority first.
    pub fn get_due_today(&self, user_id: &str) -> Result<Vec<Task>> {
        let now = Utc::now();
        let day_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .expect("valid day start");
        let day_end = Utc
            .with_ymd_and_hms(now.year(), now.month(), now.day(), 23, 59, 59)
            .single()
            .expect("valid day end");

        let mut tasks: Vec<Task> = self
            .svc
            .state
            .tasks
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.status.is_active())
            .filter(|t| {
                t.due_date
                    .map_or(false, |d| d >= day_start && d <= day_end)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.priority);
        Ok(tasks)
    }

    /// Active tasks at priority 1–2, ordered, capped at `limit`.
    pub fn get_high_priority(&self, user_id: &str, limit: usize) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .svc
            .state
            .tasks
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.priority <= 2 && t.status.is_active())
            .cloned()
            .collect();
        sort_by_priority_then_due(&mut tasks);
        tasks.truncate(limit);
        Ok(tasks)
    }

    /// Count of OPEN and IN_PROGRESS tasks.
    pub fn get_open_count(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .svc
            .state
            .tasks
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.status.is_active())
            .count())
    }
}

fn sort_by_priority_then_due(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| match (a.due_date, b.due_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });
}
