use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a task came from. Anything other than `Local` is owned by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Local,
    Notion,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Notion => "notion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "notion" => Some(Self::Notion),
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub source: TaskSource,
    /// Identifier of the remote item (Notion block id)
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub connection_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Task {
    pub(crate) fn from_new(fields: NewTask, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: fields.title,
            description: fields.description,
            completed: fields.completed,
            due_date: fields.due_date,
            source: fields.source,
            source_id: fields.source_id,
            source_url: fields.source_url,
            connection_id: fields.connection_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the task mirrors an item on a remote source.
    pub fn is_remote(&self) -> bool {
        self.source_id.is_some()
    }

    pub fn belongs_to(&self, connection_id: Uuid) -> bool {
        self.connection_id == Some(connection_id)
    }
}

/// Checks that a task's ownership fields agree with each other.
///
/// A local task carries neither a remote id nor a connection; a remote task
/// carries both.
pub fn check_link(
    source: TaskSource,
    source_id: Option<&str>,
    connection_id: Option<Uuid>,
) -> Result<(), String> {
    match (source.is_local(), source_id, connection_id) {
        (true, None, None) => Ok(()),
        (false, Some(id), Some(_)) if !id.is_empty() => Ok(()),
        (true, _, _) => Err("local tasks cannot carry a remote id or connection".to_string()),
        (false, _, _) => Err(format!(
            "{} tasks need both a remote id and a connection",
            source.as_str()
        )),
    }
}

/// Fields supplied when creating a task. The store fills in id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub source: TaskSource,
    pub source_id: Option<String>,
    pub source_url: Option<String>,
    pub connection_id: Option<Uuid>,
}

impl NewTask {
    pub fn local(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            completed: false,
            due_date: None,
            source: TaskSource::Local,
            source_id: None,
            source_url: None,
            connection_id: None,
        }
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<Option<NaiveDate>>,
    pub source_url: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.source_url.is_none()
    }

    /// Drop every field that already matches `task`.
    pub fn minus(mut self, task: &Task) -> Self {
        if self.title.as_deref() == Some(task.title.as_str()) {
            self.title = None;
        }
        if self.description.as_deref() == Some(task.description.as_str()) {
            self.description = None;
        }
        if self.completed == Some(task.completed) {
            self.completed = None;
        }
        if self.due_date == Some(task.due_date) {
            self.due_date = None;
        }
        if self.source_url.as_ref() == Some(&task.source_url) {
            self.source_url = None;
        }
        self
    }

    pub(crate) fn apply(self, task: &mut Task, now: NaiveDateTime) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(source_url) = self.source_url {
            task.source_url = source_url;
        }
        task.updated_at = now;
    }
}

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub source: Option<TaskSource>,
    pub completed: Option<bool>,
    pub connection_id: Option<Uuid>,
}

impl TaskFilter {
    pub fn for_connection(connection_id: Uuid, source: TaskSource) -> Self {
        Self {
            source: Some(source),
            completed: None,
            connection_id: Some(connection_id),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.source.is_none_or(|s| s == task.source)
            && self.completed.is_none_or(|c| c == task.completed)
            && self
                .connection_id
                .is_none_or(|id| task.connection_id == Some(id))
    }
}

/// Incomplete tasks first, newest first within each group.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
