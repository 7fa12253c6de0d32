//! Prompt repository — CRUD operations for the `prompts` table.
//!
//! A prompt row is one conversational turn: either the user's message or
//! the model's raw reply. The paired USER/SYSTEM rows of a turn are
//! deleted together through [`delete_turn`] when a render submission
//! fails, so the history never shows a dangling attempt.

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{Database, DatabaseError};

/// Which side of the conversation a prompt row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    User,
    System,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::User => "user",
            PromptKind::System => "system",
        }
    }
}

impl FromSql for PromptKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "user" => Ok(PromptKind::User),
            "system" => Ok(PromptKind::System),
            other => Err(FromSqlError::Other(
                format!("unknown prompt kind: {other}").into(),
            )),
        }
    }
}

impl ToSql for PromptKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A prompt row from the database.
#[derive(Debug, Clone)]
pub struct PromptRow {
    pub id: String,
    pub project_id: String,
    /// The user's message or the model's raw reply, verbatim.
    pub value: String,
    pub kind: PromptKind,
    /// Playable artifact URL, set once the tracked render job succeeds.
    pub video_url: Option<String>,
    /// Render job identifier, set on the SYSTEM row after submission.
    pub task_id: Option<String>,
    /// Render failure detail, set when the tracked job fails.
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PromptRow {
    /// Creates a fresh row with a generated id and current timestamps.
    pub fn new(project_id: &str, value: &str, kind: PromptKind) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            value: value.to_string(),
            kind,
            video_url: None,
            task_id: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            value: row.get("value")?,
            kind: row.get("kind")?,
            video_url: row.get("video_url")?,
            task_id: row.get("task_id")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new prompt row.
pub fn insert(db: &Database, prompt: &PromptRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO prompts (id, project_id, value, kind, video_url, task_id, error,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prompt.id,
                prompt.project_id,
                prompt.value,
                prompt.kind,
                prompt.video_url,
                prompt.task_id,
                prompt.error,
                prompt.created_at,
                prompt.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a prompt by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM prompts WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], PromptRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all prompts for a project, oldest first.
pub fn list_by_project(db: &Database, project_id: &str) -> Result<Vec<PromptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM prompts WHERE project_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows: Vec<PromptRow> = stmt
            .query_map(params![project_id], PromptRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts prompts for a project.
pub fn count_by_project(db: &Database, project_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM prompts WHERE project_id = ?1",
            params![project_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes a single prompt row.
pub fn delete_by_id(db: &Database, id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM prompts WHERE id = ?1", params![id])?;
        Ok(())
    })
}

/// Deletes a USER/SYSTEM pair in one transaction.
///
/// The compensating delete after a failed submission must remove both rows
/// or neither; a partial delete would leave the history inconsistent.
pub fn delete_turn(db: &Database, user_id: &str, system_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM prompts WHERE id = ?1", params![user_id])?;
        tx.execute("DELETE FROM prompts WHERE id = ?1", params![system_id])?;
        tx.commit()?;
        Ok(())
    })
}

/// Attaches the render job identifier to a prompt row.
pub fn set_task_id(db: &Database, id: &str, task_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET task_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, task_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}

/// Writes the artifact URL once the render job succeeds.
pub fn set_video_url(db: &Database, id: &str, video_url: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET video_url = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, video_url, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}

/// Records the render failure detail on a prompt row. The row itself stays:
/// only submission-time failures are compensated, not render failures.
pub fn set_render_error(db: &Database, id: &str, detail: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prompts SET error = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, detail, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}
