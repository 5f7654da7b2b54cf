use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use tasklane_types::models::{Priority, PushSubscription, Todo, TodoStatus};
use tasklane_types::status::derive_status;

use crate::Database;
use crate::models::{SubscriptionRow, TODO_COLUMNS, TodoRow, to_millis};

/// Fields replaced by a user edit. `completed: None` keeps the stored flag;
/// `status: None` lets the store derive it.
#[derive(Debug, Clone)]
pub struct TodoChanges {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub priority: Priority,
    pub expire_at: Option<DateTime<Utc>>,
    pub completed: Option<bool>,
    pub status: Option<TodoStatus>,
}

impl TodoChanges {
    /// Status and completion flag to store, given the flag currently stored.
    ///
    /// An explicit status wins. Otherwise a todo that is (still) completed
    /// stays `Completed` and only an open todo is re-derived, so an edit that
    /// leaves completion alone never turns a completed todo `Expired`.
    pub fn resolve(&self, stored_completed: bool, now: DateTime<Utc>) -> (TodoStatus, bool) {
        let completed = self.completed.unwrap_or(stored_completed);
        let explicit = self
            .status
            .or_else(|| completed.then_some(TodoStatus::Completed));
        let status = derive_status(self.expire_at, explicit, now);
        (status, completed || status == TodoStatus::Completed)
    }
}

impl Database {
    // -- Todos --

    pub fn insert_todo(&self, todo: &Todo) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO todos (id, title, description, date, priority, completed, expire_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    todo.id.to_string(),
                    todo.title,
                    todo.description,
                    to_millis(todo.date),
                    todo.priority.as_str(),
                    todo.completed,
                    todo.expire_at.map(to_millis),
                    todo.status.as_str(),
                    to_millis(todo.created_at),
                    to_millis(todo.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_todo(&self, id: &str) -> Result<Option<Todo>> {
        self.with_conn(|conn| query_todo(conn, id))
    }

    /// One page of todos, newest due date first.
    pub fn list_todos(&self, offset: u64, limit: u32) -> Result<Vec<Todo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TODO_COLUMNS} FROM todos
                 ORDER BY date DESC, created_at DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(params![limit, offset as i64], TodoRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(TodoRow::into_todo).collect()
        })
    }

    pub fn count_todos(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM todos", [], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    /// Apply a user edit. Returns `None` when no todo has this id.
    /// The status is resolved against the stored completion flag while the
    /// connection is held, see [`TodoChanges::resolve`]. Any edit clears the
    /// reminder stamp so a moved expiry is reminded again.
    pub fn update_todo(
        &self,
        id: &str,
        changes: &TodoChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Todo>> {
        self.with_conn(|conn| {
            let stored: Option<bool> = conn
                .query_row("SELECT completed FROM todos WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(stored_completed) = stored else {
                return Ok(None);
            };
            let (status, completed) = changes.resolve(stored_completed, now);

            conn.execute(
                "UPDATE todos
                 SET title = ?1, description = ?2, date = ?3, priority = ?4, expire_at = ?5,
                     completed = ?6, status = ?7, reminded_at = NULL, updated_at = ?8
                 WHERE id = ?9",
                params![
                    changes.title,
                    changes.description,
                    to_millis(changes.date),
                    changes.priority.as_str(),
                    changes.expire_at.map(to_millis),
                    completed,
                    status.as_str(),
                    to_millis(now),
                    id,
                ],
            )?;
            query_todo(conn, id)
        })
    }

    /// Delete a todo, returning what was removed.
    pub fn delete_todo(&self, id: &str) -> Result<Option<Todo>> {
        self.with_conn(|conn| {
            let Some(todo) = query_todo(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM todos WHERE id = ?1", [id])?;
            Ok(Some(todo))
        })
    }

    // -- Expiry sweep --

    /// Move every lapsed, non-terminal todo to `Expired` in one statement.
    /// Completed todos are never touched. Returns the number of rows changed.
    pub fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE todos
                 SET status = 'Expired', updated_at = ?1
                 WHERE expire_at IS NOT NULL
                   AND expire_at < ?1
                   AND status NOT IN ('Expired', 'Completed')",
                [to_millis(now)],
            )?;
            Ok(changed)
        })
    }

    // -- Reminders --

    /// Todos whose expiry falls inside `[now, until]` and that are not
    /// completed. Expired todos are not excluded: one can only land in the
    /// window after its expiry was edited forward. With `unreminded_only`,
    /// todos already stamped by [`Database::mark_reminded`] are skipped.
    pub fn reminder_candidates(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        unreminded_only: bool,
    ) -> Result<Vec<Todo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TODO_COLUMNS} FROM todos
                 WHERE expire_at >= ?1
                   AND expire_at <= ?2
                   AND status != 'Completed'
                   AND (?3 = 0 OR reminded_at IS NULL)
                 ORDER BY expire_at ASC"
            ))?;
            let rows = stmt
                .query_map(
                    params![to_millis(now), to_millis(until), unreminded_only],
                    TodoRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(TodoRow::into_todo).collect()
        })
    }

    pub fn mark_reminded(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE todos SET reminded_at = ?1 WHERE id = ?2",
                params![to_millis(now), id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Push subscriptions --

    /// Register a subscription. A known endpoint is left untouched.
    /// Returns true when a new row was inserted.
    pub fn upsert_subscription(&self, sub: &PushSubscription, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO push_subscriptions (endpoint, p256dh, auth, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sub.endpoint,
                    sub.keys.p256dh,
                    sub.keys.auth,
                    sub.user_id,
                    to_millis(now),
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn list_subscriptions(&self) -> Result<Vec<PushSubscription>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT endpoint, p256dh, auth, user_id FROM push_subscriptions ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([], SubscriptionRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(PushSubscription::from).collect())
        })
    }

    /// Remove a subscription. Deleting an unknown endpoint is a no-op that
    /// returns false.
    pub fn delete_subscription(&self, endpoint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM push_subscriptions WHERE endpoint = ?1", [endpoint])?;
            Ok(deleted > 0)
        })
    }
}

fn query_todo(conn: &Connection, id: &str) -> Result<Option<Todo>> {
    let row = conn
        .query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            [id],
            TodoRow::from_row,
        )
        .optional()?;

    row.map(TodoRow::into_todo).transpose()
}
