use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use tasklane_db::Database;

use crate::scheduler::Job;

/// Promotes lapsed todos to `Expired` without user interaction.
///
/// Each tick is one set-based update with the predicate evaluated by the
/// store, so a concurrent edit either lands before the update (and is
/// re-checked by it) or after it. Completed todos are never touched.
pub struct ExpirySweep {
    db: Arc<Database>,
}

impl ExpirySweep {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl Job for ExpirySweep {
    type Output = usize;

    fn name(&self) -> &'static str {
        "expiry-sweep"
    }

    async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let db = self.db.clone();
        let count = tokio::task::spawn_blocking(move || db.expire_lapsed(now)).await??;

        if count > 0 {
            info!("Expiry sweep: {} todos marked as Expired", count);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tasklane_types::models::{Priority, Todo, TodoStatus};
    use tasklane_types::status::derive_status;
    use uuid::Uuid;

    use crate::scheduler::Scheduler;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
    }

    fn insert(db: &Database, expire_at: Option<DateTime<Utc>>, created: DateTime<Utc>, status: TodoStatus) -> Todo {
        let todo = Todo {
            id: Uuid::new_v4(),
            title: "Renew passport".into(),
            description: "<p>Bring the old one along</p>".into(),
            date: t(),
            priority: Priority::Extreme,
            completed: status == TodoStatus::Completed,
            expire_at,
            status,
            created_at: created,
            updated_at: created,
        };
        db.insert_todo(&todo).unwrap();
        todo
    }

    fn status(db: &Database, todo: &Todo) -> TodoStatus {
        db.get_todo(&todo.id.to_string()).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn todo_lapses_after_its_expiry() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let created = t() - Duration::hours(2);
        let expire = t() + Duration::hours(1);
        let todo = insert(&db, Some(expire), created, derive_status(Some(expire), None, created));
        assert_eq!(todo.status, TodoStatus::Pending);

        let sweep = Scheduler::new(ExpirySweep::new(db.clone()), std::time::Duration::from_secs(60));

        assert_eq!(sweep.run_once(expire).await.unwrap().unwrap(), 0);
        assert_eq!(status(&db, &todo), TodoStatus::Pending);

        let just_after = expire + Duration::seconds(1);
        assert_eq!(sweep.run_once(just_after).await.unwrap().unwrap(), 1);
        assert_eq!(status(&db, &todo), TodoStatus::Expired);
    }

    #[tokio::test]
    async fn completed_and_unexpiring_todos_are_left_alone() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let done = insert(&db, Some(t() - Duration::days(1)), t() - Duration::days(2), TodoStatus::Completed);
        let open = insert(&db, None, t() - Duration::days(2), TodoStatus::Pending);

        let sweep = ExpirySweep::new(db.clone());
        assert_eq!(sweep.tick(t()).await.unwrap(), 0);

        assert_eq!(status(&db, &done), TodoStatus::Completed);
        assert_eq!(status(&db, &open), TodoStatus::Pending);
    }

    #[tokio::test]
    async fn second_sweep_changes_nothing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for hours in 1..=3 {
            insert(&db, Some(t() - Duration::hours(hours)), t() - Duration::days(1), TodoStatus::Pending);
        }

        let sweep = ExpirySweep::new(db.clone());
        assert_eq!(sweep.tick(t()).await.unwrap(), 3);
        let snapshot = db.list_todos(0, 10).unwrap();

        assert_eq!(sweep.tick(t()).await.unwrap(), 0);
        assert_eq!(db.list_todos(0, 10).unwrap(), snapshot);
    }
}
