use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tasklane_db::Database;
use tasklane_push::PushTransport;
use tasklane_types::models::{NotificationPayload, PushSubscription, Todo};

use crate::scheduler::Job;

pub const REMINDER_TITLE: &str = "📝 Task Reminder!";
pub const REMINDER_TAG: &str = "todo-reminder";

/// Whether a todo that stays inside the lookahead window is reminded on every
/// tick or only once. Editing a todo re-arms a `Once` reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReminderMode {
    #[default]
    EveryTick,
    Once,
}

impl FromStr for ReminderMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-tick" | "every_tick" | "always" => Ok(ReminderMode::EveryTick),
            "once" => Ok(ReminderMode::Once),
            other => Err(anyhow::anyhow!(
                "unknown reminder mode '{}', expected 'every-tick' or 'once'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// How far ahead of `now` an expiry qualifies for a reminder.
    pub lookahead: chrono::Duration,
    /// Upper bound on one delivery attempt.
    pub delivery_timeout: Duration,
    pub mode: ReminderMode,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            lookahead: chrono::Duration::hours(6),
            delivery_timeout: Duration::from_secs(10),
            mode: ReminderMode::EveryTick,
        }
    }
}

/// Decides which subscribers hear about a todo.
pub trait SubscriberResolver: Send + Sync + 'static {
    fn resolve<'a>(&self, todo: &Todo, subscriptions: &'a [PushSubscription]) -> Vec<&'a PushSubscription>;
}

/// Every subscriber is told about every soon-expiring todo, whoever owns it.
/// Todos carry no owner yet, so per-user targeting is not possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast;

impl SubscriberResolver for Broadcast {
    fn resolve<'a>(&self, _todo: &Todo, subscriptions: &'a [PushSubscription]) -> Vec<&'a PushSubscription> {
        subscriptions.iter().collect()
    }
}

/// Outcome of one dispatcher tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub candidates: usize,
    pub sent: usize,
    pub failed: usize,
    pub pruned: usize,
}

pub fn reminder_payload(todo: &Todo, lookahead: chrono::Duration) -> NotificationPayload {
    let hours = lookahead.num_hours();
    let body = if hours >= 1 {
        format!("{} is expiring in {} hours!", todo.title, hours)
    } else {
        format!("{} is expiring soon!", todo.title)
    };
    NotificationPayload {
        title: REMINDER_TITLE.to_string(),
        body,
        tag: REMINDER_TAG.to_string(),
    }
}

/// Sends reminders for todos expiring inside the lookahead window and prunes
/// subscriptions the push service reports as gone.
///
/// Deliveries run one at a time. Each one is isolated: a failure is logged
/// and counted, never retried within the tick, and never aborts the others.
/// Nothing suppresses repeat notifications to one subscriber across several
/// candidate todos in the same tick.
pub struct ReminderDispatcher<T: PushTransport, R: SubscriberResolver = Broadcast> {
    db: Arc<Database>,
    transport: T,
    resolver: R,
    settings: ReminderSettings,
}

impl<T: PushTransport> ReminderDispatcher<T, Broadcast> {
    pub fn new(db: Arc<Database>, transport: T, settings: ReminderSettings) -> Self {
        Self::with_resolver(db, transport, Broadcast, settings)
    }
}

impl<T: PushTransport, R: SubscriberResolver> ReminderDispatcher<T, R> {
    pub fn with_resolver(db: Arc<Database>, transport: T, resolver: R, settings: ReminderSettings) -> Self {
        Self {
            db,
            transport,
            resolver,
            settings,
        }
    }

    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    async fn dispatch(&self, now: DateTime<Utc>) -> anyhow::Result<DispatchReport> {
        let until = now + self.settings.lookahead;
        let unreminded_only = self.settings.mode == ReminderMode::Once;

        let db = self.db.clone();
        let (todos, subscriptions) = tokio::task::spawn_blocking(move || {
            let todos = db.reminder_candidates(now, until, unreminded_only)?;
            let subscriptions = db.list_subscriptions()?;
            Ok::<_, anyhow::Error>((todos, subscriptions))
        })
        .await??;

        let mut report = DispatchReport {
            candidates: todos.len(),
            ..DispatchReport::default()
        };
        let mut gone: HashSet<String> = HashSet::new();

        for todo in &todos {
            let payload = reminder_payload(todo, self.settings.lookahead);
            let mut delivered = false;

            for sub in self.resolver.resolve(todo, &subscriptions) {
                if gone.contains(&sub.endpoint) {
                    continue;
                }

                let attempt = tokio::time::timeout(
                    self.settings.delivery_timeout,
                    self.transport.send(sub, &payload),
                )
                .await;

                match attempt {
                    Ok(Ok(())) => {
                        report.sent += 1;
                        delivered = true;
                    }
                    Ok(Err(e)) if e.is_gone() => {
                        info!("Deleting expired subscription: {}", sub.endpoint);
                        gone.insert(sub.endpoint.clone());
                        if self.prune(&sub.endpoint).await {
                            report.pruned += 1;
                        }
                    }
                    Ok(Err(e)) => {
                        report.failed += 1;
                        warn!("Push error for todo {} to {}: {}", todo.id, sub.endpoint, e);
                    }
                    Err(_) => {
                        report.failed += 1;
                        warn!(
                            "Push to {} timed out after {:?}",
                            sub.endpoint, self.settings.delivery_timeout
                        );
                    }
                }
            }

            if delivered && unreminded_only {
                self.stamp(todo, now).await;
            }
        }

        if report.sent + report.failed + report.pruned > 0 {
            info!(
                "Reminders: {} todos, {} sent, {} failed, {} subscriptions pruned",
                report.candidates, report.sent, report.failed, report.pruned
            );
        }
        Ok(report)
    }

    /// Delete a dead subscription. A store failure is logged; the next tick
    /// will see the same gone response and try again.
    async fn prune(&self, endpoint: &str) -> bool {
        let db = self.db.clone();
        let endpoint = endpoint.to_string();
        let result = tokio::task::spawn_blocking(move || db.delete_subscription(&endpoint)).await;
        match result {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!("Failed to delete subscription: {}", e);
                false
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                false
            }
        }
    }

    async fn stamp(&self, todo: &Todo, now: DateTime<Utc>) {
        let db = self.db.clone();
        let id = todo.id.to_string();
        match tokio::task::spawn_blocking(move || db.mark_reminded(&id, now)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Failed to stamp reminder on todo {}: {}", todo.id, e),
            Err(e) => warn!("spawn_blocking join error: {}", e),
        }
    }
}

impl<T: PushTransport, R: SubscriberResolver> Job for ReminderDispatcher<T, R> {
    type Output = DispatchReport;

    fn name(&self) -> &'static str {
        "reminder-dispatcher"
    }

    async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<DispatchReport> {
        self.dispatch(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::TimeZone;
    use tasklane_push::PushError;
    use tasklane_types::models::{Priority, PushKeys, TodoStatus};
    use uuid::Uuid;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Gone,
        Fail,
        Hang,
    }

    /// In-process push service: records every delivery, answers per endpoint.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<(String, NotificationPayload)>>>,
        behaviour: Arc<Mutex<HashMap<String, Behaviour>>>,
    }

    impl RecordingTransport {
        fn set(&self, endpoint: &str, behaviour: Behaviour) {
            self.behaviour.lock().unwrap().insert(endpoint.to_string(), behaviour);
        }

        fn deliveries(&self) -> Vec<(String, NotificationPayload)> {
            self.sent.lock().unwrap().clone()
        }

        fn delivered_to(&self, endpoint: &str) -> usize {
            self.deliveries().iter().filter(|(e, _)| e == endpoint).count()
        }
    }

    impl PushTransport for RecordingTransport {
        async fn send(&self, subscription: &PushSubscription, payload: &NotificationPayload) -> Result<(), PushError> {
            let behaviour = self.behaviour.lock().unwrap().get(&subscription.endpoint).copied();
            match behaviour {
                Some(Behaviour::Gone) => Err(PushError::Gone { status: 410 }),
                Some(Behaviour::Fail) => Err(PushError::Rejected {
                    status: 500,
                    body: "internal".into(),
                }),
                Some(Behaviour::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
                None => {
                    self.sent
                        .lock()
                        .unwrap()
                        .push((subscription.endpoint.clone(), payload.clone()));
                    Ok(())
                }
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 15, 0, 0).unwrap()
    }

    fn add_todo(db: &Database, title: &str, expire_in: chrono::Duration, status: TodoStatus) -> Todo {
        let todo = Todo {
            id: Uuid::new_v4(),
            title: title.into(),
            description: "<p>details here</p>".into(),
            date: now() + chrono::Duration::hours(3),
            priority: Priority::Moderate,
            completed: status == TodoStatus::Completed,
            expire_at: Some(now() + expire_in),
            status,
            created_at: now() - chrono::Duration::days(1),
            updated_at: now() - chrono::Duration::days(1),
        };
        db.insert_todo(&todo).unwrap();
        todo
    }

    fn subscribe(db: &Database, endpoint: &str) {
        let sub = PushSubscription {
            endpoint: endpoint.into(),
            keys: PushKeys {
                p256dh: "key".into(),
                auth: "secret".into(),
            },
            user_id: None,
        };
        db.upsert_subscription(&sub, now()).unwrap();
    }

    fn setup(settings: ReminderSettings) -> (Arc<Database>, RecordingTransport, ReminderDispatcher<RecordingTransport>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let transport = RecordingTransport::default();
        let dispatcher = ReminderDispatcher::new(db.clone(), transport.clone(), settings);
        (db, transport, dispatcher)
    }

    #[tokio::test]
    async fn one_notification_for_a_soon_expiring_todo() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "Submit tax return", chrono::Duration::hours(5), TodoStatus::Pending);
        subscribe(&db, "https://push.example/a");

        let report = dispatcher.tick(now()).await.unwrap();

        assert_eq!(report, DispatchReport { candidates: 1, sent: 1, failed: 0, pruned: 0 });
        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        let (_, payload) = &deliveries[0];
        assert_eq!(payload.tag, "todo-reminder");
        assert_eq!(payload.title, REMINDER_TITLE);
        assert!(payload.body.contains("Submit tax return"));
    }

    #[tokio::test]
    async fn every_pair_of_todo_and_subscriber_is_notified() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "one", chrono::Duration::hours(1), TodoStatus::Pending);
        add_todo(&db, "two", chrono::Duration::hours(2), TodoStatus::Pending);
        add_todo(&db, "later", chrono::Duration::hours(7), TodoStatus::Pending);
        add_todo(&db, "done", chrono::Duration::hours(1), TodoStatus::Completed);
        for endpoint in ["https://push.example/a", "https://push.example/b", "https://push.example/c"] {
            subscribe(&db, endpoint);
        }

        let report = dispatcher.tick(now()).await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.sent, 6);
        assert_eq!(transport.delivered_to("https://push.example/b"), 2);
        assert!(transport.deliveries().iter().all(|(_, p)| !p.body.contains("done")));
    }

    #[tokio::test]
    async fn gone_subscription_is_pruned_and_skipped() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "first", chrono::Duration::hours(1), TodoStatus::Pending);
        add_todo(&db, "second", chrono::Duration::hours(2), TodoStatus::Pending);
        subscribe(&db, "https://push.example/dead");
        subscribe(&db, "https://push.example/live");
        transport.set("https://push.example/dead", Behaviour::Gone);

        let report = dispatcher.tick(now()).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(report.sent, 2);
        let endpoints: Vec<String> = db.list_subscriptions().unwrap().into_iter().map(|s| s.endpoint).collect();
        assert_eq!(endpoints, vec!["https://push.example/live"]);

        let next = dispatcher.tick(now()).await.unwrap();
        assert_eq!(next.pruned, 0);
        assert_eq!(next.sent, 2);
    }

    #[tokio::test]
    async fn transient_failures_do_not_stop_other_deliveries() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "flaky", chrono::Duration::hours(1), TodoStatus::Pending);
        subscribe(&db, "https://push.example/broken");
        subscribe(&db, "https://push.example/fine");
        transport.set("https://push.example/broken", Behaviour::Fail);

        let report = dispatcher.tick(now()).await.unwrap();

        assert_eq!(report, DispatchReport { candidates: 1, sent: 1, failed: 1, pruned: 0 });
        assert_eq!(db.list_subscriptions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn hung_delivery_is_bounded_by_timeout() {
        let settings = ReminderSettings {
            delivery_timeout: Duration::from_millis(50),
            ..ReminderSettings::default()
        };
        let (db, transport, dispatcher) = setup(settings);
        add_todo(&db, "slow", chrono::Duration::hours(1), TodoStatus::Pending);
        subscribe(&db, "https://push.example/hang");
        subscribe(&db, "https://push.example/ok");
        transport.set("https://push.example/hang", Behaviour::Hang);

        let report = tokio::time::timeout(Duration::from_secs(5), dispatcher.tick(now()))
            .await
            .expect("tick must finish")
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn expired_todo_moved_back_into_window_is_reminded() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "extended", chrono::Duration::hours(4), TodoStatus::Expired);
        subscribe(&db, "https://push.example/a");

        let report = dispatcher.tick(now()).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn every_tick_mode_repeats_while_in_window() {
        let (db, transport, dispatcher) = setup(ReminderSettings::default());
        add_todo(&db, "nag", chrono::Duration::hours(3), TodoStatus::Pending);
        subscribe(&db, "https://push.example/a");

        dispatcher.tick(now()).await.unwrap();
        dispatcher.tick(now() + chrono::Duration::minutes(5)).await.unwrap();

        assert_eq!(transport.deliveries().len(), 2);
    }

    #[tokio::test]
    async fn once_mode_reminds_a_todo_a_single_time() {
        let settings = ReminderSettings {
            mode: ReminderMode::Once,
            ..ReminderSettings::default()
        };
        let (db, transport, dispatcher) = setup(settings);
        add_todo(&db, "quiet", chrono::Duration::hours(3), TodoStatus::Pending);

        // no subscribers yet: nothing delivered, nothing stamped
        assert_eq!(dispatcher.tick(now()).await.unwrap().sent, 0);

        subscribe(&db, "https://push.example/a");
        assert_eq!(dispatcher.tick(now()).await.unwrap().sent, 1);
        let again = dispatcher.tick(now() + chrono::Duration::minutes(5)).await.unwrap();
        assert_eq!(again.candidates, 0);
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[test]
    fn reminder_mode_parses_config_values() {
        assert_eq!("every-tick".parse::<ReminderMode>().unwrap(), ReminderMode::EveryTick);
        assert_eq!(" Once ".parse::<ReminderMode>().unwrap(), ReminderMode::Once);
        assert!("weekly".parse::<ReminderMode>().is_err());
    }

    #[test]
    fn payload_mentions_lookahead() {
        let todo = Todo {
            id: Uuid::new_v4(),
            title: "Book flights".into(),
            description: String::new(),
            date: now(),
            priority: Priority::Low,
            completed: false,
            expire_at: None,
            status: TodoStatus::Pending,
            created_at: now(),
            updated_at: now(),
        };

        let payload = reminder_payload(&todo, chrono::Duration::hours(6));
        assert_eq!(payload.body, "Book flights is expiring in 6 hours!");

        let payload = reminder_payload(&todo, chrono::Duration::minutes(30));
        assert_eq!(payload.body, "Book flights is expiring soon!");
    }
}
