//! Recurring background work: the expiry sweep and the reminder dispatcher,
//! each driven by its own [`scheduler::Scheduler`].

pub mod reminder;
pub mod scheduler;
pub mod sweep;

pub use reminder::{Broadcast, DispatchReport, ReminderDispatcher, ReminderMode, ReminderSettings, SubscriberResolver};
pub use scheduler::{Job, Scheduler, SchedulerHandle};
pub use sweep::ExpirySweep;
