use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One unit of recurring work. `now` is captured once per tick by the
/// scheduler and passed down, so a tick never reads the clock itself.
pub trait Job: Send + Sync + 'static {
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    fn tick(&self, now: DateTime<Utc>) -> impl Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// Owns one recurring job. Ticks of the same job never overlap: a tick that
/// overruns its interval delays the next one instead of racing it.
pub struct Scheduler<J: Job> {
    job: Arc<J>,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
}

impl<J: Job> Clone for Scheduler<J> {
    fn clone(&self) -> Self {
        Self {
            job: self.job.clone(),
            interval: self.interval,
            in_flight: self.in_flight.clone(),
        }
    }
}

/// Clears the in-flight flag when a tick finishes, however it finishes.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<J: Job> Scheduler<J> {
    pub fn new(job: J, interval: Duration) -> Self {
        Self {
            job: Arc::new(job),
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run exactly one tick. Returns `None` if a tick of this job is already
    /// running. Errors and panics inside the tick are logged and returned;
    /// they never propagate as panics to the caller.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Option<anyhow::Result<J::Output>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("{}: previous tick still running, skipping", self.job.name());
            return None;
        }
        let _guard = InFlight(self.in_flight.clone());

        let job = self.job.clone();
        let result = match tokio::spawn(async move { job.tick(now).await }).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                warn!("{} error: {:#}", self.job.name(), e);
                Err(e)
            }
            Err(e) => {
                error!("{} tick aborted: {}", self.job.name(), e);
                Err(anyhow::anyhow!("{} tick aborted: {}", self.job.name(), e))
            }
        };
        Some(result)
    }

    /// Spawn the timer loop. The first tick fires immediately.
    pub fn start(&self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let scheduler = self.clone();
        let name = self.job.name();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let _ = scheduler.run_once(Utc::now()).await;
            }

            info!("{} stopped", name);
        });

        info!("{} scheduled every {:?}", name, self.interval);
        SchedulerHandle { name, token, task }
    }
}

/// Running timer loop returned by [`Scheduler::start`].
pub struct SchedulerHandle {
    name: &'static str,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop scheduling new ticks and wait for a running tick to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            error!("{} loop ended abnormally: {}", self.name, e);
        }
    }
}
