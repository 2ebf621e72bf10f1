use crate::application::events::{SessionEvent, SessionEventBus};
use crate::domain::models::{Session, TaskRef};
use crate::domain::timer::{CompletionCallback, PomodoroTimer, TimerEvent, TimerSnapshot};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification::NotificationPlayer;
use crate::infrastructure::session_api_client::SessionApiClient;
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const TICK_PERIOD: Duration = Duration::from_secs(1);
const LOG_COMMAND: &str = "timer";

/// Destination for focus sessions the timer finished on its own.
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn submit_session(
        &self,
        task_id: &str,
        duration_seconds: u32,
    ) -> Result<Session, InfraError>;
}

/// Forwards finished sessions to the remote session API.
pub struct RemoteSessionSink<C: SessionApiClient> {
    client: Arc<C>,
}

impl<C: SessionApiClient> RemoteSessionSink<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: SessionApiClient + 'static> SessionSink for RemoteSessionSink<C> {
    async fn submit_session(
        &self,
        task_id: &str,
        duration_seconds: u32,
    ) -> Result<Session, InfraError> {
        self.client.log_session(task_id, duration_seconds).await
    }
}

/// Owns the timer behind a mutex and runs it against the wall clock.
/// Recording, the end-of-phase cue and event publication happen outside the
/// lock and never hold up the countdown.
#[derive(Clone)]
pub struct TimerDriver {
    timer: Arc<Mutex<PomodoroTimer>>,
    sink: Arc<dyn SessionSink>,
    notifier: Arc<dyn NotificationPlayer>,
    events: SessionEventBus,
    log: Arc<CommandLog>,
}

/// Stops the clock loop when dropped.
#[derive(Debug)]
pub struct TimerDriverHandle {
    task: JoinHandle<()>,
}

impl TimerDriverHandle {
    pub fn shutdown(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerDriverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TimerDriver {
    pub fn new(
        timer: PomodoroTimer,
        sink: Arc<dyn SessionSink>,
        notifier: Arc<dyn NotificationPlayer>,
        events: SessionEventBus,
        log: Arc<CommandLog>,
    ) -> Self {
        Self {
            timer: Arc::new(Mutex::new(timer)),
            sink,
            notifier,
            events,
            log,
        }
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    /// Must be called from inside a tokio runtime. The first tick lands one
    /// period after the call.
    pub fn spawn(&self) -> TimerDriverHandle {
        let driver = self.clone();
        let task = tokio::spawn(async move {
            let mut clock = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            clock.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                clock.tick().await;
                driver.tick();
            }
        });
        TimerDriverHandle { task }
    }

    /// Advances the timer by one second and runs the side effects of
    /// whatever ended. Session submission needs a tokio runtime; without one
    /// the session is logged as dropped.
    pub fn tick(&self) -> Vec<TimerEvent> {
        let outcome = match self.lock() {
            Ok(mut timer) => timer.advance_second(),
            Err(error) => {
                self.log.error(LOG_COMMAND, &error.to_string());
                return Vec::new();
            }
        };
        let events = outcome.events;

        for event in &events {
            match event {
                TimerEvent::SessionCompleted {
                    task_id,
                    elapsed_seconds,
                } => self.submit(task_id.clone(), *elapsed_seconds),
                TimerEvent::PhaseEnded { ended, next } => {
                    self.log.info(
                        LOG_COMMAND,
                        &format!("{} ended; {} started", ended.as_str(), next.as_str()),
                    );
                    if let Err(error) = self.notifier.play(*ended) {
                        self.log.warn(LOG_COMMAND, &error.to_string());
                    }
                }
            }
        }
        if let Some(callback) = outcome.on_complete {
            self.run_completion(callback);
        }
        events
    }

    fn run_completion(&self, callback: CompletionCallback) {
        if catch_unwind(AssertUnwindSafe(callback)).is_err() {
            self.log
                .error(LOG_COMMAND, "completion callback panicked; timer keeps running");
        }
    }

    fn submit(&self, task_id: String, elapsed_seconds: u32) {
        let Ok(runtime) = Handle::try_current() else {
            self.log.error(
                LOG_COMMAND,
                &format!("no async runtime; session dropped task_id={task_id}"),
            );
            return;
        };
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let log = Arc::clone(&self.log);
        runtime.spawn(async move {
            match sink.submit_session(&task_id, elapsed_seconds).await {
                Ok(session) => {
                    log.info(
                        LOG_COMMAND,
                        &format!(
                            "session recorded session_id={} task_id={task_id} minutes={}",
                            session.id, session.duration_minutes
                        ),
                    );
                    events.publish(SessionEvent::SessionLogged { task_id });
                }
                Err(error) => log.error(
                    LOG_COMMAND,
                    &format!("session submission failed task_id={task_id}: {error}"),
                ),
            }
        });
    }

    fn lock(&self) -> Result<MutexGuard<'_, PomodoroTimer>, InfraError> {
        self.timer
            .lock()
            .map_err(|_| InfraError::LockPoisoned("timer state lock poisoned".to_string()))
    }

    fn with_timer<F>(&self, apply: F) -> Result<TimerSnapshot, InfraError>
    where
        F: FnOnce(&mut PomodoroTimer),
    {
        let mut timer = self.lock()?;
        apply(&mut timer);
        Ok(timer.snapshot())
    }

    /// `on_complete` runs on the ticking thread after the timer lock is
    /// released. A panic inside it is logged.
    pub fn start(
        &self,
        task: Option<TaskRef>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(|timer| timer.start(task, on_complete))
    }

    pub fn stop(&self) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(PomodoroTimer::stop)
    }

    pub fn reset(&self) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(PomodoroTimer::reset)
    }

    pub fn select_task(&self, task: Option<TaskRef>) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(|timer| timer.select_task(task))
    }

    pub fn update_work_duration(&self, minutes: u32) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(|timer| timer.update_work_duration(minutes))
    }

    pub fn update_break_duration(&self, minutes: u32) -> Result<TimerSnapshot, InfraError> {
        self.with_timer(|timer| timer.update_break_duration(minutes))
    }

    pub fn snapshot(&self) -> Result<TimerSnapshot, InfraError> {
        Ok(self.lock()?.snapshot())
    }
}
