use crate::domain::models::TaskRef;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_WORK_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;
const MIN_PHASE_MINUTES: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Focus,
    Break,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerConfig {
    pub work_duration_minutes: u32,
    pub break_duration_minutes: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_duration_minutes: DEFAULT_WORK_MINUTES,
            break_duration_minutes: DEFAULT_BREAK_MINUTES,
        }
    }
}

impl TimerConfig {
    pub fn new(work_duration_minutes: u32, break_duration_minutes: u32) -> Self {
        Self {
            work_duration_minutes: work_duration_minutes.max(MIN_PHASE_MINUTES),
            break_duration_minutes: break_duration_minutes.max(MIN_PHASE_MINUTES),
        }
    }

    pub fn duration_for(&self, phase: TimerPhase) -> u32 {
        match phase {
            TimerPhase::Focus => self.work_duration_minutes,
            TimerPhase::Break => self.break_duration_minutes,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Countdown {
    pub minutes: u32,
    pub seconds: u32,
}

impl Countdown {
    pub fn full(minutes: u32) -> Self {
        Self {
            minutes,
            seconds: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.minutes == 0 && self.seconds == 0
    }

    fn step(&mut self) {
        if self.seconds > 0 {
            self.seconds -= 1;
        } else if self.minutes > 0 {
            self.minutes -= 1;
            self.seconds = 59;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub running: bool,
    pub remaining: Countdown,
}

/// Display update after `changed`'s duration was reconfigured: only a paused
/// timer sitting in that phase picks up the new length right away.
pub fn apply_duration_change(
    config: &TimerConfig,
    changed: TimerPhase,
    state: TimerState,
) -> TimerState {
    if state.running || state.phase != changed {
        return state;
    }
    TimerState {
        remaining: Countdown::full(config.duration_for(changed)),
        ..state
    }
}

/// Seconds spent in the current focus phase. Advances only while the timer
/// runs in focus; pausing leaves the count alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ElapsedTicker {
    seconds: u32,
}

impl ElapsedTicker {
    fn on_tick(&mut self, active: bool) {
        if active {
            self.seconds = self.seconds.saturating_add(1);
        }
    }

    fn reset(&mut self) {
        self.seconds = 0;
    }

    fn take(&mut self) -> u32 {
        std::mem::take(&mut self.seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A focus phase ran to its natural end with a task bound.
    SessionCompleted {
        task_id: String,
        elapsed_seconds: u32,
    },
    PhaseEnded {
        ended: TimerPhase,
        next: TimerPhase,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub minutes: u32,
    pub seconds: u32,
    pub running: bool,
    pub phase: TimerPhase,
    pub current_task: Option<TaskRef>,
    pub elapsed_seconds: u32,
    pub work_duration_minutes: u32,
    pub break_duration_minutes: u32,
}

pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// What one second produced.
#[derive(Default)]
pub struct SecondOutcome {
    pub events: Vec<TimerEvent>,
    /// Set only on the second a focus phase ended with a callback armed.
    pub on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for SecondOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondOutcome")
            .field("events", &self.events)
            .field("has_on_complete", &self.on_complete.is_some())
            .finish()
    }
}

pub struct PomodoroTimer {
    config: TimerConfig,
    state: TimerState,
    elapsed: ElapsedTicker,
    current_task: Option<TaskRef>,
    on_complete: Option<CompletionCallback>,
}

impl fmt::Debug for PomodoroTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PomodoroTimer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("current_task", &self.current_task)
            .field("has_on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl PomodoroTimer {
    pub fn new(config: TimerConfig) -> Self {
        let config = TimerConfig::new(config.work_duration_minutes, config.break_duration_minutes);
        Self {
            config,
            state: TimerState {
                phase: TimerPhase::Focus,
                running: false,
                remaining: Countdown::full(config.work_duration_minutes),
            },
            elapsed: ElapsedTicker::default(),
            current_task: None,
            on_complete: None,
        }
    }

    pub fn config(&self) -> TimerConfig {
        self.config
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed.seconds
    }

    pub fn current_task(&self) -> Option<&TaskRef> {
        self.current_task.as_ref()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            minutes: self.state.remaining.minutes,
            seconds: self.state.remaining.seconds,
            running: self.state.running,
            phase: self.state.phase,
            current_task: self.current_task.clone(),
            elapsed_seconds: self.elapsed.seconds,
            work_duration_minutes: self.config.work_duration_minutes,
            break_duration_minutes: self.config.break_duration_minutes,
        }
    }

    /// Supplying a task always restarts the cycle for it. Each start replaces
    /// the completion callback; starting without one clears it.
    pub fn start(&mut self, task: Option<TaskRef>, on_complete: Option<CompletionCallback>) {
        if let Some(task) = task {
            self.select_task(Some(task));
        }
        self.on_complete = on_complete;
        self.state.running = true;
    }

    pub fn stop(&mut self) {
        self.state.running = false;
    }

    pub fn reset(&mut self) {
        self.state = TimerState {
            phase: TimerPhase::Focus,
            running: false,
            remaining: Countdown::full(self.config.work_duration_minutes),
        };
        self.elapsed.reset();
        self.on_complete = None;
    }

    /// Binding a task abandons the interval in progress without recording it.
    /// Clearing the binding leaves the countdown untouched.
    pub fn select_task(&mut self, task: Option<TaskRef>) {
        let restart = task.is_some();
        self.current_task = task;
        if restart {
            self.reset();
        }
    }

    pub fn update_work_duration(&mut self, minutes: u32) {
        self.config.work_duration_minutes = minutes.max(MIN_PHASE_MINUTES);
        self.state = apply_duration_change(&self.config, TimerPhase::Focus, self.state);
    }

    pub fn update_break_duration(&mut self, minutes: u32) {
        self.config.break_duration_minutes = minutes.max(MIN_PHASE_MINUTES);
        self.state = apply_duration_change(&self.config, TimerPhase::Break, self.state);
    }

    /// Advances both tickers by one wall-clock second and runs the completion
    /// callback in place if the focus phase ended.
    pub fn on_second(&mut self) -> Vec<TimerEvent> {
        let outcome = self.advance_second();
        if let Some(callback) = outcome.on_complete {
            callback();
        }
        outcome.events
    }

    /// Like [`PomodoroTimer::on_second`], but hands the completion callback
    /// back instead of running it. The elapsed ticker runs first so a focus
    /// phase ending on this second includes it.
    pub fn advance_second(&mut self) -> SecondOutcome {
        if !self.state.running {
            return SecondOutcome::default();
        }

        self.elapsed.on_tick(self.state.phase == TimerPhase::Focus);
        self.state.remaining.step();
        if self.state.remaining.is_zero() {
            return self.end_phase();
        }
        SecondOutcome::default()
    }

    fn end_phase(&mut self) -> SecondOutcome {
        let mut events = Vec::new();
        let mut on_complete = None;
        match self.state.phase {
            TimerPhase::Focus => {
                let elapsed_seconds = self.elapsed.take();
                if let Some(task) = self.current_task.as_ref() {
                    if elapsed_seconds > 0 {
                        events.push(TimerEvent::SessionCompleted {
                            task_id: task.id.clone(),
                            elapsed_seconds,
                        });
                    }
                }
                events.push(TimerEvent::PhaseEnded {
                    ended: TimerPhase::Focus,
                    next: TimerPhase::Break,
                });
                self.state.phase = TimerPhase::Break;
                self.state.remaining = Countdown::full(self.config.break_duration_minutes);
                on_complete = self.on_complete.take();
            }
            TimerPhase::Break => {
                events.push(TimerEvent::PhaseEnded {
                    ended: TimerPhase::Break,
                    next: TimerPhase::Focus,
                });
                self.state.phase = TimerPhase::Focus;
                self.state.remaining = Countdown::full(self.config.work_duration_minutes);
                self.elapsed.reset();
            }
        }
        SecondOutcome {
            events,
            on_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(id: &str) -> TaskRef {
        TaskRef {
            id: id.to_string(),
            title: format!("Task {id}"),
        }
    }

    fn run_seconds(timer: &mut PomodoroTimer, seconds: u32) -> Vec<TimerEvent> {
        (0..seconds).flat_map(|_| timer.on_second()).collect()
    }

    fn sessions(events: &[TimerEvent]) -> Vec<(String, u32)> {
        events
            .iter()
            .filter_map(|event| match event {
                TimerEvent::SessionCompleted {
                    task_id,
                    elapsed_seconds,
                } => Some((task_id.clone(), *elapsed_seconds)),
                TimerEvent::PhaseEnded { .. } => None,
            })
            .collect()
    }

    #[test]
    fn initial_state_is_paused_focus_at_work_duration() {
        let timer = PomodoroTimer::default();
        let snapshot = timer.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.phase, TimerPhase::Focus);
        assert_eq!((snapshot.minutes, snapshot.seconds), (25, 0));
        assert_eq!(snapshot.elapsed_seconds, 0);
    }

    #[test]
    fn countdown_borrows_a_minute_when_seconds_run_out() {
        let mut timer = PomodoroTimer::default();
        timer.start(None, None);
        timer.on_second();
        assert_eq!(timer.state().remaining, Countdown { minutes: 24, seconds: 59 });
        run_seconds(&mut timer, 59);
        assert_eq!(timer.state().remaining, Countdown { minutes: 24, seconds: 0 });
    }

    #[test]
    fn full_focus_phase_transitions_once_and_submits_elapsed_seconds() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(25, 5));
        timer.start(Some(task("tsk-1")), None);

        let events = run_seconds(&mut timer, 1500);

        assert_eq!(sessions(&events), vec![("tsk-1".to_string(), 1500)]);
        let phase_ends = events
            .iter()
            .filter(|event| matches!(event, TimerEvent::PhaseEnded { .. }))
            .count();
        assert_eq!(phase_ends, 1);
        let state = timer.state();
        assert_eq!(state.phase, TimerPhase::Break);
        assert_eq!(state.remaining, Countdown::full(5));
        assert!(state.running);
        assert_eq!(timer.elapsed_seconds(), 0);
    }

    #[test]
    fn focus_end_without_task_emits_no_session() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(None, None);
        let events = run_seconds(&mut timer, 60);
        assert!(sessions(&events).is_empty());
        assert_eq!(timer.state().phase, TimerPhase::Break);
    }

    #[test]
    fn break_end_returns_to_focus_with_fresh_elapsed_counter() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(Some(task("tsk-1")), None);
        run_seconds(&mut timer, 60);
        assert_eq!(timer.state().phase, TimerPhase::Break);
        assert_eq!(timer.elapsed_seconds(), 0);

        let events = run_seconds(&mut timer, 60);
        assert_eq!(
            events,
            vec![TimerEvent::PhaseEnded {
                ended: TimerPhase::Break,
                next: TimerPhase::Focus,
            }]
        );
        assert_eq!(timer.state().phase, TimerPhase::Focus);
        assert_eq!(timer.state().remaining, Countdown::full(1));

        let events = run_seconds(&mut timer, 60);
        assert_eq!(sessions(&events), vec![("tsk-1".to_string(), 60)]);
    }

    #[test]
    fn switching_task_while_running_discards_the_interval() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(Some(task("tsk-1")), None);
        let events = run_seconds(&mut timer, 40);
        assert!(events.is_empty());
        assert_eq!(timer.elapsed_seconds(), 40);

        timer.select_task(Some(task("tsk-2")));
        assert_eq!(timer.elapsed_seconds(), 0);
        assert!(!timer.state().running);
        assert_eq!(timer.state().remaining, Countdown::full(1));

        timer.start(None, None);
        let events = run_seconds(&mut timer, 60);
        assert_eq!(sessions(&events), vec![("tsk-2".to_string(), 60)]);
    }

    #[test]
    fn start_with_task_restarts_cycle_from_break() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 3));
        timer.start(Some(task("tsk-1")), None);
        run_seconds(&mut timer, 70);
        assert_eq!(timer.state().phase, TimerPhase::Break);

        timer.start(Some(task("tsk-2")), None);
        let state = timer.state();
        assert_eq!(state.phase, TimerPhase::Focus);
        assert!(state.running);
        assert_eq!(state.remaining, Countdown::full(1));
        assert_eq!(timer.current_task().map(|task| task.id.as_str()), Some("tsk-2"));
    }

    #[test]
    fn pause_and_resume_keeps_elapsed_seconds() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(Some(task("tsk-1")), None);
        run_seconds(&mut timer, 20);
        timer.stop();
        let paused = run_seconds(&mut timer, 30);
        assert!(paused.is_empty());
        assert_eq!(timer.elapsed_seconds(), 20);
        assert_eq!(timer.state().remaining, Countdown { minutes: 0, seconds: 40 });

        timer.start(None, None);
        let events = run_seconds(&mut timer, 40);
        assert_eq!(sessions(&events), vec![("tsk-1".to_string(), 60)]);
    }

    #[test]
    fn reset_abandons_progress_without_session() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(Some(task("tsk-1")), None);
        run_seconds(&mut timer, 59);
        timer.reset();
        assert_eq!(timer.elapsed_seconds(), 0);
        assert_eq!(timer.state().remaining, Countdown::full(1));
        assert!(!timer.state().running);
        assert!(timer.on_second().is_empty());
    }

    #[test]
    fn completion_callback_fires_once_at_focus_end() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(
            Some(task("tsk-1")),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as CompletionCallback),
        );

        run_seconds(&mut timer, 59);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        run_seconds(&mut timer, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        run_seconds(&mut timer, 180);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn advance_second_hands_back_the_callback_unrun() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(
            None,
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as CompletionCallback),
        );

        for _ in 0..59 {
            assert!(timer.advance_second().on_complete.is_none());
        }
        let outcome = timer.advance_second();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(timer.state().phase, TimerPhase::Break);
        let callback = outcome.on_complete.expect("callback handed back");
        callback();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn starting_without_a_callback_drops_the_previous_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 1));
        timer.start(
            None,
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as CompletionCallback),
        );
        run_seconds(&mut timer, 10);
        timer.stop();
        timer.start(None, None);

        run_seconds(&mut timer, 50);
        assert_eq!(timer.state().phase, TimerPhase::Break);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn work_duration_change_updates_display_only_when_paused_in_focus() {
        let mut timer = PomodoroTimer::default();
        timer.update_work_duration(50);
        assert_eq!(timer.state().remaining, Countdown::full(50));

        timer.start(None, None);
        timer.on_second();
        timer.update_work_duration(10);
        assert_eq!(timer.state().remaining, Countdown { minutes: 49, seconds: 59 });
        assert_eq!(timer.config().work_duration_minutes, 10);
    }

    #[test]
    fn work_duration_change_during_break_keeps_break_display() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 5));
        timer.start(None, None);
        run_seconds(&mut timer, 60);
        timer.stop();
        assert_eq!(timer.state().phase, TimerPhase::Break);

        timer.update_work_duration(30);
        assert_eq!(timer.state().remaining, Countdown::full(5));

        timer.update_break_duration(8);
        assert_eq!(timer.state().remaining, Countdown::full(8));
    }

    #[test]
    fn non_active_duration_applies_on_next_transition() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(1, 5));
        timer.update_break_duration(2);
        assert_eq!(timer.state().remaining, Countdown::full(1));
        timer.start(None, None);
        run_seconds(&mut timer, 60);
        assert_eq!(timer.state().remaining, Countdown::full(2));
    }

    #[test]
    fn durations_are_clamped_to_one_minute() {
        let mut timer = PomodoroTimer::new(TimerConfig::new(0, 0));
        assert_eq!(timer.config(), TimerConfig::new(1, 1));
        timer.update_work_duration(0);
        timer.update_break_duration(0);
        assert_eq!(timer.config().work_duration_minutes, 1);
        assert_eq!(timer.config().break_duration_minutes, 1);
        assert_eq!(timer.state().remaining, Countdown::full(1));
    }

    #[test]
    fn apply_duration_change_is_a_pure_transition() {
        let config = TimerConfig::new(40, 10);
        let paused_focus = TimerState {
            phase: TimerPhase::Focus,
            running: false,
            remaining: Countdown { minutes: 3, seconds: 12 },
        };
        assert_eq!(
            apply_duration_change(&config, TimerPhase::Focus, paused_focus).remaining,
            Countdown::full(40)
        );
        assert_eq!(
            apply_duration_change(&config, TimerPhase::Break, paused_focus),
            paused_focus
        );

        let running_focus = TimerState {
            running: true,
            ..paused_focus
        };
        assert_eq!(
            apply_duration_change(&config, TimerPhase::Focus, running_focus),
            running_focus
        );
    }

    proptest! {
        #[test]
        fn repeated_stop_is_idempotent(ticks in 0u32..400u32, stops in 1usize..5usize) {
            let mut timer = PomodoroTimer::new(TimerConfig::new(3, 1));
            timer.start(Some(task("tsk-1")), None);
            run_seconds(&mut timer, ticks);
            timer.stop();
            let state = timer.state();
            let elapsed = timer.elapsed_seconds();
            for _ in 0..stops {
                timer.stop();
            }
            prop_assert_eq!(timer.state(), state);
            prop_assert_eq!(timer.elapsed_seconds(), elapsed);
        }

        #[test]
        fn each_focus_phase_submits_its_full_length(work in 1u32..6u32, rest in 1u32..6u32) {
            let mut timer = PomodoroTimer::new(TimerConfig::new(work, rest));
            timer.start(Some(task("tsk-1")), None);
            let cycle = (work + rest) * 60;
            let events = run_seconds(&mut timer, cycle * 2);
            let submitted = sessions(&events);
            prop_assert_eq!(submitted.len(), 2);
            for (_, elapsed) in submitted {
                prop_assert_eq!(elapsed, work * 60);
            }
        }
    }
}
