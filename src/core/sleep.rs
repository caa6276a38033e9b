//! Sleep/wake state machine.
//!
//! Each tick fuses the latest [`CameraStatus`] and [`AudioStatus`] into a
//! single sleep condition and advances three timers:
//!
//! - **candidate**: how long the condition has held while awake. Sleep is
//!   confirmed once it reaches the sleep threshold (300 s by default).
//! - **snore window**: rising edges of the snore signal. Enough of them inside
//!   the window (3 in 60 s) confirm sleep immediately.
//! - **wake candidate**: how long the condition has failed while sleeping.
//!   Wake is confirmed once it reaches the wake grace period (30 s), at which
//!   point the session is finalized and handed to the recorder.
//!
//! The two sleep paths are independent; whichever fires first wins.

use crate::core::audio::AudioStatus;
use crate::core::vision::CameraStatus;
use crate::record::SessionRecorder;
use chrono::{DateTime, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_SLEEP_THRESHOLD_SECS: i64 = 300;
pub const DEFAULT_WAKE_GRACE_SECS: i64 = 30;
pub const DEFAULT_SNORE_WINDOW_SECS: i64 = 60;
pub const DEFAULT_SNORE_COUNT: usize = 3;

/// Sleep state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepState {
    Awake,
    /// Sleep condition holds, timing toward confirmation
    CandidateAsleep,
    Sleeping,
}

impl std::fmt::Display for SleepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SleepState::Awake => write!(f, "awake"),
            SleepState::CandidateAsleep => write!(f, "candidate"),
            SleepState::Sleeping => write!(f, "sleeping"),
        }
    }
}

/// Hysteresis timings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepTimings {
    /// Sustained sleep condition needed to confirm sleep
    pub sleep_threshold: Duration,
    /// Sustained wake condition needed to confirm wake
    pub wake_grace: Duration,
    /// Sliding window for snore rising edges
    pub snore_window: Duration,
    /// Snore edges inside the window that confirm sleep
    pub snore_count: usize,
}

impl Default for SleepTimings {
    fn default() -> Self {
        Self {
            sleep_threshold: Duration::seconds(DEFAULT_SLEEP_THRESHOLD_SECS),
            wake_grace: Duration::seconds(DEFAULT_WAKE_GRACE_SECS),
            snore_window: Duration::seconds(DEFAULT_SNORE_WINDOW_SECS),
            snore_count: DEFAULT_SNORE_COUNT,
        }
    }
}

/// A completed sleep session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    /// Whole hours slept
    pub duration_hours: i64,
    /// Remaining whole minutes
    pub duration_minutes: i64,
    pub snore_detected: bool,
}

impl SleepSession {
    pub fn new(started_at: DateTime<Local>, ended_at: DateTime<Local>, snore_detected: bool) -> Self {
        let secs = (ended_at - started_at).num_seconds().max(0);
        Self {
            started_at,
            ended_at,
            duration_hours: secs / 3600,
            duration_minutes: (secs % 3600) / 60,
            snore_detected,
        }
    }

    /// Calendar date the session started on.
    pub fn date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }
}

/// What confirmed sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepTrigger {
    /// Sleep condition held for the full threshold
    Stillness,
    /// Enough snore edges inside the window
    SnoreBurst,
}

/// Transitions reported by [`SleepStateMachine::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum SleepEvent {
    SleepStarted {
        at: DateTime<Local>,
        trigger: SleepTrigger,
    },
    WakeConfirmed(SleepSession),
}

/// Fused sleep predicate for one tick.
///
/// Without a face nothing counts as sleep. With one, snoring or regular
/// breathing is enough; otherwise the subject must be still, the room silent
/// and no eyes open.
pub fn sleep_condition(camera: &CameraStatus, audio: &AudioStatus) -> bool {
    if !camera.face_detected {
        return false;
    }
    if audio.snore_detected || audio.breathing_detected {
        return true;
    }
    !camera.motion_detected && audio.silent && !camera.eyes_open
}

/// The process-wide sleep state.
#[derive(Debug, Clone)]
pub struct SleepStateMachine {
    timings: SleepTimings,
    state: SleepState,
    candidate_since: Option<DateTime<Local>>,
    wake_since: Option<DateTime<Local>>,
    sleep_started: Option<DateTime<Local>>,
    snore_during_sleep: bool,
    last_snore: bool,
    snore_events: VecDeque<DateTime<Local>>,
    total_sleep_seconds: f64,
    sessions_completed: u64,
}

impl SleepStateMachine {
    pub fn new(timings: SleepTimings) -> Self {
        Self {
            timings,
            state: SleepState::Awake,
            candidate_since: None,
            wake_since: None,
            sleep_started: None,
            snore_during_sleep: false,
            last_snore: false,
            snore_events: VecDeque::new(),
            total_sleep_seconds: 0.0,
            sessions_completed: 0,
        }
    }

    /// Advance one tick. Completed sessions are appended to `recorder`.
    pub fn tick(
        &mut self,
        camera: &CameraStatus,
        audio: &AudioStatus,
        now: DateTime<Local>,
        recorder: &mut dyn SessionRecorder,
    ) -> Option<SleepEvent> {
        let condition = sleep_condition(camera, audio);
        let snore_edge = audio.snore_detected && !self.last_snore;
        self.last_snore = audio.snore_detected;

        if condition && snore_edge {
            self.snore_events.push_back(now);
        }
        self.prune_snores(now);

        if !condition {
            self.candidate_since = None;
            return match self.state {
                SleepState::Sleeping => {
                    let since = *self.wake_since.get_or_insert(now);
                    if now - since >= self.timings.wake_grace {
                        self.end_sleep(now, recorder).map(SleepEvent::WakeConfirmed)
                    } else {
                        None
                    }
                }
                _ => {
                    self.state = SleepState::Awake;
                    None
                }
            };
        }

        self.wake_since = None;
        let mut event = None;

        if self.state != SleepState::Sleeping && self.snore_events.len() >= self.timings.snore_count
        {
            event = Some(self.start_sleep(now, SleepTrigger::SnoreBurst));
            self.snore_during_sleep = true;
        }

        let since = *self.candidate_since.get_or_insert(now);
        if self.state == SleepState::Awake {
            self.state = SleepState::CandidateAsleep;
        }
        if self.state != SleepState::Sleeping && now - since >= self.timings.sleep_threshold {
            event = Some(self.start_sleep(now, SleepTrigger::Stillness));
        }

        if self.state == SleepState::Sleeping && audio.snore_detected {
            self.snore_during_sleep = true;
        }

        event
    }

    /// Finalize an open session at `now`. Used on shutdown.
    pub fn shutdown(
        &mut self,
        now: DateTime<Local>,
        recorder: &mut dyn SessionRecorder,
    ) -> Option<SleepSession> {
        if self.state != SleepState::Sleeping {
            return None;
        }
        tracing::info!("Finalizing open sleep session on shutdown");
        self.end_sleep(now, recorder)
    }

    fn start_sleep(&mut self, now: DateTime<Local>, trigger: SleepTrigger) -> SleepEvent {
        self.state = SleepState::Sleeping;
        self.sleep_started = Some(now);
        self.snore_during_sleep = false;
        self.wake_since = None;
        tracing::info!(
            "Sleep started at {} ({:?})",
            now.format("%H:%M:%S"),
            trigger
        );
        SleepEvent::SleepStarted { at: now, trigger }
    }

    fn end_sleep(
        &mut self,
        now: DateTime<Local>,
        recorder: &mut dyn SessionRecorder,
    ) -> Option<SleepSession> {
        let started = self.sleep_started.take()?;
        let session = SleepSession::new(started, now, self.snore_during_sleep);

        tracing::info!(
            "Sleep ended at {}: {}h {}m, snore {}",
            now.format("%H:%M:%S"),
            session.duration_hours,
            session.duration_minutes,
            if session.snore_detected { "detected" } else { "not detected" }
        );
        if let Err(e) = recorder.append(&session) {
            tracing::error!("Failed to record sleep session: {}", e);
        }

        self.total_sleep_seconds += session.duration().num_milliseconds().max(0) as f64 / 1000.0;
        self.sessions_completed += 1;
        self.state = SleepState::Awake;
        self.candidate_since = None;
        self.wake_since = None;
        self.snore_during_sleep = false;
        Some(session)
    }

    fn prune_snores(&mut self, now: DateTime<Local>) {
        while let Some(&oldest) = self.snore_events.front() {
            if now - oldest < self.timings.snore_window {
                break;
            }
            self.snore_events.pop_front();
        }
    }

    pub fn state(&self) -> SleepState {
        self.state
    }

    pub fn is_sleeping(&self) -> bool {
        self.state == SleepState::Sleeping
    }

    /// Sleep accumulated by completed sessions, in seconds.
    pub fn total_sleep_seconds(&self) -> f64 {
        self.total_sleep_seconds
    }

    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed
    }

    /// Snore edges currently inside the window.
    pub fn snore_event_count(&self) -> usize {
        self.snore_events.len()
    }

    pub fn sleep_started(&self) -> Option<DateTime<Local>> {
        self.sleep_started
    }

    /// Time left until stillness confirms sleep, if the candidate timer is running.
    pub fn candidate_remaining(&self, now: DateTime<Local>) -> Option<Duration> {
        if self.state == SleepState::Sleeping {
            return None;
        }
        let since = self.candidate_since?;
        Some((self.timings.sleep_threshold - (now - since)).max(Duration::zero()))
    }

    /// Time left until wake is confirmed, if the wake timer is running.
    pub fn wake_remaining(&self, now: DateTime<Local>) -> Option<Duration> {
        let since = self.wake_since?;
        Some((self.timings.wake_grace - (now - since)).max(Duration::zero()))
    }

    pub fn timings(&self) -> SleepTimings {
        self.timings
    }
}

impl Default for SleepStateMachine {
    fn default() -> Self {
        Self::new(SleepTimings::default())
    }
}
