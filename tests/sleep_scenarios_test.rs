//! End-to-end sleep/wake scenarios driven through the public state machine API.

use chrono::{DateTime, Duration, Local, TimeZone};
use sleep_sentinel::core::{
    AudioStatus, CameraStatus, SleepEvent, SleepState, SleepStateMachine, SleepTrigger,
};
use sleep_sentinel::record::{CsvSessionLog, MemoryRecorder, SessionRecorder};

fn at(secs: i64) -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 6, 14, 22, 30, 0).unwrap() + Duration::seconds(secs)
}

fn camera(face: bool, motion: bool, eyes_open: bool) -> CameraStatus {
    CameraStatus {
        motion_detected: motion,
        motion_level: if motion { 90_000.0 } else { 0.0 },
        threshold: 50_000.0,
        face_detected: face,
        face_count: usize::from(face),
        eyes_open,
        eye_count: if eyes_open { 2 } else { 0 },
    }
}

fn audio(silent: bool, snore: bool, breathing: bool) -> AudioStatus {
    AudioStatus {
        silent,
        snore_detected: snore,
        breathing_detected: breathing,
        ..AudioStatus::default()
    }
}

#[test]
fn test_absent_face_never_sleeps() {
    let mut machine = SleepStateMachine::default();
    let mut recorder = MemoryRecorder::default();

    // Cycle through every combination of the other signals for two hours.
    for s in 0..7200 {
        let bits = s % 16;
        let cam = camera(false, bits & 1 != 0, bits & 2 != 0);
        let aud = audio(bits & 4 != 0, bits & 8 != 0, bits & 3 == 0);
        assert_eq!(machine.tick(&cam, &aud, at(s), &mut recorder), None);
        assert_eq!(machine.state(), SleepState::Awake);
    }
    assert!(recorder.sessions().is_empty());
    assert_eq!(machine.snore_event_count(), 0);
}

#[test]
fn test_stillness_confirms_sleep_at_exactly_threshold() {
    let mut machine = SleepStateMachine::default();
    let mut recorder = MemoryRecorder::default();
    let still = camera(true, false, false);
    let quiet = audio(true, false, false);

    for s in 0..300 {
        assert_eq!(machine.tick(&still, &quiet, at(s), &mut recorder), None);
        assert_ne!(machine.state(), SleepState::Sleeping, "slept early at {s}s");
    }
    assert_eq!(
        machine.tick(&still, &quiet, at(300), &mut recorder),
        Some(SleepEvent::SleepStarted {
            at: at(300),
            trigger: SleepTrigger::Stillness,
        })
    );
}

#[test]
fn test_three_snores_in_a_minute_force_sleep() {
    let mut machine = SleepStateMachine::default();
    let mut recorder = MemoryRecorder::default();
    // Eyes open and moving: only the snore path can confirm sleep here.
    let restless = camera(true, true, true);

    let mut started = None;
    for s in 0..=40 {
        let snoring = s % 20 == 0;
        if let Some(event) = machine.tick(&restless, &audio(false, snoring, false), at(s), &mut recorder) {
            started = Some((s, event));
        }
    }

    assert_eq!(
        started,
        Some((
            40,
            SleepEvent::SleepStarted {
                at: at(40),
                trigger: SleepTrigger::SnoreBurst,
            }
        ))
    );
    assert!(machine.is_sleeping());

    let session = machine.shutdown(at(100), &mut recorder).unwrap();
    assert!(session.snore_detected);
    assert_eq!(session.started_at, at(40));
}

#[test]
fn test_micro_wakes_do_not_end_sleep() {
    let mut machine = SleepStateMachine::default();
    let mut recorder = MemoryRecorder::default();
    let still = camera(true, false, false);
    let awake = camera(true, true, true);
    let quiet = audio(true, false, false);

    machine.tick(&still, &quiet, at(0), &mut recorder);
    machine.tick(&still, &quiet, at(300), &mut recorder);
    assert!(machine.is_sleeping());

    // 29 s of activity, then back to still, repeated.
    let mut t = 301;
    for _ in 0..5 {
        for _ in 0..29 {
            assert_eq!(machine.tick(&awake, &quiet, at(t), &mut recorder), None);
            t += 1;
        }
        machine.tick(&still, &quiet, at(t), &mut recorder);
        t += 1;
    }
    assert!(machine.is_sleeping());
    assert!(recorder.sessions().is_empty());

    // A full grace period of activity confirms exactly one wake.
    let wake_start = t;
    let mut wakes = 0;
    for _ in 0..120 {
        if let Some(SleepEvent::WakeConfirmed(session)) =
            machine.tick(&awake, &quiet, at(t), &mut recorder)
        {
            wakes += 1;
            assert_eq!(session.ended_at, at(wake_start + 30));
        }
        t += 1;
    }
    assert_eq!(wakes, 1);
    assert_eq!(recorder.sessions().len(), 1);
    assert_eq!(machine.state(), SleepState::Awake);
}

#[test]
fn test_two_nights_accumulate_in_csv_log() {
    let dir = std::env::temp_dir().join(format!("sleep-sentinel-it-{}", uuid::Uuid::new_v4()));
    let mut log = CsvSessionLog::open(dir.join("sleep_records.csv")).unwrap();
    let mut machine = SleepStateMachine::default();

    fn night(
        start: i64,
        machine: &mut SleepStateMachine,
        log: &mut dyn SessionRecorder,
    ) -> Option<SleepEvent> {
        let still = camera(true, false, false);
        let gone = camera(false, false, false);
        let quiet = audio(true, false, false);
        machine.tick(&still, &quiet, at(start), log);
        machine.tick(&still, &quiet, at(start + 300), log);
        machine.tick(&gone, &quiet, at(start + 3900), log);
        machine.tick(&gone, &quiet, at(start + 3930), log)
    }

    assert!(matches!(night(0, &mut machine, &mut log), Some(SleepEvent::WakeConfirmed(_))));
    assert!(matches!(
        night(86_400, &mut machine, &mut log),
        Some(SleepEvent::WakeConfirmed(_))
    ));

    let rows = log.read_all().unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!((row.duration_hours, row.duration_minutes), (1, 0));
        assert!(!row.snore_detected);
        assert_eq!(row.sleep_start, "22:35:00");
        assert_eq!(row.sleep_end, "23:35:30");
    }
    assert_eq!(rows[0].date, "2025-06-14");
    assert_eq!(rows[1].date, "2025-06-15");
    assert_eq!(machine.total_sleep_seconds(), 2.0 * 3630.0);

    std::fs::remove_dir_all(&dir).ok();
}
