use chrono::{DateTime, Duration, TimeZone, Utc};
use lasershot_core::{Ellipse, Frame, RgbImage, RgbImageView};
use lasershot_session::queue::{MemoryMessageStore, QueueHandle, SharedStore};
use lasershot_session::{
    AppState, FileSessionStore, LaserShotConfig, SessionController, SessionEvent, SessionStore,
};
use lasershot_vision::{MarkerQuad, Target};
use nalgebra::Point2;

fn quad(x: f64, y: f64) -> MarkerQuad {
    MarkerQuad::new(
        Point2::new(x, y),
        Point2::new(x + 40.0, y),
        Point2::new(x, y + 40.0),
        Point2::new(x + 40.0, y + 40.0),
        "",
    )
}

fn decoder(_: &RgbImageView<'_>) -> Vec<MarkerQuad> {
    vec![quad(580.0, 420.0), quad(20.0, 20.0), quad(580.0, 20.0), quad(20.0, 420.0)]
}

fn t(index: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 18, 30, 0).single().expect("valid")
        + Duration::milliseconds(40 * index as i64)
}

/// Camera frame; the laser square is given in raw camera pixels.
fn frame(index: u64, laser_at: Option<(usize, usize)>) -> Frame {
    let mut img = RgbImage::filled(640, 480, [110, 110, 110]);
    for (x, y) in [(20, 20), (580, 20), (20, 420), (580, 420)] {
        img.fill_rect(x, y, 40, 40, [15, 15, 15]);
    }
    if let Some((x, y)) = laser_at {
        img.fill_rect(x, y, 12, 12, [255, 255, 255]);
    }
    Frame::new(img, index, t(index))
}

fn target() -> Target {
    let rings = [100.0, 200.0, 300.0]
        .iter()
        .map(|&d| Ellipse::new(320.0, 240.0, d, d))
        .collect::<Result<Vec<_>, _>>()
        .expect("rings");
    Target::from_ellipses(rings).expect("target")
}

#[test]
fn full_session_emits_events_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let outbound = SharedStore::new(MemoryMessageStore::new());
    let sessions = FileSessionStore::open(dir.path().join("sessions.json")).expect("open");

    let mut cfg = LaserShotConfig::default();
    cfg.controller.countdown_frames = 3;
    let mut controller = SessionController::new(
        &cfg,
        target(),
        decoder,
        QueueHandle::detached(outbound.clone()),
        sessions,
    );
    controller.start_calibration();

    // Frames 0-4 calibrate, 5-7 count down, live from frame 8.
    let centre = Some((314, 234));
    let ring_one = Some((363, 234));
    let mut snapshots = Vec::new();
    for i in 0..40 {
        let laser = match i {
            10 | 11 => centre,
            14 => centre,
            30 => ring_one,
            _ => None,
        };
        snapshots.push(controller.process_frame(&frame(i, laser)));
    }
    assert_eq!(snapshots[4].state, AppState::StartRunningSession);
    assert_eq!(snapshots[5].countdown_remaining, Some(2));
    assert_eq!(snapshots[7].state, AppState::RunningSession);
    assert!(snapshots[10].laser.is_some());
    assert_eq!(snapshots[10].last_score.map(|s| s.score), Some(2));
    assert_eq!(snapshots[11].shots_fired, 1);
    // Frame 14 falls inside the debounce window of the shot at frame 10.
    assert_eq!(snapshots[14].shots_fired, 1);
    assert_eq!(snapshots[30].last_score.map(|s| s.score), Some(1));
    assert_eq!(snapshots[39].shots_fired, 2);
    assert_eq!(snapshots[39].total_score, 3);

    assert_eq!(controller.end_session(), AppState::SessionEnded);

    let events: Vec<SessionEvent> = outbound
        .pending()
        .expect("pending")
        .iter()
        .map(|m| SessionEvent::from_payload(&m.payload).expect("payload"))
        .collect();
    let commands: Vec<&str> = events.iter().map(|e| e.command()).collect();
    assert_eq!(
        commands,
        ["new_session", "add_shot_to_session", "add_shot_to_session", "end_session"]
    );
    match &events[1] {
        SessionEvent::AddShotToSession {
            score, timestamp, ..
        } => {
            assert_eq!(*score, 2);
            assert_eq!(*timestamp, t(10));
        }
        other => panic!("unexpected {other:?}"),
    }

    let session = controller.last_session().expect("finished").clone();
    assert_eq!(session.shots[0].drift_samples.len(), 2);
    assert_eq!(session.start_time, t(7));
    assert_eq!(session.finish_time, Some(t(39)));

    let reopened = FileSessionStore::open(dir.path().join("sessions.json")).expect("reopen");
    let stored = reopened.get_all().expect("all");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, session.id);
    assert_eq!(stored[0].total_score, 3);
    assert_eq!(stored[0].finish_time, session.finish_time);
    let scores: Vec<i32> = stored[0].shots.iter().map(|s| s.score).collect();
    assert_eq!(scores, vec![2, 1]);
}
