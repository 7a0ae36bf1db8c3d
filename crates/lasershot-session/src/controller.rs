//! Frame-by-frame driver that owns the state machine and the live session.

use chrono::{DateTime, Utc};
use lasershot_core::{Frame, FrameSource};
use lasershot_vision::{
    rectify_markers, CalibrationTracker, CornerRoles, LaserCandidate, LaserDetector,
    MarkerDecoder, MarkerQuad, PointScore, RectificationMapping, RectifyParams, Target,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::LaserShotConfig;
use crate::events::{EventSink, SessionEvent};
use crate::session::{Session, SessionStore};
use crate::shot::{ShotTracker, ShotUpdate};
use crate::state::{AppEvent, AppState, StateMachine};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerParams {
    /// Calibration frames before giving up with `CalibrationFailed`.
    pub calibration_frame_budget: u64,
    /// Frames between calibration and the live session; `0` skips it.
    pub countdown_frames: u64,
    /// Live frames before the session ends on its own (emits `EndRunSession`).
    ///
    /// Defaults to `None`: a session then lasts until
    /// [`SessionController::end_session`] or a recalibration, since drill
    /// length is chosen by the shooter rather than the camera. Set a budget
    /// for timed drills, e.g. `Some(30 * 60)` for one minute at 30 fps.
    pub session_frame_budget: Option<u64>,
    /// Shot radius used for ring overlap, in rectified pixels.
    pub point_radius: f64,
    pub debounce_frames: u64,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            calibration_frame_budget: 300,
            countdown_frames: 90,
            session_frame_budget: None,
            point_radius: 3.0,
            debounce_frames: crate::shot::DEFAULT_DEBOUNCE_FRAMES,
        }
    }
}

/// Read-only view of the controller after one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub state: AppState,
    pub frame_index: u64,
    /// Markers decoded on this frame (calibration only).
    pub markers: Vec<MarkerQuad>,
    pub corners: Option<CornerRoles>,
    pub laser: Option<LaserCandidate>,
    pub last_score: Option<PointScore>,
    pub session_id: Option<Uuid>,
    pub total_score: i32,
    pub shots_fired: usize,
    pub countdown_remaining: Option<u64>,
    pub undelivered_events: u64,
}

pub struct SessionController<D, K, St> {
    params: ControllerParams,
    rectify: RectifyParams,
    machine: StateMachine,
    decoder: D,
    sink: K,
    sessions: St,
    tracker: CalibrationTracker,
    detector: LaserDetector,
    target: Target,
    shots: ShotTracker,

    mapping: Option<RectificationMapping>,
    corners: Option<CornerRoles>,
    session: Option<Session>,
    last_session: Option<Session>,
    calibration_frames: u64,
    countdown_remaining: u64,
    session_frames: u64,
    last_timestamp: Option<DateTime<Utc>>,

    markers: Vec<MarkerQuad>,
    laser: Option<LaserCandidate>,
    last_score: Option<PointScore>,
    undelivered_events: u64,
}

impl<D, K, St> SessionController<D, K, St>
where
    D: MarkerDecoder,
    K: EventSink,
    St: SessionStore,
{
    pub fn new(config: &LaserShotConfig, target: Target, decoder: D, sink: K, sessions: St) -> Self {
        Self {
            params: config.controller.clone(),
            rectify: config.rectify.clone(),
            machine: StateMachine::new(),
            decoder,
            sink,
            sessions,
            tracker: CalibrationTracker::new(config.calibration.clone()),
            detector: LaserDetector::new(config.laser.clone()),
            target,
            shots: ShotTracker::new(config.controller.debounce_frames),
            mapping: None,
            corners: None,
            session: None,
            last_session: None,
            calibration_frames: 0,
            countdown_remaining: 0,
            session_frames: 0,
            last_timestamp: None,
            markers: Vec::new(),
            laser: None,
            last_score: None,
            undelivered_events: 0,
        }
    }

    pub fn state(&self) -> AppState {
        self.machine.state()
    }

    /// The session currently running, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The most recently finished session.
    pub fn last_session(&self) -> Option<&Session> {
        self.last_session.as_ref()
    }

    pub fn mapping(&self) -> Option<&RectificationMapping> {
        self.mapping.as_ref()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn session_store(&self) -> &St {
        &self.sessions
    }

    /// Arm calibration. Recalibrating during a live session closes it.
    pub fn start_calibration(&mut self) -> AppState {
        let before = self.machine.state();
        let after = self.machine.handle(AppEvent::StartCalibration);
        if after == AppState::Calibrating && before != AppState::Calibrating {
            if before == AppState::RunningSession {
                self.close_session();
            }
            self.tracker.reset();
            self.calibration_frames = 0;
        }
        after
    }

    pub fn cancel_calibration(&mut self) -> AppState {
        self.machine.handle(AppEvent::EndCalibration)
    }

    pub fn end_session(&mut self) -> AppState {
        let before = self.machine.state();
        let after = self.machine.handle(AppEvent::EndRunSession);
        if before == AppState::RunningSession && after == AppState::SessionEnded {
            self.close_session();
        }
        after
    }

    /// Swap in a target built from a new reference photo.
    pub fn replace_target(&mut self, target: Target) {
        log::info!("target replaced ({} rings)", target.len());
        self.target = target;
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(index = frame.index))
    )]
    pub fn process_frame(&mut self, frame: &Frame) -> FrameSnapshot {
        self.last_timestamp = Some(frame.timestamp);
        self.markers.clear();
        self.laser = None;

        match self.machine.state() {
            AppState::Calibrating => self.calibrate(frame),
            AppState::StartRunningSession => self.count_down(frame),
            AppState::RunningSession => self.track(frame),
            _ => {}
        }
        self.snapshot(frame.index)
    }

    /// Process frames until the source is exhausted. Returns the frame count.
    pub fn run<S, F>(&mut self, source: &mut S, mut on_snapshot: F) -> u64
    where
        S: FrameSource + ?Sized,
        F: FnMut(&FrameSnapshot),
    {
        let mut frames = 0;
        while let Some(frame) = source.next_frame() {
            let snapshot = self.process_frame(&frame);
            on_snapshot(&snapshot);
            frames += 1;
        }
        frames
    }

    fn calibrate(&mut self, frame: &Frame) {
        self.calibration_frames += 1;
        let view = frame.view();
        self.markers = self.decoder.detect_markers(&view);

        if let Some(stable) = self.tracker.observe(frame.index, &self.markers) {
            match rectify_markers(&stable, frame.image.width, frame.image.height, &self.rectify) {
                Ok(cal) => {
                    log::info!(
                        "calibrated at frame {} ({}x{} canvas)",
                        frame.index,
                        cal.mapping.width(),
                        cal.mapping.height()
                    );
                    self.mapping = Some(cal.mapping);
                    self.corners = Some(cal.roles);
                    if self.params.countdown_frames == 0 {
                        self.enter_running(frame);
                    } else {
                        self.countdown_remaining = self.params.countdown_frames;
                        self.machine.handle(AppEvent::StartRunSession);
                    }
                    return;
                }
                Err(e) => log::warn!("frame {}: rectification rejected: {e}", frame.index),
            }
        }

        if self.calibration_frames >= self.params.calibration_frame_budget {
            log::warn!(
                "no stable calibration after {} frames",
                self.calibration_frames
            );
            self.machine.handle(AppEvent::CalibrationFailed);
        }
    }

    fn count_down(&mut self, frame: &Frame) {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            self.enter_running(frame);
        }
    }

    fn enter_running(&mut self, frame: &Frame) {
        if self.machine.handle(AppEvent::Running) != AppState::RunningSession {
            return;
        }
        let session = Session::start_now(frame.timestamp);
        log::info!("session {} started", session.id);
        self.submit(SessionEvent::new_session(&session));
        self.session = Some(session);
        self.last_session = None;
        self.shots.reset();
        self.session_frames = 0;
        self.last_score = None;
    }

    fn track(&mut self, frame: &Frame) {
        self.session_frames += 1;

        let rectified = self.mapping.as_ref().map(|m| m.warp_rgb(&frame.view()));
        if let Some(rectified) = rectified {
            let detection = self.detector.detect(&rectified.view(), frame.index);
            if let Some(candidate) = detection.candidate {
                self.score(frame, &candidate);
                self.laser = Some(candidate);
            }
        }

        if let Some(budget) = self.params.session_frame_budget {
            if self.session_frames >= budget {
                self.end_session();
            }
        }
    }

    fn score(&mut self, frame: &Frame, candidate: &LaserCandidate) {
        let score = self.target.classify_point(
            candidate.center.x,
            candidate.center.y,
            self.params.point_radius,
        );
        self.last_score = Some(score);

        let update = self
            .shots
            .observe(frame.index, frame.timestamp, score.position(), score.score);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match update {
            ShotUpdate::NewShot(shot) => {
                log::info!(
                    "frame {}: shot scored {} (distance {:.3})",
                    frame.index,
                    shot.score,
                    shot.position.distance
                );
                let event = SessionEvent::add_shot(session.id, &shot);
                if let Err(e) = session.record_shot(shot) {
                    log::error!("shot dropped: {e}");
                    return;
                }
                self.submit(event);
            }
            ShotUpdate::Drift(sample) => {
                if let Err(e) = session.record_drift(sample) {
                    log::warn!("drift sample dropped: {e}");
                }
            }
            ShotUpdate::Debounced => {}
        }
    }

    fn close_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let finish = self.last_timestamp.unwrap_or_else(Utc::now);
        if let Err(e) = session.finish(finish) {
            log::warn!("{e}");
        }
        log::info!(
            "session {} finished: {} shots, total {}",
            session.id,
            session.shots_fired(),
            session.total_score
        );
        if let Some(event) = SessionEvent::end_session(&session) {
            self.submit(event);
        }
        if let Err(e) = self.sessions.create(&session) {
            log::error!("failed to persist session {}: {e}", session.id);
        }
        self.last_session = Some(session);
    }

    fn submit(&mut self, event: SessionEvent) {
        if let Err(e) = self.sink.submit(&event) {
            log::error!("failed to enqueue {}: {e}", event.command());
            self.undelivered_events += 1;
        }
    }

    fn snapshot(&self, frame_index: u64) -> FrameSnapshot {
        let state = self.machine.state();
        let session = self.session.as_ref().or(self.last_session.as_ref());
        FrameSnapshot {
            state,
            frame_index,
            markers: self.markers.clone(),
            corners: self.corners,
            laser: self.laser.clone(),
            last_score: self.last_score,
            session_id: session.map(|s| s.id),
            total_score: session.map_or(0, |s| s.total_score),
            shots_fired: session.map_or(0, |s| s.shots_fired()),
            countdown_remaining: (state == AppState::StartRunningSession)
                .then_some(self.countdown_remaining),
            undelivered_events: self.undelivered_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueError;
    use crate::session::MemorySessionStore;
    use chrono::{Duration, TimeZone};
    use lasershot_core::{Ellipse, RgbImage, RgbImageView};
    use nalgebra::Point2;

    #[derive(Default)]
    struct Recorder {
        events: Vec<SessionEvent>,
        fail: bool,
    }

    impl EventSink for Recorder {
        fn submit(&mut self, event: &SessionEvent) -> Result<(), QueueError> {
            if self.fail {
                return Err(QueueError::Store(crate::persist::StoreError::Poisoned));
            }
            self.events.push(event.clone());
            Ok(())
        }
    }

    fn quad(x: f64, y: f64) -> MarkerQuad {
        MarkerQuad::new(
            Point2::new(x, y),
            Point2::new(x + 40.0, y),
            Point2::new(x, y + 40.0),
            Point2::new(x + 40.0, y + 40.0),
            "",
        )
    }

    fn four_markers(_: &RgbImageView<'_>) -> Vec<MarkerQuad> {
        vec![quad(20.0, 20.0), quad(580.0, 20.0), quad(20.0, 420.0), quad(580.0, 420.0)]
    }

    fn three_markers(_: &RgbImageView<'_>) -> Vec<MarkerQuad> {
        vec![quad(20.0, 20.0), quad(580.0, 20.0), quad(20.0, 420.0)]
    }

    fn target() -> Target {
        Target::from_ellipses(vec![
            Ellipse::new(320.0, 240.0, 100.0, 100.0).expect("ring"),
            Ellipse::new(320.0, 240.0, 300.0, 300.0).expect("ring"),
        ])
        .expect("target")
    }

    fn frame(index: u64) -> Frame {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).single().expect("valid");
        Frame::new(
            RgbImage::filled(640, 480, [90, 90, 90]),
            index,
            t0 + Duration::milliseconds(33 * index as i64),
        )
    }

    fn config(countdown: u64, budget: u64) -> LaserShotConfig {
        let mut cfg = LaserShotConfig::default();
        cfg.controller.countdown_frames = countdown;
        cfg.controller.calibration_frame_budget = budget;
        cfg
    }

    #[test]
    fn frames_are_ignored_until_calibration_starts() {
        let mut c = SessionController::new(
            &config(0, 10),
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        for i in 0..10 {
            assert_eq!(c.process_frame(&frame(i)).state, AppState::Initial);
        }
        assert!(c.mapping().is_none());
    }

    #[test]
    fn countdown_precedes_running() {
        let mut c = SessionController::new(
            &config(3, 50),
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        let states: Vec<AppState> = (0..8).map(|i| c.process_frame(&frame(i)).state).collect();
        assert_eq!(&states[..4], &[AppState::Calibrating; 4]);
        assert_eq!(states[4], AppState::StartRunningSession);
        assert_eq!(states[5], AppState::StartRunningSession);
        assert_eq!(states[6], AppState::StartRunningSession);
        assert_eq!(states[7], AppState::RunningSession);

        let snap = c.process_frame(&frame(8));
        assert_eq!(snap.corners.map(|r| r.upper_left), Some(Point2::new(20.0, 20.0)));
        assert!(snap.session_id.is_some());
        assert_eq!(c.sink().events.len(), 1);
        assert_eq!(c.sink().events[0].command(), "new_session");
    }

    #[test]
    fn zero_countdown_goes_straight_to_running() {
        let mut c = SessionController::new(
            &config(0, 50),
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        for i in 0..5 {
            c.process_frame(&frame(i));
        }
        assert_eq!(c.state(), AppState::RunningSession);
        let session = c.session().expect("session");
        assert_eq!(session.start_time, frame(4).timestamp);
    }

    #[test]
    fn calibration_budget_fails_and_can_be_rearmed() {
        let mut c = SessionController::new(
            &config(0, 6),
            target(),
            three_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        for i in 0..5 {
            let snap = c.process_frame(&frame(i));
            assert_eq!(snap.state, AppState::Calibrating);
            assert_eq!(snap.markers.len(), 3);
        }
        assert_eq!(c.process_frame(&frame(5)).state, AppState::CalibrationFailed);
        assert_eq!(c.process_frame(&frame(6)).state, AppState::CalibrationFailed);
        assert_eq!(c.start_calibration(), AppState::Calibrating);
        assert_eq!(c.process_frame(&frame(7)).state, AppState::Calibrating);
    }

    #[test]
    fn recalibration_closes_the_session() {
        let mut c = SessionController::new(
            &config(0, 50),
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        for i in 0..8 {
            c.process_frame(&frame(i));
        }
        let id = c.session().expect("running").id;
        assert_eq!(c.start_calibration(), AppState::Calibrating);
        assert!(c.session().is_none());
        assert_eq!(c.last_session().map(|s| s.id), Some(id));

        let commands: Vec<&str> = c.sink().events.iter().map(|e| e.command()).collect();
        assert_eq!(commands, ["new_session", "end_session"]);
        let stored = c.session_store().get_all().expect("all");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].finish_time, Some(frame(7).timestamp));
    }

    #[test]
    fn enqueue_failures_are_counted_not_fatal() {
        let sink = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut c = SessionController::new(
            &config(0, 50),
            target(),
            four_markers,
            sink,
            MemorySessionStore::new(),
        );
        c.start_calibration();
        let mut snap = None;
        for i in 0..6 {
            snap = Some(c.process_frame(&frame(i)));
        }
        let snap = snap.expect("snapshot");
        assert_eq!(snap.state, AppState::RunningSession);
        assert_eq!(snap.undelivered_events, 1);
    }

    #[test]
    fn session_budget_ends_the_session() {
        let mut cfg = config(0, 50);
        cfg.controller.session_frame_budget = Some(3);
        let mut c = SessionController::new(
            &cfg,
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        let mut frames = (0..20).map(frame);
        let processed = c.run(&mut frames, |_| {});
        assert_eq!(processed, 20);
        assert_eq!(c.state(), AppState::SessionEnded);
        assert_eq!(c.session_store().get_all().expect("all").len(), 1);
    }

    #[test]
    fn default_session_runs_until_ended() {
        assert_eq!(ControllerParams::default().session_frame_budget, None);
        let mut c = SessionController::new(
            &config(0, 50),
            target(),
            four_markers,
            Recorder::default(),
            MemorySessionStore::new(),
        );
        c.start_calibration();
        let mut frames = (0..60).map(frame);
        c.run(&mut frames, |_| {});
        assert_eq!(c.state(), AppState::RunningSession);

        assert_eq!(c.end_session(), AppState::SessionEnded);
        assert_eq!(c.session_store().get_all().expect("all").len(), 1);
    }
}
